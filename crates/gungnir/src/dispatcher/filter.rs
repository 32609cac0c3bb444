use super::{DispatchError, Dispatcher, Scope};
use crate::{
    context::TaskContext,
    filter::TupleFilter,
    tuple::{GungnirTuple, Schema, TupleValues},
};
use gungnir_types::config::Config;
use std::sync::Arc;

/// Ordered chain of predicates in front of a terminal dispatcher.
///
/// The cursor records how far the current tuple has advanced through the
/// chain.  It is back at zero whenever `dispatch` returns, whether the tuple
/// was forwarded, dropped or failed.
pub struct FilterDispatcher {
    filters: Vec<Box<dyn TupleFilter>>,
    cursor: usize,
    schema: Option<Arc<Schema>>,
    terminal: Box<Dispatcher>,
}

impl FilterDispatcher {
    pub fn new(terminal: impl Into<Dispatcher>) -> Self {
        Self {
            filters: Vec::new(),
            cursor: 0,
            schema: None,
            terminal: Box::new(terminal.into()),
        }
    }

    /// Evaluates filters against `schema` instead of the schema registered
    /// under the tuple name, as [`SingleDispatcher::with_schema`] does for
    /// its target.
    ///
    /// [`SingleDispatcher::with_schema`]: super::SingleDispatcher::with_schema
    pub fn with_schema(mut self, schema: Arc<Schema>) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_filter(mut self, filter: impl TupleFilter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn terminal(&self) -> &Dispatcher {
        &self.terminal
    }

    pub fn terminal_mut(&mut self) -> &mut Dispatcher {
        &mut self.terminal
    }

    pub(super) fn prepare(
        &mut self,
        source: &str,
        config: &Arc<Config>,
        context: &Arc<TaskContext>,
    ) -> Result<(), DispatchError> {
        for filter in &mut self.filters {
            filter
                .prepare(config, context)
                .map_err(|source_error| DispatchError::Prepare {
                    operator: format!("{source} filter"),
                    source: source_error,
                })?;
        }
        Ok(())
    }

    pub(super) fn dispatch(
        &mut self,
        scope: &Scope<'_>,
        values: TupleValues,
    ) -> Result<(), DispatchError> {
        let result = self.advance(scope, values);
        self.cursor = 0;
        result
    }

    fn advance(&mut self, scope: &Scope<'_>, values: TupleValues) -> Result<(), DispatchError> {
        let schema = match &self.schema {
            Some(schema) => schema.clone(),
            None => scope.context.schemas().resolve(values.tuple_name())?.clone(),
        };
        let tuple = GungnirTuple::new(schema, values);
        while self.cursor < self.filters.len() {
            let filter = &mut self.filters[self.cursor];
            self.cursor += 1;
            let accepted = filter
                .accept(&tuple)
                .map_err(|source| DispatchError::Filter {
                    source_operator: scope.source.to_string(),
                    source,
                })?;
            if !accepted {
                return Ok(());
            }
        }
        self.cursor = 0;
        self.terminal.prepare(scope.config, scope.context)?;
        self.terminal.dispatch(tuple.into_tuple_values())
    }

    pub(super) fn cleanup(&mut self) {
        for filter in &mut self.filters {
            filter.cleanup();
        }
        self.terminal.cleanup();
    }
}

#[cfg(test)]
mod test {
    use super::FilterDispatcher;
    use crate::{
        context::TaskContext,
        dispatcher::{
            test::{click, config, context, tracked_target, Tracker},
            DispatchError, Dispatcher, DispatcherKind, SingleDispatcher,
        },
        error::DetailedError,
        filter::{from_fn, Condition, TupleFilter},
        tuple::{FieldAccessor, GungnirTuple, Schema, TupleValues},
    };
    use gungnir_types::config::Config;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn cursor(dispatcher: &Dispatcher) -> usize {
        match dispatcher.kind() {
            DispatcherKind::Filter(filter) => filter.cursor(),
            _ => unreachable!(),
        }
    }

    #[test]
    fn chain_drops_and_forwards() {
        let tracker = Tracker::default();
        let mut dispatcher = Dispatcher::filter(
            FilterDispatcher::new(SingleDispatcher::new(tracked_target("sink", &tracker)))
                .with_filter(Condition::Ne(FieldAccessor::new("user"), "bot".into()))
                .with_filter(Condition::Eq(FieldAccessor::new("page"), "/buy".into())),
        );
        dispatcher.prepare(&config(), &context()).unwrap();

        for (user, page) in [("ann", "/buy"), ("bot", "/buy"), ("bob", "/home"), ("cid", "/buy")] {
            dispatcher.dispatch(click(user, page)).unwrap();
            assert_eq!(cursor(&dispatcher), 0);
        }
        assert_eq!(tracker.seen(), vec![click("ann", "/buy"), click("cid", "/buy")]);
        assert_eq!(tracker.prepared(), 1);
    }

    #[test]
    fn empty_chain_forwards_everything() {
        let tracker = Tracker::default();
        let mut dispatcher = Dispatcher::filter(FilterDispatcher::new(SingleDispatcher::new(
            tracked_target("sink", &tracker),
        )));
        dispatcher.prepare(&config(), &context()).unwrap();
        dispatcher.dispatch(click("ann", "/")).unwrap();
        assert_eq!(tracker.seen().len(), 1);
    }

    struct Failing;

    impl TupleFilter for Failing {
        fn accept(&mut self, _tuple: &GungnirTuple) -> anyhow::Result<bool> {
            anyhow::bail!("unavailable")
        }
    }

    #[test]
    fn failure_resets_cursor() {
        let tracker = Tracker::default();
        let mut dispatcher = Dispatcher::filter(
            FilterDispatcher::new(SingleDispatcher::new(tracked_target("sink", &tracker)))
                .with_filter(from_fn(|_: &GungnirTuple| true))
                .with_filter(Failing),
        );
        dispatcher.set_source("source");
        dispatcher.prepare(&config(), &context()).unwrap();

        let error = dispatcher.dispatch(click("ann", "/")).unwrap_err();
        assert!(matches!(
            error,
            DispatchError::Filter { ref source_operator, .. } if source_operator == "source"
        ));
        assert_eq!(cursor(&dispatcher), 0);
        assert!(tracker.seen().is_empty());
    }

    #[test]
    fn schema_override() {
        let tracker = Tracker::default();
        let renamed = Arc::new(Schema::new("click", ["visitor", "url"]));
        let mut dispatcher = Dispatcher::filter(
            FilterDispatcher::new(SingleDispatcher::new(tracked_target("sink", &tracker)))
                .with_schema(renamed)
                .with_filter(Condition::Eq(FieldAccessor::new("url"), "/buy".into())),
        );
        dispatcher.prepare(&config(), &context()).unwrap();

        let visit = |page: &str| TupleValues::new("visit", vec!["ann".into(), page.into()]);
        dispatcher.dispatch(visit("/home")).unwrap();
        dispatcher.dispatch(visit("/buy")).unwrap();
        assert_eq!(tracker.seen(), vec![visit("/buy")]);
    }

    struct BrokenSetup;

    impl TupleFilter for BrokenSetup {
        fn prepare(&mut self, _config: &Config, _context: &TaskContext) -> anyhow::Result<()> {
            anyhow::bail!("rules file missing")
        }

        fn accept(&mut self, _tuple: &GungnirTuple) -> anyhow::Result<bool> {
            Ok(true)
        }
    }

    #[test]
    fn failed_setup_blocks_the_chain() {
        let tracker = Tracker::default();
        let mut dispatcher = Dispatcher::filter(
            FilterDispatcher::new(SingleDispatcher::new(tracked_target("sink", &tracker)))
                .with_filter(BrokenSetup),
        );

        assert!(matches!(
            dispatcher.prepare(&config(), &context()),
            Err(DispatchError::Prepare { .. })
        ));
        let again = dispatcher.prepare(&config(), &context()).unwrap_err();
        assert!(matches!(again, DispatchError::PreviouslyFailed { .. }));
        assert_eq!(again.to_string(), "filter dispatcher failed to prepare earlier");
        assert_eq!(again.error_code(), "PreviouslyFailed");

        let error = dispatcher.dispatch(click("ann", "/")).unwrap_err();
        assert!(matches!(error, DispatchError::PreviouslyFailed { .. }));
        assert!(!dispatcher.is_prepared());
        assert!(tracker.seen().is_empty());
        assert_eq!(tracker.prepared(), 0);
    }
}
