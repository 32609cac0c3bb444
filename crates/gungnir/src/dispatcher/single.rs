use super::{DispatchError, Scope};
use crate::{
    context::TaskContext,
    metrics::{Counter, DISPATCH_COUNT},
    operator::SharedOperator,
    tuple::{GungnirTuple, Schema, TupleValues},
};
use gungnir_types::config::Config;
use std::sync::Arc;
use tracing::debug;

/// Delivers every tuple to one target operator.
pub struct SingleDispatcher {
    target: SharedOperator,
    schema: Option<Arc<Schema>>,
    dispatched: Counter,
}

impl SingleDispatcher {
    pub fn new(target: SharedOperator) -> Self {
        Self {
            target,
            schema: None,
            dispatched: Counter::noop(),
        }
    }

    /// Binds delivered tuples to `schema` instead of the schema registered
    /// under their tuple name.  Used when the target reads merged or renamed
    /// fields.
    pub fn with_schema(mut self, schema: Arc<Schema>) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn target(&self) -> &SharedOperator {
        &self.target
    }

    pub(super) fn prepare(
        &mut self,
        source: &str,
        config: &Arc<Config>,
        context: &Arc<TaskContext>,
    ) -> Result<(), DispatchError> {
        if config.metrics_enabled()? {
            let target = self.target.lock().name().to_string();
            self.dispatched = dispatch_counter(source, &target, context);
        }
        Ok(())
    }

    pub(super) fn dispatch(
        &mut self,
        scope: &Scope<'_>,
        values: TupleValues,
    ) -> Result<(), DispatchError> {
        let schema = match &self.schema {
            Some(schema) => schema.clone(),
            None => scope.context.schemas().resolve(values.tuple_name())?.clone(),
        };
        let mut target = self.target.lock();
        target.prepare(scope.config, scope.context)?;
        debug!(source = scope.source, target = target.name(), tuple = %values, "dispatch");
        self.dispatched.increment(1);
        target.execute(GungnirTuple::new(schema, values))
    }

    pub(super) fn cleanup(&mut self) {
        self.target.lock().cleanup();
    }
}

pub(super) fn dispatch_counter(source: &str, target: &str, context: &TaskContext) -> Counter {
    Counter::new(
        DISPATCH_COUNT,
        context,
        vec![
            ("source".to_owned(), source.to_owned()),
            ("target".to_owned(), target.to_owned()),
        ],
    )
}

#[cfg(test)]
mod test {
    use super::SingleDispatcher;
    use crate::{
        dispatcher::{
            test::{click, context, tracked_target, Tracker},
            Dispatcher,
        },
        metrics::{metric_name, DISPATCH_COUNT},
        tuple::{Schema, TupleValues},
    };
    use gungnir_types::{config::Config, constants::METRICS_ENABLED};
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};
    use std::sync::Arc;

    #[test]
    fn schema_override() {
        let tracker = Tracker::default();
        let renamed = Arc::new(Schema::new("click", ["visitor", "url"]));
        let mut dispatcher = Dispatcher::single(
            SingleDispatcher::new(tracked_target("sink", &tracker)).with_schema(renamed),
        );
        dispatcher.prepare(&Arc::new(Config::new()), &context()).unwrap();

        // Unregistered tuple names are fine once the schema is bound.
        dispatcher
            .dispatch(TupleValues::new("visit", vec!["a".into(), "/".into()]))
            .unwrap();
        assert_eq!(tracker.seen().len(), 1);
    }

    #[test]
    fn counts_dispatches_when_metrics_enabled() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        let tracker = Tracker::default();

        metrics::with_local_recorder(&recorder, || {
            let config = Arc::new(Config::new().with(METRICS_ENABLED, true));
            let mut dispatcher = Dispatcher::single(SingleDispatcher::new(tracked_target("sink", &tracker)));
            dispatcher.set_source("source");
            dispatcher.prepare(&config, &context()).unwrap();
            for _ in 0..3 {
                dispatcher.dispatch(click("a", "/")).unwrap();
            }
        });

        let counts: Vec<_> = snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .filter(|(key, ..)| key.key().name() == metric_name(DISPATCH_COUNT))
            .collect();
        assert_eq!(counts.len(), 1);
        let (key, _, _, value) = &counts[0];
        assert!(key
            .key()
            .labels()
            .any(|label| label.key() == "target" && label.value() == "sink"));
        assert_eq!(value, &DebugValue::Counter(3));
    }
}
