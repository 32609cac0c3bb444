use super::{DispatchError, Dispatcher};
use crate::{context::TaskContext, tuple::TupleValues};
use gungnir_types::config::Config;
use std::sync::Arc;

/// Fans each tuple out to its children in registration order.
///
/// Every child owns its dispatch subtree, including any filter cursor, so
/// concurrent paths never share per-call state.  Each child except the last
/// receives a copy of the values; the last one receives the original.
pub struct MultiDispatcher {
    children: Vec<Dispatcher>,
}

impl MultiDispatcher {
    pub fn new(children: Vec<Dispatcher>) -> Self {
        Self { children }
    }

    pub fn with_child(mut self, child: impl Into<Dispatcher>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn children(&self) -> &[Dispatcher] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut [Dispatcher] {
        &mut self.children
    }

    pub(super) fn prepare(
        &mut self,
        config: &Arc<Config>,
        context: &Arc<TaskContext>,
    ) -> Result<(), DispatchError> {
        self.children
            .iter_mut()
            .try_for_each(|child| child.prepare(config, context))
    }

    pub(super) fn dispatch(&mut self, values: TupleValues) -> Result<(), DispatchError> {
        let Some((last, rest)) = self.children.split_last_mut() else {
            return Ok(());
        };
        for child in rest {
            child.dispatch(values.clone())?;
        }
        last.dispatch(values)
    }

    pub(super) fn cleanup(&mut self) {
        for child in &mut self.children {
            child.cleanup();
        }
    }
}

#[cfg(test)]
mod test {
    use super::MultiDispatcher;
    use crate::{
        dispatcher::{
            test::{click, config, context, Tracker, TrackingOperator},
            Dispatcher, DispatcherKind, FilterDispatcher, SingleDispatcher,
        },
        filter::from_fn,
        operator::{Collector, Operator, OperatorNode, SharedOperator},
        tuple::{GungnirTuple, TupleValues},
    };
    use pretty_assertions::assert_eq;

    /// Appends a marker to every tuple it receives before recording it.
    struct Tag {
        marker: &'static str,
        inner: TrackingOperator,
    }

    impl Operator for Tag {
        fn name(&self) -> &str {
            self.marker
        }

        fn execute(&mut self, tuple: GungnirTuple, output: &mut Collector) -> anyhow::Result<()> {
            let mut values = tuple.tuple_values().clone();
            values.values_mut().push(self.marker.into());
            self.inner
                .execute(GungnirTuple::new(tuple.schema().clone(), values), output)
        }
    }

    fn tagged(marker: &'static str, tracker: &Tracker) -> SharedOperator {
        SharedOperator::new(OperatorNode::new(Tag {
            marker,
            inner: TrackingOperator::new(marker, tracker),
        }))
    }

    #[test]
    fn children_get_independent_copies() {
        let (left, right) = (Tracker::default(), Tracker::default());
        let mut dispatcher = Dispatcher::multi(
            MultiDispatcher::new(vec![])
                .with_child(SingleDispatcher::new(tagged("l", &left)))
                .with_child(SingleDispatcher::new(tagged("r", &right))),
        );
        dispatcher.prepare(&config(), &context()).unwrap();
        dispatcher.dispatch(click("a", "/")).unwrap();

        assert_eq!(
            left.seen(),
            vec![TupleValues::new("click", vec!["a".into(), "/".into(), "l".into()])]
        );
        assert_eq!(
            right.seen(),
            vec![TupleValues::new("click", vec!["a".into(), "/".into(), "r".into()])]
        );
    }

    #[test]
    fn filter_children_keep_separate_cursors() {
        let (even, short) = (Tracker::default(), Tracker::default());
        let even_filter = FilterDispatcher::new(SingleDispatcher::new(tagged("even", &even)))
            .with_filter(from_fn(|t: &GungnirTuple| t.get(0).is_some()))
            .with_filter(from_fn(|t: &GungnirTuple| {
                t.get(0)
                    .and_then(|v| v.as_str())
                    .is_some_and(|user| user.len() % 2 == 0)
            }));
        let short_filter = FilterDispatcher::new(SingleDispatcher::new(tagged("short", &short)))
            .with_filter(from_fn(|t: &GungnirTuple| {
                t.get(0)
                    .and_then(|v| v.as_str())
                    .is_some_and(|user| user.len() <= 2)
            }))
            .with_filter(from_fn(|_: &GungnirTuple| true))
            .with_filter(from_fn(|_: &GungnirTuple| true));

        let mut dispatcher = Dispatcher::multi(MultiDispatcher::new(vec![
            even_filter.into(),
            short_filter.into(),
        ]));
        dispatcher.prepare(&config(), &context()).unwrap();

        let users = ["a", "bb", "ccc", "dddd", "ee"];
        for user in users {
            dispatcher.dispatch(click(user, "/")).unwrap();
            let DispatcherKind::Multi(multi) = dispatcher.kind() else {
                unreachable!()
            };
            for child in multi.children() {
                let DispatcherKind::Filter(filter) = child.kind() else {
                    unreachable!()
                };
                assert_eq!(filter.cursor(), 0);
            }
        }

        let users_of = |tracker: &Tracker| -> Vec<String> {
            tracker
                .seen()
                .iter()
                .map(|t| t.values()[0].as_str().unwrap_or_default().to_string())
                .collect()
        };
        assert_eq!(users_of(&even), vec!["bb", "dddd", "ee"]);
        assert_eq!(users_of(&short), vec!["a", "bb", "ee"]);
    }

    #[test]
    fn empty_fan_out() {
        let mut dispatcher = Dispatcher::multi(MultiDispatcher::new(vec![]));
        dispatcher.prepare(&config(), &context()).unwrap();
        dispatcher.dispatch(click("a", "/")).unwrap();
    }
}
