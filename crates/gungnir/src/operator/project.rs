use super::{Collector, Operator};
use crate::tuple::{FieldAccessor, GungnirTuple, TupleValues};

/// Emits a new tuple holding the selected fields, in the given order.
pub struct ProjectOperator {
    name: String,
    fields: Vec<FieldAccessor>,
    output_tuple_name: String,
}

impl ProjectOperator {
    pub fn new(
        name: impl Into<String>,
        fields: Vec<FieldAccessor>,
        output_tuple_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            fields,
            output_tuple_name: output_tuple_name.into(),
        }
    }
}

impl Operator for ProjectOperator {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&mut self, tuple: GungnirTuple, output: &mut Collector) -> anyhow::Result<()> {
        let values = self
            .fields
            .iter()
            .map(|field| field.get(&tuple).cloned())
            .collect::<Result<Vec<_>, _>>()?;
        output.emit(TupleValues::new(self.output_tuple_name.clone(), values));
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::ProjectOperator;
    use crate::{
        dispatcher::{
            test::{click, config, context, tracked_target, Tracker},
            Dispatcher, MultiDispatcher, SharedDispatcher, SingleDispatcher,
        },
        operator::{OperatorNode, SharedOperator},
        tuple::{FieldAccessor, Schema, TupleValues},
    };
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[test]
    fn projection_does_not_touch_sibling_copy() {
        let (projected, raw) = (Tracker::default(), Tracker::default());
        let visits = SingleDispatcher::new(tracked_target("visits", &projected))
            .with_schema(Arc::new(Schema::new("visit", ["page", "user"])));
        let project = OperatorNode::new(ProjectOperator::new(
            "project",
            vec![FieldAccessor::new("page"), FieldAccessor::new("user")],
            "visit",
        ))
        .with_dispatcher(SharedDispatcher::new(visits));

        let mut dispatcher = Dispatcher::multi(
            MultiDispatcher::new(vec![])
                .with_child(SingleDispatcher::new(SharedOperator::new(project)))
                .with_child(SingleDispatcher::new(tracked_target("raw", &raw))),
        );
        dispatcher.prepare(&config(), &context()).unwrap();
        dispatcher.dispatch(click("ann", "/buy")).unwrap();

        assert_eq!(
            projected.seen(),
            vec![TupleValues::new("visit", vec!["/buy".into(), "ann".into()])]
        );
        assert_eq!(raw.seen(), vec![click("ann", "/buy")]);
    }

    #[test]
    fn missing_field_fails_the_tuple() {
        let mut dispatcher = Dispatcher::single(SingleDispatcher::new(SharedOperator::new(
            OperatorNode::new(ProjectOperator::new(
                "project",
                vec![FieldAccessor::new("referrer")],
                "visit",
            )),
        )));
        dispatcher.prepare(&config(), &context()).unwrap();
        assert!(dispatcher.dispatch(click("ann", "/")).is_err());
    }
}
