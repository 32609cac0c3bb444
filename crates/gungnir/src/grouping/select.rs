use super::{Grouping, GroupingError, StreamId};
use crate::{
    context::{TaskId, WorkerContext},
    tuple::TupleValues,
};
use std::collections::BTreeMap;

/// Router of routers for an edge that multiplexes several upstream
/// schemas: picks the inner grouping by tuple name and delegates to it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SelectGrouping {
    routes: BTreeMap<String, Grouping>,
}

impl SelectGrouping {
    pub fn new(routes: BTreeMap<String, Grouping>) -> Self {
        Self { routes }
    }

    pub fn routes(&self) -> &BTreeMap<String, Grouping> {
        &self.routes
    }

    pub(super) fn prepare(
        &mut self,
        worker: &WorkerContext,
        stream: &StreamId,
        targets: &[TaskId],
    ) -> Result<(), GroupingError> {
        self.routes
            .values_mut()
            .try_for_each(|grouping| grouping.prepare(worker, stream, targets))
    }

    pub(super) fn choose_tasks(
        &mut self,
        caller: TaskId,
        tuple: &TupleValues,
    ) -> Result<Vec<TaskId>, GroupingError> {
        self.routes
            .get_mut(tuple.tuple_name())
            .ok_or_else(|| GroupingError::UnknownTupleName {
                tuple_name: tuple.tuple_name().to_string(),
            })?
            .choose_tasks(caller, tuple)
    }

    pub(super) fn is_partitioned(&self) -> bool {
        !self.routes.is_empty() && self.routes.values().all(Grouping::is_partitioned)
    }
}

#[cfg(test)]
mod test {
    use super::super::test::{tasks, worker};
    use crate::context::TaskId;
    use crate::grouping::{Grouping, StreamId};
    use crate::tuple::{GroupFields, TupleValues};
    use std::collections::BTreeMap;

    #[test]
    fn delegates_by_tuple_name() {
        let mut grouping = Grouping::select(BTreeMap::from([
            ("click".to_string(), Grouping::global()),
            (
                "view".to_string(),
                Grouping::fields(GroupFields::from_names(["user"])),
            ),
        ]));
        let targets = tasks(&[8, 2, 6]);
        grouping
            .prepare(&worker(), &StreamId::new("merge", "default"), &targets)
            .unwrap();
        assert!(grouping.is_partitioned());

        let click = TupleValues::new("click", vec!["u".into(), "/".into()]);
        assert_eq!(grouping.choose_tasks(TaskId(8), &click).unwrap(), vec![TaskId(2)]);

        let view = TupleValues::new("view", vec!["/".into(), "u".into(), 1.into()]);
        let first = grouping.choose_tasks(TaskId(8), &view).unwrap();
        assert_eq!(grouping.choose_tasks(TaskId(6), &view).unwrap(), first);
        assert!(targets.contains(&first[0]));
    }

    #[test]
    fn shuffle_route_is_not_partitioned() {
        let grouping = Grouping::select(BTreeMap::from([
            ("click".to_string(), Grouping::global()),
            ("view".to_string(), Grouping::shuffle()),
        ]));
        assert!(!grouping.is_partitioned());
    }
}
