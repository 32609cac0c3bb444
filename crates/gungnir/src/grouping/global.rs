use super::GroupingError;
use crate::context::TaskId;
use std::hash::{Hash, Hasher};

/// Pins every tuple of a stream to the lowest candidate task, centralizing
/// the stream on a single instance for the life of the worker.
#[derive(Clone, Debug, Default)]
pub struct GlobalGrouping {
    target: Option<TaskId>,
}

impl GlobalGrouping {
    pub fn new() -> Self {
        Self::default()
    }

    pub(super) fn prepare(&mut self, targets: &[TaskId]) {
        let mut sorted = targets.to_vec();
        sorted.sort_unstable();
        self.target = sorted.first().copied();
    }

    pub(super) fn choose_tasks(&self) -> Result<Vec<TaskId>, GroupingError> {
        self.target
            .map(|target| vec![target])
            .ok_or(GroupingError::NotPrepared)
    }

    /// The task every tuple is routed to, once prepared.
    pub fn target(&self) -> Option<TaskId> {
        self.target
    }
}

impl PartialEq for GlobalGrouping {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl Eq for GlobalGrouping {}

impl Hash for GlobalGrouping {
    fn hash<H: Hasher>(&self, state: &mut H) {
        "global".hash(state);
    }
}

#[cfg(test)]
mod test {
    use super::super::test::{tasks, worker};
    use crate::context::TaskId;
    use crate::grouping::{Grouping, StreamId};
    use crate::tuple::TupleValues;

    #[test]
    fn pins_lowest_task() {
        let mut grouping = Grouping::global();
        grouping
            .prepare(&worker(), &StreamId::new("source", "default"), &tasks(&[9, 3, 5]))
            .unwrap();

        for user in ["a", "b", "c"] {
            let tuple = TupleValues::new("click", vec![user.into(), "/".into()]);
            assert_eq!(grouping.choose_tasks(TaskId(9), &tuple).unwrap(), vec![TaskId(3)]);
        }
    }
}
