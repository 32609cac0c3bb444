use super::{GroupingError, KeyResolver};
use crate::{
    context::{TaskId, WorkerContext},
    hash::hash_index,
    tuple::{GroupFields, TupleValues},
};
use std::{
    collections::BTreeMap,
    hash::{Hash, Hasher},
};

/// Routes the branches of a join by their join key.  Each upstream tuple
/// name has its own key extractor; keys from different branches that
/// compare equal land on the same task.
#[derive(Clone, Debug)]
pub struct JoinKeyGrouping {
    extractors: BTreeMap<String, GroupFields>,
    state: Option<(Vec<TaskId>, KeyResolver)>,
}

impl JoinKeyGrouping {
    pub fn new(extractors: BTreeMap<String, GroupFields>) -> Self {
        Self {
            extractors,
            state: None,
        }
    }

    pub fn extractors(&self) -> &BTreeMap<String, GroupFields> {
        &self.extractors
    }

    pub(super) fn prepare(&mut self, worker: &WorkerContext, targets: &[TaskId]) {
        self.state = Some((targets.to_vec(), KeyResolver::new(worker.schemas().clone())));
    }

    pub(super) fn choose_tasks(&mut self, tuple: &TupleValues) -> Result<Vec<TaskId>, GroupingError> {
        let (targets, resolver) = self.state.as_mut().ok_or(GroupingError::NotPrepared)?;
        let fields = self.extractors.get(tuple.tuple_name()).ok_or_else(|| {
            GroupingError::UnknownTupleName {
                tuple_name: tuple.tuple_name().to_string(),
            }
        })?;
        let key = resolver.key(fields, tuple)?;
        Ok(vec![targets[hash_index(&key, targets.len())]])
    }
}

impl PartialEq for JoinKeyGrouping {
    fn eq(&self, other: &Self) -> bool {
        self.extractors == other.extractors
    }
}

impl Eq for JoinKeyGrouping {}

impl Hash for JoinKeyGrouping {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.extractors.hash(state);
    }
}

#[cfg(test)]
mod test {
    use super::super::test::{tasks, worker};
    use crate::context::TaskId;
    use crate::grouping::{Grouping, GroupingError, StreamId};
    use crate::tuple::{GroupFields, TupleValues};
    use std::collections::BTreeMap;

    fn prepared() -> Grouping {
        let mut grouping = Grouping::join_key(BTreeMap::from([
            ("click".to_string(), GroupFields::from_names(["user"])),
            ("view".to_string(), GroupFields::from_names(["user"])),
        ]));
        grouping
            .prepare(&worker(), &StreamId::new("join", "default"), &tasks(&[0, 1, 2, 3, 4, 5, 6]))
            .unwrap();
        grouping
    }

    #[test]
    fn branches_with_equal_keys_meet() {
        let mut grouping = prepared();
        for user in ["alice", "bob", "carol", "dave"] {
            let click = TupleValues::new("click", vec![user.into(), "/home".into()]);
            let view = TupleValues::new("view", vec!["/other".into(), user.into(), 12.into()]);
            assert_eq!(
                grouping.choose_tasks(TaskId(0), &click).unwrap(),
                grouping.choose_tasks(TaskId(0), &view).unwrap()
            );
        }
    }

    #[test]
    fn unknown_branch_is_fatal() {
        let mut grouping = prepared();
        let tuple = TupleValues::new("purchase", vec![]);
        assert_eq!(
            grouping.choose_tasks(TaskId(0), &tuple),
            Err(GroupingError::UnknownTupleName {
                tuple_name: "purchase".to_string()
            })
        );
    }
}
