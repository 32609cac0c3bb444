use super::{GroupingError, KeyResolver};
use crate::{
    context::{TaskId, WorkerContext},
    hash::hash_index,
    tuple::{GroupFields, TupleValues},
};
use std::hash::{Hash, Hasher};

/// Routes by a stable hash of the configured fields, so that all tuples
/// sharing a key reach the same task for the life of the worker.
#[derive(Clone, Debug)]
pub struct FieldsGrouping {
    fields: GroupFields,
    state: Option<(Vec<TaskId>, KeyResolver)>,
}

impl FieldsGrouping {
    pub fn new(fields: GroupFields) -> Self {
        Self {
            fields,
            state: None,
        }
    }

    pub fn group_fields(&self) -> &GroupFields {
        &self.fields
    }

    pub(super) fn prepare(&mut self, worker: &WorkerContext, targets: &[TaskId]) {
        self.state = Some((targets.to_vec(), KeyResolver::new(worker.schemas().clone())));
    }

    pub(super) fn choose_tasks(&mut self, tuple: &TupleValues) -> Result<Vec<TaskId>, GroupingError> {
        let (targets, resolver) = self.state.as_mut().ok_or(GroupingError::NotPrepared)?;
        let key = resolver.key(&self.fields, tuple)?;
        Ok(vec![targets[hash_index(&key, targets.len())]])
    }
}

impl PartialEq for FieldsGrouping {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl Eq for FieldsGrouping {}

impl Hash for FieldsGrouping {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fields.hash(state);
    }
}
