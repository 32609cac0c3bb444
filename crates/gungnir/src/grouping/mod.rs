//! Cross-task routing: for every tuple leaving a task, choose the
//! downstream task instances that receive it.
//!
//! A [`Grouping`] is prepared once per physical stream edge with the full
//! list of candidate tasks for that edge, then asked to
//! [`choose_tasks`](Grouping::choose_tasks) for each outbound tuple.
//!
//! Equality and hashing of groupings are defined on their configuration
//! only: a prepared grouping equals a fresh one with the same fields.

mod fields;
mod global;
mod join_key;
mod select;
mod shuffle;

pub use fields::FieldsGrouping;
pub use global::GlobalGrouping;
pub use join_key::JoinKeyGrouping;
pub use select::SelectGrouping;
pub use shuffle::ShuffleGrouping;

use crate::{
    context::{TaskId, WorkerContext},
    error::DetailedError,
    tuple::{GroupFields, GroupKey, Schema, SchemaRegistry, TupleError, TupleValues},
};
use serde::Serialize;
use std::{
    borrow::Cow,
    collections::{BTreeMap, HashMap},
    fmt::{self, Display},
    sync::Arc,
};
use thiserror::Error;

/// Identifies a physical stream edge: the emitting component and the
/// stream name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct StreamId {
    pub component: String,
    pub stream: String,
}

impl StreamId {
    pub fn new(component: impl Into<String>, stream: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            stream: stream.into(),
        }
    }
}

impl Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.component, self.stream)
    }
}

/// Routing failures.  All of them indicate a defect in graph construction
/// and are fatal for the task.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum GroupingError {
    #[error("stream '{stream}' has no candidate tasks")]
    NoTargets { stream: StreamId },

    #[error("grouping used before prepare")]
    NotPrepared,

    #[error("no key extractor for tuple '{tuple_name}'")]
    UnknownTupleName { tuple_name: String },

    #[error(transparent)]
    Tuple(#[from] TupleError),
}

impl DetailedError for GroupingError {
    fn error_code(&self) -> Cow<'static, str> {
        match self {
            Self::NoTargets { .. } => Cow::from("NoTargetTasks"),
            Self::NotPrepared => Cow::from("GroupingNotPrepared"),
            Self::UnknownTupleName { .. } => Cow::from("UnknownTupleName"),
            Self::Tuple(error) => error.error_code(),
        }
    }
}

/// Routing strategy of one stream edge.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Grouping {
    /// One uniformly random candidate per tuple.
    Shuffle(ShuffleGrouping),
    /// Every tuple goes to the lowest candidate task.
    Global(GlobalGrouping),
    /// Hash of the configured fields.
    Fields(FieldsGrouping),
    /// Hash of a per-tuple-name join key.
    JoinKey(JoinKeyGrouping),
    /// Delegates by tuple name to another grouping.
    Select(SelectGrouping),
}

impl Grouping {
    pub fn shuffle() -> Self {
        Self::Shuffle(ShuffleGrouping::new())
    }

    pub fn global() -> Self {
        Self::Global(GlobalGrouping::new())
    }

    pub fn fields(fields: GroupFields) -> Self {
        Self::Fields(FieldsGrouping::new(fields))
    }

    pub fn join_key(extractors: BTreeMap<String, GroupFields>) -> Self {
        Self::JoinKey(JoinKeyGrouping::new(extractors))
    }

    pub fn select(routes: BTreeMap<String, Grouping>) -> Self {
        Self::Select(SelectGrouping::new(routes))
    }

    /// Called once per stream edge when the owning worker starts.
    pub fn prepare(
        &mut self,
        worker: &WorkerContext,
        stream: &StreamId,
        targets: &[TaskId],
    ) -> Result<(), GroupingError> {
        if targets.is_empty() {
            return Err(GroupingError::NoTargets {
                stream: stream.clone(),
            });
        }
        match self {
            Self::Shuffle(grouping) => grouping.prepare(targets),
            Self::Global(grouping) => grouping.prepare(targets),
            Self::Fields(grouping) => grouping.prepare(worker, targets),
            Self::JoinKey(grouping) => grouping.prepare(worker, targets),
            Self::Select(grouping) => return grouping.prepare(worker, stream, targets),
        }
        Ok(())
    }

    /// Called once per outbound tuple.
    pub fn choose_tasks(
        &mut self,
        caller: TaskId,
        tuple: &TupleValues,
    ) -> Result<Vec<TaskId>, GroupingError> {
        match self {
            Self::Shuffle(grouping) => grouping.choose_tasks(),
            Self::Global(grouping) => grouping.choose_tasks(),
            Self::Fields(grouping) => grouping.choose_tasks(tuple),
            Self::JoinKey(grouping) => grouping.choose_tasks(tuple),
            Self::Select(grouping) => grouping.choose_tasks(caller, tuple),
        }
    }

    /// Whether tuples sharing a key always reach the same task.
    pub fn is_partitioned(&self) -> bool {
        match self {
            Self::Shuffle(_) => false,
            Self::Global(_) | Self::Fields(_) | Self::JoinKey(_) => true,
            Self::Select(grouping) => grouping.is_partitioned(),
        }
    }
}

impl Display for Grouping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shuffle(_) => f.write_str("shuffle"),
            Self::Global(_) => f.write_str("global"),
            Self::Fields(grouping) => write!(f, "fields({})", grouping.group_fields()),
            Self::JoinKey(_) => f.write_str("join_key"),
            Self::Select(_) => f.write_str("select"),
        }
    }
}

/// Resolves group field positions per tuple name, caching the result so
/// that schema lookups happen once per tuple name rather than once per
/// tuple.
#[derive(Clone, Debug)]
pub(crate) struct KeyResolver {
    schemas: SchemaRegistry,
    indices: HashMap<String, (Arc<Schema>, Vec<usize>)>,
}

impl KeyResolver {
    pub(crate) fn new(schemas: SchemaRegistry) -> Self {
        Self {
            schemas,
            indices: HashMap::new(),
        }
    }

    /// Builds the hash key of `tuple` from `fields`.
    pub(crate) fn key(
        &mut self,
        fields: &GroupFields,
        tuple: &TupleValues,
    ) -> Result<GroupKey, TupleError> {
        if !self.indices.contains_key(tuple.tuple_name()) {
            let schema = self.schemas.resolve(tuple.tuple_name())?.clone();
            let indices = fields.indices_in(&schema)?;
            self.indices
                .insert(tuple.tuple_name().to_string(), (schema, indices));
        }
        let (schema, indices) = &self.indices[tuple.tuple_name()];
        indices
            .iter()
            .zip(fields.fields())
            .map(|(index, field)| {
                tuple
                    .get(*index)
                    .cloned()
                    .ok_or_else(|| TupleError::UnknownField {
                        tuple_name: schema.name().to_string(),
                        field: field.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(GroupKey::new)
    }
}

#[cfg(test)]
mod test {
    use super::{Grouping, GroupingError, StreamId};
    use crate::{
        context::{TaskId, WorkerContext},
        hash::default_hash,
        tuple::{GroupFields, Schema, SchemaRegistry, TupleValues},
    };
    use std::collections::BTreeMap;

    pub(crate) fn worker() -> WorkerContext {
        let schemas = SchemaRegistry::new()
            .with_schema(Schema::new("click", ["user", "page"]))
            .with_schema(Schema::new("view", ["page", "user", "duration"]));
        WorkerContext::new("test", 0, schemas)
    }

    pub(crate) fn tasks(ids: &[u32]) -> Vec<TaskId> {
        ids.iter().copied().map(TaskId).collect()
    }

    #[test]
    fn empty_targets_are_fatal() {
        let stream = StreamId::new("source", "default");
        for mut grouping in [
            Grouping::shuffle(),
            Grouping::global(),
            Grouping::fields(GroupFields::from_names(["user"])),
        ] {
            assert_eq!(
                grouping.prepare(&worker(), &stream, &[]),
                Err(GroupingError::NoTargets {
                    stream: stream.clone()
                })
            );
        }
    }

    #[test]
    fn unprepared_grouping() {
        let tuple = TupleValues::new("click", vec!["a".into(), "b".into()]);
        assert_eq!(
            Grouping::global().choose_tasks(TaskId(0), &tuple),
            Err(GroupingError::NotPrepared)
        );
    }

    #[test]
    fn equality_ignores_prepared_state() {
        let fields = GroupFields::from_names(["user"]);
        let mut prepared = Grouping::fields(fields.clone());
        prepared
            .prepare(&worker(), &StreamId::new("s", "default"), &tasks(&[1, 2]))
            .unwrap();
        let fresh = Grouping::fields(fields);

        assert_eq!(prepared, fresh);
        assert_eq!(default_hash(&prepared), default_hash(&fresh));
        assert_eq!(Grouping::shuffle(), Grouping::shuffle());
        assert_ne!(Grouping::shuffle(), Grouping::global());

        let routes = |g: Grouping| BTreeMap::from([("click".to_string(), g)]);
        assert_eq!(
            Grouping::select(routes(Grouping::global())),
            Grouping::select(routes(Grouping::global()))
        );
        assert_ne!(
            Grouping::select(routes(Grouping::global())),
            Grouping::select(routes(Grouping::shuffle()))
        );
    }
}
