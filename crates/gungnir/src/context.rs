//! Worker and task identity, passed explicitly to every `prepare` hook.

use crate::tuple::SchemaRegistry;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// Identifier of a task instance within a topology.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TaskId(pub u32);

impl Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for TaskId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// State shared by all tasks hosted by one worker process.
#[derive(Clone, Debug)]
pub struct WorkerContext {
    topology_name: String,
    worker_index: usize,
    schemas: SchemaRegistry,
}

impl WorkerContext {
    pub fn new(topology_name: impl Into<String>, worker_index: usize, schemas: SchemaRegistry) -> Self {
        Self {
            topology_name: topology_name.into(),
            worker_index,
            schemas,
        }
    }

    pub fn topology_name(&self) -> &str {
        &self.topology_name
    }

    pub fn worker_index(&self) -> usize {
        self.worker_index
    }

    pub fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }
}

/// Identity of one task: the fragment of the dataflow graph it hosts and the
/// worker it runs in.
#[derive(Clone, Debug)]
pub struct TaskContext {
    worker: WorkerContext,
    task_id: TaskId,
    component: String,
    stream_execution_id: String,
}

impl TaskContext {
    pub fn new(worker: WorkerContext, task_id: TaskId, component: impl Into<String>) -> Self {
        let component = component.into();
        let stream_execution_id = format!("{}-{component}-{task_id}", worker.topology_name());
        Self {
            worker,
            task_id,
            component,
            stream_execution_id,
        }
    }

    /// Overrides the identifier used to scope window storage.
    pub fn with_stream_execution_id(mut self, id: impl Into<String>) -> Self {
        self.stream_execution_id = id.into();
        self
    }

    pub fn worker(&self) -> &WorkerContext {
        &self.worker
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn stream_execution_id(&self) -> &str {
        &self.stream_execution_id
    }

    pub fn schemas(&self) -> &SchemaRegistry {
        self.worker.schemas()
    }

    /// Labels attached to every metric emitted on behalf of this task.
    pub fn metric_labels(&self) -> Vec<(String, String)> {
        vec![
            ("worker".to_owned(), self.worker.worker_index().to_string()),
            ("task".to_owned(), self.task_id.to_string()),
        ]
    }
}
