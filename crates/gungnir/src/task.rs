//! Task-local entry point into the dispatch layer.
//!
//! A [`Task`] hosts one fragment of the dataflow graph.  The transport
//! layer delivers raw `(tuple name, values)` pairs to
//! [`Task::execute`], which hands them to the entry dispatcher registered for
//! that tuple name.  Outbound routing is exposed through the task's
//! [`OutgoingStream`]s.
//!
//! A task processes one tuple at a time; every dispatch pass runs to
//! completion before the next tuple is accepted.

use crate::{
    context::TaskContext,
    dispatcher::{DispatchError, SharedDispatcher},
    error::Error,
    metrics::{DispatchMetrics, MetricsHook},
    operator::Lifecycle,
    transport::OutgoingStream,
    tuple::{TupleValues, Value},
};
use gungnir_types::{
    config::{Config, ConfigError},
    constants::TOPOLOGY_NAME,
};
use itertools::Itertools;
use std::{collections::BTreeMap, sync::Arc};
use tracing::{info, warn};

pub struct Task {
    entries: BTreeMap<String, SharedDispatcher>,
    outgoing: BTreeMap<String, OutgoingStream>,
    hooks: Vec<Box<dyn MetricsHook>>,
    lifecycle: Lifecycle,
    config: Option<Arc<Config>>,
    context: Option<Arc<TaskContext>>,
}

impl Default for Task {
    fn default() -> Self {
        Self::new()
    }
}

impl Task {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            outgoing: BTreeMap::new(),
            hooks: Vec::new(),
            lifecycle: Lifecycle::default(),
            config: None,
            context: None,
        }
    }

    /// Registers the dispatcher receiving inbound tuples named `tuple_name`.
    pub fn with_entry(
        mut self,
        tuple_name: impl Into<String>,
        dispatcher: impl Into<SharedDispatcher>,
    ) -> Self {
        self.add_entry(tuple_name, dispatcher);
        self
    }

    pub fn add_entry(&mut self, tuple_name: impl Into<String>, dispatcher: impl Into<SharedDispatcher>) {
        self.entries.insert(tuple_name.into(), dispatcher.into());
    }

    /// Registers an output edge, keyed by its stream name.
    pub fn with_outgoing(mut self, stream: OutgoingStream) -> Self {
        self.outgoing.insert(stream.id().stream.clone(), stream);
        self
    }

    /// Adds a hook run once at prepare time when metrics are enabled.
    pub fn with_metrics_hook(mut self, hook: impl MetricsHook + 'static) -> Self {
        self.hooks.push(Box::new(hook));
        self
    }

    pub fn config(&self) -> Option<&Arc<Config>> {
        self.config.as_ref()
    }

    pub fn context(&self) -> Option<&Arc<TaskContext>> {
        self.context.as_ref()
    }

    pub fn entry(&self, tuple_name: &str) -> Option<&SharedDispatcher> {
        self.entries.get(tuple_name)
    }

    pub fn outgoing_mut(&mut self, stream: &str) -> Option<&mut OutgoingStream> {
        self.outgoing.get_mut(stream)
    }

    pub fn is_prepared(&self) -> bool {
        self.lifecycle.is_prepared()
    }

    /// Registers metrics and prepares every entry dispatcher and output
    /// edge.  Any failure is fatal: the task must not start, and every later
    /// `prepare` or `execute` reports that it failed.
    pub fn prepare(&mut self, config: Config, context: TaskContext) -> Result<(), Error> {
        if !self.lifecycle.begin_prepare(|| "task".to_string())? {
            return Ok(());
        }
        let result = self.run_prepare(config, context);
        self.lifecycle.finish_prepare(result)
    }

    fn run_prepare(&mut self, config: Config, context: TaskContext) -> Result<(), Error> {
        let topology = config.require_str(TOPOLOGY_NAME)?;
        if topology != context.worker().topology_name() {
            return Err(ConfigError::InvalidValue {
                key: TOPOLOGY_NAME.to_string(),
                reason: format!(
                    "task belongs to topology '{}'",
                    context.worker().topology_name()
                ),
            }
            .into());
        }

        let config = Arc::new(config);
        let context = Arc::new(context);
        if config.metrics_enabled()? {
            let interval = config.metrics_interval()?;
            DispatchMetrics.register_metrics(&config, &context);
            for hook in &mut self.hooks {
                hook.register_metrics(&config, &context);
            }
            info!(task = %context.task_id(), ?interval, "metrics enabled");
        }

        for dispatcher in self.entries.values() {
            dispatcher.lock().prepare(&config, &context)?;
        }
        for stream in self.outgoing.values_mut() {
            stream.prepare(context.worker())?;
        }
        info!(
            task = %context.task_id(),
            component = context.component(),
            entries = %self.entries.keys().join(","),
            outgoing = %self.outgoing.keys().join(","),
            "task prepared"
        );

        self.config = Some(config);
        self.context = Some(context);
        Ok(())
    }

    /// Delivers one inbound tuple and runs its dispatch pass to completion.
    pub fn execute(&mut self, tuple_name: &str, values: Vec<Value>) -> Result<(), Error> {
        if self.lifecycle.has_failed() {
            return Err(DispatchError::PreviouslyFailed {
                component: "task".to_string(),
            }
            .into());
        }
        if !self.lifecycle.is_prepared() {
            return Err(DispatchError::NotPrepared { kind: "task" }.into());
        }
        let dispatcher = self
            .entries
            .get(tuple_name)
            .ok_or_else(|| DispatchError::NoEntry {
                tuple_name: tuple_name.to_string(),
            })?;
        dispatcher
            .lock()
            .dispatch(TupleValues::new(tuple_name, values))?;
        Ok(())
    }

    /// Tears down every dispatcher once, including after a failed prepare.
    /// Skipped if the task never tried to prepare.
    pub fn cleanup(&mut self) {
        if !self.lifecycle.begin_cleanup() {
            if !self.lifecycle.is_cleaned_up() {
                warn!("cleanup of a task that was never prepared");
            }
            return;
        }
        for dispatcher in self.entries.values() {
            dispatcher.lock().cleanup();
        }
        if let Some(context) = &self.context {
            info!(task = %context.task_id(), "task cleaned up");
        }
    }
}
