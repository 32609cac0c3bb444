//! Operators and their runtime wrappers.
//!
//! An [`Operator`] is the user-visible unit of computation.  The dispatch
//! layer never calls it directly; it goes through an [`OperatorNode`], which
//! adds the once-only prepare/cleanup guard, the downstream dispatcher and
//! the forwarding of emitted tuples.
//!
//! Partitionable operators return a fresh instance from
//! [`Operator::new_instance`].  Grouping dispatchers use this to keep one
//! independent instance per partition key.

mod count;
mod emit;
mod project;
mod window;

pub use count::CountOperator;
pub use emit::EmitOperator;
pub use project::ProjectOperator;
pub use window::{CountAggregate, WindowAggregate, WindowOperator, WindowSpec};

use crate::{
    context::TaskContext,
    dispatcher::{DispatchError, SharedDispatcher},
    tuple::{GungnirTuple, TupleValues},
};
use gungnir_types::config::Config;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::trace;

pub trait Operator: Send {
    /// Stable name, used in traces, metrics and window storage scoping.
    fn name(&self) -> &str;

    fn prepare(&mut self, _config: &Config, _context: &TaskContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Processes one tuple, pushing any results to `output`.
    fn execute(&mut self, tuple: GungnirTuple, output: &mut Collector) -> anyhow::Result<()>;

    fn cleanup(&mut self) {}

    /// Returns an unprepared instance with the same configuration and no
    /// shared state, or `None` if the operator cannot be partitioned.
    fn new_instance(&self) -> Option<Box<dyn Operator>> {
        None
    }
}

/// Buffer of tuples emitted by one [`Operator::execute`] call.
#[derive(Debug, Default)]
pub struct Collector {
    emitted: Vec<TupleValues>,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, values: TupleValues) {
        self.emitted.push(values);
    }

    pub fn len(&self) -> usize {
        self.emitted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.emitted.is_empty()
    }

    pub fn drain(&mut self) -> std::vec::Drain<'_, TupleValues> {
        self.emitted.drain(..)
    }

    pub fn clear(&mut self) {
        self.emitted.clear();
    }
}

/// Once-only guards for `prepare` and `cleanup`.
///
/// Nodes are reached through `&mut` or a mutex, so a plain state suffices.
/// A failed prepare is terminal: the node never runs, later prepares report
/// the earlier failure, and cleanup still runs once to release whatever the
/// setup acquired before it failed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) enum Lifecycle {
    #[default]
    Unprepared,
    Prepared,
    Failed,
    CleanedUp,
}

impl Lifecycle {
    /// Whether the setup hooks still have to run.  `component` names the
    /// node in the error returned when an earlier attempt failed.
    pub(crate) fn begin_prepare(
        &self,
        component: impl FnOnce() -> String,
    ) -> Result<bool, DispatchError> {
        match self {
            Self::Unprepared => Ok(true),
            Self::Prepared | Self::CleanedUp => Ok(false),
            Self::Failed => Err(DispatchError::PreviouslyFailed {
                component: component(),
            }),
        }
    }

    /// Commits the outcome of the setup hooks.
    pub(crate) fn finish_prepare<T, E>(&mut self, result: Result<T, E>) -> Result<T, E> {
        *self = if result.is_ok() {
            Self::Prepared
        } else {
            Self::Failed
        };
        result
    }

    /// Returns `true` exactly once, and only if prepare was attempted.
    pub(crate) fn begin_cleanup(&mut self) -> bool {
        match self {
            Self::Prepared | Self::Failed => {
                *self = Self::CleanedUp;
                true
            }
            Self::Unprepared | Self::CleanedUp => false,
        }
    }

    pub(crate) fn is_prepared(&self) -> bool {
        *self == Self::Prepared
    }

    pub(crate) fn has_failed(&self) -> bool {
        *self == Self::Failed
    }

    pub(crate) fn is_cleaned_up(&self) -> bool {
        *self == Self::CleanedUp
    }
}

/// Runtime wrapper around an operator.
pub struct OperatorNode {
    operator: Box<dyn Operator>,
    dispatcher: Option<SharedDispatcher>,
    // Per-key instances share the template's dispatcher but must not tear
    // it down when they are evicted.
    owns_dispatcher: bool,
    lifecycle: Lifecycle,
    output: Collector,
}

impl OperatorNode {
    pub fn new(operator: impl Operator + 'static) -> Self {
        Self::from_box(Box::new(operator))
    }

    pub fn from_box(operator: Box<dyn Operator>) -> Self {
        Self {
            operator,
            dispatcher: None,
            owns_dispatcher: true,
            lifecycle: Lifecycle::default(),
            output: Collector::new(),
        }
    }

    /// Sets the dispatcher emitted tuples are forwarded to and records this
    /// operator as its source.
    pub fn with_dispatcher(mut self, dispatcher: SharedDispatcher) -> Self {
        self.set_dispatcher(dispatcher);
        self
    }

    pub fn set_dispatcher(&mut self, dispatcher: SharedDispatcher) {
        dispatcher.lock().set_source(self.operator.name());
        self.dispatcher = Some(dispatcher);
    }

    pub fn dispatcher(&self) -> Option<&SharedDispatcher> {
        self.dispatcher.as_ref()
    }

    pub fn name(&self) -> &str {
        self.operator.name()
    }

    pub fn operator(&self) -> &dyn Operator {
        self.operator.as_ref()
    }

    pub fn is_prepared(&self) -> bool {
        self.lifecycle.is_prepared()
    }

    pub fn is_cleaned_up(&self) -> bool {
        self.lifecycle.is_cleaned_up()
    }

    /// A fresh, unprepared node for a new partition key.  The clone shares
    /// the template's downstream dispatcher but none of its state.
    pub fn new_instance(&self) -> Option<Self> {
        let operator = self.operator.new_instance()?;
        Some(Self {
            operator,
            dispatcher: self.dispatcher.clone(),
            owns_dispatcher: false,
            lifecycle: Lifecycle::default(),
            output: Collector::new(),
        })
    }

    /// Prepares the operator and then its dispatcher.  Subsequent calls are
    /// no-ops once this succeeded, and errors once it failed.
    pub fn prepare(
        &mut self,
        config: &Arc<Config>,
        context: &Arc<TaskContext>,
    ) -> Result<(), DispatchError> {
        if !self
            .lifecycle
            .begin_prepare(|| format!("operator '{}'", self.operator.name()))?
        {
            return Ok(());
        }
        let result = self.run_prepare(config, context);
        self.lifecycle.finish_prepare(result)
    }

    fn run_prepare(
        &mut self,
        config: &Arc<Config>,
        context: &Arc<TaskContext>,
    ) -> Result<(), DispatchError> {
        self.operator
            .prepare(config, context)
            .map_err(|source| DispatchError::Prepare {
                operator: self.operator.name().to_string(),
                source,
            })?;
        if let Some(dispatcher) = &self.dispatcher {
            dispatcher.lock().prepare(config, context)?;
        }
        Ok(())
    }

    /// Runs the operator on `tuple` and forwards everything it emitted.
    pub fn execute(&mut self, tuple: GungnirTuple) -> Result<(), DispatchError> {
        if self.lifecycle.has_failed() {
            return Err(DispatchError::PreviouslyFailed {
                component: format!("operator '{}'", self.name()),
            });
        }
        if !self.lifecycle.is_prepared() {
            return Err(DispatchError::OperatorNotPrepared {
                operator: self.name().to_string(),
            });
        }
        self.operator
            .execute(tuple, &mut self.output)
            .map_err(|source| DispatchError::Operator {
                operator: self.operator.name().to_string(),
                source,
            })?;

        if self.output.is_empty() {
            return Ok(());
        }
        match &self.dispatcher {
            Some(dispatcher) => {
                let mut dispatcher = dispatcher.lock();
                for values in self.output.drain() {
                    dispatcher.dispatch(values)?;
                }
            }
            None => {
                trace!(
                    operator = self.operator.name(),
                    dropped = self.output.len(),
                    "operator has no dispatcher"
                );
                self.output.clear();
            }
        }
        Ok(())
    }

    /// Cleans up the operator and then its dispatcher, once, and only if
    /// prepare was attempted.  Per-key instances leave the shared
    /// dispatcher to their template.
    pub fn cleanup(&mut self) {
        if !self.lifecycle.begin_cleanup() {
            return;
        }
        self.operator.cleanup();
        if !self.owns_dispatcher {
            return;
        }
        if let Some(dispatcher) = &self.dispatcher {
            dispatcher.lock().cleanup();
        }
    }
}

/// Operator node reachable from more than one dispatcher.
#[derive(Clone)]
pub struct SharedOperator(Arc<Mutex<OperatorNode>>);

impl SharedOperator {
    pub fn new(node: OperatorNode) -> Self {
        Self(Arc::new(Mutex::new(node)))
    }

    /// Locks the node.  The dataflow graph is acyclic, so a dispatch pass
    /// never re-enters a node it is already executing.
    pub fn lock(&self) -> MutexGuard<'_, OperatorNode> {
        self.0.lock().unwrap()
    }
}

impl From<OperatorNode> for SharedOperator {
    fn from(node: OperatorNode) -> Self {
        Self::new(node)
    }
}
