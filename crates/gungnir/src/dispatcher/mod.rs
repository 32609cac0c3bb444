//! In-task routing of tuples between operators.
//!
//! A [`Dispatcher`] receives the [`TupleValues`] an operator emitted and
//! delivers them to the next operator(s) of the same task.  Dispatchers form
//! a tree of four kinds:
//!
//! * [`FilterDispatcher`] runs an ordered chain of predicates and forwards
//!   surviving tuples to a terminal dispatcher.
//! * [`SingleDispatcher`] delivers to exactly one operator.
//! * [`MultiDispatcher`] fans a tuple out to several child dispatchers,
//!   each receiving its own copy.
//! * [`GroupingDispatcher`] keys tuples into one operator instance per
//!   partition key.
//!
//! `prepare` and `cleanup` run at most once per dispatcher regardless of how
//! many paths reach it.  Targets are prepared lazily on first delivery.

mod filter;
mod grouping;
mod multi;
mod registry;
mod single;

pub use filter::FilterDispatcher;
pub use grouping::GroupingDispatcher;
pub use multi::MultiDispatcher;
pub use registry::{KeyRetention, PerKeyRegistry};
pub use single::SingleDispatcher;

use crate::{
    context::TaskContext,
    error::{serialize_opaque, ConfigError, DetailedError},
    operator::Lifecycle,
    tuple::{TupleError, TupleValues},
};
use gungnir_types::config::Config;
use serde::{Serialize, Serializer};
use std::{
    borrow::Cow,
    sync::{Arc, Mutex, MutexGuard},
};
use thiserror::Error;

/// Failures raised while preparing or running a dispatch chain.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("{kind} dispatcher used before prepare")]
    NotPrepared { kind: &'static str },

    #[error("operator '{operator}' used before prepare")]
    OperatorNotPrepared { operator: String },

    #[error("operator '{operator}' cannot be partitioned by key")]
    NotPartitionable { operator: String },

    #[error("no dispatcher registered for tuple '{tuple_name}'")]
    NoEntry { tuple_name: String },

    #[error("{component} failed to prepare earlier")]
    PreviouslyFailed { component: String },

    #[error("failed to prepare '{operator}'")]
    Prepare {
        operator: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("operator '{operator}' failed")]
    Operator {
        operator: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("filter in front of '{source_operator}' failed")]
    Filter {
        source_operator: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Tuple(#[from] TupleError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl DetailedError for DispatchError {
    fn error_code(&self) -> Cow<'static, str> {
        match self {
            Self::NotPrepared { .. } => Cow::from("DispatcherNotPrepared"),
            Self::OperatorNotPrepared { .. } => Cow::from("OperatorNotPrepared"),
            Self::NotPartitionable { .. } => Cow::from("OperatorNotPartitionable"),
            Self::NoEntry { .. } => Cow::from("NoEntryDispatcher"),
            Self::PreviouslyFailed { .. } => Cow::from("PreviouslyFailed"),
            Self::Prepare { .. } => Cow::from("PrepareFailed"),
            Self::Operator { .. } => Cow::from("OperatorFailed"),
            Self::Filter { .. } => Cow::from("FilterFailed"),
            Self::Tuple(error) => error.error_code(),
            Self::Config(error) => error.error_code(),
        }
    }

    /// Operator and filter failures affect one tuple; the task harness
    /// decides whether to retry it.
    fn is_fatal(&self) -> bool {
        !matches!(self, Self::Operator { .. } | Self::Filter { .. })
    }
}

impl Serialize for DispatchError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Prepare { operator, source } | Self::Operator { operator, source } => {
                serialize_opaque(serializer, &self.error_code(), operator, source)
            }
            Self::Filter {
                source_operator,
                source,
            } => serialize_opaque(serializer, &self.error_code(), source_operator, source),
            Self::NotPrepared { kind } => serializer.serialize_str(kind),
            Self::OperatorNotPrepared { operator } | Self::NotPartitionable { operator } => {
                serializer.serialize_str(operator)
            }
            Self::NoEntry { tuple_name } => serializer.serialize_str(tuple_name),
            Self::PreviouslyFailed { component } => serializer.serialize_str(component),
            Self::Tuple(error) => error.serialize(serializer),
            Self::Config(error) => error.serialize(serializer),
        }
    }
}

/// Name reported as the source of dispatchers nobody has claimed, such as
/// the entry dispatchers of a task.
pub const TASK_SOURCE: &str = "task";

/// Everything a dispatcher needs from `prepare` when it delivers a tuple.
pub(crate) struct Scope<'a> {
    pub(crate) source: &'a str,
    pub(crate) config: &'a Arc<Config>,
    pub(crate) context: &'a Arc<TaskContext>,
}

pub enum DispatcherKind {
    Filter(FilterDispatcher),
    Single(SingleDispatcher),
    Multi(MultiDispatcher),
    Grouping(GroupingDispatcher),
}

impl DispatcherKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Filter(_) => "filter",
            Self::Single(_) => "single",
            Self::Multi(_) => "multi",
            Self::Grouping(_) => "grouping",
        }
    }
}

/// A node of the dispatch tree.
pub struct Dispatcher {
    source: Option<String>,
    lifecycle: Lifecycle,
    config: Option<Arc<Config>>,
    context: Option<Arc<TaskContext>>,
    kind: DispatcherKind,
}

impl Dispatcher {
    fn from_kind(kind: DispatcherKind) -> Self {
        Self {
            source: None,
            lifecycle: Lifecycle::default(),
            config: None,
            context: None,
            kind,
        }
    }

    pub fn filter(filter: FilterDispatcher) -> Self {
        Self::from_kind(DispatcherKind::Filter(filter))
    }

    pub fn single(single: SingleDispatcher) -> Self {
        Self::from_kind(DispatcherKind::Single(single))
    }

    pub fn multi(multi: MultiDispatcher) -> Self {
        Self::from_kind(DispatcherKind::Multi(multi))
    }

    pub fn grouping(grouping: GroupingDispatcher) -> Self {
        Self::from_kind(DispatcherKind::Grouping(grouping))
    }

    pub fn kind(&self) -> &DispatcherKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut DispatcherKind {
        &mut self.kind
    }

    pub fn as_grouping(&self) -> Option<&GroupingDispatcher> {
        match &self.kind {
            DispatcherKind::Grouping(grouping) => Some(grouping),
            _ => None,
        }
    }

    pub fn as_grouping_mut(&mut self) -> Option<&mut GroupingDispatcher> {
        match &mut self.kind {
            DispatcherKind::Grouping(grouping) => Some(grouping),
            _ => None,
        }
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Records the operator whose output this dispatcher routes.  Nested
    /// dispatchers inherit the same source.
    pub fn set_source(&mut self, source: &str) {
        self.source = Some(source.to_string());
        match &mut self.kind {
            DispatcherKind::Filter(filter) => filter.terminal_mut().set_source(source),
            DispatcherKind::Multi(multi) => multi
                .children_mut()
                .iter_mut()
                .for_each(|child| child.set_source(source)),
            DispatcherKind::Single(_) | DispatcherKind::Grouping(_) => {}
        }
    }

    pub fn is_prepared(&self) -> bool {
        self.lifecycle.is_prepared()
    }

    pub fn is_cleaned_up(&self) -> bool {
        self.lifecycle.is_cleaned_up()
    }

    /// Runs the setup hooks of this dispatcher.  Only the first call has any
    /// effect; once it failed, every later call reports that failure.
    pub fn prepare(
        &mut self,
        config: &Arc<Config>,
        context: &Arc<TaskContext>,
    ) -> Result<(), DispatchError> {
        if !self
            .lifecycle
            .begin_prepare(|| format!("{} dispatcher", self.kind.name()))?
        {
            return Ok(());
        }
        let source = self.source.as_deref().unwrap_or(TASK_SOURCE);
        let result = match &mut self.kind {
            DispatcherKind::Filter(filter) => filter.prepare(source, config, context),
            DispatcherKind::Single(single) => single.prepare(source, config, context),
            DispatcherKind::Multi(multi) => multi.prepare(config, context),
            DispatcherKind::Grouping(grouping) => grouping.prepare(source, config, context),
        };
        if result.is_ok() {
            self.config = Some(config.clone());
            self.context = Some(context.clone());
        }
        self.lifecycle.finish_prepare(result)
    }

    /// Routes `values` to the next operator(s).
    pub fn dispatch(&mut self, values: TupleValues) -> Result<(), DispatchError> {
        if self.lifecycle.has_failed() {
            return Err(DispatchError::PreviouslyFailed {
                component: format!("{} dispatcher", self.kind.name()),
            });
        }
        let Self {
            source,
            config,
            context,
            kind,
            ..
        } = self;
        let (Some(config), Some(context)) = (config.as_ref(), context.as_ref()) else {
            return Err(DispatchError::NotPrepared { kind: kind.name() });
        };
        let scope = Scope {
            source: source.as_deref().unwrap_or(TASK_SOURCE),
            config,
            context,
        };
        match kind {
            DispatcherKind::Filter(filter) => filter.dispatch(&scope, values),
            DispatcherKind::Single(single) => single.dispatch(&scope, values),
            DispatcherKind::Multi(multi) => multi.dispatch(values),
            DispatcherKind::Grouping(grouping) => grouping.dispatch(&scope, values),
        }
    }

    /// Tears down this dispatcher and everything below it, once, and only
    /// if prepare was attempted.
    pub fn cleanup(&mut self) {
        if !self.lifecycle.begin_cleanup() {
            return;
        }
        match &mut self.kind {
            DispatcherKind::Filter(filter) => filter.cleanup(),
            DispatcherKind::Single(single) => single.cleanup(),
            DispatcherKind::Multi(multi) => multi.cleanup(),
            DispatcherKind::Grouping(grouping) => grouping.cleanup(),
        }
    }
}

impl From<FilterDispatcher> for Dispatcher {
    fn from(filter: FilterDispatcher) -> Self {
        Self::filter(filter)
    }
}

impl From<SingleDispatcher> for Dispatcher {
    fn from(single: SingleDispatcher) -> Self {
        Self::single(single)
    }
}

impl From<MultiDispatcher> for Dispatcher {
    fn from(multi: MultiDispatcher) -> Self {
        Self::multi(multi)
    }
}

impl From<GroupingDispatcher> for Dispatcher {
    fn from(grouping: GroupingDispatcher) -> Self {
        Self::grouping(grouping)
    }
}

/// Dispatcher owned by an operator node and, for per-key instances, shared
/// with every instance of that node.
#[derive(Clone)]
pub struct SharedDispatcher(Arc<Mutex<Dispatcher>>);

impl SharedDispatcher {
    pub fn new(dispatcher: impl Into<Dispatcher>) -> Self {
        Self(Arc::new(Mutex::new(dispatcher.into())))
    }

    pub fn lock(&self) -> MutexGuard<'_, Dispatcher> {
        self.0.lock().unwrap()
    }
}

impl From<Dispatcher> for SharedDispatcher {
    fn from(dispatcher: Dispatcher) -> Self {
        Self::new(dispatcher)
    }
}
