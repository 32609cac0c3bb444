//! Tuple dispatch, grouping and windowing core of the Gungnir continuous
//! query engine.
//!
//! A query runs as a dataflow graph of operators spread over many tasks.
//! This crate decides where each tuple goes next:
//!
//! * across tasks, a [`Grouping`] picks the downstream task instances
//!   receiving a tuple;
//! * inside a task, a tree of [`Dispatcher`]s filters tuples, fans them out
//!   and keys them into per-partition operator instances;
//! * windowed operators keep their retained rows in a [`WindowStorage`] and
//!   drain whatever ages out by count or by time.
//!
//! The transport that moves tuples between processes and the compiler that
//! builds the graph are external; they meet this crate at [`Task`],
//! [`Emitter`] and [`OutgoingStream`].

pub mod context;
pub mod dispatcher;
pub mod error;
pub mod filter;
pub mod grouping;
pub mod hash;
pub mod metrics;
pub mod operator;
pub mod task;
pub mod topology;
pub mod transport;
pub mod tuple;
pub mod window;

pub use context::{TaskContext, TaskId, WorkerContext};
pub use dispatcher::{
    DispatchError, Dispatcher, FilterDispatcher, GroupingDispatcher, KeyRetention,
    MultiDispatcher, SharedDispatcher, SingleDispatcher,
};
pub use error::{DetailedError, Error};
pub use filter::{Condition, TupleFilter};
pub use gungnir_types::config::Config;
pub use grouping::{Grouping, GroupingError, StreamId};
pub use operator::{Collector, Operator, OperatorNode, SharedOperator};
pub use task::Task;
pub use topology::{TopologyError, TopologyGraph};
pub use transport::{ChannelEmitter, Emitter, OutgoingStream, OutgoingTuple};
pub use tuple::{
    FieldAccessor, GroupFields, GroupKey, GungnirTuple, Schema, SchemaRegistry, TupleValues,
    Value,
};
pub use window::{MemoryWindowStorage, TimeKey, WindowError, WindowStorage};
