//! Seams towards the transport layer, which physically moves tuples between
//! tasks.
//!
//! Outbound, operators hand `(stream, tuple)` pairs to an [`Emitter`].  The
//! transport then asks the [`OutgoingStream`] of that stream which
//! downstream tasks receive each tuple.

use crate::{
    context::{TaskId, WorkerContext},
    grouping::{Grouping, GroupingError, StreamId},
    tuple::TupleValues,
};
use anyhow::anyhow;
use crossbeam::channel::{self, Receiver, Sender};

/// Sink for tuples leaving the task.
pub trait Emitter: Send + Sync {
    fn emit(&self, stream: &str, values: TupleValues) -> anyhow::Result<()>;
}

/// A tuple addressed to an output stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingTuple {
    pub stream: String,
    pub values: TupleValues,
}

/// [`Emitter`] that queues tuples on an unbounded channel.
#[derive(Clone, Debug)]
pub struct ChannelEmitter {
    sender: Sender<OutgoingTuple>,
}

impl ChannelEmitter {
    /// Returns the emitter and the receiving half for the transport layer.
    pub fn new() -> (Self, Receiver<OutgoingTuple>) {
        let (sender, receiver) = channel::unbounded();
        (Self { sender }, receiver)
    }
}

impl Emitter for ChannelEmitter {
    fn emit(&self, stream: &str, values: TupleValues) -> anyhow::Result<()> {
        self.sender
            .send(OutgoingTuple {
                stream: stream.to_string(),
                values,
            })
            .map_err(|_| anyhow!("transport for stream '{stream}' is disconnected"))
    }
}

/// One physical output edge: a grouping bound to its candidate tasks.
#[derive(Clone, Debug)]
pub struct OutgoingStream {
    id: StreamId,
    grouping: Grouping,
    targets: Vec<TaskId>,
}

impl OutgoingStream {
    pub fn new(id: StreamId, grouping: Grouping, targets: Vec<TaskId>) -> Self {
        Self {
            id,
            grouping,
            targets,
        }
    }

    pub fn id(&self) -> &StreamId {
        &self.id
    }

    pub fn grouping(&self) -> &Grouping {
        &self.grouping
    }

    pub fn targets(&self) -> &[TaskId] {
        &self.targets
    }

    pub fn prepare(&mut self, worker: &WorkerContext) -> Result<(), GroupingError> {
        self.grouping.prepare(worker, &self.id, &self.targets)
    }

    pub fn choose_tasks(
        &mut self,
        caller: TaskId,
        values: &TupleValues,
    ) -> Result<Vec<TaskId>, GroupingError> {
        self.grouping.choose_tasks(caller, values)
    }
}

#[cfg(test)]
mod test {
    use super::{ChannelEmitter, Emitter, OutgoingStream, OutgoingTuple};
    use crate::{
        context::{TaskId, WorkerContext},
        grouping::{Grouping, GroupingError, StreamId},
        tuple::{GroupFields, Schema, SchemaRegistry, TupleValues},
    };

    #[test]
    fn channel_emitter() {
        let (emitter, receiver) = ChannelEmitter::new();
        let values = TupleValues::new("t", vec![1.into()]);
        emitter.emit("out", values.clone()).unwrap();
        assert_eq!(
            receiver.try_recv().unwrap(),
            OutgoingTuple {
                stream: "out".to_string(),
                values: values.clone(),
            }
        );

        drop(receiver);
        assert!(emitter.emit("out", values).is_err());
    }

    #[test]
    fn outgoing_stream_routes_by_key() {
        let worker = WorkerContext::new(
            "test",
            0,
            SchemaRegistry::new().with_schema(Schema::new("click", ["user", "page"])),
        );
        let mut stream = OutgoingStream::new(
            StreamId::new("source", "default"),
            Grouping::fields(GroupFields::from_names(["user"])),
            vec![TaskId(3), TaskId(4), TaskId(5)],
        );
        stream.prepare(&worker).unwrap();

        let tuple = |page: &str| TupleValues::new("click", vec!["ann".into(), page.into()]);
        let first = stream.choose_tasks(TaskId(0), &tuple("/a")).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(stream.choose_tasks(TaskId(1), &tuple("/b")).unwrap(), first);

        let mut empty = OutgoingStream::new(StreamId::new("source", "x"), Grouping::shuffle(), vec![]);
        assert!(matches!(
            empty.prepare(&worker),
            Err(GroupingError::NoTargets { .. })
        ));
    }
}
