use super::{Collector, Operator};
use crate::{transport::Emitter, tuple::GungnirTuple};
use std::sync::Arc;

/// Terminal operator handing tuples to the transport layer on a named
/// output stream.
pub struct EmitOperator {
    name: String,
    stream: String,
    emitter: Arc<dyn Emitter>,
}

impl EmitOperator {
    pub fn new(name: impl Into<String>, stream: impl Into<String>, emitter: Arc<dyn Emitter>) -> Self {
        Self {
            name: name.into(),
            stream: stream.into(),
            emitter,
        }
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }
}

impl Operator for EmitOperator {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&mut self, tuple: GungnirTuple, _output: &mut Collector) -> anyhow::Result<()> {
        self.emitter.emit(&self.stream, tuple.into_tuple_values())
    }
}
