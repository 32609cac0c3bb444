use super::{Collector, Operator};
use crate::{
    context::TaskContext,
    metrics::{Counter, WINDOW_EVICTED_ROWS},
    tuple::{FieldAccessor, GroupFields, GroupKey, GungnirTuple, TupleValues, Value},
    window::{MemoryWindowStorage, TimeKey, WindowStorage},
};
use anyhow::anyhow;
use gungnir_types::config::Config;
use std::sync::Arc;
use tracing::trace;

/// Retention bound of a [`WindowOperator`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WindowSpec {
    /// Keep the newest `n` rows per key.
    Count(usize),
    /// Keep rows whose event time lies within `seconds` of the newest row.
    Time {
        seconds: i64,
        time_field: FieldAccessor,
    },
}

/// Folds the rows drained from a window into the values of one output
/// tuple.
pub trait WindowAggregate: Send + Sync {
    fn aggregate(&self, key: &GroupKey, rows: &[TupleValues]) -> Vec<Value>;
}

/// Emits the key values followed by the number of drained rows.
#[derive(Clone, Copy, Debug, Default)]
pub struct CountAggregate;

impl WindowAggregate for CountAggregate {
    fn aggregate(&self, key: &GroupKey, rows: &[TupleValues]) -> Vec<Value> {
        let mut values = key.values().to_vec();
        values.push(Value::from(rows.len()));
        values
    }
}

type StorageFactory = Arc<dyn Fn() -> Box<dyn WindowStorage> + Send + Sync>;

/// Buffers rows per key and emits one aggregate over every portion that
/// ages out of the window.
pub struct WindowOperator {
    name: String,
    fields: GroupFields,
    spec: WindowSpec,
    output_tuple_name: String,
    aggregate: Arc<dyn WindowAggregate>,
    new_storage: StorageFactory,
    storage: Box<dyn WindowStorage>,
    evicted_rows: Counter,
}

impl WindowOperator {
    pub fn new(
        name: impl Into<String>,
        fields: GroupFields,
        spec: WindowSpec,
        output_tuple_name: impl Into<String>,
    ) -> Self {
        let new_storage: StorageFactory =
            Arc::new(|| Box::new(MemoryWindowStorage::new()) as Box<dyn WindowStorage>);
        Self {
            name: name.into(),
            fields,
            spec,
            output_tuple_name: output_tuple_name.into(),
            aggregate: Arc::new(CountAggregate),
            storage: new_storage(),
            new_storage,
            evicted_rows: Counter::noop(),
        }
    }

    pub fn with_aggregate(mut self, aggregate: impl WindowAggregate + 'static) -> Self {
        self.aggregate = Arc::new(aggregate);
        self
    }

    /// Replaces the backing store.  `factory` is called again for every
    /// instance derived from this operator.
    pub fn with_storage<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn WindowStorage> + Send + Sync + 'static,
    {
        self.new_storage = Arc::new(factory);
        self.storage = (self.new_storage)();
        self
    }

    pub fn spec(&self) -> &WindowSpec {
        &self.spec
    }

    /// Number of rows currently retained for `key`.
    pub fn retained(&self, key: &GroupKey) -> anyhow::Result<usize> {
        Ok(self.storage.retained(key)?)
    }

    fn ingest(&mut self, key: &GroupKey, tuple: GungnirTuple) -> anyhow::Result<Option<Vec<TupleValues>>> {
        match &self.spec {
            WindowSpec::Count(count) => {
                self.storage.put(key, tuple.into_tuple_values())?;
                Ok(self.storage.get_by_count(key, *count)?)
            }
            WindowSpec::Time {
                seconds,
                time_field,
            } => {
                let value = time_field.get(&tuple)?;
                let millis = value.as_timestamp_millis().ok_or_else(|| {
                    anyhow!("field '{time_field}' holds {value}, expected a timestamp")
                })?;
                let time_key = TimeKey::from_millis(millis);
                self.storage.put_at(key, time_key, tuple.into_tuple_values())?;
                Ok(self
                    .storage
                    .get_by_time(key, time_key.saturating_sub_secs(*seconds))?)
            }
        }
    }
}

impl Operator for WindowOperator {
    fn name(&self) -> &str {
        &self.name
    }

    fn prepare(&mut self, config: &Config, context: &TaskContext) -> anyhow::Result<()> {
        self.storage.open(context.stream_execution_id(), &self.name)?;
        if config.metrics_enabled()? {
            self.evicted_rows = Counter::new(
                WINDOW_EVICTED_ROWS,
                context,
                vec![("operator".to_owned(), self.name.clone())],
            );
        }
        Ok(())
    }

    fn execute(&mut self, tuple: GungnirTuple, output: &mut Collector) -> anyhow::Result<()> {
        let key = self.fields.key(&tuple)?;
        let Some(drained) = self.ingest(&key, tuple)? else {
            return Ok(());
        };
        if drained.is_empty() {
            return Ok(());
        }
        trace!(operator = %self.name, %key, rows = drained.len(), "window evicted rows");
        self.evicted_rows.increment(drained.len() as u64);
        output.emit(TupleValues::new(
            self.output_tuple_name.clone(),
            self.aggregate.aggregate(&key, &drained),
        ));
        Ok(())
    }

    fn cleanup(&mut self) {
        self.storage.close();
    }

    fn new_instance(&self) -> Option<Box<dyn Operator>> {
        Some(Box::new(Self {
            name: self.name.clone(),
            fields: self.fields.clone(),
            spec: self.spec.clone(),
            output_tuple_name: self.output_tuple_name.clone(),
            aggregate: self.aggregate.clone(),
            new_storage: self.new_storage.clone(),
            storage: (self.new_storage)(),
            evicted_rows: Counter::noop(),
        }))
    }
}
