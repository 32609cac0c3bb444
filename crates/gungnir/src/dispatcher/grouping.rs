use super::{
    registry::{KeyRetention, PerKeyRegistry},
    single::dispatch_counter,
    DispatchError, Scope,
};
use crate::{
    context::TaskContext,
    metrics::{Counter, Gauge, PER_KEY_INSTANCES},
    operator::OperatorNode,
    tuple::{GroupFields, GroupKey, GungnirTuple, TupleValues},
};
use gungnir_types::config::Config;
use std::sync::Arc;
use tracing::debug;

/// Routes each tuple to the operator instance owning its partition key.
///
/// Instances are derived from a template on first sight of a key and
/// prepared before their first tuple.  They share the template's downstream
/// dispatcher.
pub struct GroupingDispatcher {
    template: OperatorNode,
    fields: GroupFields,
    registry: PerKeyRegistry,
    // Set when retention was chosen explicitly; otherwise it comes from the
    // task configuration at prepare time.
    explicit_retention: bool,
    dispatched: Counter,
    instances: Gauge,
}

impl GroupingDispatcher {
    /// Fails if `template` cannot produce per-key instances.
    pub fn new(template: OperatorNode, fields: GroupFields) -> Result<Self, DispatchError> {
        if template.operator().new_instance().is_none() {
            return Err(DispatchError::NotPartitionable {
                operator: template.name().to_string(),
            });
        }
        Ok(Self {
            template,
            fields,
            registry: PerKeyRegistry::new(KeyRetention::Unbounded),
            explicit_retention: false,
            dispatched: Counter::noop(),
            instances: Gauge::noop(),
        })
    }

    pub fn with_retention(mut self, retention: KeyRetention) -> Self {
        self.registry.set_retention(retention);
        self.explicit_retention = true;
        self
    }

    pub fn template(&self) -> &OperatorNode {
        &self.template
    }

    pub fn group_fields(&self) -> &GroupFields {
        &self.fields
    }

    pub fn registry(&self) -> &PerKeyRegistry {
        &self.registry
    }

    /// Number of live per-key instances.
    pub fn instance_count(&self) -> usize {
        self.registry.len()
    }

    pub fn instance(&self, key: &GroupKey) -> Option<&OperatorNode> {
        self.registry.get(key)
    }

    /// Cleans up and drops the instance for `key`.  The next tuple with that
    /// key starts from fresh state.
    pub fn evict_key(&mut self, key: &GroupKey) -> bool {
        let removed = self.registry.remove(key);
        self.instances.set(self.registry.len() as f64);
        removed
    }

    pub(super) fn prepare(
        &mut self,
        source: &str,
        config: &Arc<Config>,
        context: &Arc<TaskContext>,
    ) -> Result<(), DispatchError> {
        if !self.explicit_retention {
            self.registry.set_retention(KeyRetention::from_config(config)?);
        }
        if config.metrics_enabled()? {
            self.dispatched = dispatch_counter(source, self.template.name(), context);
            self.instances = Gauge::new(
                PER_KEY_INSTANCES,
                context,
                vec![("operator".to_owned(), self.template.name().to_owned())],
            );
        }
        Ok(())
    }

    pub(super) fn dispatch(
        &mut self,
        scope: &Scope<'_>,
        values: TupleValues,
    ) -> Result<(), DispatchError> {
        let schema = scope.context.schemas().resolve(values.tuple_name())?.clone();
        let key = self.fields.key_from(&schema, &values)?;

        let template = &self.template;
        let created = !self.registry.contains(&key);
        let index = self.registry.index_or_try_insert_with(key, || {
            let mut instance =
                template
                    .new_instance()
                    .ok_or_else(|| DispatchError::NotPartitionable {
                        operator: template.name().to_string(),
                    })?;
            if let Err(error) = instance.prepare(scope.config, scope.context) {
                instance.cleanup();
                return Err(error);
            }
            Ok::<_, DispatchError>(instance)
        })?;
        if created {
            self.instances.set(self.registry.len() as f64);
        }

        let instance = self.registry.instance_at(index);
        debug!(
            source = scope.source,
            target = instance.name(),
            tuple = %values,
            created,
            "dispatch"
        );
        self.dispatched.increment(1);
        instance.execute(GungnirTuple::new(schema, values))
    }

    /// Instances first, then the template, then the downstream dispatcher
    /// they share.
    pub(super) fn cleanup(&mut self) {
        self.registry.clear();
        self.instances.set(0.0);
        self.template.cleanup();
        if let Some(dispatcher) = self.template.dispatcher() {
            dispatcher.lock().cleanup();
        }
    }
}
