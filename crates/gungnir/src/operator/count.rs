use super::{Collector, Operator};
use crate::tuple::{GroupFields, GroupKey, GungnirTuple, TupleValues, Value};
use std::collections::HashMap;

/// Running count of tuples per group key.  For every input it emits the
/// key fields followed by the updated count.
pub struct CountOperator {
    name: String,
    fields: GroupFields,
    output_tuple_name: String,
    counts: HashMap<GroupKey, i64>,
}

impl CountOperator {
    pub fn new(
        name: impl Into<String>,
        fields: GroupFields,
        output_tuple_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            fields,
            output_tuple_name: output_tuple_name.into(),
            counts: HashMap::new(),
        }
    }

    pub fn count(&self, key: &GroupKey) -> i64 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    pub fn clear(&mut self) {
        self.counts.clear();
    }
}

impl Operator for CountOperator {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&mut self, tuple: GungnirTuple, output: &mut Collector) -> anyhow::Result<()> {
        let key = self.fields.key(&tuple)?;
        let count = self.counts.entry(key.clone()).or_default();
        *count += 1;

        let mut values = key.into_values();
        values.push(Value::Int(*count));
        output.emit(TupleValues::new(self.output_tuple_name.clone(), values));
        Ok(())
    }

    fn cleanup(&mut self) {
        self.counts.clear();
    }

    fn new_instance(&self) -> Option<Box<dyn Operator>> {
        Some(Box::new(Self::new(
            self.name.clone(),
            self.fields.clone(),
            self.output_tuple_name.clone(),
        )))
    }
}

#[cfg(test)]
mod test {
    use super::CountOperator;
    use crate::operator::{Collector, Operator};
    use crate::tuple::{GroupFields, GroupKey, GungnirTuple, Schema, TupleValues, Value};
    use std::sync::Arc;

    #[test]
    fn counts_per_key_and_instances_are_independent() {
        let schema = Arc::new(Schema::new("click", ["user", "page"]));
        let click = |user: &str| {
            GungnirTuple::new(schema.clone(), TupleValues::new("click", vec![user.into(), "/".into()]))
        };
        let mut template = CountOperator::new("count", GroupFields::from_names(["user"]), "clicks");
        let mut output = Collector::new();

        template.execute(click("a"), &mut output).unwrap();
        template.execute(click("a"), &mut output).unwrap();
        template.execute(click("b"), &mut output).unwrap();
        assert_eq!(template.count(&GroupKey::new(vec!["a".into()])), 2);

        let emitted: Vec<_> = output.drain().collect();
        assert_eq!(
            emitted.last().unwrap(),
            &TupleValues::new("clicks", vec!["b".into(), Value::Int(1)])
        );

        let mut instance = template.new_instance().unwrap();
        instance.execute(click("a"), &mut output).unwrap();
        assert_eq!(
            output.drain().next().unwrap(),
            TupleValues::new("clicks", vec!["a".into(), Value::Int(1)])
        );
        assert_eq!(template.count(&GroupKey::new(vec!["a".into()])), 2);
    }
}
