use super::{GungnirTuple, Schema, TupleError, TupleValues, Value};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// Reference to a field, optionally qualified by the tuple name it belongs
/// to (`click.user`).  A qualified accessor matches only tuples of that name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldAccessor {
    tuple_name: Option<String>,
    field_name: String,
}

impl FieldAccessor {
    pub fn new(field_name: impl Into<String>) -> Self {
        Self {
            tuple_name: None,
            field_name: field_name.into(),
        }
    }

    pub fn qualified(tuple_name: impl Into<String>, field_name: impl Into<String>) -> Self {
        Self {
            tuple_name: Some(tuple_name.into()),
            field_name: field_name.into(),
        }
    }

    /// Parses `field` or `tuple.field`.
    pub fn parse(accessor: &str) -> Self {
        match accessor.split_once('.') {
            Some((tuple_name, field_name)) => Self::qualified(tuple_name, field_name),
            None => Self::new(accessor),
        }
    }

    pub fn tuple_name(&self) -> Option<&str> {
        self.tuple_name.as_deref()
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    /// Position of the field in `schema`.
    pub fn index_in(&self, schema: &Schema) -> Result<usize, TupleError> {
        let matches_tuple = self
            .tuple_name
            .as_deref()
            .is_none_or(|tuple_name| tuple_name == schema.name());
        matches_tuple
            .then(|| schema.field_index(&self.field_name))
            .flatten()
            .ok_or_else(|| TupleError::UnknownField {
                tuple_name: schema.name().to_string(),
                field: self.to_string(),
            })
    }

    pub fn get<'a>(&self, tuple: &'a GungnirTuple) -> Result<&'a Value, TupleError> {
        self.get_from(tuple.schema(), tuple.tuple_values())
    }

    pub fn get_from<'a>(
        &self,
        schema: &Schema,
        values: &'a TupleValues,
    ) -> Result<&'a Value, TupleError> {
        let index = self.index_in(schema)?;
        values.get(index).ok_or_else(|| TupleError::UnknownField {
            tuple_name: values.tuple_name().to_string(),
            field: self.to_string(),
        })
    }
}

impl Display for FieldAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tuple_name {
            Some(tuple_name) => write!(f, "{tuple_name}.{}", self.field_name),
            None => f.write_str(&self.field_name),
        }
    }
}

/// Ordered list of fields whose values form a partition key.
///
/// Equality and hashing are defined by the accessors alone, so two
/// `GroupFields` naming the same fields in the same order are
/// interchangeable.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupFields {
    fields: Vec<FieldAccessor>,
}

impl GroupFields {
    pub fn new(fields: Vec<FieldAccessor>) -> Self {
        Self { fields }
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(
            names
                .into_iter()
                .map(|name| FieldAccessor::parse(name.as_ref()))
                .collect(),
        )
    }

    pub fn fields(&self) -> &[FieldAccessor] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Positions of the group fields in `schema`, in key order.
    pub fn indices_in(&self, schema: &Schema) -> Result<Vec<usize>, TupleError> {
        self.fields
            .iter()
            .map(|field| field.index_in(schema))
            .collect()
    }

    pub fn key(&self, tuple: &GungnirTuple) -> Result<GroupKey, TupleError> {
        self.key_from(tuple.schema(), tuple.tuple_values())
    }

    pub fn key_from(&self, schema: &Schema, values: &TupleValues) -> Result<GroupKey, TupleError> {
        self.fields
            .iter()
            .map(|field| field.get_from(schema, values).cloned())
            .collect::<Result<Vec<_>, _>>()
            .map(GroupKey)
    }
}

impl Display for GroupFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{field}")?;
        }
        Ok(())
    }
}

/// Extracted partition key: the group field values in order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupKey(Vec<Value>);

impl GroupKey {
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    /// Key of an ungrouped stream.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }

    pub fn into_values(self) -> Vec<Value> {
        self.0
    }
}

impl From<Vec<Value>> for GroupKey {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

impl Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Value::List(self.0.clone()))
    }
}
