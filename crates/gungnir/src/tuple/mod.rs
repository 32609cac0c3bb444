//! Named tuples and the schemas that give their positional values meaning.
//!
//! A [`TupleValues`] is what travels between operators: a tuple name plus
//! the field values, positionally aligned to the [`Schema`] registered under
//! that name.  Operators never see raw values; each delivery wraps them in a
//! [`GungnirTuple`] bound to the schema of the consuming side.

mod fields;

pub use fields::{FieldAccessor, GroupFields, GroupKey};

use crate::error::DetailedError;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::{
    borrow::Cow,
    cmp::Ordering,
    collections::HashMap,
    fmt::{self, Display},
    sync::Arc,
};
use thiserror::Error;

/// A single field value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(OrderedFloat<f64>),
    String(String),
    /// Milliseconds since the Unix epoch.
    Timestamp(i64),
    List(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(v.into_inner()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    /// Interprets the value as an event time in milliseconds.  Plain
    /// integers are accepted so that sources can emit raw epoch values.
    pub fn as_timestamp_millis(&self) -> Option<i64> {
        match self {
            Self::Timestamp(v) | Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Orders two values of compatible kinds.  Integers and floats compare
    /// numerically with each other; every comparison involving `Null` or
    /// mismatched kinds is undefined.
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Float(a), Self::Float(b)) => Some(a.cmp(b)),
            (Self::Int(_), Self::Float(_)) | (Self::Float(_), Self::Int(_)) => {
                self.as_f64()?.partial_cmp(&other.as_f64()?)
            }
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            (Self::Timestamp(a), Self::Timestamp(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v:?}"),
            Self::Timestamp(v) => write!(f, "@{v}"),
            Self::List(values) => {
                f.write_str("[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Self::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(OrderedFloat(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::List(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// A tuple name with its positional field values.
///
/// Cloning produces an independent copy: fan-out paths that may mutate the
/// values each get their own.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TupleValues {
    tuple_name: String,
    values: Vec<Value>,
}

impl TupleValues {
    pub fn new(tuple_name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            tuple_name: tuple_name.into(),
            values,
        }
    }

    pub fn tuple_name(&self) -> &str {
        &self.tuple_name
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut Vec<Value> {
        &mut self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Display for TupleValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.tuple_name, Value::List(self.values.clone()))
    }
}

/// Field layout of a named tuple.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Schema {
    name: String,
    field_names: Vec<String>,
}

impl Schema {
    pub fn new<I, S>(name: impl Into<String>, field_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            field_names: field_names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_names(&self) -> &[String] {
        &self.field_names
    }

    pub fn field_index(&self, field_name: &str) -> Option<usize> {
        self.field_names.iter().position(|name| name == field_name)
    }
}

/// Schemas of every tuple name a worker may observe.
#[derive(Clone, Debug, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, Arc<Schema>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.register(schema);
        self
    }

    /// Registers `schema`, replacing any previous schema with the same name.
    pub fn register(&mut self, schema: Schema) -> Arc<Schema> {
        let schema = Arc::new(schema);
        self.schemas
            .insert(schema.name().to_string(), schema.clone());
        schema
    }

    pub fn get(&self, tuple_name: &str) -> Option<&Arc<Schema>> {
        self.schemas.get(tuple_name)
    }

    pub fn resolve(&self, tuple_name: &str) -> Result<&Arc<Schema>, TupleError> {
        self.get(tuple_name).ok_or_else(|| TupleError::UnknownSchema {
            tuple_name: tuple_name.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

/// A tuple as seen by one consuming operator: the values plus the field
/// names of the schema bound at that operator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GungnirTuple {
    schema: Arc<Schema>,
    values: TupleValues,
}

impl GungnirTuple {
    pub fn new(schema: Arc<Schema>, values: TupleValues) -> Self {
        Self { schema, values }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn field_names(&self) -> &[String] {
        self.schema.field_names()
    }

    pub fn tuple_name(&self) -> &str {
        self.values.tuple_name()
    }

    pub fn tuple_values(&self) -> &TupleValues {
        &self.values
    }

    pub fn into_tuple_values(self) -> TupleValues {
        self.values
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn get_by_field(&self, field_name: &str) -> Option<&Value> {
        self.schema
            .field_index(field_name)
            .and_then(|index| self.values.get(index))
    }
}

/// Errors resolving tuple names and fields.  These always indicate a
/// dataflow graph that was wired against the wrong schemas.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TupleError {
    #[error("no schema registered for tuple '{tuple_name}'")]
    UnknownSchema { tuple_name: String },

    #[error("tuple '{tuple_name}' has no field '{field}'")]
    UnknownField { tuple_name: String, field: String },
}

impl DetailedError for TupleError {
    fn error_code(&self) -> Cow<'static, str> {
        match self {
            Self::UnknownSchema { .. } => Cow::from("UnknownSchema"),
            Self::UnknownField { .. } => Cow::from("UnknownField"),
        }
    }
}
