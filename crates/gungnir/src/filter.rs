//! Tuple predicates applied by filter dispatchers.

use crate::{
    context::TaskContext,
    tuple::{FieldAccessor, GungnirTuple, TupleError, Value},
};
use gungnir_types::config::Config;
use std::cmp::Ordering;

/// A gate in a filter chain.  Returning `false` from
/// [`accept`](TupleFilter::accept) drops the tuple.
pub trait TupleFilter: Send {
    fn prepare(&mut self, _config: &Config, _context: &TaskContext) -> anyhow::Result<()> {
        Ok(())
    }

    fn accept(&mut self, tuple: &GungnirTuple) -> anyhow::Result<bool>;

    fn cleanup(&mut self) {}
}

/// Adapts a closure into a [`TupleFilter`].
pub struct FnFilter<F>(F);

pub fn from_fn<F>(f: F) -> FnFilter<F>
where
    F: FnMut(&GungnirTuple) -> bool + Send,
{
    FnFilter(f)
}

impl<F> TupleFilter for FnFilter<F>
where
    F: FnMut(&GungnirTuple) -> bool + Send,
{
    fn accept(&mut self, tuple: &GungnirTuple) -> anyhow::Result<bool> {
        Ok((self.0)(tuple))
    }
}

/// Declarative field predicates.
///
/// Comparisons against `Null` or values of a different kind are false,
/// so `Ne` is not the negation of `Eq` in their presence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Condition {
    Eq(FieldAccessor, Value),
    Ne(FieldAccessor, Value),
    Lt(FieldAccessor, Value),
    Le(FieldAccessor, Value),
    Gt(FieldAccessor, Value),
    Ge(FieldAccessor, Value),
    IsNull(FieldAccessor),
    IsNotNull(FieldAccessor),
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    pub fn evaluate(&self, tuple: &GungnirTuple) -> Result<bool, TupleError> {
        let compare = |field: &FieldAccessor,
                       value: &Value,
                       accept: fn(Ordering) -> bool|
         -> Result<bool, TupleError> {
            Ok(field
                .get(tuple)?
                .compare(value)
                .is_some_and(accept))
        };
        match self {
            Self::Eq(field, value) => compare(field, value, Ordering::is_eq),
            Self::Ne(field, value) => compare(field, value, Ordering::is_ne),
            Self::Lt(field, value) => compare(field, value, Ordering::is_lt),
            Self::Le(field, value) => compare(field, value, Ordering::is_le),
            Self::Gt(field, value) => compare(field, value, Ordering::is_gt),
            Self::Ge(field, value) => compare(field, value, Ordering::is_ge),
            Self::IsNull(field) => Ok(field.get(tuple)?.is_null()),
            Self::IsNotNull(field) => Ok(!field.get(tuple)?.is_null()),
            Self::And(conditions) => {
                for condition in conditions {
                    if !condition.evaluate(tuple)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Self::Or(conditions) => {
                for condition in conditions {
                    if condition.evaluate(tuple)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Self::Not(condition) => Ok(!condition.evaluate(tuple)?),
        }
    }
}

impl TupleFilter for Condition {
    fn accept(&mut self, tuple: &GungnirTuple) -> anyhow::Result<bool> {
        Ok(self.evaluate(tuple)?)
    }
}

#[cfg(test)]
mod test {
    use super::Condition;
    use crate::tuple::{FieldAccessor, GungnirTuple, Schema, TupleError, TupleValues, Value};
    use std::sync::Arc;

    fn tuple(user: &str, amount: Value) -> GungnirTuple {
        GungnirTuple::new(
            Arc::new(Schema::new("order", ["user", "amount"])),
            TupleValues::new("order", vec![user.into(), amount]),
        )
    }

    fn field(name: &str) -> FieldAccessor {
        FieldAccessor::new(name)
    }

    #[test]
    fn comparisons() {
        let t = tuple("ann", 25.into());
        assert!(Condition::Gt(field("amount"), 20.into()).evaluate(&t).unwrap());
        assert!(Condition::Le(field("amount"), 25.5.into()).evaluate(&t).unwrap());
        assert!(!Condition::Lt(field("amount"), 25.into()).evaluate(&t).unwrap());
        assert!(Condition::Eq(field("user"), "ann".into()).evaluate(&t).unwrap());
        assert!(!Condition::Eq(field("user"), 1.into()).evaluate(&t).unwrap());
    }

    #[test]
    fn nulls() {
        let t = tuple("ann", Value::Null);
        assert!(Condition::IsNull(field("amount")).evaluate(&t).unwrap());
        assert!(!Condition::Gt(field("amount"), 0.into()).evaluate(&t).unwrap());
        assert!(!Condition::Ne(field("amount"), 0.into()).evaluate(&t).unwrap());
    }

    #[test]
    fn composition() {
        let t = tuple("bob", 7.into());
        let condition = Condition::And(vec![
            Condition::IsNotNull(field("user")),
            Condition::Or(vec![
                Condition::Eq(field("user"), "ann".into()),
                Condition::Not(Box::new(Condition::Lt(field("amount"), 5.into()))),
            ]),
        ]);
        assert!(condition.evaluate(&t).unwrap());
    }

    #[test]
    fn unknown_field() {
        assert_eq!(
            Condition::IsNull(field("price")).evaluate(&tuple("ann", 1.into())),
            Err(TupleError::UnknownField {
                tuple_name: "order".to_string(),
                field: "price".to_string()
            })
        );
    }
}
