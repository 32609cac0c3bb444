use crate::{
    dispatcher::DispatchError, grouping::GroupingError, topology::TopologyError,
    tuple::TupleError, window::WindowError,
};
pub use gungnir_types::config::ConfigError;
pub use gungnir_types::error::DetailedError;
use serde::{ser::SerializeStruct, Serialize, Serializer};
use std::borrow::Cow;
use thiserror::Error;

/// Top-level error type of the engine core.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Tuple(#[from] TupleError),
    #[error(transparent)]
    Grouping(#[from] GroupingError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Window(#[from] WindowError),
    #[error(transparent)]
    Topology(#[from] TopologyError),
}

impl DetailedError for Error {
    fn error_code(&self) -> Cow<'static, str> {
        match self {
            Self::Config(error) => error.error_code(),
            Self::Tuple(error) => error.error_code(),
            Self::Grouping(error) => error.error_code(),
            Self::Dispatch(error) => error.error_code(),
            Self::Window(error) => error.error_code(),
            Self::Topology(error) => error.error_code(),
        }
    }

    fn is_fatal(&self) -> bool {
        match self {
            Self::Dispatch(error) => error.is_fatal(),
            _ => true,
        }
    }
}

impl Serialize for Error {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Config(error) => error.serialize(serializer),
            Self::Tuple(error) => error.serialize(serializer),
            Self::Grouping(error) => error.serialize(serializer),
            Self::Dispatch(error) => error.serialize(serializer),
            Self::Window(error) => error.serialize(serializer),
            Self::Topology(error) => error.serialize(serializer),
        }
    }
}

/// Serializes an error that wraps an opaque [`anyhow::Error`] as its code,
/// the offending component and the rendered cause chain.
pub(crate) fn serialize_opaque<S>(
    serializer: S,
    error_code: &str,
    component: &str,
    source: &anyhow::Error,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut ser = serializer.serialize_struct("OpaqueError", 3)?;
    ser.serialize_field("error_code", error_code)?;
    ser.serialize_field("component", component)?;
    ser.serialize_field("cause", &format!("{source:#}"))?;
    ser.end()
}
