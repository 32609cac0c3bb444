use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::{borrow::Cow, error::Error as StdError};
use tracing::{error, warn};

/// Error description handed to outer surfaces (console, REST gateways).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub message: String,
    /// Error code is a string that specifies this error type.
    pub error_code: Cow<'static, str>,
    /// Detailed error metadata.
    /// The contents of this field is determined by `error_code`.
    pub details: JsonValue,
}

/// Error trait which internal errors must implement such that it
/// can be transformed to a complete JSON error response.
pub trait DetailedError: StdError + Serialize {
    /// Identifying name of the error.
    fn error_code(&self) -> Cow<'static, str>;

    /// Fatal errors stop the task; the others only affect the current tuple.
    fn is_fatal(&self) -> bool {
        true
    }
}

impl<E> From<&E> for ErrorResponse
where
    E: DetailedError,
{
    fn from(error: &E) -> ErrorResponse {
        Self::from_error(error)
    }
}

impl ErrorResponse {
    /// Transform the detailed error to a complete JSON error response,
    /// logging it at a level determined by [`DetailedError::is_fatal`].
    pub fn from_error<E>(error: &E) -> Self
    where
        E: DetailedError,
    {
        let response = Self::from_error_nolog(error);

        if error.is_fatal() {
            error!("[fatal] {}: {}", response.error_code, response.message);
        } else {
            warn!("{}: {}", response.error_code, response.message);
        }

        response
    }

    pub fn from_error_nolog<E>(error: &E) -> Self
    where
        E: DetailedError,
    {
        let message = error.to_string();
        let error_code = error.error_code();
        let details = serde_json::to_value(error).unwrap_or_else(|e| {
            JsonValue::String(format!("Failed to serialize error. Details: '{e}'"))
        });

        Self {
            message,
            error_code,
            details,
        }
    }
}
