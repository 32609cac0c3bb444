//! Keyed buffers of retained tuples for windowed operators.
//!
//! Each group key owns an ordered sequence of rows and, for time windows, a
//! parallel index of second-resolution time keys.  Both `get_by_*` calls
//! express eviction as "drain everything that has aged out and keep the
//! rest", returning `None` when nothing has aged out yet.
//!
//! Implementations may be backed by a remote store, so callers treat every
//! call as potentially blocking and hold no other resources across it.

mod memory;

pub use memory::MemoryWindowStorage;

use crate::{
    error::DetailedError,
    tuple::{GroupKey, TupleValues},
};
use serde::{Deserialize, Serialize};
use std::{
    borrow::Cow,
    fmt::{self, Display},
};
use thiserror::Error;

/// A point in time truncated to whole seconds.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TimeKey(i64);

impl TimeKey {
    pub const fn from_secs(secs: i64) -> Self {
        Self(secs)
    }

    /// Truncates `millis` to the enclosing second.
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis.div_euclid(1000))
    }

    pub const fn secs(self) -> i64 {
        self.0
    }

    pub const fn saturating_sub_secs(self, secs: i64) -> Self {
        Self(self.0.saturating_sub(secs))
    }
}

impl Display for TimeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum WindowError {
    #[error("window storage is not open")]
    NotOpen,

    #[error("window storage has been closed")]
    Closed,

    /// Rows with and without time keys were mixed under one key, which
    /// would break the parallel time index.
    #[error("key {key} mixes count-window and time-window rows")]
    MixedModes { key: String },

    #[error("window storage backend failed: {0}")]
    Backend(String),
}

impl DetailedError for WindowError {
    fn error_code(&self) -> Cow<'static, str> {
        match self {
            Self::NotOpen => Cow::from("WindowNotOpen"),
            Self::Closed => Cow::from("WindowClosed"),
            Self::MixedModes { .. } => Cow::from("WindowMixedModes"),
            Self::Backend(_) => Cow::from("WindowBackend"),
        }
    }
}

pub trait WindowStorage: Send {
    /// Allocates the key to container map.  Opening an already open storage
    /// is a no-op.
    fn open(&mut self, stream_execution_id: &str, operator_name: &str) -> Result<(), WindowError>;

    /// Appends a row to the count window of `key`.
    fn put(&mut self, key: &GroupKey, values: TupleValues) -> Result<(), WindowError>;

    /// Appends a row to the time window of `key`.
    ///
    /// Time keys must be non-decreasing per key.  The index is a plain
    /// append and is never re-sorted.
    fn put_at(
        &mut self,
        key: &GroupKey,
        time_key: TimeKey,
        values: TupleValues,
    ) -> Result<(), WindowError>;

    /// Returns every row except the newest `count`, retaining those.
    /// `None` if the key is unknown or holds at most `count` rows.
    fn get_by_count(
        &mut self,
        key: &GroupKey,
        count: usize,
    ) -> Result<Option<Vec<TupleValues>>, WindowError>;

    /// Returns every row strictly older than `time_key`, retaining the
    /// rest.  `None` if the key is unknown or no row is older.
    fn get_by_time(
        &mut self,
        key: &GroupKey,
        time_key: TimeKey,
    ) -> Result<Option<Vec<TupleValues>>, WindowError>;

    /// Number of rows currently retained for `key`.
    fn retained(&self, key: &GroupKey) -> Result<usize, WindowError>;

    /// Releases all buffered rows.  No further operations are valid.
    fn close(&mut self);
}

#[cfg(test)]
mod test {
    use super::TimeKey;

    #[test]
    fn time_key_truncation() {
        assert_eq!(TimeKey::from_millis(25_999), TimeKey::from_secs(25));
        assert_eq!(TimeKey::from_millis(0), TimeKey::from_secs(0));
        assert_eq!(TimeKey::from_millis(-1), TimeKey::from_secs(-1));
        assert_eq!(TimeKey::from_secs(30).saturating_sub_secs(10), TimeKey::from_secs(20));
    }
}
