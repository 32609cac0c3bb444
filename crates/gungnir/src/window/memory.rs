use super::{TimeKey, WindowError, WindowStorage};
use crate::tuple::{GroupKey, TupleValues};
use std::{collections::HashMap, mem};
use tracing::debug;

/// Rows retained for one key, plus the time index when the key is used as
/// a time window.
#[derive(Debug, Default)]
struct WindowContainer {
    rows: Vec<TupleValues>,
    time_keys: Vec<TimeKey>,
}

impl WindowContainer {
    fn is_timed(&self) -> bool {
        !self.time_keys.is_empty()
    }

    /// Removes and returns the rows before `boundary`.
    fn split_off_front(&mut self, boundary: usize) -> Vec<TupleValues> {
        let retained = self.rows.split_off(boundary);
        if self.is_timed() {
            self.time_keys.drain(..boundary);
        }
        mem::replace(&mut self.rows, retained)
    }
}

#[derive(Debug, Default)]
enum State {
    #[default]
    Unopened,
    Open(HashMap<GroupKey, WindowContainer>),
    Closed,
}

/// In-memory [`WindowStorage`] backed by two growable sequences per key.
#[derive(Debug, Default)]
pub struct MemoryWindowStorage {
    state: State,
    scope: String,
}

impl MemoryWindowStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows currently retained for `key`, oldest first.
    pub fn rows(&self, key: &GroupKey) -> Option<&[TupleValues]> {
        match &self.state {
            State::Open(containers) => containers.get(key).map(|c| c.rows.as_slice()),
            _ => None,
        }
    }

    pub fn time_keys(&self, key: &GroupKey) -> Option<&[TimeKey]> {
        match &self.state {
            State::Open(containers) => containers.get(key).map(|c| c.time_keys.as_slice()),
            _ => None,
        }
    }

    /// Number of keys with a container.
    pub fn key_count(&self) -> usize {
        match &self.state {
            State::Open(containers) => containers.len(),
            _ => 0,
        }
    }

    fn containers(&mut self) -> Result<&mut HashMap<GroupKey, WindowContainer>, WindowError> {
        match &mut self.state {
            State::Open(containers) => Ok(containers),
            State::Unopened => Err(WindowError::NotOpen),
            State::Closed => Err(WindowError::Closed),
        }
    }
}

impl WindowStorage for MemoryWindowStorage {
    fn open(&mut self, stream_execution_id: &str, operator_name: &str) -> Result<(), WindowError> {
        match self.state {
            State::Open(_) => Ok(()),
            State::Closed => Err(WindowError::Closed),
            State::Unopened => {
                self.scope = format!("{stream_execution_id}/{operator_name}");
                debug!(scope = %self.scope, "opened in-memory window storage");
                self.state = State::Open(HashMap::new());
                Ok(())
            }
        }
    }

    fn put(&mut self, key: &GroupKey, values: TupleValues) -> Result<(), WindowError> {
        let container = self.containers()?.entry(key.clone()).or_default();
        if container.is_timed() {
            return Err(WindowError::MixedModes {
                key: key.to_string(),
            });
        }
        container.rows.push(values);
        Ok(())
    }

    fn put_at(
        &mut self,
        key: &GroupKey,
        time_key: TimeKey,
        values: TupleValues,
    ) -> Result<(), WindowError> {
        let container = self.containers()?.entry(key.clone()).or_default();
        if container.rows.len() != container.time_keys.len() {
            return Err(WindowError::MixedModes {
                key: key.to_string(),
            });
        }
        debug_assert!(
            container.time_keys.last().is_none_or(|last| *last <= time_key),
            "time keys must be appended in non-decreasing order"
        );
        container.rows.push(values);
        container.time_keys.push(time_key);
        Ok(())
    }

    fn get_by_count(
        &mut self,
        key: &GroupKey,
        count: usize,
    ) -> Result<Option<Vec<TupleValues>>, WindowError> {
        let Some(container) = self.containers()?.get_mut(key) else {
            return Ok(None);
        };
        let len = container.rows.len();
        if len <= count {
            return Ok(None);
        }
        Ok(Some(container.split_off_front(len - count)))
    }

    fn get_by_time(
        &mut self,
        key: &GroupKey,
        time_key: TimeKey,
    ) -> Result<Option<Vec<TupleValues>>, WindowError> {
        let Some(container) = self.containers()?.get_mut(key) else {
            return Ok(None);
        };
        // First row not strictly older than `time_key`, also for runs of
        // equal keys.
        let boundary = container.time_keys.partition_point(|key| *key < time_key);
        if boundary == 0 {
            return Ok(None);
        }
        if boundary >= container.rows.len() {
            container.time_keys.clear();
            return Ok(Some(mem::take(&mut container.rows)));
        }
        Ok(Some(container.split_off_front(boundary)))
    }

    fn retained(&self, key: &GroupKey) -> Result<usize, WindowError> {
        match &self.state {
            State::Open(containers) => Ok(containers.get(key).map_or(0, |c| c.rows.len())),
            State::Unopened => Err(WindowError::NotOpen),
            State::Closed => Err(WindowError::Closed),
        }
    }

    fn close(&mut self) {
        if matches!(self.state, State::Open(_)) {
            debug!(scope = %self.scope, "closed in-memory window storage");
        }
        self.state = State::Closed;
    }
}
