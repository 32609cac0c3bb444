use super::GroupingError;
use crate::context::TaskId;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::hash::{Hash, Hasher};

/// Sends each tuple to one uniformly random candidate task.
#[derive(Clone, Debug, Default)]
pub struct ShuffleGrouping {
    seed: Option<u64>,
    state: Option<(Vec<TaskId>, ChaCha8Rng)>,
}

impl ShuffleGrouping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a fixed seed instead of drawing one at prepare time.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            state: None,
        }
    }

    pub(super) fn prepare(&mut self, targets: &[TaskId]) {
        let rng = match self.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        self.state = Some((targets.to_vec(), rng));
    }

    pub(super) fn choose_tasks(&mut self) -> Result<Vec<TaskId>, GroupingError> {
        let (targets, rng) = self.state.as_mut().ok_or(GroupingError::NotPrepared)?;
        Ok(vec![targets[rng.gen_range(0..targets.len())]])
    }
}

impl PartialEq for ShuffleGrouping {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl Eq for ShuffleGrouping {}

impl Hash for ShuffleGrouping {
    fn hash<H: Hasher>(&self, state: &mut H) {
        "shuffle".hash(state);
    }
}
