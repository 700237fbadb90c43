use super::error::SchedulerError;
use super::exchange::ExchangeStats;
use super::replica::Replica;
use super::simulation::Configuration;
use crate::core::atm::AlchemicalSchedule;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Everything needed to resume a production run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Last completed cycle.
    pub cycle: u64,
    pub seed: u64,
    /// State index of every replica.
    pub permutation: Vec<usize>,
    pub exchange_stats: ExchangeStats,
    pub configurations: Vec<Configuration>,
}

impl Checkpoint {
    pub fn save(&self, path: &Path) -> Result<(), SchedulerError> {
        let text =
            toml::to_string(self).map_err(|e| SchedulerError::CheckpointFormat(e.to_string()))?;
        std::fs::write(path, text).map_err(|source| SchedulerError::CheckpointIo {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, SchedulerError> {
        let text = std::fs::read_to_string(path).map_err(|source| SchedulerError::CheckpointIo {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|e| SchedulerError::CheckpointFormat(e.to_string()))
    }
}

/// Mutable state of a production run: one replica per schedule state.
#[derive(Debug)]
pub struct RunContext {
    schedule: AlchemicalSchedule,
    seed: u64,
    cycle: u64,
    permutation: Vec<usize>,
    replicas: Vec<Replica>,
    rng: StdRng,
    stats: ExchangeStats,
}

impl RunContext {
    /// Fresh run: replica `i` starts in state `i` from the given configuration.
    pub fn new(schedule: AlchemicalSchedule, initial: Configuration, seed: u64) -> Self {
        let n = schedule.len();
        Self {
            permutation: (0..n).collect(),
            replicas: (0..n).map(|i| Replica::new(i, initial.clone())).collect(),
            rng: StdRng::seed_from_u64(seed),
            stats: ExchangeStats::new(n),
            schedule,
            seed,
            cycle: 0,
        }
    }

    pub fn from_checkpoint(
        schedule: AlchemicalSchedule,
        checkpoint: Checkpoint,
    ) -> Result<Self, SchedulerError> {
        let n = schedule.len();
        if checkpoint.permutation.len() != n || checkpoint.configurations.len() != n {
            return Err(SchedulerError::CheckpointMismatch {
                found: checkpoint.permutation.len(),
                expected: n,
            });
        }
        if !is_permutation(&checkpoint.permutation) {
            return Err(SchedulerError::InvalidPermutation(checkpoint.permutation));
        }
        Ok(Self {
            rng: StdRng::seed_from_u64(checkpoint.seed.wrapping_add(checkpoint.cycle)),
            replicas: checkpoint
                .configurations
                .into_iter()
                .enumerate()
                .map(|(i, c)| Replica::new(i, c))
                .collect(),
            permutation: checkpoint.permutation,
            stats: checkpoint.exchange_stats,
            seed: checkpoint.seed,
            cycle: checkpoint.cycle,
            schedule,
        })
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            cycle: self.cycle,
            seed: self.seed,
            permutation: self.permutation.clone(),
            exchange_stats: self.stats.clone(),
            configurations: self
                .replicas
                .iter()
                .map(|r| r.configuration().clone())
                .collect(),
        }
    }

    pub fn schedule(&self) -> &AlchemicalSchedule {
        &self.schedule
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Last completed cycle; `0` before the first one.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn permutation(&self) -> &[usize] {
        &self.permutation
    }

    pub fn replicas(&self) -> &[Replica] {
        &self.replicas
    }

    pub fn exchange_stats(&self) -> &ExchangeStats {
        &self.stats
    }

    pub(crate) fn replica_mut(&mut self, index: usize) -> &mut Replica {
        &mut self.replicas[index]
    }

    pub(crate) fn exchange_parts(
        &mut self,
    ) -> (&AlchemicalSchedule, &mut Vec<usize>, &mut StdRng, &mut ExchangeStats) {
        (
            &self.schedule,
            &mut self.permutation,
            &mut self.rng,
            &mut self.stats,
        )
    }

    pub(crate) fn finish_cycle(&mut self, cycle: u64) -> Result<(), SchedulerError> {
        if !is_permutation(&self.permutation) {
            return Err(SchedulerError::InvalidPermutation(self.permutation.clone()));
        }
        self.cycle = cycle;
        Ok(())
    }
}

pub(crate) fn is_permutation(values: &[usize]) -> bool {
    let mut seen = vec![false; values.len()];
    values.iter().all(|&v| {
        v < seen.len() && !std::mem::replace(&mut seen[v], true)
    })
}
