use thiserror::Error;

use super::config::ConfigError;
use super::replica::TransitionError;
use crate::core::io::store::StoreError;
use std::path::PathBuf;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Invalid production configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Sample store failure: {source}")]
    Store {
        #[from]
        source: StoreError,
    },

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("Replica/state assignment is not a permutation: {0:?}")]
    InvalidPermutation(Vec<usize>),

    #[error("Checkpoint has {found} replica(s), the schedule has {expected} states")]
    CheckpointMismatch { found: usize, expected: usize },

    #[error("I/O error on checkpoint '{path}': {source}")]
    CheckpointIo {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed checkpoint: {0}")]
    CheckpointFormat(String),

    #[error("Sample store already holds cycles up to {last_cycle}; resume from a checkpoint or use a new store")]
    StoreNotEmpty { last_cycle: u64 },

    #[error("Sample store holds cycles up to {store}, past the checkpoint at cycle {checkpoint}")]
    StoreAheadOfCheckpoint { store: u64, checkpoint: u64 },
}
