use super::simulation::Configuration;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Lifecycle of a replica within one production run.
///
/// A replica cycles `Idle → Running → AwaitingExchange → Idle`; a cycle whose
/// engine runs all failed ends in `Failed` instead of `AwaitingExchange`, and
/// the replica rejoins at the next cycle. `Completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReplicaStatus {
    Idle,
    Running { state: usize },
    AwaitingExchange,
    Failed,
    Completed,
}

impl fmt::Display for ReplicaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running { state } => write!(f, "running in state {state}"),
            Self::AwaitingExchange => write!(f, "awaiting exchange"),
            Self::Failed => write!(f, "failed"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("Replica {replica}: illegal transition from {from} to {to}")]
pub struct TransitionError {
    pub replica: usize,
    pub from: ReplicaStatus,
    pub to: ReplicaStatus,
}

impl ReplicaStatus {
    pub fn can_transition_to(self, next: ReplicaStatus) -> bool {
        use ReplicaStatus::*;
        matches!(
            (self, next),
            (Idle, Running { .. })
                | (Idle, Completed)
                | (Running { .. }, AwaitingExchange)
                | (Running { .. }, Failed)
                | (Running { .. }, Completed)
                | (AwaitingExchange, Idle)
                | (AwaitingExchange, Completed)
                | (Failed, Idle)
                | (Failed, Completed)
        )
    }

    /// Whether the replica still takes part in the run.
    pub fn is_live(self) -> bool {
        self != ReplicaStatus::Completed
    }
}

/// A replica slot. Its index never changes; the state it samples does.
#[derive(Debug, Clone, PartialEq)]
pub struct Replica {
    index: usize,
    status: ReplicaStatus,
    configuration: Configuration,
}

impl Replica {
    pub fn new(index: usize, configuration: Configuration) -> Self {
        Self {
            index,
            status: ReplicaStatus::Idle,
            configuration,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn status(&self) -> ReplicaStatus {
        self.status
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    pub fn set_configuration(&mut self, configuration: Configuration) {
        self.configuration = configuration;
    }

    pub fn transition(&mut self, next: ReplicaStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                replica: self.index,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}
