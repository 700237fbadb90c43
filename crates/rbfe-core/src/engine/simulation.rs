use crate::core::atm::AtmState;
use crate::core::models::complex::Complex;
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimulationError {
    /// The run may succeed from a slightly different starting point.
    #[error("Transient engine failure: {0}")]
    Transient(String),
    /// The replica cannot continue.
    #[error("Fatal engine failure: {0}")]
    Fatal(String),
}

impl SimulationError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Coordinates (and optionally velocities) carried by one replica from cycle
/// to cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    pub positions: Vec<Point3<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocities: Option<Vec<Vector3<f64>>>,
    /// Engine-side reference to the full snapshot (e.g. a restart file).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<String>,
}

impl Configuration {
    pub fn new(positions: Vec<Point3<f64>>) -> Self {
        Self {
            positions,
            velocities: None,
            snapshot: None,
        }
    }

    pub fn from_complex(complex: &Complex) -> Self {
        Self::new(complex.topology.atoms.iter().map(|a| a.position).collect())
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// One unit of work: propagate a replica's configuration in a fixed state for
/// one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineRequest {
    pub replica: usize,
    pub cycle: u64,
    pub state_index: usize,
    pub state: AtmState,
    /// Zero for the first try, incremented on every retry.
    pub attempt: u32,
    pub configuration: Configuration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineOutput {
    /// Total potential energy including the state's bias (kcal/mol).
    pub potential_energy: f64,
    /// Softcore perturbation energy `u` of the final configuration (kcal/mol).
    pub perturbation_energy: f64,
    pub configuration: Configuration,
}

impl EngineOutput {
    pub fn is_finite(&self) -> bool {
        self.potential_energy.is_finite() && self.perturbation_energy.is_finite()
    }
}

/// Boundary to the molecular dynamics engine.
///
/// Implementations must be callable concurrently for different replicas.
pub trait SimulationEngine: Send + Sync {
    fn run(&self, request: &EngineRequest) -> Result<EngineOutput, SimulationError>;
}

#[cfg(test)]
pub(crate) mod test_engines {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Deterministic engine whose perturbation energy depends on the replica,
    /// the cycle and the sampled state only.
    #[derive(Default)]
    pub struct SyntheticEngine {
        /// `(replica, cycle)` pairs that always fail transiently.
        pub failing: HashSet<(usize, u64)>,
        /// `(replica, cycle)` pairs that fail fatally.
        pub fatal: HashSet<(usize, u64)>,
        pub calls: AtomicUsize,
        pub attempts: Mutex<Vec<(usize, u64, u32)>>,
    }

    impl SyntheticEngine {
        pub fn failing(pairs: &[(usize, u64)]) -> Self {
            Self {
                failing: pairs.iter().copied().collect(),
                ..Self::default()
            }
        }

        pub fn fatal(pairs: &[(usize, u64)]) -> Self {
            Self {
                fatal: pairs.iter().copied().collect(),
                ..Self::default()
            }
        }
    }

    impl SimulationEngine for SyntheticEngine {
        fn run(&self, request: &EngineRequest) -> Result<EngineOutput, SimulationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut attempts) = self.attempts.lock() {
                attempts.push((request.replica, request.cycle, request.attempt));
            }
            let key = (request.replica, request.cycle);
            if self.fatal.contains(&key) {
                return Err(SimulationError::Fatal("segmentation fault".into()));
            }
            if self.failing.contains(&key) {
                return Err(SimulationError::Transient("particle coordinate is NaN".into()));
            }

            let state = &request.state;
            let phase = (request.replica as f64 * 1.7 + request.cycle as f64 * 0.9).sin();
            let u = 2.0 - state.lambda2 + 1.5 * phase;
            let e0 = -12000.0 + 2.5 * (request.cycle as f64 * 0.37 + request.replica as f64).cos();
            Ok(EngineOutput {
                potential_energy: e0 + state.bias(u),
                perturbation_energy: u,
                configuration: request.configuration.clone(),
            })
        }
    }
}
