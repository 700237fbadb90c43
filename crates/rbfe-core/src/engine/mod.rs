//! # Engine Module
//!
//! The stateful production layer: replica-exchange sampling of the alchemical
//! schedule through an external molecular dynamics engine.
//!
//! ## Overview
//!
//! One replica exists per schedule state. Every cycle each live replica is
//! propagated by the [`simulation::SimulationEngine`] in the state it is
//! currently assigned, one [`SampleRecord`](crate::core::io::store::SampleRecord)
//! per successful run is appended to the sample store, and neighbouring states
//! then attempt Metropolis swaps. Swaps exchange state assignments; the
//! configurations stay with their replica.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Structure-preparation and production parameters with builders
//! - **Engine Boundary** ([`simulation`]) - Requests, outputs and failure classes of the MD engine
//! - **Replica Lifecycle** ([`replica`]) - Per-replica state machine
//! - **Exchange** ([`exchange`]) - Acceptance rule, pairing sweeps and statistics
//! - **Run State** ([`context`]) - State permutation, replicas, RNG and checkpoints
//! - **Scheduling** ([`scheduler`]) - The cycle loop with retries, cancellation and wall-clock limits
//! - **Progress Monitoring** ([`progress`]) - Progress events for front ends
//! - **Error Handling** ([`error`]) - Scheduler error type

pub mod config;
pub mod context;
pub mod error;
pub mod exchange;
pub(crate) mod perturb;
pub mod progress;
pub mod replica;
pub mod scheduler;
pub mod simulation;
