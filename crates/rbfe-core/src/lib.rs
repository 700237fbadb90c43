//! # RBFE-ATM Core Library
//!
//! Setup, replica-exchange scheduling and analysis of relative binding free
//! energy calculations with the Alchemical Transfer Method (ATM).
//!
//! ## Architectural Philosophy
//!
//! The library keeps the same three-layer split throughout:
//!
//! - **[`core`]: The Foundation.** Stateless data models (`Ligand`, `Complex`,
//!   `AlchemicalSystem`), the atom mapper, restraint selection, the ATM bias
//!   potential and the UWHAM free-energy estimator.
//!
//! - **[`engine`]: The Logic Core.** The stateful production layer. It owns the
//!   run context (state permutation, replica status table, configurations,
//!   RNG), drives the external simulation engine through the
//!   [`engine::simulation::SimulationEngine`] trait and performs the
//!   Metropolis state exchanges.
//!
//! - **[`workflows`]: The Public API.** Complete procedures built on the two
//!   layers below: structure preparation, production and analysis.

pub mod core;
pub mod engine;
pub mod workflows;
