//! # Alchemical Transfer Method potential
//!
//! The alchemical coordinate of ATM is the perturbation energy `u`, the
//! difference between the potential energy with ligand B in the binding site
//! (and A displaced into the solvent) and the reverse arrangement. Each
//! thermodynamic state biases `u` with an integrated-logistic function; the
//! engine applies a softcore transform to `u` before biasing.
//!
//! Energies are in kcal/mol, temperatures in kelvin.

pub mod schedule;
pub mod softcore;
pub mod state;

pub use schedule::{AlchemicalSchedule, ScheduleError};
pub use softcore::SoftcoreParams;
pub use state::{AtmState, Direction, BOLTZMANN_KCAL};
