//! # Core Module
//!
//! Stateless building blocks of an ATM relative binding free energy
//! calculation: the molecular input, the atom mapping between the two
//! ligands, restraint selection, assembly of the dual-topology alchemical
//! system, sample persistence and the free-energy estimator.
//!
//! ## Architecture
//!
//! - **Molecular Representation** ([`models`]) - Topology, ligand graphs and the receptor complex
//! - **Atom Mapping** ([`mapping`]) - Maximum common substructure and explicit mappings
//! - **Restraints** ([`restraints`]) - Binding-site anchors, centroid and alignment restraints
//! - **Alchemical Potential** ([`atm`]) - ATM states, the softcore transform and the state schedule
//! - **System Assembly** ([`system`]) - The validated, serializable [`system::AlchemicalSystem`]
//! - **Persistence** ([`io`]) - Append-only sample stores and legacy replica logs
//! - **Analysis** ([`analysis`]) - UWHAM reweighting and the two-leg ΔΔG estimate
//! - **Utilities** ([`utils`]) - Geometry helpers shared across modules

pub mod analysis;
pub mod atm;
pub mod io;
pub mod mapping;
pub mod models;
pub mod restraints;
pub mod system;
pub mod utils;
