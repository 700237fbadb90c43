//! # Core Models Module
//!
//! Data structures describing the molecular input of an ATM relative binding
//! free energy calculation.
//!
//! ## Key Components
//!
//! - [`element`] - Chemical elements with masses and heavy-atom classification
//! - [`topology`] - Flat, index-addressed system topology (atoms and bonds)
//! - [`ligand`] - Immutable ligand graphs with ring and connectivity queries
//! - [`complex`] - Receptor plus the two alchemical ligands, as delivered by a loader
//!
//! ## Usage
//!
//! ```ignore
//! use rbfe_atm::core::models::complex::{Complex, LigandSide};
//!
//! let complex: Complex = toml::from_str(&text)?;
//! let ligand_a = complex.ligand(LigandSide::A)?;
//! let ligand_b = complex.ligand(LigandSide::B)?;
//! ```

pub mod complex;
pub mod element;
pub mod ligand;
pub mod topology;
