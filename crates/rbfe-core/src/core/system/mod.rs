//! # Alchemical System
//!
//! The immutable artifact produced by structure preparation: the receptor
//! complex with both ligands (B aligned onto A and displaced into the
//! solvent), the atom mapping, the softcore region, the restraints, the
//! softcore parameters and the alchemical schedule.

pub mod alchemical;
pub mod builder;

use crate::core::atm::ScheduleError;
use crate::core::mapping::MappingError;
use crate::core::models::complex::{ComplexError, LigandSide};
use thiserror::Error;

pub use alchemical::{AlchemicalSystem, SoftcoreRegion, SystemFileError};
pub use builder::AlchemicalSystemBuilder;

#[derive(Debug, Error, PartialEq)]
pub enum SystemBuildError {
    #[error("Missing required component: {0}")]
    MissingComponent(&'static str),
    #[error("Invalid complex: {0}")]
    Complex(#[from] ComplexError),
    #[error("Invalid atom mapping: {0}")]
    Mapping(#[from] MappingError),
    #[error("Invalid alchemical schedule: {0}")]
    Schedule(#[from] ScheduleError),
    #[error("Restraint references atom {index}, but the topology has {len} atoms")]
    RestraintAtomOutOfRange { index: usize, len: usize },
    #[error("Receptor anchor atom {index} belongs to a ligand")]
    AnchorIsLigandAtom { index: usize },
    #[error("Alignment reference atom {index} of ligand {side} is not part of the mapped core")]
    ReferenceOutsideCore { side: LigandSide, index: usize },
    #[error("Restraint #{position} has invalid constants or shape")]
    MalformedRestraint { position: usize },
    #[error("Invalid softcore parameters: {0}")]
    InvalidSoftcore(String),
    #[error("Displacement vector must be finite and non-zero")]
    InvalidDisplacement,
    #[error("Could not superimpose ligand B onto ligand A")]
    AlignmentFailed,
    #[error("Softcore region does not match the atom mapping")]
    InconsistentSoftcoreRegion,
}
