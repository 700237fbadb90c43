//! # Workflows Module
//!
//! End-to-end procedures of an ATM relative binding free energy calculation,
//! built on the [`core`](crate::core) and [`engine`](crate::engine) layers.
//!
//! ## Architecture
//!
//! - **Structure Preparation** ([`structprep`]) - Atom mapping, restraint selection and
//!   assembly of the [`AlchemicalSystem`](crate::core::system::AlchemicalSystem)
//! - **Production** ([`production`]) - Replica-exchange sampling followed by the final estimate
//! - **Analysis** ([`analyze`]) - ΔΔG estimation from an existing sample store
//!
//! Every workflow reports progress through a
//! [`ProgressReporter`](crate::engine::progress::ProgressReporter) and fails
//! with a [`WorkflowError`], whose [`kind`](WorkflowError::kind) tells front
//! ends which phase failed.

pub mod analyze;
pub mod production;
pub mod structprep;

use crate::core::analysis::EstimatorError;
use crate::core::io::store::StoreError;
use crate::core::mapping::MappingError;
use crate::core::models::complex::ComplexError;
use crate::core::restraints::RestraintError;
use crate::core::system::{SystemBuildError, SystemFileError};
use crate::engine::config::ConfigError;
use crate::engine::error::SchedulerError;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid input or preparation failure.
    Setup,
    /// Production run failure.
    Runtime,
    /// Free-energy estimation failure.
    Analysis,
    /// File system or persistence failure.
    Io,
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Invalid complex: {0}")]
    Complex(#[from] ComplexError),
    #[error("Atom mapping failed: {0}")]
    Mapping(#[from] MappingError),
    #[error("Restraint selection failed: {0}")]
    Restraint(#[from] RestraintError),
    #[error("Alchemical system assembly failed: {0}")]
    SystemBuild(#[from] SystemBuildError),
    #[error(transparent)]
    SystemFile(#[from] SystemFileError),
    #[error("Production failed: {0}")]
    Scheduler(#[from] SchedulerError),
    #[error("Free energy estimation failed: {0}")]
    Estimator(#[from] EstimatorError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_)
            | Self::Complex(_)
            | Self::Mapping(_)
            | Self::Restraint(_)
            | Self::SystemBuild(_)
            | Self::Scheduler(SchedulerError::StoreNotEmpty { .. })
            | Self::Scheduler(SchedulerError::StoreAheadOfCheckpoint { .. }) => ErrorKind::Setup,
            Self::Scheduler(SchedulerError::Store { .. })
            | Self::Scheduler(SchedulerError::CheckpointIo { .. }) => ErrorKind::Io,
            Self::Scheduler(_) => ErrorKind::Runtime,
            Self::Estimator(EstimatorError::Store(_)) => ErrorKind::Io,
            Self::Estimator(_) => ErrorKind::Analysis,
            Self::SystemFile(_) | Self::Store(_) => ErrorKind::Io,
        }
    }
}
