//! # Free Energy Analysis
//!
//! Estimation of the relative binding free energy from production samples.
//!
//! The samples of each ATM leg are reweighted jointly with UWHAM ([`uwham`]),
//! the unbinned equivalent of MBAR. The two legs are combined into ΔΔG in
//! [`estimator`], with standard errors optionally inflated by the statistical
//! inefficiency of the perturbation energy series ([`correlation`]).

pub mod correlation;
pub mod estimator;
pub mod uwham;

pub use estimator::{
    EstimatorConfig, EstimatorError, FreeEnergyEstimate, FreeEnergyEstimator, IncrementalEstimator,
    LegEstimate,
};
