use crate::core::analysis::EstimatorConfig;
use crate::core::atm::{AlchemicalSchedule, SoftcoreParams};
use crate::core::mapping::McsOptions;
use crate::core::restraints::RestraintPolicy;
use nalgebra::Vector3;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

/// How ligand atoms are matched.
#[derive(Debug, Clone, PartialEq)]
pub enum MappingMethod {
    Mcs(McsOptions),
    /// Explicit `(index in A, index in B)` pairs.
    Explicit(Vec<(usize, usize)>),
}

impl Default for MappingMethod {
    fn default() -> Self {
        Self::Mcs(McsOptions::default())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructprepConfig {
    pub mapping: MappingMethod,
    pub restraints: RestraintPolicy,
    pub softcore: SoftcoreParams,
    pub schedule: AlchemicalSchedule,
    pub displacement: Vector3<f64>,
    pub align_ligand_b: bool,
}

#[derive(Default)]
pub struct StructprepConfigBuilder {
    mapping: Option<MappingMethod>,
    restraints: Option<RestraintPolicy>,
    softcore: Option<SoftcoreParams>,
    schedule: Option<AlchemicalSchedule>,
    displacement: Option<Vector3<f64>>,
    align_ligand_b: Option<bool>,
}

impl StructprepConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mapping(mut self, mapping: MappingMethod) -> Self {
        self.mapping = Some(mapping);
        self
    }
    pub fn restraints(mut self, policy: RestraintPolicy) -> Self {
        self.restraints = Some(policy);
        self
    }
    pub fn softcore(mut self, softcore: SoftcoreParams) -> Self {
        self.softcore = Some(softcore);
        self
    }
    pub fn schedule(mut self, schedule: AlchemicalSchedule) -> Self {
        self.schedule = Some(schedule);
        self
    }
    pub fn displacement(mut self, displacement: Vector3<f64>) -> Self {
        self.displacement = Some(displacement);
        self
    }
    pub fn align_ligand_b(mut self, align: bool) -> Self {
        self.align_ligand_b = Some(align);
        self
    }

    /// Only the displacement is required; everything else falls back to the
    /// standard RBFE settings.
    pub fn build(self) -> Result<StructprepConfig, ConfigError> {
        let displacement = self
            .displacement
            .ok_or(ConfigError::MissingParameter("displacement"))?;
        let restraints = self.restraints.unwrap_or_default();
        restraints
            .validate()
            .map_err(|e| ConfigError::InvalidParameter {
                name: "restraints",
                reason: e.to_string(),
            })?;
        let softcore = self.softcore.unwrap_or_default();
        softcore
            .validate()
            .map_err(|reason| ConfigError::InvalidParameter {
                name: "softcore",
                reason,
            })?;
        Ok(StructprepConfig {
            mapping: self.mapping.unwrap_or_default(),
            restraints,
            softcore,
            schedule: self.schedule.unwrap_or_else(AlchemicalSchedule::default_rbfe),
            displacement,
            align_ligand_b: self.align_ligand_b.unwrap_or(true),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointConfig {
    pub path: PathBuf,
    /// Cycles between checkpoints; the final state is always written.
    pub interval: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProductionConfig {
    /// Total number of cycles, including those of a resumed run.
    pub cycles: u64,
    pub max_retries: u32,
    /// Maximum per-coordinate displacement (Å) applied before a retry.
    pub perturbation_magnitude: f64,
    pub seed: u64,
    pub wall_clock_limit: Option<Duration>,
    pub checkpoint: Option<CheckpointConfig>,
    /// Cycles between running estimates during production; `0` disables them.
    pub estimate_interval: u64,
    pub estimator: EstimatorConfig,
}

#[derive(Default)]
pub struct ProductionConfigBuilder {
    cycles: Option<u64>,
    max_retries: Option<u32>,
    perturbation_magnitude: Option<f64>,
    seed: Option<u64>,
    wall_clock_limit: Option<Duration>,
    checkpoint: Option<CheckpointConfig>,
    estimate_interval: Option<u64>,
    estimator: Option<EstimatorConfig>,
}

impl ProductionConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cycles(mut self, cycles: u64) -> Self {
        self.cycles = Some(cycles);
        self
    }
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }
    pub fn perturbation_magnitude(mut self, magnitude: f64) -> Self {
        self.perturbation_magnitude = Some(magnitude);
        self
    }
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
    pub fn wall_clock_limit(mut self, limit: Option<Duration>) -> Self {
        self.wall_clock_limit = limit;
        self
    }
    pub fn checkpoint(mut self, checkpoint: Option<CheckpointConfig>) -> Self {
        self.checkpoint = checkpoint;
        self
    }
    pub fn estimate_interval(mut self, interval: u64) -> Self {
        self.estimate_interval = Some(interval);
        self
    }
    pub fn estimator(mut self, estimator: EstimatorConfig) -> Self {
        self.estimator = Some(estimator);
        self
    }

    pub fn build(self) -> Result<ProductionConfig, ConfigError> {
        let cycles = self.cycles.ok_or(ConfigError::MissingParameter("cycles"))?;
        if cycles == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "cycles",
                reason: "must be at least 1".into(),
            });
        }
        let perturbation_magnitude = self
            .perturbation_magnitude
            .ok_or(ConfigError::MissingParameter("perturbation_magnitude"))?;
        if !(perturbation_magnitude.is_finite() && perturbation_magnitude >= 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "perturbation_magnitude",
                reason: format!("{perturbation_magnitude} is not a non-negative length"),
            });
        }
        Ok(ProductionConfig {
            cycles,
            max_retries: self
                .max_retries
                .ok_or(ConfigError::MissingParameter("max_retries"))?,
            perturbation_magnitude,
            seed: self.seed.ok_or(ConfigError::MissingParameter("seed"))?,
            wall_clock_limit: self.wall_clock_limit,
            checkpoint: self.checkpoint,
            estimate_interval: self.estimate_interval.unwrap_or(0),
            estimator: self.estimator.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn production_builder_requires_core_parameters() {
        let err = ProductionConfigBuilder::new().seed(1).build().unwrap_err();
        assert_eq!(err, ConfigError::MissingParameter("cycles"));

        let err = ProductionConfigBuilder::new()
            .cycles(10)
            .perturbation_magnitude(0.01)
            .seed(1)
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::MissingParameter("max_retries"));

        let config = ProductionConfigBuilder::new()
            .cycles(10)
            .max_retries(2)
            .perturbation_magnitude(0.01)
            .seed(7)
            .build()
            .unwrap();
        assert_eq!(config.estimate_interval, 0);
        assert!(config.checkpoint.is_none());
        assert_eq!(config.estimator, EstimatorConfig::default());
    }

    #[test]
    fn production_builder_rejects_bad_values() {
        let base = || {
            ProductionConfigBuilder::new()
                .max_retries(1)
                .seed(0)
                .perturbation_magnitude(0.01)
        };
        assert!(matches!(
            base().cycles(0).build(),
            Err(ConfigError::InvalidParameter { name: "cycles", .. })
        ));
        assert!(matches!(
            base().cycles(5).perturbation_magnitude(-1.0).build(),
            Err(ConfigError::InvalidParameter {
                name: "perturbation_magnitude",
                ..
            })
        ));
    }

    #[test]
    fn structprep_builder_defaults_everything_but_displacement() {
        assert_eq!(
            StructprepConfigBuilder::new().build().unwrap_err(),
            ConfigError::MissingParameter("displacement")
        );
        let config = StructprepConfigBuilder::new()
            .displacement(Vector3::new(25.0, 0.0, 0.0))
            .build()
            .unwrap();
        assert_eq!(config.mapping, MappingMethod::Mcs(McsOptions::default()));
        assert_eq!(config.schedule, AlchemicalSchedule::default_rbfe());
        assert!(config.align_ligand_b);
    }

    #[test]
    fn structprep_builder_validates_policies() {
        let policy = RestraintPolicy {
            site_radius: -1.0,
            ..RestraintPolicy::default()
        };
        let err = StructprepConfigBuilder::new()
            .displacement(Vector3::new(25.0, 0.0, 0.0))
            .restraints(policy)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidParameter { name: "restraints", .. }));
    }
}
