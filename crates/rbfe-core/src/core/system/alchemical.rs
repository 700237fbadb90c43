use super::SystemBuildError;
use crate::core::atm::{AlchemicalSchedule, SoftcoreParams};
use crate::core::mapping::AtomMapping;
use crate::core::models::complex::{Complex, LigandSide};
use crate::core::restraints::{Restraint, RestraintSet};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SystemFileError {
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to serialize alchemical system: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Failed to parse alchemical system: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Alchemical system file is inconsistent: {0}")]
    Invalid(#[from] SystemBuildError),
}

/// Global indices of the atoms whose interactions are switched on or off
/// along the alchemical path.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SoftcoreRegion {
    /// Ligand A atoms without a partner in B.
    pub disappearing: Vec<usize>,
    /// Ligand B atoms without a partner in A.
    pub appearing: Vec<usize>,
}

impl SoftcoreRegion {
    pub fn from_mapping(complex: &Complex, mapping: &AtomMapping) -> Self {
        Self {
            disappearing: mapping
                .disappearing()
                .iter()
                .map(|&i| complex.ligand_a[i])
                .collect(),
            appearing: mapping
                .appearing()
                .iter()
                .map(|&i| complex.ligand_b[i])
                .collect(),
        }
    }
}

/// Fully prepared dual-topology system. Constructed only through
/// [`AlchemicalSystemBuilder`](super::AlchemicalSystemBuilder) or loaded from a
/// file, both of which validate it; read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlchemicalSystem {
    displacement: Vector3<f64>,
    softcore: SoftcoreParams,
    mapping: AtomMapping,
    softcore_region: SoftcoreRegion,
    restraints: RestraintSet,
    schedule: AlchemicalSchedule,
    complex: Complex,
}

impl AlchemicalSystem {
    pub(super) fn from_parts(
        complex: Complex,
        mapping: AtomMapping,
        restraints: RestraintSet,
        softcore: SoftcoreParams,
        schedule: AlchemicalSchedule,
        displacement: Vector3<f64>,
    ) -> Self {
        let softcore_region = SoftcoreRegion::from_mapping(&complex, &mapping);
        Self {
            displacement,
            softcore,
            mapping,
            softcore_region,
            restraints,
            schedule,
            complex,
        }
    }

    pub fn complex(&self) -> &Complex {
        &self.complex
    }

    pub fn mapping(&self) -> &AtomMapping {
        &self.mapping
    }

    pub fn softcore_region(&self) -> &SoftcoreRegion {
        &self.softcore_region
    }

    pub fn restraints(&self) -> &RestraintSet {
        &self.restraints
    }

    pub fn softcore(&self) -> &SoftcoreParams {
        &self.softcore
    }

    pub fn schedule(&self) -> &AlchemicalSchedule {
        &self.schedule
    }

    pub fn displacement(&self) -> Vector3<f64> {
        self.displacement
    }

    /// Checks every cross-component invariant of the system.
    pub fn validate(&self) -> Result<(), SystemBuildError> {
        self.complex.validate()?;
        let ligand_a = self.complex.ligand(LigandSide::A)?;
        let ligand_b = self.complex.ligand(LigandSide::B)?;
        self.mapping.validate(&ligand_a, &ligand_b)?;
        self.schedule.validate()?;
        self.softcore
            .validate()
            .map_err(SystemBuildError::InvalidSoftcore)?;

        let d = self.displacement;
        if !d.iter().all(|c| c.is_finite()) || d.norm() < f64::EPSILON {
            return Err(SystemBuildError::InvalidDisplacement);
        }

        if SoftcoreRegion::from_mapping(&self.complex, &self.mapping) != self.softcore_region {
            return Err(SystemBuildError::InconsistentSoftcoreRegion);
        }

        self.validate_restraints()
    }

    fn validate_restraints(&self) -> Result<(), SystemBuildError> {
        let len = self.complex.topology.len();
        let core_a: HashSet<usize> = self
            .mapping
            .mapped_a()
            .into_iter()
            .map(|i| self.complex.ligand_a[i])
            .collect();
        let core_b: HashSet<usize> = self
            .mapping
            .mapped_b()
            .into_iter()
            .map(|i| self.complex.ligand_b[i])
            .collect();

        for (position, restraint) in self.restraints.iter().enumerate() {
            if !restraint.is_well_formed() {
                return Err(SystemBuildError::MalformedRestraint { position });
            }
            if let Some(&index) = restraint.atoms().iter().find(|&&i| i >= len) {
                return Err(SystemBuildError::RestraintAtomOutOfRange { index, len });
            }
            if let Some(&index) = restraint
                .receptor_atoms()
                .iter()
                .find(|&&i| self.complex.is_ligand_atom(i))
            {
                return Err(SystemBuildError::AnchorIsLigandAtom { index });
            }
            if let Restraint::Alignment {
                reference_a,
                reference_b,
                ..
            } = restraint
            {
                if let Some(&index) = reference_a.iter().find(|&&i| !core_a.contains(&i)) {
                    return Err(SystemBuildError::ReferenceOutsideCore {
                        side: LigandSide::A,
                        index,
                    });
                }
                if let Some(&index) = reference_b.iter().find(|&&i| !core_b.contains(&i)) {
                    return Err(SystemBuildError::ReferenceOutsideCore {
                        side: LigandSide::B,
                        index,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn to_toml_string(&self) -> Result<String, SystemFileError> {
        Ok(toml::to_string(self)?)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, SystemFileError> {
        let system: Self = toml::from_str(text)?;
        system.validate()?;
        Ok(system)
    }

    pub fn save(&self, path: &Path) -> Result<(), SystemFileError> {
        let text = self.to_toml_string()?;
        std::fs::write(path, text).map_err(|source| SystemFileError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, SystemFileError> {
        let text = std::fs::read_to_string(path).map_err(|source| SystemFileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }
}
