//! # Restraints
//!
//! Soft (finite force constant) restraints that keep both ligands in a
//! well-defined region during the alchemical transfer: a flat-bottom centroid
//! restraint per ligand, an alignment restraint between their reference
//! frames, and optional positional restraints on receptor anchor atoms.

pub mod site;

use crate::core::mapping::AtomMapping;
use crate::core::models::complex::{Complex, ComplexError, LigandSide};
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use thiserror::Error;

pub use site::{RestraintPolicy, SiteRestraintBuilder};

#[derive(Debug, Error, PartialEq)]
pub enum RestraintError {
    #[error("Found {found} receptor anchor atom(s) near the binding site, at least {required} required")]
    NoAnchors { found: usize, required: usize },
    #[error("Only {found} mapped non-terminal heavy atom(s) available; three are needed for a reference frame")]
    InsufficientReferenceAtoms { found: usize },
    #[error("Invalid restraint policy: {0}")]
    InvalidPolicy(String),
    #[error(transparent)]
    Complex(#[from] ComplexError),
}

/// Capability of choosing restraints for a prepared ligand pair.
pub trait RestraintStrategy: Send + Sync {
    fn select(&self, complex: &Complex, mapping: &AtomMapping) -> Result<RestraintSet, RestraintError>;
}

/// A single restraint. All atom indices are global topology indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Restraint {
    /// Flat-bottom harmonic restraint on the distance between the ligand
    /// centroid and the receptor site centroid shifted by `offset`.
    CentroidDistance {
        ligand: LigandSide,
        ligand_atoms: Vec<usize>,
        receptor_atoms: Vec<usize>,
        offset: Vector3<f64>,
        force_constant: f64,
        tolerance: f64,
    },
    /// Keeps the frame of ligand B (atoms `reference_b`) aligned with the
    /// frame of ligand A (`reference_a`) shifted by `offset`: a distance term
    /// on the first atoms and two angular terms on the frame axes.
    Alignment {
        reference_a: [usize; 3],
        reference_b: [usize; 3],
        offset: Vector3<f64>,
        k_distance: f64,
        k_theta: f64,
        k_psi: f64,
    },
    /// Flat-bottom harmonic restraint of each atom to its reference position.
    Positional {
        atoms: Vec<usize>,
        reference_positions: Vec<Point3<f64>>,
        force_constant: f64,
        tolerance: f64,
    },
}

impl Restraint {
    /// Every global atom index the restraint references.
    pub fn atoms(&self) -> Vec<usize> {
        match self {
            Restraint::CentroidDistance {
                ligand_atoms,
                receptor_atoms,
                ..
            } => ligand_atoms.iter().chain(receptor_atoms).copied().collect(),
            Restraint::Alignment {
                reference_a,
                reference_b,
                ..
            } => reference_a.iter().chain(reference_b).copied().collect(),
            Restraint::Positional { atoms, .. } => atoms.clone(),
        }
    }

    /// Receptor-side atoms, which must never belong to a ligand.
    pub fn receptor_atoms(&self) -> &[usize] {
        match self {
            Restraint::CentroidDistance { receptor_atoms, .. } => receptor_atoms,
            Restraint::Positional { atoms, .. } => atoms,
            Restraint::Alignment { .. } => &[],
        }
    }

    fn constants(&self) -> Vec<f64> {
        match self {
            Restraint::CentroidDistance {
                force_constant,
                tolerance,
                ..
            }
            | Restraint::Positional {
                force_constant,
                tolerance,
                ..
            } => vec![*force_constant, *tolerance],
            Restraint::Alignment {
                k_distance,
                k_theta,
                k_psi,
                ..
            } => vec![*k_distance, *k_theta, *k_psi],
        }
    }

    /// Finite, non-negative constants and a consistent positional reference.
    pub fn is_well_formed(&self) -> bool {
        let constants_ok = self.constants().iter().all(|c| c.is_finite() && *c >= 0.0);
        let shape_ok = match self {
            Restraint::CentroidDistance {
                ligand_atoms,
                receptor_atoms,
                ..
            } => !ligand_atoms.is_empty() && !receptor_atoms.is_empty(),
            Restraint::Positional {
                atoms,
                reference_positions,
                ..
            } => atoms.len() == reference_positions.len(),
            Restraint::Alignment { .. } => true,
        };
        constants_ok && shape_ok
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RestraintSet {
    #[serde(default)]
    restraints: Vec<Restraint>,
}

impl RestraintSet {
    pub fn new(restraints: Vec<Restraint>) -> Self {
        Self { restraints }
    }

    pub fn restraints(&self) -> &[Restraint] {
        &self.restraints
    }

    pub fn iter(&self) -> impl Iterator<Item = &Restraint> {
        self.restraints.iter()
    }

    pub fn len(&self) -> usize {
        self.restraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.restraints.is_empty()
    }

    /// Sorted, deduplicated global indices of every restrained atom.
    pub fn atoms(&self) -> Vec<usize> {
        let mut atoms: Vec<usize> = self.restraints.iter().flat_map(|r| r.atoms()).collect();
        atoms.sort_unstable();
        atoms.dedup();
        atoms
    }

    pub fn centroid_restraint(&self, side: LigandSide) -> Option<&Restraint> {
        self.restraints.iter().find(|r| {
            matches!(r, Restraint::CentroidDistance { ligand, .. } if *ligand == side)
        })
    }

    /// Free-energy correction (kcal/mol) for the difference between the
    /// configurational volumes accessible to ligand B and ligand A under their
    /// centroid restraints, to be added to ΔΔG(B − A). Zero when both
    /// restraints share force constant and tolerance.
    pub fn reference_correction(&self, temperature: f64) -> f64 {
        let kt = crate::core::atm::BOLTZMANN_KCAL * temperature;
        let volume = |side| match self.centroid_restraint(side) {
            Some(Restraint::CentroidDistance {
                force_constant,
                tolerance,
                ..
            }) => Some(flat_bottom_volume(*force_constant, *tolerance, kt)),
            _ => None,
        };
        match (volume(LigandSide::A), volume(LigandSide::B)) {
            (Some(va), Some(vb)) => -kt * (vb / va).ln(),
            _ => 0.0,
        }
    }
}

/// Volume (Å³) accessible to a point under a flat-bottom harmonic well
/// `½k(r − r0)²` for `r > r0`, at thermal energy `kt`.
pub fn flat_bottom_volume(force_constant: f64, tolerance: f64, kt: f64) -> f64 {
    let r0 = tolerance;
    let inner = 4.0 / 3.0 * PI * r0.powi(3);
    if force_constant <= 0.0 {
        return f64::INFINITY;
    }
    let a = force_constant / (2.0 * kt);
    let shell = r0 * r0 * 0.5 * (PI / a).sqrt() + r0 / a + 0.25 * (PI / a.powi(3)).sqrt();
    inner + 4.0 * PI * shell
}

#[cfg(test)]
mod tests {
    use super::*;

    fn centroid(side: LigandSide, k: f64, tol: f64) -> Restraint {
        Restraint::CentroidDistance {
            ligand: side,
            ligand_atoms: vec![10, 11],
            receptor_atoms: vec![1, 2, 3],
            offset: Vector3::zeros(),
            force_constant: k,
            tolerance: tol,
        }
    }

    #[test]
    fn atoms_are_collected_across_restraints() {
        let set = RestraintSet::new(vec![
            centroid(LigandSide::A, 25.0, 4.5),
            Restraint::Alignment {
                reference_a: [10, 11, 12],
                reference_b: [20, 21, 22],
                offset: Vector3::new(20.0, 0.0, 0.0),
                k_distance: 2.5,
                k_theta: 10.0,
                k_psi: 10.0,
            },
        ]);
        assert_eq!(set.atoms(), vec![1, 2, 3, 10, 11, 12, 20, 21, 22]);
        assert!(set.iter().all(Restraint::is_well_formed));
    }

    #[test]
    fn symmetric_centroid_restraints_have_no_correction() {
        let set = RestraintSet::new(vec![
            centroid(LigandSide::A, 25.0, 4.5),
            centroid(LigandSide::B, 25.0, 4.5),
        ]);
        assert_eq!(set.reference_correction(300.0), 0.0);
    }

    #[test]
    fn looser_restraint_on_b_lowers_the_correction() {
        let set = RestraintSet::new(vec![
            centroid(LigandSide::A, 25.0, 4.5),
            centroid(LigandSide::B, 25.0, 6.0),
        ]);
        assert!(set.reference_correction(300.0) < 0.0);
    }

    #[test]
    fn flat_bottom_volume_approaches_sphere_for_stiff_wells() {
        let kt = crate::core::atm::BOLTZMANN_KCAL * 300.0;
        let sphere = 4.0 / 3.0 * PI * 4.5_f64.powi(3);
        let stiff = flat_bottom_volume(1.0e9, 4.5, kt);
        assert!((stiff - sphere).abs() / sphere < 1e-3);
        assert!(flat_bottom_volume(1.0, 4.5, kt) > flat_bottom_volume(25.0, 4.5, kt));
    }

    #[test]
    fn negative_constants_are_not_well_formed() {
        assert!(!centroid(LigandSide::A, -1.0, 4.5).is_well_formed());
        let positional = Restraint::Positional {
            atoms: vec![1, 2],
            reference_positions: vec![Point3::origin()],
            force_constant: 25.0,
            tolerance: 1.5,
        };
        assert!(!positional.is_well_formed());
    }

    #[test]
    fn restraint_set_serializes_to_toml() {
        let set = RestraintSet::new(vec![centroid(LigandSide::B, 25.0, 4.5)]);
        let text = toml::to_string(&set).unwrap();
        assert!(text.contains("kind = \"centroid-distance\""));
        let parsed: RestraintSet = toml::from_str(&text).unwrap();
        assert_eq!(parsed, set);
    }
}
