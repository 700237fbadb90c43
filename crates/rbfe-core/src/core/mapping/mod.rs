//! # Atom Mapping
//!
//! Correspondence between the atoms of ligand A and ligand B. The mapped pairs
//! form the common core shared by both end states; everything else is part of
//! the softcore region (atoms that disappear with A or appear with B).
//!
//! Mapping algorithms are interchangeable [`MappingStrategy`] implementations.

pub mod explicit;
pub mod mcs;

use crate::core::models::complex::LigandSide;
use crate::core::models::ligand::Ligand;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

pub use explicit::ExplicitMapper;
pub use mcs::{McsMapper, McsOptions};

#[derive(Debug, Error, PartialEq)]
pub enum MappingError {
    #[error("Ligand {side} has no atoms eligible for mapping")]
    EmptyLigand { side: LigandSide },

    #[error("Common core has {found} atom(s), fewer than the required {required}")]
    BelowThreshold { found: usize, required: usize },

    #[error("Mapped atoms of ligand {side} do not form a connected substructure")]
    Disconnected { side: LigandSide },

    #[error("Ligand {side} atom index {index} is out of range")]
    IndexOutOfRange { side: LigandSide, index: usize },

    #[error("Ligand {side} atom {index} is mapped more than once")]
    DuplicatePartner { side: LigandSide, index: usize },

    #[error("Cannot map A:{a} to B:{b}: {reason}")]
    InvalidPair { a: usize, b: usize, reason: String },

    #[error("Unmapped atom sets are inconsistent with the mapped pairs: {0}")]
    Inconsistent(String),
}

/// Capability of proposing an atom mapping for a ligand pair.
pub trait MappingStrategy: Send + Sync {
    fn propose(&self, ligand_a: &Ligand, ligand_b: &Ligand) -> Result<AtomMapping, MappingError>;
}

/// A partial bijection between ligand-local atom indices of A and B.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AtomMapping {
    pairs: Vec<(usize, usize)>,
    disappearing: Vec<usize>,
    appearing: Vec<usize>,
}

impl AtomMapping {
    /// Builds a mapping from pairs; atoms not covered are assigned to the
    /// disappearing (A-only) or appearing (B-only) sets.
    pub fn from_pairs(mut pairs: Vec<(usize, usize)>, len_a: usize, len_b: usize) -> Self {
        pairs.sort_unstable();
        let mapped_a: HashSet<usize> = pairs.iter().map(|p| p.0).collect();
        let mapped_b: HashSet<usize> = pairs.iter().map(|p| p.1).collect();
        Self {
            disappearing: (0..len_a).filter(|i| !mapped_a.contains(i)).collect(),
            appearing: (0..len_b).filter(|i| !mapped_b.contains(i)).collect(),
            pairs,
        }
    }

    pub fn pairs(&self) -> &[(usize, usize)] {
        &self.pairs
    }

    /// Atoms of A with no partner in B.
    pub fn disappearing(&self) -> &[usize] {
        &self.disappearing
    }

    /// Atoms of B with no partner in A.
    pub fn appearing(&self) -> &[usize] {
        &self.appearing
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn partner_of_a(&self, a: usize) -> Option<usize> {
        self.pairs.iter().find(|p| p.0 == a).map(|p| p.1)
    }

    pub fn partner_of_b(&self, b: usize) -> Option<usize> {
        self.pairs.iter().find(|p| p.1 == b).map(|p| p.0)
    }

    pub fn mapped_a(&self) -> Vec<usize> {
        self.pairs.iter().map(|p| p.0).collect()
    }

    pub fn mapped_b(&self) -> Vec<usize> {
        self.pairs.iter().map(|p| p.1).collect()
    }

    /// Checks every structural invariant of the mapping against the two ligands:
    /// indices in range, no atom mapped twice, unmapped sets exactly complementary,
    /// identical elements, bonded-ness preserved between mapped pairs and a
    /// connected core in both ligands.
    pub fn validate(&self, ligand_a: &Ligand, ligand_b: &Ligand) -> Result<(), MappingError> {
        let mut seen_a = HashSet::new();
        let mut seen_b = HashSet::new();
        for &(a, b) in &self.pairs {
            if a >= ligand_a.len() {
                return Err(MappingError::IndexOutOfRange {
                    side: LigandSide::A,
                    index: a,
                });
            }
            if b >= ligand_b.len() {
                return Err(MappingError::IndexOutOfRange {
                    side: LigandSide::B,
                    index: b,
                });
            }
            if !seen_a.insert(a) {
                return Err(MappingError::DuplicatePartner {
                    side: LigandSide::A,
                    index: a,
                });
            }
            if !seen_b.insert(b) {
                return Err(MappingError::DuplicatePartner {
                    side: LigandSide::B,
                    index: b,
                });
            }
            let (ea, eb) = (ligand_a.atoms()[a].element, ligand_b.atoms()[b].element);
            if ea != eb {
                return Err(MappingError::InvalidPair {
                    a,
                    b,
                    reason: format!("element mismatch ({ea} vs {eb})"),
                });
            }
        }

        for (i, &(a1, b1)) in self.pairs.iter().enumerate() {
            for &(a2, b2) in &self.pairs[i + 1..] {
                if ligand_a.are_bonded(a1, a2) != ligand_b.are_bonded(b1, b2) {
                    return Err(MappingError::InvalidPair {
                        a: a2,
                        b: b2,
                        reason: format!(
                            "bond {a1}-{a2} in A does not correspond to bond {b1}-{b2} in B"
                        ),
                    });
                }
            }
        }

        let expected_disappearing: Vec<usize> =
            (0..ligand_a.len()).filter(|i| !seen_a.contains(i)).collect();
        let expected_appearing: Vec<usize> =
            (0..ligand_b.len()).filter(|i| !seen_b.contains(i)).collect();
        if expected_disappearing != self.disappearing {
            return Err(MappingError::Inconsistent(
                "disappearing set does not complement the mapped atoms of A".to_string(),
            ));
        }
        if expected_appearing != self.appearing {
            return Err(MappingError::Inconsistent(
                "appearing set does not complement the mapped atoms of B".to_string(),
            ));
        }

        if !ligand_a.is_connected_subset(&self.mapped_a()) {
            return Err(MappingError::Disconnected {
                side: LigandSide::A,
            });
        }
        if !ligand_b.is_connected_subset(&self.mapped_b()) {
            return Err(MappingError::Disconnected {
                side: LigandSide::B,
            });
        }
        Ok(())
    }
}
