use super::ligand::{Ligand, LigandAtom, LigandError};
use super::topology::{Bond, Topology};
use crate::core::utils::identifiers::is_solvent_residue;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use thiserror::Error;

/// Which of the two alchemical ligands is meant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LigandSide {
    /// The ligand bound at the start of the transformation (pure-A end state).
    A,
    /// The ligand bound at the end of the transformation (pure-B end state).
    B,
}

impl fmt::Display for LigandSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LigandSide::A => write!(f, "A"),
            LigandSide::B => write!(f, "B"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ComplexError {
    #[error("Ligand {side} selection is empty")]
    EmptySelection { side: LigandSide },
    #[error("Ligand {side} references atom {index}, but the topology has {len} atoms")]
    IndexOutOfRange {
        side: LigandSide,
        index: usize,
        len: usize,
    },
    #[error("Atom {index} is listed more than once in the ligand selections")]
    DuplicateIndex { index: usize },
    #[error(transparent)]
    Ligand(#[from] LigandError),
}

/// A receptor-ligand-ligand system as delivered by the structure loader.
///
/// `ligand_a` and `ligand_b` hold global atom indices into `topology`; all
/// remaining non-solvent atoms form the receptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Complex {
    pub topology: Topology,
    pub ligand_a: Vec<usize>,
    pub ligand_b: Vec<usize>,
}

impl Complex {
    pub fn new(topology: Topology, ligand_a: Vec<usize>, ligand_b: Vec<usize>) -> Self {
        Self {
            topology,
            ligand_a,
            ligand_b,
        }
    }

    pub fn selection(&self, side: LigandSide) -> &[usize] {
        match side {
            LigandSide::A => &self.ligand_a,
            LigandSide::B => &self.ligand_b,
        }
    }

    /// Checks that both ligand selections are non-empty, in range and disjoint.
    pub fn validate(&self) -> Result<(), ComplexError> {
        let mut seen = HashSet::new();
        for side in [LigandSide::A, LigandSide::B] {
            let selection = self.selection(side);
            if selection.is_empty() {
                return Err(ComplexError::EmptySelection { side });
            }
            for &index in selection {
                if !self.topology.contains(index) {
                    return Err(ComplexError::IndexOutOfRange {
                        side,
                        index,
                        len: self.topology.len(),
                    });
                }
                if !seen.insert(index) {
                    return Err(ComplexError::DuplicateIndex { index });
                }
            }
        }
        Ok(())
    }

    /// Extracts one ligand as a standalone molecular graph with local indices.
    pub fn ligand(&self, side: LigandSide) -> Result<Ligand, ComplexError> {
        self.validate()?;
        let selection = self.selection(side);
        let local: HashMap<usize, usize> = selection
            .iter()
            .enumerate()
            .map(|(local, &global)| (global, local))
            .collect();

        let atoms = selection
            .iter()
            .map(|&global| {
                let atom = &self.topology.atoms[global];
                LigandAtom::new(&atom.name, atom.element, atom.position, global)
            })
            .collect();

        let bonds = self
            .topology
            .bonds
            .iter()
            .filter_map(|bond| {
                let a = local.get(&bond.atom1)?;
                let b = local.get(&bond.atom2)?;
                Some(Bond::new(*a, *b, bond.order))
            })
            .collect();

        let name = self.topology.atoms[selection[0]].residue_name.clone();
        let name = if name.is_empty() {
            format!("LIG{side}")
        } else {
            name
        };
        Ok(Ligand::new(&name, atoms, bonds)?)
    }

    /// Global indices of receptor atoms: everything that is neither ligand nor solvent.
    pub fn receptor_indices(&self) -> Vec<usize> {
        let ligand: HashSet<usize> = self
            .ligand_a
            .iter()
            .chain(self.ligand_b.iter())
            .copied()
            .collect();
        (0..self.topology.len())
            .filter(|i| !ligand.contains(i))
            .filter(|&i| !is_solvent_residue(&self.topology.atoms[i].residue_name))
            .collect()
    }

    pub fn is_ligand_atom(&self, index: usize) -> bool {
        self.ligand_a.contains(&index) || self.ligand_b.contains(&index)
    }
}

#[cfg(test)]
pub(crate) mod test_complexes {
    use super::*;
    use crate::core::models::element::Element;
    use crate::core::models::ligand::test_molecules;
    use crate::core::models::topology::{BondOrder, TopologyAtom};
    use nalgebra::{Point3, Vector3};

    /// A ring of receptor Cα atoms around the origin, the two ligands of the
    /// H→CH3 test pair (A at the origin, B displaced), and one water.
    pub fn methyl_pair_complex() -> Complex {
        let mut atoms = Vec::new();
        let mut bonds = Vec::new();

        for k in 0..8 {
            let theta = std::f64::consts::TAU * k as f64 / 8.0;
            let z = if k % 2 == 0 { 1.5 } else { -1.5 };
            let mut ca = TopologyAtom::new(
                "CA",
                Element::C,
                Point3::new(6.0 * theta.cos(), 6.0 * theta.sin(), z),
            );
            ca.residue_name = "ALA".to_string();
            ca.residue_number = k as isize + 1;
            ca.chain = Some('A');
            let mut cb = ca.clone();
            cb.name = "CB".to_string();
            cb.position = Point3::new(7.2 * theta.cos(), 7.2 * theta.sin(), z);
            atoms.push(ca);
            atoms.push(cb);
            bonds.push(Bond::new(2 * k, 2 * k + 1, BondOrder::Single));
        }

        let displacement = Vector3::new(20.0, 0.0, 0.0);
        let mut push_ligand = |ligand: Ligand, residue: &str, shift: Vector3<f64>| -> Vec<usize> {
            let offset = atoms.len();
            for atom in ligand.atoms() {
                let mut t = TopologyAtom::new(&atom.name, atom.element, atom.position + shift);
                t.residue_name = residue.to_string();
                t.chain = Some('L');
                atoms.push(t);
            }
            for bond in ligand.bonds() {
                bonds.push(Bond::new(bond.atom1 + offset, bond.atom2 + offset, bond.order));
            }
            (offset..offset + ligand.len()).collect()
        };
        let ligand_a = push_ligand(test_molecules::phenyl_h(), "PHH", Vector3::zeros());
        let ligand_b = push_ligand(test_molecules::phenyl_methyl(), "PHM", displacement);

        let mut water = TopologyAtom::new("O", Element::O, Point3::new(30.0, 30.0, 30.0));
        water.residue_name = "HOH".to_string();
        atoms.push(water);

        Complex::new(Topology::new(atoms, bonds), ligand_a, ligand_b)
    }
}
