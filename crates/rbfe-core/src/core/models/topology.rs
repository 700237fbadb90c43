use super::element::Element;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum BondOrder {
    #[default]
    Single,
    Double,
    Triple,
    Aromatic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bond {
    pub atom1: usize, // index of the first atom
    pub atom2: usize, // index of the second atom
    #[serde(default)]
    pub order: BondOrder,
}

impl Bond {
    pub fn new(atom1: usize, atom2: usize, order: BondOrder) -> Self {
        Self {
            atom1,
            atom2,
            order,
        }
    }

    pub fn contains(&self, atom: usize) -> bool {
        self.atom1 == atom || self.atom2 == atom
    }

    /// Returns the other end of the bond, or `None` if `atom` is not part of it.
    pub fn partner(&self, atom: usize) -> Option<usize> {
        if self.atom1 == atom {
            Some(self.atom2)
        } else if self.atom2 == atom {
            Some(self.atom1)
        } else {
            None
        }
    }
}

/// One atom of the full simulation system (receptor, ligands, solvent).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyAtom {
    pub name: String,
    pub element: Element,
    #[serde(default)]
    pub residue_name: String,
    #[serde(default)]
    pub residue_number: isize,
    #[serde(default)]
    pub chain: Option<char>,
    pub position: Point3<f64>,
}

impl TopologyAtom {
    pub fn new(name: &str, element: Element, position: Point3<f64>) -> Self {
        Self {
            name: name.to_string(),
            element,
            residue_name: String::new(),
            residue_number: 0,
            chain: None,
            position,
        }
    }
}

/// Flat, index-addressed topology of the whole system.
///
/// Atom indices are the positions in `atoms` and are the same indices the
/// simulation engine uses; every other structure in the crate refers to atoms
/// by these indices.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    pub atoms: Vec<TopologyAtom>,
    #[serde(default)]
    pub bonds: Vec<Bond>,
}

impl Topology {
    pub fn new(atoms: Vec<TopologyAtom>, bonds: Vec<Bond>) -> Self {
        Self { atoms, bonds }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    #[inline]
    pub fn contains(&self, index: usize) -> bool {
        index < self.atoms.len()
    }

    pub fn atom(&self, index: usize) -> Option<&TopologyAtom> {
        self.atoms.get(index)
    }

    pub fn positions(&self) -> Vec<Point3<f64>> {
        self.atoms.iter().map(|a| a.position).collect()
    }

    /// Returns the first bond whose endpoints do not resolve, if any.
    pub fn find_dangling_bond(&self) -> Option<&Bond> {
        self.bonds
            .iter()
            .find(|b| !self.contains(b.atom1) || !self.contains(b.atom2))
    }
}
