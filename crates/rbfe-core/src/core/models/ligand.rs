use super::element::Element;
use super::topology::Bond;
use nalgebra::Point3;
use std::collections::{HashSet, VecDeque};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LigandError {
    #[error("Ligand '{ligand}' has no atoms")]
    Empty { ligand: String },
    #[error("Bond ({atom1}, {atom2}) in ligand '{ligand}' references a missing atom")]
    DanglingBond {
        ligand: String,
        atom1: usize,
        atom2: usize,
    },
    #[error("Atom {atom} in ligand '{ligand}' is bonded to itself")]
    SelfBond { ligand: String, atom: usize },
}

/// An atom of a ligand, addressed locally by its position in [`Ligand::atoms`].
#[derive(Debug, Clone, PartialEq)]
pub struct LigandAtom {
    pub name: String,
    pub element: Element,
    pub position: Point3<f64>,
    /// Index of this atom in the full system topology.
    pub global_index: usize,
}

impl LigandAtom {
    pub fn new(name: &str, element: Element, position: Point3<f64>, global_index: usize) -> Self {
        Self {
            name: name.to_string(),
            element,
            position,
            global_index,
        }
    }
}

/// An immutable molecular graph with coordinates.
///
/// Bonds use local indices. Adjacency and ring membership are computed once at
/// construction; a bond is a ring bond when its endpoints stay connected after
/// the bond is removed.
#[derive(Debug, Clone)]
pub struct Ligand {
    name: String,
    atoms: Vec<LigandAtom>,
    bonds: Vec<Bond>,
    adjacency: Vec<Vec<usize>>,
    ring_bonds: HashSet<(usize, usize)>,
}

impl Ligand {
    pub fn new(name: &str, atoms: Vec<LigandAtom>, bonds: Vec<Bond>) -> Result<Self, LigandError> {
        if atoms.is_empty() {
            return Err(LigandError::Empty {
                ligand: name.to_string(),
            });
        }

        let mut adjacency = vec![Vec::new(); atoms.len()];
        for bond in &bonds {
            if bond.atom1 >= atoms.len() || bond.atom2 >= atoms.len() {
                return Err(LigandError::DanglingBond {
                    ligand: name.to_string(),
                    atom1: bond.atom1,
                    atom2: bond.atom2,
                });
            }
            if bond.atom1 == bond.atom2 {
                return Err(LigandError::SelfBond {
                    ligand: name.to_string(),
                    atom: bond.atom1,
                });
            }
            if !adjacency[bond.atom1].contains(&bond.atom2) {
                adjacency[bond.atom1].push(bond.atom2);
                adjacency[bond.atom2].push(bond.atom1);
            }
        }
        for neighbors in &mut adjacency {
            neighbors.sort_unstable();
        }

        let mut ligand = Self {
            name: name.to_string(),
            atoms,
            bonds,
            adjacency,
            ring_bonds: HashSet::new(),
        };
        ligand.ring_bonds = ligand.detect_ring_bonds();
        Ok(ligand)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn atoms(&self) -> &[LigandAtom] {
        &self.atoms
    }

    pub fn atom(&self, index: usize) -> Option<&LigandAtom> {
        self.atoms.get(index)
    }

    pub fn bonds(&self) -> &[Bond] {
        &self.bonds
    }

    pub fn neighbors(&self, index: usize) -> &[usize] {
        self.adjacency.get(index).map_or(&[], |v| v.as_slice())
    }

    pub fn are_bonded(&self, a: usize, b: usize) -> bool {
        self.neighbors(a).binary_search(&b).is_ok()
    }

    pub fn degree(&self, index: usize) -> usize {
        self.neighbors(index).len()
    }

    /// Number of heavy-atom neighbors.
    pub fn heavy_degree(&self, index: usize) -> usize {
        self.neighbors(index)
            .iter()
            .filter(|&&n| self.atoms[n].element.is_heavy())
            .count()
    }

    /// A heavy atom hanging off the molecule by a single heavy-atom bond, or a hydrogen.
    pub fn is_terminal(&self, index: usize) -> bool {
        match self.atoms.get(index) {
            Some(atom) if atom.element.is_heavy() => self.heavy_degree(index) <= 1,
            Some(_) => true,
            None => false,
        }
    }

    pub fn is_ring_bond(&self, a: usize, b: usize) -> bool {
        self.ring_bonds.contains(&ordered(a, b))
    }

    pub fn in_ring(&self, index: usize) -> bool {
        self.neighbors(index)
            .iter()
            .any(|&n| self.is_ring_bond(index, n))
    }

    pub fn ring_bond_count(&self) -> usize {
        self.ring_bonds.len()
    }

    pub fn heavy_atom_indices(&self) -> Vec<usize> {
        (0..self.atoms.len())
            .filter(|&i| self.atoms[i].element.is_heavy())
            .collect()
    }

    pub fn positions(&self) -> Vec<Point3<f64>> {
        self.atoms.iter().map(|a| a.position).collect()
    }

    /// Geometric centroid of the selected atoms, or `None` for an empty selection.
    pub fn centroid_of(&self, indices: &[usize]) -> Option<Point3<f64>> {
        let points: Vec<Point3<f64>> = indices
            .iter()
            .filter_map(|&i| self.atoms.get(i).map(|a| a.position))
            .collect();
        crate::core::utils::geometry::centroid(&points)
    }

    /// Centroid of all heavy atoms, falling back to all atoms for hydrogen-only fragments.
    pub fn heavy_centroid(&self) -> Point3<f64> {
        let heavy = self.heavy_atom_indices();
        self.centroid_of(&heavy)
            .or_else(|| {
                let all: Vec<usize> = (0..self.atoms.len()).collect();
                self.centroid_of(&all)
            })
            .unwrap_or_else(Point3::origin)
    }

    /// Whether the selected atoms induce a connected subgraph. Empty selections are connected.
    pub fn is_connected_subset(&self, indices: &[usize]) -> bool {
        let selected: HashSet<usize> = indices.iter().copied().collect();
        let Some(&start) = indices.first() else {
            return true;
        };
        let mut seen = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);
        while let Some(current) = queue.pop_front() {
            for &n in self.neighbors(current) {
                if selected.contains(&n) && seen.insert(n) {
                    queue.push_back(n);
                }
            }
        }
        seen.len() == selected.len()
    }

    fn detect_ring_bonds(&self) -> HashSet<(usize, usize)> {
        let mut rings = HashSet::new();
        for bond in &self.bonds {
            if self.connected_without(bond.atom1, bond.atom2) {
                rings.insert(ordered(bond.atom1, bond.atom2));
            }
        }
        rings
    }

    fn connected_without(&self, a: usize, b: usize) -> bool {
        let mut seen = vec![false; self.atoms.len()];
        let mut queue = VecDeque::from([a]);
        seen[a] = true;
        while let Some(current) = queue.pop_front() {
            for &n in &self.adjacency[current] {
                if (current == a && n == b) || (current == b && n == a) {
                    continue;
                }
                if n == b {
                    return true;
                }
                if !seen[n] {
                    seen[n] = true;
                    queue.push_back(n);
                }
            }
        }
        false
    }
}

#[inline]
fn ordered(a: usize, b: usize) -> (usize, usize) {
    if a <= b { (a, b) } else { (b, a) }
}

#[cfg(test)]
pub(crate) mod test_molecules {
    use super::*;
    use crate::core::models::topology::BondOrder;

    fn build(name: &str, spec: &[(&str, Element, [f64; 3])], bonds: &[(usize, usize)]) -> Ligand {
        let atoms = spec
            .iter()
            .enumerate()
            .map(|(i, (n, e, p))| LigandAtom::new(n, *e, Point3::new(p[0], p[1], p[2]), 100 + i))
            .collect();
        let bonds = bonds
            .iter()
            .map(|&(a, b)| Bond::new(a, b, BondOrder::Single))
            .collect();
        Ligand::new(name, atoms, bonds).unwrap()
    }

    /// Benzene ring with a single hydrogen substituent on C1 (other ring hydrogens omitted).
    pub fn phenyl_h() -> Ligand {
        let mut spec: Vec<(&str, Element, [f64; 3])> = ring_atoms();
        spec.push(("H1", Element::H, [2.48, 0.0, 0.0]));
        let mut bonds = ring_bonds();
        bonds.push((0, 6));
        build("PHH", &spec, &bonds)
    }

    /// Same ring with the hydrogen on C1 replaced by a methyl group.
    pub fn phenyl_methyl() -> Ligand {
        let mut spec: Vec<(&str, Element, [f64; 3])> = ring_atoms();
        spec.push(("C7", Element::C, [2.90, 0.0, 0.0]));
        spec.push(("H71", Element::H, [3.26, 1.03, 0.0]));
        spec.push(("H72", Element::H, [3.26, -0.51, 0.89]));
        spec.push(("H73", Element::H, [3.26, -0.51, -0.89]));
        let mut bonds = ring_bonds();
        bonds.extend([(0, 6), (6, 7), (6, 8), (6, 9)]);
        build("PHM", &spec, &bonds)
    }

    /// Ethanol: C1-C2-O3.
    pub fn ethanol() -> Ligand {
        build(
            "EOH",
            &[
                ("C1", Element::C, [0.0, 0.0, 0.0]),
                ("C2", Element::C, [1.52, 0.0, 0.0]),
                ("O3", Element::O, [2.0, 1.35, 0.0]),
            ],
            &[(0, 1), (1, 2)],
        )
    }

    pub fn chloride() -> Ligand {
        build("CL", &[("CL", Element::Cl, [0.0, 0.0, 0.0])], &[])
    }

    fn ring_atoms() -> Vec<(&'static str, Element, [f64; 3])> {
        let r = 1.39;
        (0..6)
            .map(|k| {
                let theta = std::f64::consts::PI / 3.0 * k as f64;
                let name: &'static str = ["C1", "C2", "C3", "C4", "C5", "C6"][k];
                (name, Element::C, [r * theta.cos(), r * theta.sin(), 0.0])
            })
            .collect()
    }

    fn ring_bonds() -> Vec<(usize, usize)> {
        vec![(0, 1), (1, 2), (2, 3), (3, 4), (4, 5), (5, 0)]
    }
}
