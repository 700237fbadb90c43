use super::{AtomMapping, MappingError, MappingStrategy};
use crate::core::models::complex::LigandSide;
use crate::core::models::ligand::Ligand;
use crate::core::utils::geometry::superposed_rmsd;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// RMSD improvements smaller than this do not displace an earlier candidate.
const RMSD_TIE_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct McsOptions {
    /// Ring atoms may only pair with ring atoms (and chain with chain).
    pub ring_matches_ring_only: bool,
    /// Ignore hydrogens entirely; they always end up in the softcore region.
    pub heavy_atoms_only: bool,
    /// Largest allowed difference in bonded degree between paired atoms.
    pub max_degree_difference: usize,
    pub min_mapped_atoms: usize,
    /// Search tree nodes visited before returning the best mapping found so far.
    pub max_search_nodes: usize,
}

impl Default for McsOptions {
    fn default() -> Self {
        Self {
            ring_matches_ring_only: true,
            heavy_atoms_only: false,
            max_degree_difference: 1,
            min_mapped_atoms: 1,
            max_search_nodes: 500_000,
        }
    }
}

/// Maximum common substructure mapper.
///
/// Grows connected, induced common subgraphs from every compatible seed pair by
/// branch-and-bound. Among mappings of maximal size, the one cutting the fewest
/// ring bonds wins, then the one with the lowest superposed RMSD between the
/// mapped coordinates.
#[derive(Debug, Clone, Default)]
pub struct McsMapper {
    options: McsOptions,
}

impl McsMapper {
    pub fn new(options: McsOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &McsOptions {
        &self.options
    }
}

impl MappingStrategy for McsMapper {
    fn propose(&self, ligand_a: &Ligand, ligand_b: &Ligand) -> Result<AtomMapping, MappingError> {
        let mut search = Search::new(ligand_a, ligand_b, &self.options);
        if search.order.is_empty() {
            return Err(MappingError::EmptyLigand {
                side: LigandSide::A,
            });
        }
        if search.considered_b.iter().all(|&c| !c) {
            return Err(MappingError::EmptyLigand {
                side: LigandSide::B,
            });
        }

        search.run();

        if search.exhausted {
            warn!(
                nodes = search.nodes,
                "MCS search budget exhausted; returning best mapping found so far"
            );
        }

        let best = search.best.take();
        let found = best.as_ref().map_or(0, |c| c.pairs.len());
        let required = self.options.min_mapped_atoms.max(1);
        let Some(candidate) = best.filter(|c| c.pairs.len() >= required) else {
            return Err(MappingError::BelowThreshold { found, required });
        };

        debug!(
            mapped = candidate.pairs.len(),
            cut_ring_bonds = candidate.score.cut_ring_bonds,
            rmsd = candidate.score.rmsd,
            nodes = search.nodes,
            "MCS search finished"
        );

        let mapping = AtomMapping::from_pairs(candidate.pairs, ligand_a.len(), ligand_b.len());
        mapping.validate(ligand_a, ligand_b)?;
        Ok(mapping)
    }
}

#[derive(Debug, Clone, Copy)]
struct Score {
    size: usize,
    cut_ring_bonds: usize,
    rmsd: f64,
}

impl Score {
    fn beats(&self, other: &Score) -> bool {
        if self.size != other.size {
            return self.size > other.size;
        }
        if self.cut_ring_bonds != other.cut_ring_bonds {
            return self.cut_ring_bonds < other.cut_ring_bonds;
        }
        self.rmsd < other.rmsd - RMSD_TIE_TOLERANCE
    }
}

struct Candidate {
    pairs: Vec<(usize, usize)>,
    score: Score,
}

struct Search<'a> {
    a: &'a Ligand,
    b: &'a Ligand,
    budget: usize,
    /// Considered atoms of A, heavy atoms first; defines seed and frontier priority.
    order: Vec<usize>,
    considered_b: Vec<bool>,
    compatible: Vec<Vec<bool>>,
    a_to_b: Vec<Option<usize>>,
    b_to_a: Vec<Option<usize>>,
    excluded: Vec<bool>,
    size: usize,
    nodes: usize,
    exhausted: bool,
    best: Option<Candidate>,
}

impl<'a> Search<'a> {
    fn new(a: &'a Ligand, b: &'a Ligand, options: &McsOptions) -> Self {
        let considered = |ligand: &Ligand, i: usize| {
            !options.heavy_atoms_only || ligand.atoms()[i].element.is_heavy()
        };
        let degree = |ligand: &Ligand, i: usize| {
            if options.heavy_atoms_only {
                ligand.heavy_degree(i)
            } else {
                ligand.degree(i)
            }
        };

        let mut order: Vec<usize> = (0..a.len()).filter(|&i| considered(a, i)).collect();
        order.sort_by_key(|&i| !a.atoms()[i].element.is_heavy());
        let considered_b: Vec<bool> = (0..b.len()).map(|j| considered(b, j)).collect();

        let compatible = (0..a.len())
            .map(|i| {
                (0..b.len())
                    .map(|j| {
                        considered(a, i)
                            && considered_b[j]
                            && a.atoms()[i].element == b.atoms()[j].element
                            && (!options.ring_matches_ring_only || a.in_ring(i) == b.in_ring(j))
                            && degree(a, i).abs_diff(degree(b, j)) <= options.max_degree_difference
                    })
                    .collect()
            })
            .collect();

        Self {
            a,
            b,
            budget: options.max_search_nodes.max(1),
            order,
            considered_b,
            compatible,
            a_to_b: vec![None; a.len()],
            b_to_a: vec![None; b.len()],
            excluded: vec![false; a.len()],
            size: 0,
            nodes: 0,
            exhausted: false,
            best: None,
        }
    }

    fn run(&mut self) {
        for (rank, &seed_a) in self.order.clone().iter().enumerate() {
            // Mappings containing an earlier seed were already explored from that seed.
            for &earlier in &self.order[..rank] {
                self.excluded[earlier] = true;
            }
            for seed_b in 0..self.b.len() {
                if !self.compatible[seed_a][seed_b] {
                    continue;
                }
                self.assign(seed_a, seed_b);
                self.extend();
                self.unassign(seed_a, seed_b);
                if self.exhausted {
                    return;
                }
            }
        }
    }

    fn extend(&mut self) {
        if self.nodes >= self.budget {
            self.exhausted = true;
            self.consider_current();
            return;
        }
        self.nodes += 1;

        let Some(next) = self.next_frontier_atom() else {
            self.consider_current();
            return;
        };

        if let Some(best) = &self.best {
            let undecided = self
                .order
                .iter()
                .filter(|&&i| self.a_to_b[i].is_none() && !self.excluded[i])
                .count();
            let unused_b = (0..self.b.len())
                .filter(|&j| self.considered_b[j] && self.b_to_a[j].is_none())
                .count();
            if self.size + undecided.min(unused_b) < best.score.size {
                return;
            }
        }

        for candidate in self.candidates_for(next) {
            self.assign(next, candidate);
            self.extend();
            self.unassign(next, candidate);
            if self.exhausted {
                return;
            }
        }

        self.excluded[next] = true;
        self.extend();
        self.excluded[next] = false;
    }

    /// Highest-priority undecided atom of A bonded to the current partial mapping.
    fn next_frontier_atom(&self) -> Option<usize> {
        self.order.iter().copied().find(|&i| {
            self.a_to_b[i].is_none()
                && !self.excluded[i]
                && self.a.neighbors(i).iter().any(|&n| self.a_to_b[n].is_some())
        })
    }

    /// Unused atoms of B that keep the mapping an induced common subgraph when paired with `i`.
    fn candidates_for(&self, i: usize) -> Vec<usize> {
        (0..self.b.len())
            .filter(|&j| self.compatible[i][j] && self.b_to_a[j].is_none())
            .filter(|&j| {
                self.a.neighbors(i).iter().all(|&n| match self.a_to_b[n] {
                    Some(partner) => self.b.are_bonded(j, partner),
                    None => true,
                })
            })
            .filter(|&j| {
                self.b.neighbors(j).iter().all(|&m| match self.b_to_a[m] {
                    Some(partner) => self.a.are_bonded(i, partner),
                    None => true,
                })
            })
            .collect()
    }

    fn assign(&mut self, i: usize, j: usize) {
        self.a_to_b[i] = Some(j);
        self.b_to_a[j] = Some(i);
        self.size += 1;
    }

    fn unassign(&mut self, i: usize, j: usize) {
        self.a_to_b[i] = None;
        self.b_to_a[j] = None;
        self.size -= 1;
    }

    fn consider_current(&mut self) {
        if let Some(best) = &self.best {
            if self.size < best.score.size {
                return;
            }
        }
        let pairs: Vec<(usize, usize)> = self
            .a_to_b
            .iter()
            .enumerate()
            .filter_map(|(i, j)| j.map(|j| (i, j)))
            .collect();
        let score = self.score(&pairs);
        let replace = match &self.best {
            Some(best) => score.beats(&best.score),
            None => true,
        };
        if replace {
            self.best = Some(Candidate { pairs, score });
        }
    }

    fn score(&self, pairs: &[(usize, usize)]) -> Score {
        let cut_in = |ligand: &Ligand, mapped: &dyn Fn(usize) -> bool| {
            ligand
                .bonds()
                .iter()
                .filter(|bond| ligand.is_ring_bond(bond.atom1, bond.atom2))
                .filter(|bond| mapped(bond.atom1) != mapped(bond.atom2))
                .count()
        };
        let cut_ring_bonds = cut_in(self.a, &|i| self.a_to_b[i].is_some())
            + cut_in(self.b, &|j| self.b_to_a[j].is_some());

        let coords_a: Vec<Point3<f64>> = pairs.iter().map(|&(i, _)| self.a.atoms()[i].position).collect();
        let coords_b: Vec<Point3<f64>> = pairs.iter().map(|&(_, j)| self.b.atoms()[j].position).collect();
        let rmsd = superposed_rmsd(&coords_b, &coords_a).unwrap_or(f64::INFINITY);

        Score {
            size: pairs.len(),
            cut_ring_bonds,
            rmsd,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::ligand::test_molecules::*;

    #[test]
    fn hydrogen_to_methyl_maps_the_ring() {
        let (a, b) = (phenyl_h(), phenyl_methyl());
        let mapping = McsMapper::default().propose(&a, &b).unwrap();

        assert_eq!(mapping.len(), 6);
        assert_eq!(mapping.pairs(), &[(0, 0), (1, 1), (2, 2), (3, 3), (4, 4), (5, 5)]);
        assert_eq!(mapping.disappearing(), &[6]);
        assert_eq!(mapping.appearing(), &[6, 7, 8, 9]);
        assert!(mapping.validate(&a, &b).is_ok());
    }

    #[test]
    fn mapping_is_connected_bijection_in_both_directions() {
        let (a, b) = (phenyl_methyl(), phenyl_h());
        let mapping = McsMapper::default().propose(&a, &b).unwrap();

        assert_eq!(mapping.len(), 6);
        assert!(a.is_connected_subset(&mapping.mapped_a()));
        assert!(b.is_connected_subset(&mapping.mapped_b()));
        let mut partners = mapping.mapped_b();
        partners.sort_unstable();
        partners.dedup();
        assert_eq!(partners.len(), mapping.len());
    }

    #[test]
    fn identical_ligands_map_completely() {
        let a = ethanol();
        let mapping = McsMapper::default().propose(&a, &ethanol()).unwrap();
        assert_eq!(mapping.pairs(), &[(0, 0), (1, 1), (2, 2)]);
        assert!(mapping.disappearing().is_empty());
        assert!(mapping.appearing().is_empty());
    }

    #[test]
    fn heavy_atoms_only_leaves_hydrogens_unmapped() {
        let options = McsOptions {
            heavy_atoms_only: true,
            ..McsOptions::default()
        };
        let (a, b) = (phenyl_h(), phenyl_methyl());
        let mapping = McsMapper::new(options).propose(&a, &b).unwrap();
        assert_eq!(mapping.len(), 6);
        assert!(mapping.pairs().iter().all(|&(i, _)| a.atoms()[i].element.is_heavy()));
    }

    #[test]
    fn disjoint_chemistry_is_below_threshold() {
        let err = McsMapper::default().propose(&chloride(), &ethanol()).unwrap_err();
        assert_eq!(
            err,
            MappingError::BelowThreshold {
                found: 0,
                required: 1
            }
        );
    }

    #[test]
    fn minimum_core_size_is_enforced() {
        let options = McsOptions {
            min_mapped_atoms: 7,
            ..McsOptions::default()
        };
        let err = McsMapper::new(options)
            .propose(&phenyl_h(), &phenyl_methyl())
            .unwrap_err();
        assert_eq!(
            err,
            MappingError::BelowThreshold {
                found: 6,
                required: 7
            }
        );
    }

    #[test]
    fn exhausted_budget_still_returns_a_valid_mapping() {
        let options = McsOptions {
            max_search_nodes: 3,
            ..McsOptions::default()
        };
        let (a, b) = (phenyl_h(), phenyl_methyl());
        let mapping = McsMapper::new(options).propose(&a, &b).unwrap();
        assert!(!mapping.is_empty());
        assert!(mapping.validate(&a, &b).is_ok());
    }

    #[test]
    fn hydrogen_only_selection_is_rejected_in_heavy_mode() {
        let options = McsOptions {
            heavy_atoms_only: true,
            ..McsOptions::default()
        };
        let h2 = {
            use crate::core::models::element::Element;
            use crate::core::models::ligand::LigandAtom;
            use crate::core::models::topology::{Bond, BondOrder};
            let atoms = vec![
                LigandAtom::new("H1", Element::H, Point3::origin(), 0),
                LigandAtom::new("H2", Element::H, Point3::new(0.74, 0.0, 0.0), 1),
            ];
            Ligand::new("H2", atoms, vec![Bond::new(0, 1, BondOrder::Single)]).unwrap()
        };
        let err = McsMapper::new(options).propose(&h2, &ethanol()).unwrap_err();
        assert_eq!(err, MappingError::EmptyLigand { side: LigandSide::A });
    }
}
