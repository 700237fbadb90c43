use super::{Restraint, RestraintError, RestraintSet, RestraintStrategy};
use crate::core::mapping::AtomMapping;
use crate::core::models::complex::{Complex, LigandSide};
use crate::core::models::ligand::Ligand;
use crate::core::utils::geometry::distance_from_line;
use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RestraintPolicy {
    /// Radius (Å) around ligand A's heavy-atom centroid searched for anchors.
    pub site_radius: f64,
    /// Receptor atom names considered stable anchors.
    pub anchor_atom_names: Vec<String>,
    pub min_anchor_atoms: usize,
    pub centroid_force_constant: f64,
    pub centroid_tolerance: f64,
    pub alignment_k_distance: f64,
    pub alignment_k_theta: f64,
    pub alignment_k_psi: f64,
    pub positional_restraints: bool,
    pub positional_force_constant: f64,
    pub positional_tolerance: f64,
}

impl Default for RestraintPolicy {
    fn default() -> Self {
        Self {
            site_radius: 8.0,
            anchor_atom_names: vec!["CA".to_string()],
            min_anchor_atoms: 3,
            centroid_force_constant: 25.0,
            centroid_tolerance: 4.5,
            alignment_k_distance: 2.5,
            alignment_k_theta: 10.0,
            alignment_k_psi: 10.0,
            positional_restraints: false,
            positional_force_constant: 25.0,
            positional_tolerance: 1.5,
        }
    }
}

impl RestraintPolicy {
    pub fn validate(&self) -> Result<(), RestraintError> {
        let constants = [
            ("site-radius", self.site_radius),
            ("centroid-force-constant", self.centroid_force_constant),
            ("centroid-tolerance", self.centroid_tolerance),
            ("alignment-k-distance", self.alignment_k_distance),
            ("alignment-k-theta", self.alignment_k_theta),
            ("alignment-k-psi", self.alignment_k_psi),
            ("positional-force-constant", self.positional_force_constant),
            ("positional-tolerance", self.positional_tolerance),
        ];
        for (name, value) in constants {
            if !value.is_finite() || value < 0.0 {
                return Err(RestraintError::InvalidPolicy(format!(
                    "{name} must be a finite non-negative number, got {value}"
                )));
            }
        }
        if self.anchor_atom_names.is_empty() {
            return Err(RestraintError::InvalidPolicy(
                "anchor-atom-names must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Default restraint strategy: anchors the binding site on receptor atoms
/// around ligand A and builds the ligand frames from the mapped core.
#[derive(Debug, Clone)]
pub struct SiteRestraintBuilder {
    policy: RestraintPolicy,
    displacement: Vector3<f64>,
}

impl SiteRestraintBuilder {
    pub fn new(policy: RestraintPolicy, displacement: Vector3<f64>) -> Self {
        Self {
            policy,
            displacement,
        }
    }

    pub fn policy(&self) -> &RestraintPolicy {
        &self.policy
    }

    /// Receptor anchor atoms (global indices, ascending) within the site radius.
    pub fn find_anchors(&self, complex: &Complex, site_center: &Point3<f64>) -> Vec<usize> {
        let candidates: Vec<usize> = complex
            .receptor_indices()
            .into_iter()
            .filter(|&i| {
                let name = complex.topology.atoms[i].name.trim();
                self.policy
                    .anchor_atom_names
                    .iter()
                    .any(|anchor| anchor.eq_ignore_ascii_case(name))
            })
            .collect();
        if candidates.is_empty() {
            return Vec::new();
        }

        let positions: Vec<[f64; 3]> = candidates
            .iter()
            .map(|&i| {
                let p = complex.topology.atoms[i].position;
                [p.x, p.y, p.z]
            })
            .collect();
        let kdtree: KdTree<f64, 3> = (&positions).into();
        let radius_sq = self.policy.site_radius * self.policy.site_radius;

        let mut anchors: Vec<usize> = kdtree
            .within_unsorted::<SquaredEuclidean>(&[site_center.x, site_center.y, site_center.z], radius_sq)
            .into_iter()
            .map(|neighbour| candidates[neighbour.item as usize])
            .collect();
        anchors.sort_unstable();
        anchors
    }
}

impl RestraintStrategy for SiteRestraintBuilder {
    fn select(&self, complex: &Complex, mapping: &AtomMapping) -> Result<RestraintSet, RestraintError> {
        self.policy.validate()?;
        let ligand_a = complex.ligand(LigandSide::A)?;
        let ligand_b = complex.ligand(LigandSide::B)?;

        let site_center = ligand_a.heavy_centroid();
        let anchors = self.find_anchors(complex, &site_center);
        let required = self.policy.min_anchor_atoms.max(1);
        if anchors.len() < required {
            return Err(RestraintError::NoAnchors {
                found: anchors.len(),
                required,
            });
        }

        let frame = reference_frame(&ligand_a, &ligand_b, mapping)?;
        let reference_a = frame.map(|(a, _)| ligand_a.atoms()[a].global_index);
        let reference_b = frame.map(|(_, b)| ligand_b.atoms()[b].global_index);

        debug!(
            anchors = anchors.len(),
            ?reference_a,
            ?reference_b,
            "Selected restraint atoms"
        );

        let heavy_globals = |ligand: &Ligand| -> Vec<usize> {
            ligand
                .heavy_atom_indices()
                .into_iter()
                .map(|i| ligand.atoms()[i].global_index)
                .collect()
        };

        let mut restraints = vec![
            Restraint::CentroidDistance {
                ligand: LigandSide::A,
                ligand_atoms: heavy_globals(&ligand_a),
                receptor_atoms: anchors.clone(),
                offset: Vector3::zeros(),
                force_constant: self.policy.centroid_force_constant,
                tolerance: self.policy.centroid_tolerance,
            },
            Restraint::CentroidDistance {
                ligand: LigandSide::B,
                ligand_atoms: heavy_globals(&ligand_b),
                receptor_atoms: anchors.clone(),
                offset: self.displacement,
                force_constant: self.policy.centroid_force_constant,
                tolerance: self.policy.centroid_tolerance,
            },
            Restraint::Alignment {
                reference_a,
                reference_b,
                offset: self.displacement,
                k_distance: self.policy.alignment_k_distance,
                k_theta: self.policy.alignment_k_theta,
                k_psi: self.policy.alignment_k_psi,
            },
        ];

        if self.policy.positional_restraints {
            let reference_positions = anchors
                .iter()
                .map(|&i| complex.topology.atoms[i].position)
                .collect();
            restraints.push(Restraint::Positional {
                atoms: anchors,
                reference_positions,
                force_constant: self.policy.positional_force_constant,
                tolerance: self.policy.positional_tolerance,
            });
        }

        Ok(RestraintSet::new(restraints))
    }
}

/// Picks three mapped, non-terminal heavy-atom pairs spanning the core: the
/// one nearest the core centroid, the one farthest from that, and the one
/// farthest from the line through the first two. Ties go to the lower index.
fn reference_frame(
    ligand_a: &Ligand,
    ligand_b: &Ligand,
    mapping: &AtomMapping,
) -> Result<[(usize, usize); 3], RestraintError> {
    let eligible: Vec<(usize, usize)> = mapping
        .pairs()
        .iter()
        .copied()
        .filter(|&(a, b)| {
            ligand_a.atoms()[a].element.is_heavy()
                && !ligand_a.is_terminal(a)
                && !ligand_b.is_terminal(b)
        })
        .collect();
    if eligible.len() < 3 {
        return Err(RestraintError::InsufficientReferenceAtoms {
            found: eligible.len(),
        });
    }

    let position = |a: usize| ligand_a.atoms()[a].position;
    let core: Vec<usize> = mapping.mapped_a();
    let center = ligand_a.centroid_of(&core).unwrap_or_else(Point3::origin);

    let pick = |score: &dyn Fn(usize) -> f64, maximize: bool, taken: &[(usize, usize)]| {
        eligible
            .iter()
            .copied()
            .filter(|pair| !taken.contains(pair))
            .fold(None::<((usize, usize), f64)>, |best, pair| {
                let value = score(pair.0);
                let better = match best {
                    None => true,
                    Some((_, v)) if maximize => value > v + 1e-9,
                    Some((_, v)) => value < v - 1e-9,
                };
                if better { Some((pair, value)) } else { best }
            })
            .map(|(pair, _)| pair)
    };

    let first = pick(&|a| (position(a) - center).norm(), false, &[]);
    let second = first.and_then(|f| pick(&|a| (position(a) - position(f.0)).norm(), true, &[f]));
    let third = match (first, second) {
        (Some(f), Some(s)) => pick(
            &|a| distance_from_line(&position(a), &position(f.0), &position(s.0)),
            true,
            &[f, s],
        ),
        _ => None,
    };

    match (first, second, third) {
        (Some(f), Some(s), Some(t)) => Ok([f, s, t]),
        _ => Err(RestraintError::InsufficientReferenceAtoms {
            found: eligible.len(),
        }),
    }
}
