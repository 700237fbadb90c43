use super::{AtomMapping, MappingError, MappingStrategy};
use crate::core::models::ligand::Ligand;

/// Uses a caller-supplied list of `(a, b)` ligand-local index pairs verbatim,
/// after checking that it forms a valid mapping.
#[derive(Debug, Clone, Default)]
pub struct ExplicitMapper {
    pairs: Vec<(usize, usize)>,
}

impl ExplicitMapper {
    pub fn new(pairs: Vec<(usize, usize)>) -> Self {
        Self { pairs }
    }

    /// Pairs atoms by identical names, e.g. for ligands prepared from a shared template.
    pub fn by_atom_name(ligand_a: &Ligand, ligand_b: &Ligand) -> Self {
        let pairs = ligand_a
            .atoms()
            .iter()
            .enumerate()
            .filter_map(|(i, atom)| {
                ligand_b
                    .atoms()
                    .iter()
                    .position(|other| other.name == atom.name && other.element == atom.element)
                    .map(|j| (i, j))
            })
            .collect();
        Self { pairs }
    }

    pub fn pairs(&self) -> &[(usize, usize)] {
        &self.pairs
    }
}

impl MappingStrategy for ExplicitMapper {
    fn propose(&self, ligand_a: &Ligand, ligand_b: &Ligand) -> Result<AtomMapping, MappingError> {
        if self.pairs.is_empty() {
            return Err(MappingError::BelowThreshold {
                found: 0,
                required: 1,
            });
        }
        let mapping = AtomMapping::from_pairs(self.pairs.clone(), ligand_a.len(), ligand_b.len());
        mapping.validate(ligand_a, ligand_b)?;
        Ok(mapping)
    }
}
