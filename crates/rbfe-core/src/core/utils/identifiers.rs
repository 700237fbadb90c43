use phf::{Set, phf_set};

/// Water models and common counter-ions. Residues named here never take
/// part in binding-site restraints.
static SOLVENT_RESIDUE_NAMES: Set<&'static str> = phf_set! {
    "HOH", "WAT", "TIP3", "TIP3P", "TIP4P", "SPC", "SOL", "NA", "NA+", "CL", "CL-", "K", "K+",
};

pub fn is_solvent_residue(residue_name: &str) -> bool {
    SOLVENT_RESIDUE_NAMES.contains(residue_name.trim().to_ascii_uppercase().as_str())
}
