use super::{AlchemicalSystem, SystemBuildError};
use crate::core::atm::{AlchemicalSchedule, SoftcoreParams};
use crate::core::mapping::AtomMapping;
use crate::core::models::complex::{Complex, LigandSide};
use crate::core::restraints::RestraintSet;
use crate::core::utils::geometry::kabsch;
use nalgebra::{Point3, Vector3};
use tracing::{debug, info};

/// Assembles and validates an [`AlchemicalSystem`].
///
/// The mapping and the displacement vector are required; restraints default
/// to an empty set, softcore parameters and the schedule to the standard RBFE
/// values.
#[derive(Debug, Clone)]
pub struct AlchemicalSystemBuilder {
    complex: Complex,
    mapping: Option<AtomMapping>,
    restraints: RestraintSet,
    softcore: SoftcoreParams,
    schedule: Option<AlchemicalSchedule>,
    displacement: Option<Vector3<f64>>,
    align_ligand_b: bool,
}

impl AlchemicalSystemBuilder {
    pub fn new(complex: Complex) -> Self {
        Self {
            complex,
            mapping: None,
            restraints: RestraintSet::default(),
            softcore: SoftcoreParams::default(),
            schedule: None,
            displacement: None,
            align_ligand_b: true,
        }
    }

    pub fn mapping(mut self, mapping: AtomMapping) -> Self {
        self.mapping = Some(mapping);
        self
    }

    pub fn restraints(mut self, restraints: RestraintSet) -> Self {
        self.restraints = restraints;
        self
    }

    pub fn softcore(mut self, softcore: SoftcoreParams) -> Self {
        self.softcore = softcore;
        self
    }

    pub fn schedule(mut self, schedule: AlchemicalSchedule) -> Self {
        self.schedule = Some(schedule);
        self
    }

    pub fn displacement(mut self, displacement: Vector3<f64>) -> Self {
        self.displacement = Some(displacement);
        self
    }

    /// When disabled, ligand B keeps its input coordinates.
    pub fn align_ligand_b(mut self, align: bool) -> Self {
        self.align_ligand_b = align;
        self
    }

    pub fn build(self) -> Result<AlchemicalSystem, SystemBuildError> {
        let mapping = self
            .mapping
            .ok_or(SystemBuildError::MissingComponent("mapping"))?;
        let displacement = self
            .displacement
            .ok_or(SystemBuildError::MissingComponent("displacement"))?;
        let schedule = self.schedule.unwrap_or_else(AlchemicalSchedule::default_rbfe);

        let mut complex = self.complex;
        complex.validate()?;
        let ligand_a = complex.ligand(LigandSide::A)?;
        let ligand_b = complex.ligand(LigandSide::B)?;
        mapping.validate(&ligand_a, &ligand_b)?;

        if self.align_ligand_b {
            place_ligand_b(&mut complex, &mapping, displacement)?;
        }

        let system = AlchemicalSystem::from_parts(
            complex,
            mapping,
            self.restraints,
            self.softcore,
            schedule,
            displacement,
        );
        system.validate()?;

        info!(
            mapped = system.mapping().len(),
            disappearing = system.softcore_region().disappearing.len(),
            appearing = system.softcore_region().appearing.len(),
            restraints = system.restraints().len(),
            states = system.schedule().len(),
            "Alchemical system assembled"
        );
        Ok(system)
    }
}

/// Superimposes ligand B onto ligand A over the mapped atoms, then shifts it
/// by the displacement vector.
fn place_ligand_b(
    complex: &mut Complex,
    mapping: &AtomMapping,
    displacement: Vector3<f64>,
) -> Result<(), SystemBuildError> {
    let atoms = &complex.topology.atoms;
    let target: Vec<Point3<f64>> = mapping
        .pairs()
        .iter()
        .map(|&(a, _)| atoms[complex.ligand_a[a]].position)
        .collect();
    let mobile: Vec<Point3<f64>> = mapping
        .pairs()
        .iter()
        .map(|&(_, b)| atoms[complex.ligand_b[b]].position)
        .collect();

    let transform = kabsch(&mobile, &target).ok_or(SystemBuildError::AlignmentFailed)?;
    debug!(
        translation = ?transform.translation.vector,
        "Superimposing ligand B onto ligand A"
    );

    for &global in &complex.ligand_b {
        let atom = &mut complex.topology.atoms[global];
        atom.position = transform * atom.position + displacement;
    }
    Ok(())
}
