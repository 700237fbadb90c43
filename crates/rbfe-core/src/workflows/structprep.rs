use super::WorkflowError;
use crate::core::mapping::{AtomMapping, ExplicitMapper, MappingStrategy, McsMapper};
use crate::core::models::complex::{Complex, LigandSide};
use crate::core::restraints::{RestraintStrategy, SiteRestraintBuilder};
use crate::core::system::{AlchemicalSystem, AlchemicalSystemBuilder};
use crate::engine::config::{MappingMethod, StructprepConfig};
use crate::engine::progress::{Progress, ProgressReporter};
use tracing::{info, instrument};

fn mapper(method: &MappingMethod) -> Box<dyn MappingStrategy> {
    match method {
        MappingMethod::Mcs(options) => Box::new(McsMapper::new(options.clone())),
        MappingMethod::Explicit(pairs) => Box::new(ExplicitMapper::new(pairs.clone())),
    }
}

/// Maps the ligands, selects restraints and assembles the alchemical system.
#[instrument(skip_all, name = "structprep_workflow")]
pub fn run(
    complex: Complex,
    config: &StructprepConfig,
    reporter: &ProgressReporter,
) -> Result<AlchemicalSystem, WorkflowError> {
    complex.validate()?;

    // === Phase 1: Atom mapping ===
    reporter.report(Progress::PhaseStart {
        name: "Atom Mapping",
    });
    let ligand_a = complex.ligand(LigandSide::A)?;
    let ligand_b = complex.ligand(LigandSide::B)?;
    info!(
        ligand_a = ligand_a.name(),
        ligand_b = ligand_b.name(),
        atoms_a = ligand_a.len(),
        atoms_b = ligand_b.len(),
        "Mapping ligand atoms."
    );
    let mapping: AtomMapping = mapper(&config.mapping).propose(&ligand_a, &ligand_b)?;
    reporter.report(Progress::Message(format!(
        "Mapped {} atom pair(s); {} disappearing, {} appearing.",
        mapping.len(),
        mapping.disappearing().len(),
        mapping.appearing().len()
    )));
    reporter.report(Progress::PhaseFinish);

    // === Phase 2: Restraints ===
    reporter.report(Progress::PhaseStart { name: "Restraints" });
    let restraints = SiteRestraintBuilder::new(config.restraints.clone(), config.displacement)
        .select(&complex, &mapping)?;
    info!(restraints = restraints.len(), "Restraints selected.");
    reporter.report(Progress::PhaseFinish);

    // === Phase 3: Assembly ===
    reporter.report(Progress::PhaseStart {
        name: "System Assembly",
    });
    let system = AlchemicalSystemBuilder::new(complex)
        .mapping(mapping)
        .restraints(restraints)
        .softcore(config.softcore)
        .schedule(config.schedule.clone())
        .displacement(config.displacement)
        .align_ligand_b(config.align_ligand_b)
        .build()?;
    reporter.report(Progress::PhaseFinish);

    Ok(system)
}
