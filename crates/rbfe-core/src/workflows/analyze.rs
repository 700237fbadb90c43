use super::WorkflowError;
use crate::core::analysis::{EstimatorConfig, FreeEnergyEstimate, FreeEnergyEstimator};
use crate::core::atm::AlchemicalSchedule;
use crate::core::io::store::SampleRecord;
use crate::core::system::AlchemicalSystem;
use crate::engine::progress::{Progress, ProgressReporter};
use tracing::{info, instrument};

/// Restraint volume correction of the system at the temperature of its
/// first state.
pub fn reference_correction(system: &AlchemicalSystem) -> f64 {
    let temperature = system
        .schedule()
        .states()
        .first()
        .map_or(300.0, |s| s.temperature);
    system.restraints().reference_correction(temperature)
}

/// Estimates ΔΔG from previously collected samples.
#[instrument(skip_all, name = "analyze_workflow")]
pub fn run(
    schedule: &AlchemicalSchedule,
    reference_correction: f64,
    records: &[SampleRecord],
    config: &EstimatorConfig,
    reporter: &ProgressReporter,
) -> Result<FreeEnergyEstimate, WorkflowError> {
    reporter.report(Progress::PhaseStart { name: "Analysis" });
    info!(
        records = records.len(),
        states = schedule.len(),
        min_cycle = ?config.min_cycle,
        max_cycle = ?config.max_cycle,
        "Estimating relative binding free energy."
    );
    let estimate = FreeEnergyEstimator::new(schedule.clone(), config.clone())
        .with_reference_correction(reference_correction)
        .estimate(records)?;
    reporter.report(Progress::Message(format!(
        "ΔΔG = {:.3} ± {:.3} kcal/mol ({} samples per replica)",
        estimate.ddg, estimate.std_error, estimate.samples_per_replica
    )));
    reporter.report(Progress::PhaseFinish);
    Ok(estimate)
}
