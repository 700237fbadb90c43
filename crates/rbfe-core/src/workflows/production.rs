use super::WorkflowError;
use super::analyze;
use crate::core::analysis::{FreeEnergyEstimate, FreeEnergyEstimator};
use crate::core::io::store::SampleStore;
use crate::core::system::AlchemicalSystem;
use crate::engine::config::ProductionConfig;
use crate::engine::context::{Checkpoint, RunContext};
use crate::engine::error::SchedulerError;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::scheduler::{CancellationToken, ProductionReport, ReplicaExchangeScheduler};
use crate::engine::simulation::{Configuration, SimulationEngine};
use tracing::{info, instrument};

#[derive(Debug, Clone)]
pub struct ProductionResult {
    pub report: ProductionReport,
    pub estimate: FreeEnergyEstimate,
}

/// Runs replica exchange for the configured number of cycles, then estimates
/// ΔΔG from everything in the store.
///
/// With `resume`, the run continues from the checkpointed cycle; records of
/// the earlier cycles are expected to be in `store` already, and none past
/// it. A fresh run requires an empty store.
#[instrument(skip_all, name = "production_workflow")]
pub fn run(
    system: &AlchemicalSystem,
    engine: &dyn SimulationEngine,
    store: &mut dyn SampleStore,
    config: &ProductionConfig,
    resume: Option<Checkpoint>,
    cancel: CancellationToken,
    reporter: &ProgressReporter,
) -> Result<ProductionResult, WorkflowError> {
    system.validate()?;
    let schedule = system.schedule().clone();

    let last_stored = store.last_cycle()?;
    let mut context = match resume {
        Some(checkpoint) => {
            info!(cycle = checkpoint.cycle, "Resuming production from checkpoint.");
            if let Some(last) = last_stored.filter(|&last| last > checkpoint.cycle) {
                return Err(SchedulerError::StoreAheadOfCheckpoint {
                    store: last,
                    checkpoint: checkpoint.cycle,
                }
                .into());
            }
            RunContext::from_checkpoint(schedule.clone(), checkpoint)?
        }
        None => {
            if let Some(last_cycle) = last_stored {
                return Err(SchedulerError::StoreNotEmpty { last_cycle }.into());
            }
            RunContext::new(
                schedule.clone(),
                Configuration::from_complex(system.complex()),
                config.seed,
            )
        }
    };

    let estimator = FreeEnergyEstimator::new(schedule, config.estimator.clone())
        .with_reference_correction(analyze::reference_correction(system));

    let report = {
        let mut scheduler = ReplicaExchangeScheduler::new(engine, store, config, reporter)
            .with_cancellation(cancel);
        if config.estimate_interval > 0 {
            scheduler = scheduler.with_monitor(estimator.clone());
        }
        scheduler.run(&mut context)?
    };

    reporter.report(Progress::PhaseStart { name: "Analysis" });
    let records = store.records()?;
    let estimate = estimator.estimate(&records)?;
    reporter.report(Progress::PhaseFinish);

    Ok(ProductionResult { report, estimate })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::io::store::{CsvSampleStore, MemorySampleStore};
    use crate::core::system::alchemical::test_systems::methyl_pair_system;
    use crate::engine::config::ProductionConfigBuilder;
    use crate::engine::scheduler::StopReason;
    use crate::engine::simulation::test_engines::SyntheticEngine;
    use crate::workflows::ErrorKind;
    use tempfile::tempdir;

    fn config(cycles: u64) -> ProductionConfig {
        ProductionConfigBuilder::new()
            .cycles(cycles)
            .max_retries(1)
            .perturbation_magnitude(0.02)
            .seed(5)
            .estimate_interval(2)
            .build()
            .unwrap()
    }

    #[test]
    fn production_ends_with_an_estimate() {
        let system = methyl_pair_system();
        let engine = SyntheticEngine::failing(&[(3, 3)]);
        let dir = tempdir().unwrap();
        let mut store = CsvSampleStore::new(dir.path().join("samples.csv"));
        let result = run(
            &system,
            &engine,
            &mut store,
            &config(6),
            None,
            CancellationToken::new(),
            &ProgressReporter::new(),
        )
        .unwrap();

        assert_eq!(result.report.stop_reason, StopReason::Completed);
        assert_eq!(result.report.records_written, 6 * 22 - 1);
        assert!(result.estimate.ddg.is_finite());
        assert!(result.estimate.std_error.is_finite());
        assert_eq!(store.records().unwrap().len(), 6 * 22 - 1);
    }

    #[test]
    fn second_fresh_run_on_the_same_store_is_refused() {
        let system = methyl_pair_system();
        let engine = SyntheticEngine::default();
        let dir = tempdir().unwrap();
        let path = dir.path().join("samples.csv");
        let first = run(
            &system,
            &engine,
            &mut CsvSampleStore::new(&path),
            &config(3),
            None,
            CancellationToken::new(),
            &ProgressReporter::new(),
        )
        .unwrap();
        assert_eq!(first.report.records_written, 3 * 22);

        let err = run(
            &system,
            &engine,
            &mut CsvSampleStore::new(&path),
            &config(3),
            None,
            CancellationToken::new(),
            &ProgressReporter::new(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Scheduler(SchedulerError::StoreNotEmpty { last_cycle: 3 })
        ));
        assert_eq!(err.kind(), ErrorKind::Setup);
        assert_eq!(CsvSampleStore::new(&path).records().unwrap().len(), 3 * 22);
    }

    #[test]
    fn resume_refuses_a_store_ahead_of_the_checkpoint() {
        let system = methyl_pair_system();
        let engine = SyntheticEngine::default();
        let mut store = MemorySampleStore::new();
        let first = run(
            &system,
            &engine,
            &mut store,
            &config(4),
            None,
            CancellationToken::new(),
            &ProgressReporter::new(),
        )
        .unwrap();

        let mut stale = RunContext::new(
            system.schedule().clone(),
            Configuration::from_complex(system.complex()),
            5,
        );
        stale.finish_cycle(2).unwrap();
        let err = run(
            &system,
            &engine,
            &mut store,
            &config(4),
            Some(stale.checkpoint()),
            CancellationToken::new(),
            &ProgressReporter::new(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Scheduler(SchedulerError::StoreAheadOfCheckpoint {
                store: 4,
                checkpoint: 2
            })
        ));
        assert_eq!(store.len(), first.report.records_written);
    }

    #[test]
    fn cancelled_before_start_reports_insufficient_data() {
        let system = methyl_pair_system();
        let engine = SyntheticEngine::default();
        let mut store = MemorySampleStore::new();
        let token = CancellationToken::new();
        token.cancel();
        let err = run(
            &system,
            &engine,
            &mut store,
            &config(4),
            None,
            token,
            &ProgressReporter::new(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Analysis);
        assert!(store.is_empty());
    }
}
