use super::write_toml;
use crate::cli::AnalyzeArgs;
use crate::config::{SampleSource, build_analyze_config};
use crate::error::{CliError, Result};
use crate::ui::{CliProgressHandler, UiEvent};
use rbfe_atm::core::analysis::FreeEnergyEstimate;
use rbfe_atm::core::atm::AlchemicalSchedule;
use rbfe_atm::core::io::replica_log::read_replica_logs;
use rbfe_atm::core::io::store::{CsvSampleStore, SampleRecord, SampleStore};
use rbfe_atm::core::system::AlchemicalSystem;
use rbfe_atm::engine::progress::ProgressReporter;
use rbfe_atm::workflows::{self, WorkflowError};
use tokio::sync::mpsc;
use tokio::task;
use tracing::{info, warn};

pub async fn run(args: AnalyzeArgs, ui_sender: mpsc::Sender<UiEvent>) -> Result<()> {
    let app = build_analyze_config(&args)?;

    let (schedule, reference_correction) = match &app.system_path {
        Some(path) => {
            info!("Loading alchemical system from {:?}", path);
            let system = AlchemicalSystem::load(path).map_err(WorkflowError::from)?;
            let correction = workflows::analyze::reference_correction(&system);
            (system.schedule().clone(), correction)
        }
        None => {
            warn!("No system given; assuming the default schedule without a restraint correction.");
            (AlchemicalSchedule::default_rbfe(), 0.0)
        }
    };

    let records = load_records(&app.source, &schedule)?;
    info!("Loaded {} sample record(s).", records.len());

    let progress_handler = CliProgressHandler::new(ui_sender);
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());
    let estimator = app.estimator;
    let estimate = task::spawn_blocking(move || {
        workflows::analyze::run(
            &schedule,
            reference_correction,
            &records,
            &estimator,
            &reporter,
        )
    })
    .await
    .map_err(|e| CliError::Other(anyhow::anyhow!("Analysis task failed: {}", e)))??;

    print_estimate(&estimate);
    if let Some(path) = &app.output_path {
        write_toml(path, &estimate).await?;
        println!("Estimate written to: {}", path.display());
    }
    Ok(())
}

fn load_records(source: &SampleSource, schedule: &AlchemicalSchedule) -> Result<Vec<SampleRecord>> {
    let records = match source {
        SampleSource::Store(path) => CsvSampleStore::new(path.clone()).records(),
        SampleSource::ReplicaLogs { run_dir, job_name } => {
            read_replica_logs(run_dir, job_name, schedule.len())
        }
    };
    Ok(records.map_err(WorkflowError::from)?)
}

fn print_estimate(estimate: &FreeEnergyEstimate) {
    println!(
        "DDG = {:.3} ± {:.3} kcal/mol",
        estimate.ddg, estimate.std_error
    );
    println!(
        "  leg 1: {:.3} ± {:.3}   leg 2: {:.3} ± {:.3}   restraint correction: {:.3}",
        estimate.leg1.free_energy,
        estimate.leg1.std_error,
        estimate.leg2.free_energy,
        estimate.leg2.std_error,
        estimate.reference_correction
    );
    println!(
        "  {} sample(s) per replica, statistical inefficiency {:.2}",
        estimate.samples_per_replica, estimate.statistical_inefficiency
    );
}
