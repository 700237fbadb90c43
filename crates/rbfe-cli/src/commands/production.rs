use super::write_toml;
use crate::cli::ProductionArgs;
use crate::config::build_production_config;
use crate::engine::CommandEngine;
use crate::error::{CliError, Result};
use crate::ui::{CliProgressHandler, UiEvent};
use rbfe_atm::core::analysis::FreeEnergyEstimate;
use rbfe_atm::core::io::store::CsvSampleStore;
use rbfe_atm::core::system::AlchemicalSystem;
use rbfe_atm::engine::context::Checkpoint;
use rbfe_atm::engine::progress::ProgressReporter;
use rbfe_atm::engine::scheduler::{CancellationToken, ProductionReport, StopReason};
use rbfe_atm::workflows::{self, WorkflowError};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task;
use tracing::{info, warn};

#[derive(Serialize)]
struct RunSummary<'a> {
    estimate: &'a FreeEnergyEstimate,
    report: &'a ProductionReport,
}

pub async fn run(args: ProductionArgs, ui_sender: mpsc::Sender<UiEvent>) -> Result<()> {
    info!("Merging configuration from file and CLI arguments...");
    let app = build_production_config(&args)?;

    info!("Loading alchemical system from {:?}", &app.system_path);
    let system = AlchemicalSystem::load(&app.system_path).map_err(WorkflowError::from)?;

    let resume = match (&app.core_config.checkpoint, app.resume) {
        (Some(checkpoint), true) => {
            info!("Loading checkpoint from {:?}", &checkpoint.path);
            Some(Checkpoint::load(&checkpoint.path).map_err(WorkflowError::from)?)
        }
        _ => None,
    };

    let engine = CommandEngine::new(&app.engine, app.system_path.clone(), Handle::current());
    let mut store = CsvSampleStore::new(app.store_path.clone());

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; stopping after the current cycle.");
            signal_token.cancel();
        }
    });

    let progress_handler = CliProgressHandler::new(ui_sender);
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!(
        "Starting production: {} replicas, {} cycles, engine '{}'...",
        system.schedule().len(),
        app.core_config.cycles,
        app.engine.program
    );
    let config = app.core_config;
    let result = task::spawn_blocking(move || {
        workflows::production::run(
            &system,
            &engine,
            &mut store,
            &config,
            resume,
            cancel,
            &reporter,
        )
    })
    .await;
    signal_task.abort();
    let result =
        result.map_err(|e| CliError::Other(anyhow::anyhow!("Production task failed: {}", e)))??;

    let report = &result.report;
    if !report.failures.is_empty() {
        warn!(
            "{} replica run(s) failed; see the log for details.",
            report.failures.len()
        );
    }
    match report.stop_reason {
        StopReason::Completed => {}
        reason => println!(
            "Production stopped early ({:?}) after cycle {}.",
            reason, report.last_cycle
        ),
    }
    println!(
        "✓ {} cycle(s) run, {} sample(s) written to {}",
        report.cycles_run,
        report.records_written,
        app.store_path.display()
    );
    println!(
        "ΔΔG = {:.3} ± {:.3} kcal/mol",
        result.estimate.ddg, result.estimate.std_error
    );

    if let Some(path) = &app.output_path {
        write_toml(
            path,
            &RunSummary {
                estimate: &result.estimate,
                report,
            },
        )
        .await?;
        println!("Run summary written to: {}", path.display());
    }
    Ok(())
}
