use crate::cli::StructprepArgs;
use crate::config::build_structprep_config;
use crate::error::{CliError, Result};
use crate::ui::{CliProgressHandler, UiEvent};
use rbfe_atm::core::models::complex::Complex;
use rbfe_atm::engine::progress::ProgressReporter;
use rbfe_atm::workflows::{self, WorkflowError};
use std::path::Path;
use tokio::sync::mpsc;
use tokio::task;
use tracing::info;

pub async fn run(args: StructprepArgs, ui_sender: mpsc::Sender<UiEvent>) -> Result<()> {
    info!("Merging configuration from file and CLI arguments...");
    let app = build_structprep_config(&args)?;

    info!("Loading input complex from {:?}", &app.input_path);
    let complex = load_complex(&app.input_path).await?;

    let progress_handler = CliProgressHandler::new(ui_sender);
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!("Starting structure preparation...");
    let core_config = app.core_config;
    let system = task::spawn_blocking(move || {
        workflows::structprep::run(complex, &core_config, &reporter)
    })
    .await
    .map_err(|e| CliError::Other(anyhow::anyhow!("Structure preparation task failed: {}", e)))??;

    system.save(&app.output_path).map_err(WorkflowError::from)?;
    info!("Alchemical system written to {:?}", &app.output_path);
    println!(
        "✓ Alchemical system ({} mapped pairs, {} restraints, {} states) written to: {}",
        system.mapping().len(),
        system.restraints().len(),
        system.schedule().len(),
        app.output_path.display()
    );
    Ok(())
}

async fn load_complex(path: &Path) -> Result<Complex> {
    let text = tokio::fs::read_to_string(path).await?;
    toml::from_str(&text).map_err(|e: toml::de::Error| CliError::FileParsing {
        path: path.to_path_buf(),
        source: e.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn unreadable_complex_names_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("complex.toml");
        tokio::fs::write(&path, "ligand-a = [0, 1]").await.unwrap();

        let err = load_complex(&path).await.unwrap_err();
        assert!(matches!(err, CliError::FileParsing { path: p, .. } if p == path));

        let missing = load_complex(&dir.path().join("missing.toml")).await.unwrap_err();
        assert!(matches!(missing, CliError::Io(_)));
    }
}
