use crate::config::EngineSettings;
use rbfe_atm::engine::simulation::{EngineOutput, EngineRequest, SimulationEngine, SimulationError};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::runtime::Handle;
use tracing::{debug, trace};

/// Exit status an engine uses to report that the replica cannot continue.
/// Every other non-zero status is treated as transient and retried.
pub const FATAL_EXIT_CODE: i32 = 3;

/// Runs an external MD program once per replica per cycle.
///
/// The program is called as `<program> <args...> <system> <request> <output>`:
/// it reads the alchemical system and the TOML [`EngineRequest`], propagates
/// the configuration and writes a TOML [`EngineOutput`] to `<output>`.
pub struct CommandEngine {
    program: String,
    args: Vec<String>,
    system_path: PathBuf,
    work_dir: PathBuf,
    timeout: Duration,
    runtime: Handle,
}

impl CommandEngine {
    /// `runtime` drives the child processes; [`SimulationEngine::run`] must
    /// therefore be called from outside of that runtime's async context.
    pub fn new(settings: &EngineSettings, system_path: PathBuf, runtime: Handle) -> Self {
        Self {
            program: settings.program.clone(),
            args: settings.args.clone(),
            system_path,
            work_dir: settings.work_dir.clone(),
            timeout: settings.timeout,
            runtime,
        }
    }

    fn paths(&self, request: &EngineRequest) -> (PathBuf, PathBuf) {
        let dir = self.work_dir.join(format!("r{}", request.replica));
        let stem = format!("c{}-a{}", request.cycle, request.attempt);
        (
            dir.join(format!("{stem}.request.toml")),
            dir.join(format!("{stem}.output.toml")),
        )
    }

    async fn run_async(&self, request: &EngineRequest) -> Result<EngineOutput, SimulationError> {
        let (request_path, output_path) = self.paths(request);
        if let Some(dir) = request_path.parent() {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                SimulationError::Fatal(format!("cannot create {}: {}", dir.display(), e))
            })?;
        }

        let body = toml::to_string(request)
            .map_err(|e| SimulationError::Fatal(format!("cannot encode request: {}", e)))?;
        tokio::fs::write(&request_path, body).await.map_err(|e| {
            SimulationError::Transient(format!("cannot write {}: {}", request_path.display(), e))
        })?;
        // A leftover output from an earlier run must never be read back.
        match tokio::fs::remove_file(&output_path).await {
            Ok(()) => debug!(path = %output_path.display(), "Removed stale engine output"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                debug!(path = %output_path.display(), error = %e, "Cannot remove stale engine output");
                return Err(SimulationError::Transient(format!(
                    "cannot remove {}: {}",
                    output_path.display(),
                    e
                )));
            }
        }

        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(&self.system_path)
            .arg(&request_path)
            .arg(&output_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                SimulationError::Fatal(format!("failed to start '{}': {}", self.program, e))
            })?;
        trace!(replica = request.replica, cycle = request.cycle, "Engine process started");

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| SimulationError::Transient(e.to_string()))?,
            Err(_) => {
                return Err(SimulationError::Transient(format!(
                    "engine timed out after {:?}",
                    self.timeout
                )));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr.lines().last().unwrap_or("").trim();
            let message = format!("engine exited with {}: {}", output.status, detail);
            return Err(match output.status.code() {
                Some(FATAL_EXIT_CODE) => SimulationError::Fatal(message),
                _ => SimulationError::Transient(message),
            });
        }

        let text = tokio::fs::read_to_string(&output_path).await.map_err(|e| {
            SimulationError::Transient(format!("cannot read {}: {}", output_path.display(), e))
        })?;
        let result: EngineOutput = toml::from_str(&text).map_err(|e| {
            SimulationError::Transient(format!("malformed {}: {}", output_path.display(), e))
        })?;
        debug!(
            replica = request.replica,
            cycle = request.cycle,
            u = result.perturbation_energy,
            "Engine run finished"
        );
        Ok(result)
    }
}

impl SimulationEngine for CommandEngine {
    fn run(&self, request: &EngineRequest) -> Result<EngineOutput, SimulationError> {
        self.runtime.block_on(self.run_async(request))
    }
}
