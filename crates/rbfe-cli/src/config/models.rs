use rbfe_atm::core::analysis::EstimatorConfig;
use rbfe_atm::engine::config as core_config;
use std::path::PathBuf;
use std::time::Duration;

pub struct StructprepAppConfig {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub core_config: core_config::StructprepConfig,
}

/// How the external MD program is invoked.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub program: String,
    pub args: Vec<String>,
    pub work_dir: PathBuf,
    pub timeout: Duration,
}

pub struct ProductionAppConfig {
    pub system_path: PathBuf,
    pub store_path: PathBuf,
    pub output_path: Option<PathBuf>,
    pub resume: bool,
    pub engine: EngineSettings,
    pub core_config: core_config::ProductionConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SampleSource {
    Store(PathBuf),
    ReplicaLogs { run_dir: PathBuf, job_name: String },
}

pub struct AnalyzeAppConfig {
    pub source: SampleSource,
    pub system_path: Option<PathBuf>,
    pub output_path: Option<PathBuf>,
    pub estimator: EstimatorConfig,
}
