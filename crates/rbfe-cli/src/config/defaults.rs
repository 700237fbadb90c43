use std::path::PathBuf;

/// Built-in values used when neither the config file nor the command line
/// provides one. The displacement and the cycle count have no default.
pub struct DefaultsConfig {
    pub align_ligand_b: bool,
    pub temperature: f64,
    pub max_retries: u32,
    pub perturbation_magnitude: f64,
    pub seed: u64,
    pub estimate_interval: u64,
    pub checkpoint_interval: u64,
    pub engine_work_dir: PathBuf,
    pub engine_timeout_seconds: u64,
    pub replica_log_job_name: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            align_ligand_b: true,
            temperature: 300.0,
            max_retries: 3,
            perturbation_magnitude: 0.05,
            seed: 20_240_601,
            estimate_interval: 50,
            checkpoint_interval: 10,
            engine_work_dir: PathBuf::from("rbfe-work"),
            engine_timeout_seconds: 3600,
            replica_log_job_name: "rbfe".to_string(),
        }
    }
}
