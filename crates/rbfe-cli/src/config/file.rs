use crate::error::{CliError, Result};
use rbfe_atm::core::atm::AlchemicalSchedule;
use rbfe_atm::core::restraints::RestraintPolicy;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum FileMappingMethod {
    Mcs,
    Explicit,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileMappingConfig {
    pub method: Option<FileMappingMethod>,
    /// `[a, b]` index pairs, only with `method = "explicit"`.
    pub pairs: Option<Vec<[usize; 2]>>,
    pub ring_matches_ring_only: Option<bool>,
    pub heavy_atoms_only: Option<bool>,
    pub max_degree_difference: Option<usize>,
    pub min_mapped_atoms: Option<usize>,
    pub max_search_nodes: Option<usize>,
}

#[derive(Deserialize, Debug, Default, Clone, Copy)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileSoftcoreConfig {
    pub umax: Option<f64>,
    pub acore: Option<f64>,
    pub ubcore: Option<f64>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileStructprepConfig {
    pub displacement: Option<[f64; 3]>,
    pub align_ligand_b: Option<bool>,
    /// Temperature of the default schedule; exclusive with `schedule`.
    pub temperature: Option<f64>,
    /// Explicit list of states replacing the default schedule.
    pub schedule: Option<AlchemicalSchedule>,
    pub mapping: Option<FileMappingConfig>,
    pub restraints: Option<RestraintPolicy>,
    pub softcore: Option<FileSoftcoreConfig>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileCheckpointConfig {
    pub path: Option<PathBuf>,
    pub interval: Option<u64>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileEngineConfig {
    pub command: Option<String>,
    /// Arguments placed before the system, request and output paths.
    pub args: Option<Vec<String>>,
    pub work_dir: Option<PathBuf>,
    pub timeout_seconds: Option<u64>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileProductionConfig {
    pub cycles: Option<u64>,
    pub max_retries: Option<u32>,
    pub perturbation_magnitude: Option<f64>,
    pub seed: Option<u64>,
    pub time_limit_minutes: Option<f64>,
    pub estimate_interval: Option<u64>,
    pub checkpoint: Option<FileCheckpointConfig>,
    pub engine: Option<FileEngineConfig>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileAnalysisConfig {
    pub min_cycle: Option<u64>,
    pub max_cycle: Option<u64>,
    pub correlation_correction: Option<bool>,
    pub max_iterations: Option<usize>,
    pub tolerance: Option<f64>,
}

/// One TOML file shared by all subcommands; each reads its own section.
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub structprep: Option<FileStructprepConfig>,
    pub production: Option<FileProductionConfig>,
    pub analysis: Option<FileAnalysisConfig>,
}

impl FileConfig {
    /// Reads the optional config file and applies `--set KEY=VALUE` overrides
    /// on the raw TOML before it is typed.
    pub fn load(path: Option<&Path>, set_values: &[String]) -> Result<Self> {
        let mut table = match path {
            Some(path) => {
                debug!("Loading configuration from file: {:?}", path);
                let content = std::fs::read_to_string(path)?;
                toml::from_str::<toml::Table>(&content).map_err(|e| CliError::FileParsing {
                    path: path.to_path_buf(),
                    source: e.into(),
                })?
            }
            None => toml::Table::new(),
        };

        apply_set_values(&mut table, set_values)?;

        toml::Value::Table(table)
            .try_into()
            .map_err(|e: toml::de::Error| CliError::Config(e.to_string()))
    }
}

fn apply_set_values(table: &mut toml::Table, set_values: &[String]) -> Result<()> {
    for kv_pair in set_values {
        let Some((key, value_str)) = kv_pair.split_once('=') else {
            return Err(CliError::Config(format!(
                "Invalid --set format: '{}'. Expected KEY=VALUE.",
                kv_pair
            )));
        };
        let segments: Vec<&str> = key.trim().split('.').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(CliError::Config(format!(
                "Invalid configuration key for --set: '{}'",
                key
            )));
        }
        let Some((last, parents)) = segments.split_last() else {
            continue;
        };

        let mut current = &mut *table;
        for segment in parents {
            let entry = current
                .entry(segment.to_string())
                .or_insert_with(|| toml::Value::Table(toml::Table::new()));
            current = match entry {
                toml::Value::Table(inner) => inner,
                _ => {
                    return Err(CliError::Config(format!(
                        "Cannot set '{}': '{}' is not a table",
                        key, segment
                    )));
                }
            };
        }
        current.insert(last.to_string(), parse_value(value_str.trim()));
    }
    Ok(())
}

/// Parses a TOML literal; anything else is taken as a bare string.
fn parse_value(raw: &str) -> toml::Value {
    toml::from_str::<toml::Table>(&format!("value = {raw}"))
        .ok()
        .and_then(|mut t| t.remove("value"))
        .unwrap_or_else(|| toml::Value::String(raw.to_string()))
}
