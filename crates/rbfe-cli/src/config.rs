mod builder;
mod defaults;
mod file;
mod models;

pub use builder::{build_analyze_config, build_production_config, build_structprep_config};
pub use models::{EngineSettings, SampleSource};
