pub mod analyze;
pub mod production;
pub mod structprep;

use crate::error::{CliError, Result};
use serde::Serialize;
use std::path::Path;

/// Writes a result summary as pretty TOML.
pub(crate) async fn write_toml<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let text = toml::to_string_pretty(value).map_err(|e| CliError::Other(e.into()))?;
    tokio::fs::write(path, text).await?;
    Ok(())
}
