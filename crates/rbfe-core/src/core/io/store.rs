use crate::core::atm::{AtmState, Direction};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on sample store '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("CSV error in sample store: {0}")]
    Csv(#[from] csv::Error),
    #[error("Malformed sample log '{path}' line {line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },
}

/// Observables of one replica at the end of one cycle, together with the
/// parameters of the state it was sampled in. Enough to evaluate its reduced
/// energy in any state of the schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub cycle: u64,
    pub replica: usize,
    pub state_index: usize,
    pub temperature: f64,
    pub direction: Direction,
    pub lambda1: f64,
    pub lambda2: f64,
    pub alpha: f64,
    pub u0: f64,
    pub w0: f64,
    pub potential_energy: f64,
    pub perturbation_energy: f64,
    /// Opaque reference to the engine's coordinate snapshot, if it kept one.
    #[serde(default)]
    pub snapshot: Option<String>,
}

impl SampleRecord {
    pub fn new(
        replica: usize,
        cycle: u64,
        state_index: usize,
        state: &AtmState,
        potential_energy: f64,
        perturbation_energy: f64,
    ) -> Self {
        Self {
            cycle,
            replica,
            state_index,
            temperature: state.temperature,
            direction: state.direction,
            lambda1: state.lambda1,
            lambda2: state.lambda2,
            alpha: state.alpha,
            u0: state.u0,
            w0: state.w0,
            potential_energy,
            perturbation_energy,
            snapshot: None,
        }
    }

    pub fn with_snapshot(mut self, snapshot: Option<String>) -> Self {
        self.snapshot = snapshot;
        self
    }

    /// The state the sample was drawn from.
    pub fn state(&self) -> AtmState {
        AtmState {
            lambda1: self.lambda1,
            lambda2: self.lambda2,
            alpha: self.alpha,
            u0: self.u0,
            w0: self.w0,
            direction: self.direction,
            temperature: self.temperature,
        }
    }

    /// Potential energy with the sampled state's bias removed.
    pub fn unbiased_energy(&self) -> f64 {
        self.state()
            .unbiased_energy(self.potential_energy, self.perturbation_energy)
    }

    /// Reduced energy of this configuration evaluated in `state`.
    pub fn reduced_energy_in(&self, state: &AtmState) -> f64 {
        state.reduced_energy(self.unbiased_energy(), self.perturbation_energy)
    }
}

/// Append-only storage of sample records.
pub trait SampleStore: Send {
    /// Appends records in the given order.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be written.
    fn append(&mut self, records: &[SampleRecord]) -> Result<(), StoreError>;

    /// Reads back every record in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be read or parsed.
    fn records(&self) -> Result<Vec<SampleRecord>, StoreError>;

    /// Highest cycle index present in the store.
    fn last_cycle(&self) -> Result<Option<u64>, StoreError> {
        Ok(self.records()?.iter().map(|r| r.cycle).max())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemorySampleStore {
    records: Vec<SampleRecord>,
}

impl MemorySampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn as_slice(&self) -> &[SampleRecord] {
        &self.records
    }
}

impl SampleStore for MemorySampleStore {
    fn append(&mut self, records: &[SampleRecord]) -> Result<(), StoreError> {
        self.records.extend_from_slice(records);
        Ok(())
    }

    fn records(&self) -> Result<Vec<SampleRecord>, StoreError> {
        Ok(self.records.clone())
    }
}

/// CSV-backed store; one row per record, header written once.
#[derive(Debug, Clone)]
pub struct CsvSampleStore {
    path: PathBuf,
}

impl CsvSampleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl SampleStore for CsvSampleStore {
    fn append(&mut self, records: &[SampleRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;
        let is_empty = file.metadata().map_err(|e| self.io_error(e))?.len() == 0;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(is_empty)
            .from_writer(file);
        for record in records {
            writer.serialize(record)?;
        }
        writer.flush().map_err(|e| self.io_error(e))?;
        Ok(())
    }

    fn records(&self) -> Result<Vec<SampleRecord>, StoreError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = csv::Reader::from_path(&self.path)?;
        reader
            .deserialize()
            .map(|row| row.map_err(StoreError::from))
            .collect()
    }
}
