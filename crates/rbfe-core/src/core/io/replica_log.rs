use super::store::{SampleRecord, StoreError};
use crate::core::atm::Direction;
use std::path::Path;
use tracing::debug;

/// Reads the per-replica output files of an earlier ATM run,
/// `<run_dir>/r<i>/<job_name>.out` for `i` in `0..replicas`.
///
/// Each whitespace-separated line holds `state temperature direction lambda1
/// lambda2 alpha u0 w0 potential_energy perturbation_energy`, optionally
/// followed by extra columns that are ignored. The line number (starting at 1)
/// becomes the cycle index.
pub fn read_replica_logs(
    run_dir: &Path,
    job_name: &str,
    replicas: usize,
) -> Result<Vec<SampleRecord>, StoreError> {
    let mut records = Vec::new();
    for replica in 0..replicas {
        let path = run_dir.join(format!("r{replica}")).join(format!("{job_name}.out"));
        let text = std::fs::read_to_string(&path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        let before = records.len();
        for (index, line) in text.lines().filter(|l| !l.trim().is_empty()).enumerate() {
            let record = parse_line(line, replica, index as u64 + 1).map_err(|message| {
                StoreError::Parse {
                    path: path.clone(),
                    line: index + 1,
                    message,
                }
            })?;
            records.push(record);
        }
        debug!(replica, samples = records.len() - before, "Imported replica log");
    }
    Ok(records)
}

fn parse_line(line: &str, replica: usize, cycle: u64) -> Result<SampleRecord, String> {
    let fields: Vec<f64> = line
        .split_whitespace()
        .take(10)
        .map(|f| f.parse::<f64>().map_err(|_| format!("'{f}' is not a number")))
        .collect::<Result<_, _>>()?;
    if fields.len() < 10 {
        return Err(format!("expected at least 10 columns, found {}", fields.len()));
    }
    if fields[0] < 0.0 || fields[0].fract() != 0.0 {
        return Err(format!("invalid state index {}", fields[0]));
    }
    let direction = if fields[2] < 0.0 {
        Direction::Reverse
    } else {
        Direction::Forward
    };
    Ok(SampleRecord {
        cycle,
        replica,
        state_index: fields[0] as usize,
        temperature: fields[1],
        direction,
        lambda1: fields[3],
        lambda2: fields[4],
        alpha: fields[5],
        u0: fields[6],
        w0: fields[7],
        potential_energy: fields[8],
        perturbation_energy: fields[9],
        snapshot: None,
    })
}
