use super::correlation::statistical_inefficiency;
use super::uwham::{self, UwhamError, UwhamOptions};
use crate::core::atm::AlchemicalSchedule;
use crate::core::io::store::{SampleRecord, SampleStore, StoreError};
use itertools::Itertools;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info, instrument};

#[derive(Debug, Error)]
pub enum EstimatorError {
    #[error("No usable samples for end state {state}")]
    InsufficientData { state: usize },
    #[error("Sample refers to state {state}, but the schedule has {states} states")]
    UnknownState { state: usize, states: usize },
    #[error("Multistate reweighting failed: {0}")]
    Uwham(#[from] UwhamError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct EstimatorConfig {
    /// First cycle included in the analysis.
    pub min_cycle: Option<u64>,
    /// Last cycle included in the analysis.
    pub max_cycle: Option<u64>,
    /// Inflate variances by the largest per-replica statistical inefficiency.
    pub correlation_correction: bool,
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        let uwham = UwhamOptions::default();
        Self {
            min_cycle: None,
            max_cycle: None,
            correlation_correction: true,
            max_iterations: uwham.max_iterations,
            tolerance: uwham.tolerance,
        }
    }
}

/// Result for one leg of the ATM cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegEstimate {
    /// Schedule indices of the leg, starting at its end state.
    pub states: Vec<usize>,
    /// Free energy of the intermediate relative to the end state (kcal/mol).
    pub free_energy: f64,
    pub std_error: f64,
    /// Free energy of every state of the leg relative to its first state.
    pub profile: Vec<f64>,
    pub samples: usize,
    pub iterations: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreeEnergyEstimate {
    /// ΔΔG of binding, B relative to A (kcal/mol).
    pub ddg: f64,
    pub std_error: f64,
    pub leg1: LegEstimate,
    pub leg2: LegEstimate,
    pub reference_correction: f64,
    pub statistical_inefficiency: f64,
    /// Analysed samples divided by the number of states; one replica
    /// contributes one sample per cycle.
    pub samples_per_replica: usize,
    pub samples_per_state: Vec<usize>,
}

/// Warm-start values carried between incremental estimates.
#[derive(Debug, Clone, Default)]
struct WarmStart {
    leg1: Option<DVector<f64>>,
    leg2: Option<DVector<f64>>,
}

/// Two-leg UWHAM estimator of the relative binding free energy.
#[derive(Debug, Clone)]
pub struct FreeEnergyEstimator {
    schedule: AlchemicalSchedule,
    config: EstimatorConfig,
    reference_correction: f64,
}

impl FreeEnergyEstimator {
    pub fn new(schedule: AlchemicalSchedule, config: EstimatorConfig) -> Self {
        Self {
            schedule,
            config,
            reference_correction: 0.0,
        }
    }

    /// Adds a constant (e.g. the restraint volume correction) to every ΔΔG.
    pub fn with_reference_correction(mut self, correction: f64) -> Self {
        self.reference_correction = correction;
        self
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    pub fn schedule(&self) -> &AlchemicalSchedule {
        &self.schedule
    }

    pub fn estimate(&self, records: &[SampleRecord]) -> Result<FreeEnergyEstimate, EstimatorError> {
        self.estimate_warm(records, &WarmStart::default())
            .map(|(estimate, _)| estimate)
    }

    pub fn estimate_from_store(&self, store: &dyn SampleStore) -> Result<FreeEnergyEstimate, EstimatorError> {
        let records = store.records()?;
        self.estimate(&records)
    }

    #[instrument(skip_all, name = "free_energy_estimate")]
    fn estimate_warm(
        &self,
        records: &[SampleRecord],
        warm: &WarmStart,
    ) -> Result<(FreeEnergyEstimate, WarmStart), EstimatorError> {
        let n_states = self.schedule.len();
        let selected: Vec<&SampleRecord> = records
            .iter()
            .filter(|r| self.config.min_cycle.is_none_or(|min| r.cycle >= min))
            .filter(|r| self.config.max_cycle.is_none_or(|max| r.cycle <= max))
            .sorted_by_key(|r| (r.cycle, r.replica, r.state_index))
            .collect();

        if let Some(r) = selected.iter().find(|r| r.state_index >= n_states) {
            return Err(EstimatorError::UnknownState {
                state: r.state_index,
                states: n_states,
            });
        }

        let mut samples_per_state = vec![0usize; n_states];
        for r in &selected {
            samples_per_state[r.state_index] += 1;
        }
        for end_state in [0, n_states - 1] {
            if samples_per_state[end_state] == 0 {
                return Err(EstimatorError::InsufficientData { state: end_state });
            }
        }

        let g = if self.config.correlation_correction {
            max_statistical_inefficiency(&selected)
        } else {
            1.0
        };

        let (mut leg1, ze1) = self.leg(&selected, &self.schedule.leg1(), warm.leg1.as_ref())?;
        let (mut leg2, ze2) = self.leg(&selected, &self.schedule.leg2(), warm.leg2.as_ref())?;
        leg1.std_error *= g.sqrt();
        leg2.std_error *= g.sqrt();

        let ddg = leg1.free_energy - leg2.free_energy + self.reference_correction;
        let std_error = leg1.std_error.hypot(leg2.std_error);

        info!(
            ddg,
            std_error,
            dg_leg1 = leg1.free_energy,
            dg_leg2 = leg2.free_energy,
            samples = selected.len(),
            statistical_inefficiency = g,
            "Free energy estimate"
        );

        let estimate = FreeEnergyEstimate {
            ddg,
            std_error,
            leg1,
            leg2,
            reference_correction: self.reference_correction,
            statistical_inefficiency: g,
            samples_per_replica: selected.len() / n_states,
            samples_per_state,
        };
        let warm = WarmStart {
            leg1: Some(ze1),
            leg2: Some(ze2),
        };
        Ok((estimate, warm))
    }

    fn leg(
        &self,
        records: &[&SampleRecord],
        states: &[usize],
        init: Option<&DVector<f64>>,
    ) -> Result<(LegEstimate, DVector<f64>), EstimatorError> {
        let position: BTreeMap<usize, usize> =
            states.iter().enumerate().map(|(k, &s)| (s, k)).collect();
        let rows: Vec<&SampleRecord> = records
            .iter()
            .copied()
            .filter(|r| position.contains_key(&r.state_index))
            .collect();

        let mut sizes = vec![0usize; states.len()];
        for r in &rows {
            sizes[position[&r.state_index]] += 1;
        }
        let targets: Vec<_> = states.iter().map(|&s| self.schedule.states()[s]).collect();
        let log_q = DMatrix::from_fn(rows.len(), states.len(), |n, k| {
            -rows[n].reduced_energy_in(&targets[k])
        });

        let init = init.filter(|z| z.len() == states.len());
        let options = UwhamOptions {
            max_iterations: self.config.max_iterations,
            tolerance: self.config.tolerance,
        };
        let solution = uwham::solve(&log_q, &sizes, init, &options)?;

        let last = states.len() - 1;
        let beta_first = targets[0].beta();
        let profile: Vec<f64> = (0..states.len())
            .map(|k| -solution.ze[k] / targets[k].beta() + solution.ze[0] / beta_first)
            .collect();
        let variance = (solution.ve[last] + solution.ve[0]).max(0.0);

        debug!(
            states = states.len(),
            samples = rows.len(),
            iterations = solution.iterations,
            "Leg solved"
        );

        let leg = LegEstimate {
            states: states.to_vec(),
            free_energy: profile[last],
            std_error: variance.sqrt() / targets[last].beta(),
            profile,
            samples: rows.len(),
            iterations: solution.iterations,
        };
        Ok((leg, solution.ze))
    }
}

/// Largest statistical inefficiency over the per-replica perturbation energy series.
fn max_statistical_inefficiency(records: &[&SampleRecord]) -> f64 {
    records
        .iter()
        .into_group_map_by(|r| r.replica)
        .into_values()
        .map(|series| {
            let values: Vec<f64> = series.iter().map(|r| r.perturbation_energy).collect();
            statistical_inefficiency(&values)
        })
        .fold(1.0, f64::max)
}

/// Accumulates records across cycles and re-estimates, starting each solve
/// from the previous solution.
#[derive(Debug, Clone)]
pub struct IncrementalEstimator {
    estimator: FreeEnergyEstimator,
    records: Vec<SampleRecord>,
    warm: WarmStart,
}

impl IncrementalEstimator {
    pub fn new(estimator: FreeEnergyEstimator) -> Self {
        Self {
            estimator,
            records: Vec::new(),
            warm: WarmStart::default(),
        }
    }

    pub fn extend(&mut self, records: &[SampleRecord]) {
        self.records.extend_from_slice(records);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn estimate(&mut self) -> Result<FreeEnergyEstimate, EstimatorError> {
        let (estimate, warm) = self.estimator.estimate_warm(&self.records, &self.warm)?;
        self.warm = warm;
        Ok(estimate)
    }
}


#[cfg(test)]
mod tests {
    use super::test_records::*;
    use super::*;
    use crate::core::io::store::MemorySampleStore;

    fn estimator() -> FreeEnergyEstimator {
        FreeEnergyEstimator::new(AlchemicalSchedule::default_rbfe(), EstimatorConfig::default())
    }

    #[test]
    fn constant_perturbation_energy_gives_exact_result() {
        let schedule = AlchemicalSchedule::default_rbfe();
        let records = constant_perturbation_records(&schedule, 5, 10.0, 4.0);
        let estimate = estimator().estimate(&records).unwrap();

        let s = schedule.states();
        let dg1 = s[10].bias(10.0) - s[0].bias(10.0);
        let dg2 = s[11].bias(4.0) - s[21].bias(4.0);
        assert!((estimate.leg1.free_energy - dg1).abs() < 1e-6);
        assert!((estimate.leg2.free_energy - dg2).abs() < 1e-6);
        assert!((estimate.ddg - (dg1 - dg2)).abs() < 1e-6);
        assert!(estimate.std_error.abs() < 1e-6);
        assert_eq!(estimate.samples_per_replica, 5);
        assert_eq!(estimate.samples_per_state, vec![5; 22]);
        assert_eq!(estimate.leg1.states.len(), 11);
        assert_eq!(estimate.leg2.states[0], 21);
    }

    #[test]
    fn estimate_is_independent_of_record_order() {
        let schedule = AlchemicalSchedule::default_rbfe();
        let mut records = constant_perturbation_records(&schedule, 4, 12.0, 3.0);
        for (i, r) in records.iter_mut().enumerate() {
            r.perturbation_energy += (i % 5) as f64 * 0.7;
        }
        let first = estimator().estimate(&records).unwrap();
        records.reverse();
        records.rotate_left(17);
        let second = estimator().estimate(&records).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn missing_pure_a_samples_is_insufficient_data() {
        let schedule = AlchemicalSchedule::default_rbfe();
        let records: Vec<SampleRecord> = constant_perturbation_records(&schedule, 3, 10.0, 4.0)
            .into_iter()
            .filter(|r| r.state_index != 0)
            .collect();
        let err = estimator().estimate(&records).unwrap_err();
        assert!(matches!(err, EstimatorError::InsufficientData { state: 0 }));
    }

    #[test]
    fn cycle_window_limits_the_samples() {
        let schedule = AlchemicalSchedule::default_rbfe();
        let records = constant_perturbation_records(&schedule, 10, 10.0, 4.0);
        let config = EstimatorConfig {
            min_cycle: Some(4),
            max_cycle: Some(6),
            ..EstimatorConfig::default()
        };
        let estimate = FreeEnergyEstimator::new(schedule, config)
            .estimate(&records)
            .unwrap();
        assert_eq!(estimate.samples_per_replica, 3);

        let empty = EstimatorConfig {
            min_cycle: Some(11),
            ..EstimatorConfig::default()
        };
        assert!(matches!(
            FreeEnergyEstimator::new(AlchemicalSchedule::default_rbfe(), empty).estimate(&records),
            Err(EstimatorError::InsufficientData { state: 0 })
        ));
    }

    #[test]
    fn out_of_range_state_is_rejected() {
        let schedule = AlchemicalSchedule::default_rbfe();
        let mut records = constant_perturbation_records(&schedule, 2, 10.0, 4.0);
        records[3].state_index = 40;
        assert!(matches!(
            estimator().estimate(&records),
            Err(EstimatorError::UnknownState { state: 40, states: 22 })
        ));
    }

    #[test]
    fn samples_per_replica_counts_against_the_number_of_states() {
        let schedule = AlchemicalSchedule::default_rbfe();
        let mut records = constant_perturbation_records(&schedule, 4, 10.0, 4.0);
        // Fewer distinct replica ids than states.
        for r in records.iter_mut() {
            r.replica %= 11;
        }
        let estimate = estimator().estimate(&records).unwrap();
        assert_eq!(estimate.samples_per_replica, records.len() / 22);
        assert_eq!(estimate.samples_per_replica, 4);
    }

    #[test]
    fn reference_correction_shifts_ddg() {
        let schedule = AlchemicalSchedule::default_rbfe();
        let records = constant_perturbation_records(&schedule, 3, 10.0, 4.0);
        let plain = estimator().estimate(&records).unwrap();
        let corrected = estimator()
            .with_reference_correction(0.25)
            .estimate(&records)
            .unwrap();
        assert!((corrected.ddg - plain.ddg - 0.25).abs() < 1e-12);
    }

    #[test]
    fn incremental_estimate_matches_batch_estimate() {
        let schedule = AlchemicalSchedule::default_rbfe();
        let mut records = constant_perturbation_records(&schedule, 6, 9.0, 5.0);
        for (i, r) in records.iter_mut().enumerate() {
            r.perturbation_energy += ((i * 31) % 11) as f64 * 0.4;
        }
        let mut incremental = IncrementalEstimator::new(estimator());
        incremental.extend(&records[..66]);
        incremental.estimate().unwrap();
        incremental.extend(&records[66..]);
        let warm = incremental.estimate().unwrap();
        let batch = estimator().estimate(&records).unwrap();
        assert_eq!(incremental.len(), records.len());
        assert!((warm.ddg - batch.ddg).abs() < 1e-6);
        assert!((warm.std_error - batch.std_error).abs() < 1e-6);
    }

    #[test]
    fn estimate_reads_from_a_store() {
        let schedule = AlchemicalSchedule::default_rbfe();
        let mut store = MemorySampleStore::new();
        store
            .append(&constant_perturbation_records(&schedule, 2, 10.0, 4.0))
            .unwrap();
        assert!(estimator().estimate_from_store(&store).is_ok());
    }
}
