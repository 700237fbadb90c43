use crate::core::atm::AlchemicalSchedule;
use crate::core::io::store::SampleRecord;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Metropolis acceptance probability `min(1, exp(−Δ))`.
pub fn acceptance_probability(delta: f64) -> f64 {
    if delta.is_nan() {
        0.0
    } else if delta <= 0.0 {
        1.0
    } else {
        (-delta).exp()
    }
}

/// Reduced-energy change of swapping the states of two samples.
///
/// `x_i` was sampled in state `a`, `x_j` in state `b`:
/// `Δ = u_a(x_j) + u_b(x_i) − u_a(x_i) − u_b(x_j)`.
///
/// Each sample's perturbation energy is reused in the other state, also
/// across the two intermediates where the legs meet. That holds because a
/// validated schedule gives both intermediates identical parameters, which
/// makes `Δ` vanish for that pair.
pub fn exchange_delta(schedule: &AlchemicalSchedule, x_i: &SampleRecord, x_j: &SampleRecord) -> f64 {
    let states = schedule.states();
    let a = &states[x_i.state_index];
    let b = &states[x_j.state_index];
    x_j.reduced_energy_in(a) + x_i.reduced_energy_in(b)
        - x_i.reduced_energy_in(a)
        - x_j.reduced_energy_in(b)
}

/// Attempt and acceptance counts per adjacent state pair `(k, k + 1)`,
/// indexed by `k`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExchangeStats {
    attempts: Vec<u64>,
    accepted: Vec<u64>,
}

impl ExchangeStats {
    pub fn new(n_states: usize) -> Self {
        let pairs = n_states.saturating_sub(1);
        Self {
            attempts: vec![0; pairs],
            accepted: vec![0; pairs],
        }
    }

    fn record(&mut self, lower: usize, accepted: bool) {
        if lower >= self.attempts.len() {
            self.attempts.resize(lower + 1, 0);
            self.accepted.resize(lower + 1, 0);
        }
        self.attempts[lower] += 1;
        if accepted {
            self.accepted[lower] += 1;
        }
    }

    pub fn attempts(&self, lower: usize) -> u64 {
        self.attempts.get(lower).copied().unwrap_or(0)
    }

    pub fn accepted(&self, lower: usize) -> u64 {
        self.accepted.get(lower).copied().unwrap_or(0)
    }

    /// Fraction of accepted swaps between `lower` and `lower + 1`.
    pub fn acceptance_ratio(&self, lower: usize) -> Option<f64> {
        match self.attempts(lower) {
            0 => None,
            n => Some(self.accepted(lower) as f64 / n as f64),
        }
    }

    pub fn total_attempts(&self) -> u64 {
        self.attempts.iter().sum()
    }

    pub fn total_accepted(&self) -> u64 {
        self.accepted.iter().sum()
    }

    pub fn pairs(&self) -> usize {
        self.attempts.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExchangeOutcome {
    pub lower_state: usize,
    pub replicas: (usize, usize),
    pub probability: f64,
    pub accepted: bool,
}

/// Attempts one sweep of neighbour exchanges over the pairs of the given
/// parity.
///
/// `permutation[r]` is the state of replica `r`; `records[r]` is its sample
/// of the current cycle, `None` if it produced none. Pairs involving a
/// replica without a sample are skipped. Accepted swaps exchange the two
/// entries of `permutation`.
pub fn attempt_exchanges<R: Rng + ?Sized>(
    schedule: &AlchemicalSchedule,
    permutation: &mut [usize],
    records: &[Option<SampleRecord>],
    parity: usize,
    rng: &mut R,
    stats: &mut ExchangeStats,
) -> Vec<ExchangeOutcome> {
    let mut occupant = vec![None; schedule.len()];
    for (replica, &state) in permutation.iter().enumerate() {
        if let Some(slot) = occupant.get_mut(state) {
            *slot = Some(replica);
        }
    }

    let mut outcomes = Vec::new();
    for (lower, upper) in schedule.neighbor_pairs(parity) {
        let (Some(ri), Some(rj)) = (occupant[lower], occupant[upper]) else {
            continue;
        };
        let (Some(xi), Some(xj)) = (
            records.get(ri).and_then(Option::as_ref),
            records.get(rj).and_then(Option::as_ref),
        ) else {
            continue;
        };

        let delta = exchange_delta(schedule, xi, xj);
        let probability = acceptance_probability(delta);
        let accepted = rng.gen_range(0.0..1.0) < probability;
        if accepted {
            permutation[ri] = upper;
            permutation[rj] = lower;
            occupant[lower] = Some(rj);
            occupant[upper] = Some(ri);
        }
        stats.record(lower, accepted);
        trace!(lower, ri, rj, delta, accepted, "Exchange attempt");
        outcomes.push(ExchangeOutcome {
            lower_state: lower,
            replicas: (ri, rj),
            probability,
            accepted,
        });
    }
    outcomes
}
