use super::state::{AtmState, Direction};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ScheduleError {
    #[error("Alchemical schedule has no states")]
    Empty,
    #[error("State {index} has a non-finite parameter")]
    NonFinite { index: usize },
    #[error("State {index} has non-positive temperature {temperature} K")]
    NonPositiveTemperature { index: usize, temperature: f64 },
    #[error("State {index} has negative alpha {alpha}")]
    NegativeAlpha { index: usize, alpha: f64 },
    #[error("State {index} is a forward-leg state after the reverse leg started")]
    InterleavedLegs { index: usize },
    #[error("Schedule needs at least one forward and one reverse state")]
    MissingLeg,
    #[error("Intermediates {forward} and {reverse} must share every state parameter but the direction")]
    AsymmetricIntermediates { forward: usize, reverse: usize },
}

/// Ordered list of thermodynamic states.
///
/// Forward-leg states come first (starting at the A-bound end state), reverse
/// states follow and end at the B-bound end state. The last forward state and
/// the first reverse state are the two intermediates; they describe the same
/// thermodynamic state, so their parameters must agree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<AtmState>", into = "Vec<AtmState>")]
pub struct AlchemicalSchedule {
    states: Vec<AtmState>,
}

impl TryFrom<Vec<AtmState>> for AlchemicalSchedule {
    type Error = ScheduleError;

    fn try_from(states: Vec<AtmState>) -> Result<Self, Self::Error> {
        Self::new(states)
    }
}

impl From<AlchemicalSchedule> for Vec<AtmState> {
    fn from(schedule: AlchemicalSchedule) -> Self {
        schedule.states
    }
}

// Standard 22-state RBFE schedule.
const DEFAULT_LAMBDA1: [f64; 22] = [
    0.00, 0.00, 0.00, 0.00, 0.00, 0.00, 0.10, 0.20, 0.30, 0.40, 0.50, 0.50, 0.40, 0.30, 0.20,
    0.10, 0.00, 0.00, 0.00, 0.00, 0.00, 0.00,
];
const DEFAULT_LAMBDA2: [f64; 22] = [
    0.00, 0.10, 0.20, 0.30, 0.40, 0.50, 0.50, 0.50, 0.50, 0.50, 0.50, 0.50, 0.50, 0.50, 0.50,
    0.50, 0.50, 0.40, 0.30, 0.20, 0.10, 0.00,
];
const DEFAULT_ALPHA: f64 = 0.10;
const DEFAULT_U0: f64 = 110.0;
const DEFAULT_TEMPERATURE: f64 = 300.0;

impl AlchemicalSchedule {
    pub fn new(states: Vec<AtmState>) -> Result<Self, ScheduleError> {
        let schedule = Self { states };
        schedule.validate()?;
        Ok(schedule)
    }

    pub fn default_rbfe() -> Self {
        Self::symmetric(&DEFAULT_LAMBDA1, &DEFAULT_LAMBDA2, DEFAULT_TEMPERATURE)
    }

    /// Same lambda path as [`default_rbfe`](Self::default_rbfe) at another temperature.
    pub fn default_rbfe_at(temperature: f64) -> Self {
        Self::symmetric(&DEFAULT_LAMBDA1, &DEFAULT_LAMBDA2, temperature)
    }

    fn symmetric(lambda1: &[f64], lambda2: &[f64], temperature: f64) -> Self {
        let n = lambda1.len();
        let half = n / 2;
        let states = lambda1
            .iter()
            .zip(lambda2)
            .enumerate()
            .map(|(i, (&l1, &l2))| {
                let intermediate = i + 1 == half || i == half;
                AtmState {
                    lambda1: l1,
                    lambda2: l2,
                    alpha: DEFAULT_ALPHA,
                    u0: DEFAULT_U0,
                    w0: if intermediate { 1.0 } else { 0.0 },
                    direction: if i < half {
                        Direction::Forward
                    } else {
                        Direction::Reverse
                    },
                    temperature,
                }
            })
            .collect();
        Self { states }
    }

    pub fn validate(&self) -> Result<(), ScheduleError> {
        if self.states.is_empty() {
            return Err(ScheduleError::Empty);
        }
        let mut reverse_started = false;
        for (index, s) in self.states.iter().enumerate() {
            let finite = [s.lambda1, s.lambda2, s.alpha, s.u0, s.w0, s.temperature]
                .iter()
                .all(|v| v.is_finite());
            if !finite {
                return Err(ScheduleError::NonFinite { index });
            }
            if s.temperature <= 0.0 {
                return Err(ScheduleError::NonPositiveTemperature {
                    index,
                    temperature: s.temperature,
                });
            }
            if s.alpha < 0.0 {
                return Err(ScheduleError::NegativeAlpha {
                    index,
                    alpha: s.alpha,
                });
            }
            match s.direction {
                Direction::Reverse => reverse_started = true,
                Direction::Forward if reverse_started => {
                    return Err(ScheduleError::InterleavedLegs { index });
                }
                Direction::Forward => {}
            }
        }
        if !reverse_started || self.states[0].direction != Direction::Forward {
            return Err(ScheduleError::MissingLeg);
        }
        let (forward, reverse) = self.intermediates();
        let (f, r) = (&self.states[forward], &self.states[reverse]);
        let same = [
            (f.lambda1, r.lambda1),
            (f.lambda2, r.lambda2),
            (f.alpha, r.alpha),
            (f.u0, r.u0),
            (f.w0, r.w0),
            (f.temperature, r.temperature),
        ]
        .iter()
        .all(|(a, b)| a == b);
        if !same {
            return Err(ScheduleError::AsymmetricIntermediates { forward, reverse });
        }
        Ok(())
    }

    pub fn states(&self) -> &[AtmState] {
        &self.states
    }

    pub fn state(&self, index: usize) -> Option<&AtmState> {
        self.states.get(index)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Index of the first reverse-leg state.
    fn reverse_start(&self) -> usize {
        self.states
            .iter()
            .position(|s| s.direction == Direction::Reverse)
            .unwrap_or(self.states.len())
    }

    /// Indices of the two intermediate states.
    pub fn intermediates(&self) -> (usize, usize) {
        let start = self.reverse_start();
        (start.saturating_sub(1), start)
    }

    /// Forward leg from the A-bound end state to the first intermediate.
    pub fn leg1(&self) -> Vec<usize> {
        (0..self.reverse_start()).collect()
    }

    /// Reverse leg from the B-bound end state back to the second intermediate.
    pub fn leg2(&self) -> Vec<usize> {
        (self.reverse_start()..self.states.len()).rev().collect()
    }

    /// Adjacent schedule positions `(k, k+1)` with `k` of the given parity.
    pub fn neighbor_pairs(&self, parity: usize) -> Vec<(usize, usize)> {
        (parity % 2..self.states.len().saturating_sub(1))
            .step_by(2)
            .map(|k| (k, k + 1))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_has_two_symmetric_legs() {
        let schedule = AlchemicalSchedule::default_rbfe();
        assert_eq!(schedule.len(), 22);
        assert!(schedule.validate().is_ok());
        assert_eq!(schedule.intermediates(), (10, 11));
        assert_eq!(schedule.leg1(), (0..=10).collect::<Vec<_>>());
        assert_eq!(schedule.leg2(), (11..22).rev().collect::<Vec<_>>());

        let s = schedule.states();
        assert_eq!((s[0].lambda1, s[0].lambda2), (0.0, 0.0));
        assert_eq!((s[21].lambda1, s[21].lambda2), (0.0, 0.0));
        assert_eq!((s[10].lambda1, s[10].lambda2, s[10].w0), (0.5, 0.5, 1.0));
        assert_eq!(s[11].direction, Direction::Reverse);
        assert_eq!(s[5].w0, 0.0);
    }

    #[test]
    fn neighbor_pairs_alternate_parity() {
        let schedule = AlchemicalSchedule::default_rbfe();
        let even = schedule.neighbor_pairs(0);
        let odd = schedule.neighbor_pairs(1);
        assert_eq!(even.first(), Some(&(0, 1)));
        assert_eq!(even.last(), Some(&(20, 21)));
        assert_eq!(even.len(), 11);
        assert_eq!(odd.first(), Some(&(1, 2)));
        assert_eq!(odd.last(), Some(&(19, 20)));
        assert_eq!(odd.len(), 10);
    }

    #[test]
    fn validate_rejects_malformed_states() {
        let mut states = AlchemicalSchedule::default_rbfe().states().to_vec();
        states[3].temperature = 0.0;
        assert!(matches!(
            AlchemicalSchedule::new(states),
            Err(ScheduleError::NonPositiveTemperature { index: 3, .. })
        ));

        let mut states = AlchemicalSchedule::default_rbfe().states().to_vec();
        states[15].direction = Direction::Forward;
        assert_eq!(
            AlchemicalSchedule::new(states),
            Err(ScheduleError::InterleavedLegs { index: 15 })
        );

        let mut states = AlchemicalSchedule::default_rbfe().states().to_vec();
        states.truncate(11);
        assert_eq!(
            AlchemicalSchedule::new(states),
            Err(ScheduleError::MissingLeg)
        );

        assert_eq!(AlchemicalSchedule::new(vec![]), Err(ScheduleError::Empty));
    }

    #[test]
    fn intermediates_must_match() {
        let edits: [fn(&mut AtmState); 4] = [
            |s| s.lambda1 = 0.45,
            |s| s.lambda2 = 0.55,
            |s| s.w0 = 0.0,
            |s| s.temperature = 310.0,
        ];
        for edit in edits {
            let mut states = AlchemicalSchedule::default_rbfe().states().to_vec();
            edit(&mut states[11]);
            assert_eq!(
                AlchemicalSchedule::new(states),
                Err(ScheduleError::AsymmetricIntermediates {
                    forward: 10,
                    reverse: 11
                })
            );
        }

        // End states may differ freely.
        let mut states = AlchemicalSchedule::default_rbfe().states().to_vec();
        states[21].w0 = 2.0;
        assert!(AlchemicalSchedule::new(states).is_ok());
    }

    #[test]
    fn schedule_round_trips_through_toml() {
        #[derive(Serialize, Deserialize)]
        struct Wrapper {
            schedule: AlchemicalSchedule,
        }
        let original = AlchemicalSchedule::default_rbfe_at(298.0);
        let text = toml::to_string(&Wrapper {
            schedule: original.clone(),
        })
        .unwrap();
        let parsed: Wrapper = toml::from_str(&text).unwrap();
        assert_eq!(parsed.schedule, original);
    }
}
