//! Unbinned weighted histogram analysis (UWHAM).
//!
//! Given `N` pooled samples and their log unnormalized densities in `M`
//! states (the negative reduced energies), estimates the log normalizing
//! constant `ze` of every state relative to a baseline state together with
//! Fisher-information variances. Equivalent to MBAR.

use nalgebra::{DMatrix, DVector};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum UwhamError {
    #[error("Sample matrix has {rows} rows but the state sizes sum to {total}")]
    InconsistentSizes { rows: usize, total: usize },
    #[error("Sample matrix has {columns} columns but {states} state sizes were given")]
    InconsistentStates { columns: usize, states: usize },
    #[error("No state has samples")]
    NoSamples,
    #[error("Sample matrix contains non-finite log densities")]
    NonFinite,
    #[error(
        "Newton iterations did not converge after {iterations} steps (gradient {gradient_norm:e})"
    )]
    NotConverged {
        iterations: usize,
        gradient_norm: f64,
    },
    #[error("Information matrix is singular; variances are undefined")]
    SingularInformation,
}

/// Self-consistent sweeps used to build a cold starting point.
const START_SWEEPS: usize = 50;

/// Initial, smallest and largest trust radius (∞-norm, in units of kT).
const INITIAL_RADIUS: f64 = 1.0;
const MIN_RADIUS: f64 = 1e-10;
const MAX_RADIUS: f64 = 1e3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UwhamOptions {
    pub max_iterations: usize,
    /// Convergence threshold on the largest gradient component.
    pub tolerance: f64,
}

impl Default for UwhamOptions {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            tolerance: 1e-9,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UwhamSolution {
    /// Log normalizing constants, zero at `base`.
    pub ze: DVector<f64>,
    /// Variances of `ze`, zero at `base`.
    pub ve: DVector<f64>,
    pub base: usize,
    pub iterations: usize,
}

/// Solves the UWHAM equations.
///
/// # Arguments
///
/// * `log_q` - `N × M` matrix; row `n` holds the log unnormalized density of
///   sample `n` in each state.
/// * `sizes` - Number of samples drawn from each state; must sum to `N`.
/// * `init` - Optional starting values for `ze` (length `M`), e.g. from a
///   previous solve on fewer samples.
///
/// The baseline is the first state with samples.
///
/// # Errors
///
/// Returns [`UwhamError`] for inconsistent inputs, when Newton iterations fail
/// to converge, or when the information matrix cannot be inverted.
pub fn solve(
    log_q: &DMatrix<f64>,
    sizes: &[usize],
    init: Option<&DVector<f64>>,
    options: &UwhamOptions,
) -> Result<UwhamSolution, UwhamError> {
    let (n, m) = log_q.shape();
    if sizes.len() != m {
        return Err(UwhamError::InconsistentStates {
            columns: m,
            states: sizes.len(),
        });
    }
    let total: usize = sizes.iter().sum();
    if total != n {
        return Err(UwhamError::InconsistentSizes { rows: n, total });
    }
    let sampled: Vec<usize> = (0..m).filter(|&j| sizes[j] > 0).collect();
    let Some(&base) = sampled.first() else {
        return Err(UwhamError::NoSamples);
    };
    if log_q.iter().any(|v| !v.is_finite()) {
        return Err(UwhamError::NonFinite);
    }

    let shifted = DMatrix::from_fn(n, m, |row, col| log_q[(row, col)] - log_q[(row, base)]);
    let rho: Vec<f64> = sampled.iter().map(|&j| sizes[j] as f64 / n as f64).collect();
    let objective = Objective {
        log_q: &shifted,
        sampled: &sampled,
        log_rho: rho.iter().map(|r| r.ln()).collect(),
        rho,
    };

    let start = match init {
        Some(z) => DVector::from_iterator(
            sampled.len() - 1,
            sampled[1..].iter().map(|&j| z[j] - z[base]),
        ),
        None => objective.self_consistent_start(START_SWEEPS),
    };
    let (free, iterations) = objective.minimize(start, options)?;

    let mut ze = DVector::zeros(m);
    for (k, &j) in sampled.iter().enumerate().skip(1) {
        ze[j] = free[k - 1];
    }

    let log_norm: Vec<f64> = (0..n)
        .map(|row| {
            log_sum_exp(
                sampled
                    .iter()
                    .zip(&objective.log_rho)
                    .map(|(&j, lr)| shifted[(row, j)] - ze[j] + lr),
            )
        })
        .collect();

    // Unsampled states: ze from the mean weight, then weights renormalized.
    let mut log_w = DMatrix::from_fn(n, m, |row, col| shifted[(row, col)] - ze[col] - log_norm[row]);
    for j in (0..m).filter(|&j| sizes[j] == 0) {
        let column: Vec<f64> = log_w.column(j).iter().copied().collect();
        let log_z = log_sum_exp(column.iter().copied()) - (n as f64).ln();
        ze[j] = log_z;
        log_w.column_mut(j).add_scalar_mut(-log_z);
    }
    let w = log_w.map(f64::exp);

    let ve = fisher_variances(&w, sizes, base)?;
    Ok(UwhamSolution {
        ze,
        ve,
        base,
        iterations,
    })
}

/// Diagonal of the Fisher-information covariance of `ze`.
fn fisher_variances(w: &DMatrix<f64>, sizes: &[usize], base: usize) -> Result<DVector<f64>, UwhamError> {
    let (n, m) = w.shape();
    let mut ve = DVector::zeros(m);
    if m == 1 {
        return Ok(ve);
    }
    let nf = n as f64;
    let o = w.transpose() * w / nf;

    let mut d = DMatrix::zeros(m, m);
    for j in (0..m).filter(|&j| sizes[j] > 0) {
        let rho = sizes[j] as f64 / nf;
        for i in 0..m {
            d[(i, j)] = o[(i, j)] * rho;
        }
    }
    let h = (d - DMatrix::identity(m, m))
        .remove_row(base)
        .remove_column(base);
    let mut ihg = DMatrix::from_fn(m, m, |i, j| -o[(i, j)] + o[(base, j)]);
    ihg = ihg.remove_row(base).remove_column(base);

    let h_t_inv = h
        .transpose()
        .try_inverse()
        .ok_or(UwhamError::SingularInformation)?;
    let cov = ihg * h_t_inv / nf;

    for (k, j) in (0..m).filter(|&j| j != base).enumerate() {
        ve[j] = cov[(k, k)];
    }
    Ok(ve)
}

struct Objective<'a> {
    log_q: &'a DMatrix<f64>,
    sampled: &'a [usize],
    rho: Vec<f64>,
    log_rho: Vec<f64>,
}

impl Objective<'_> {
    /// Full `ze` over sampled states; the baseline (first) is pinned to zero.
    fn expand(&self, free: &DVector<f64>) -> Vec<f64> {
        std::iter::once(0.0).chain(free.iter().copied()).collect()
    }

    fn value(&self, free: &DVector<f64>) -> f64 {
        let ze = self.expand(free);
        let n = self.log_q.nrows();
        let sum: f64 = (0..n).map(|row| log_sum_exp(self.terms(row, &ze))).sum();
        sum / n as f64 + ze.iter().zip(&self.rho).map(|(z, r)| z * r).sum::<f64>()
    }

    fn terms<'b>(&'b self, row: usize, ze: &'b [f64]) -> impl Iterator<Item = f64> + Clone + 'b {
        self.sampled
            .iter()
            .zip(ze)
            .zip(&self.log_rho)
            .map(move |((&j, z), lr)| self.log_q[(row, j)] - z + lr)
    }

    fn gradient_hessian(&self, free: &DVector<f64>) -> (DVector<f64>, DMatrix<f64>) {
        let ze = self.expand(free);
        let n = self.log_q.nrows();
        let k = free.len();
        let mut column_sums: DVector<f64> = DVector::zeros(k);
        let mut outer: DMatrix<f64> = DMatrix::zeros(k, k);
        let mut weights: DVector<f64> = DVector::zeros(k);
        for row in 0..n {
            let terms: Vec<f64> = self.terms(row, &ze).collect();
            let norm = log_sum_exp(terms.iter().copied());
            for (slot, t) in terms[1..].iter().enumerate() {
                weights[slot] = (t - norm).exp();
            }
            column_sums += &weights;
            outer.ger(1.0, &weights, &weights, 1.0);
        }
        let nf = n as f64;
        let rho_free = DVector::from_iterator(k, self.rho[1..].iter().copied());
        let gradient = rho_free - &column_sums / nf;
        let hessian = DMatrix::from_diagonal(&(column_sums / nf)) - outer / nf;
        (gradient, hessian)
    }

    /// Fixed-point iteration of the UWHAM equations,
    /// `e^{ze_j} = 1/N Σ_n q_j(x_n) / Σ_k ρ_k q_k(x_n) e^{-ze_k}`.
    ///
    /// Used as the cold starting point; stable when neighbouring states
    /// differ by many kT.
    fn self_consistent_start(&self, sweeps: usize) -> DVector<f64> {
        let n = self.log_q.nrows();
        let log_n = (n as f64).ln();
        let mut ze = vec![0.0; self.sampled.len()];
        for _ in 0..sweeps {
            let norms: Vec<f64> = (0..n).map(|row| log_sum_exp(self.terms(row, &ze))).collect();
            let mut next: Vec<f64> = self
                .sampled
                .iter()
                .map(|&j| log_sum_exp((0..n).map(|row| self.log_q[(row, j)] - norms[row])) - log_n)
                .collect();
            let pin = next[0];
            next.iter_mut().for_each(|z| *z -= pin);
            let change = next
                .iter()
                .zip(&ze)
                .map(|(a, b)| (a - b).abs())
                .fold(0.0, f64::max);
            ze = next;
            if change < 1e-3 {
                break;
            }
        }
        DVector::from_iterator(ze.len() - 1, ze[1..].iter().copied())
    }

    /// Trust-region Newton iterations; each step is capped in ∞-norm by a
    /// radius that follows the agreement between the quadratic model and
    /// the objective.
    fn minimize(
        &self,
        mut x: DVector<f64>,
        options: &UwhamOptions,
    ) -> Result<(DVector<f64>, usize), UwhamError> {
        if x.is_empty() {
            return Ok((x, 0));
        }
        let mut f = self.value(&x);
        let mut radius = INITIAL_RADIUS;
        for iteration in 0..options.max_iterations {
            let (gradient, hessian) = self.gradient_hessian(&x);
            let gradient_norm = gradient.amax();
            if gradient_norm < options.tolerance {
                return Ok((x, iteration));
            }

            let mut step = newton_step(&hessian, &gradient);
            let length = step.amax();
            let on_boundary = length > radius;
            if on_boundary {
                step *= radius / length;
            }

            // Minimization moves along -step.
            let predicted = gradient.dot(&step) - 0.5 * step.dot(&(&hessian * &step));
            let trial = &x - &step;
            let ft = self.value(&trial);
            let actual = f - ft;
            let noise = 1e-12 * (1.0 + f.abs());

            let accept = if predicted <= noise {
                // Inside the rounding floor of the objective: trust the
                // quadratic model when the step is a full Newton step.
                let accept = !on_boundary && actual > -noise;
                if !accept {
                    radius = 0.25 * step.amax();
                }
                accept
            } else {
                let ratio = actual / predicted;
                if ratio < 0.25 {
                    radius = 0.25 * step.amax();
                } else if ratio > 0.75 && on_boundary {
                    radius = (2.0 * radius).min(MAX_RADIUS);
                }
                ratio > 1e-4
            };

            if accept {
                x = trial;
                f = ft;
            } else if radius < MIN_RADIUS || (predicted <= noise && on_boundary) {
                // No measurable progress left.
                if gradient_norm < options.tolerance.sqrt() {
                    return Ok((x, iteration));
                }
                return Err(UwhamError::NotConverged {
                    iterations: iteration,
                    gradient_norm,
                });
            }
        }
        let (gradient, _) = self.gradient_hessian(&x);
        Err(UwhamError::NotConverged {
            iterations: options.max_iterations,
            gradient_norm: gradient.amax(),
        })
    }
}

/// Solves `H s = g`, adding diagonal damping until `H` is positive definite.
fn newton_step(hessian: &DMatrix<f64>, gradient: &DVector<f64>) -> DVector<f64> {
    let k = hessian.nrows();
    let scale = hessian.diagonal().amax().max(f64::MIN_POSITIVE);
    let mut damping = 0.0;
    loop {
        let damped = hessian + DMatrix::identity(k, k) * damping;
        if let Some(cholesky) = damped.cholesky() {
            return cholesky.solve(gradient);
        }
        damping = if damping == 0.0 {
            scale * 1e-10
        } else {
            damping * 10.0
        };
        if damping > scale * 1e6 {
            return gradient / scale;
        }
    }
}

pub(crate) fn log_sum_exp(values: impl Iterator<Item = f64> + Clone) -> f64 {
    let max = values.clone().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + values.map(|v| (v - max).exp()).sum::<f64>().ln()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// States whose energies differ from state 0 by constant offsets have
    /// exactly known free energies regardless of the samples.
    fn offset_states(samples: &[f64], offsets: &[f64]) -> DMatrix<f64> {
        DMatrix::from_fn(samples.len(), offsets.len(), |row, col| {
            -(0.5 * samples[row] * samples[row] + offsets[col])
        })
    }

    #[test]
    fn recovers_constant_offsets_exactly() {
        let samples: Vec<f64> = (0..60).map(|i| (i as f64 * 0.37).sin() * 2.0).collect();
        let offsets = [0.0, 1.5, -0.75];
        let log_q = offset_states(&samples, &offsets);
        let solution = solve(&log_q, &[20, 25, 15], None, &UwhamOptions::default()).unwrap();

        assert_eq!(solution.base, 0);
        for (j, offset) in offsets.iter().enumerate() {
            assert!((solution.ze[j] + offset).abs() < 1e-7, "state {j}: {}", solution.ze[j]);
        }
        assert_eq!(solution.ve[0], 0.0);
    }

    #[test]
    fn widely_separated_offsets_converge() {
        // Neighbouring states 9.23 kT apart, like one leg of the default schedule.
        let samples: Vec<f64> = (0..110).map(|i| (i as f64 * 0.29).sin() * 1.5).collect();
        let offsets: Vec<f64> = (0..11).map(|j| 9.23 * j as f64).collect();
        let log_q = offset_states(&samples, &offsets);
        let solution = solve(&log_q, &[10; 11], None, &UwhamOptions::default()).unwrap();
        for (j, offset) in offsets.iter().enumerate() {
            assert!((solution.ze[j] + offset).abs() < 1e-6, "state {j}: {}", solution.ze[j]);
        }

        let offsets = [0.0, 40.0, 90.0];
        let log_q = offset_states(&samples[..60], &offsets);
        let solution = solve(&log_q, &[20, 20, 20], None, &UwhamOptions::default()).unwrap();
        for (j, offset) in offsets.iter().enumerate() {
            assert!((solution.ze[j] + offset).abs() < 1e-6, "state {j}: {}", solution.ze[j]);
        }
    }

    #[test]
    fn trust_region_newton_converges_from_a_cold_start() {
        let samples: Vec<f64> = (0..60).map(|i| (i as f64 * 0.41).cos()).collect();
        let log_q = offset_states(&samples, &[0.0, 40.0, 90.0]);
        let shifted = DMatrix::from_fn(60, 3, |row, col| log_q[(row, col)] - log_q[(row, 0)]);
        let sampled = [0, 1, 2];
        let rho = vec![1.0 / 3.0; 3];
        let objective = Objective {
            log_q: &shifted,
            sampled: &sampled,
            log_rho: rho.iter().map(|r: &f64| r.ln()).collect(),
            rho,
        };

        let (free, iterations) = objective
            .minimize(DVector::zeros(2), &UwhamOptions::default())
            .unwrap();
        assert!(iterations > 1);
        assert!((free[0] + 40.0).abs() < 1e-6, "ze[1] = {}", free[0]);
        assert!((free[1] + 90.0).abs() < 1e-6, "ze[2] = {}", free[1]);
    }

    #[test]
    fn overlapping_states_are_refined_from_the_self_consistent_start() {
        // Harmonic wells of different stiffness: no constant offset, so the
        // fixed-point start is only approximate and Newton finishes the job.
        let xs: Vec<f64> = (0..90).map(|i| (i as f64 * 0.173).sin() * 2.0).collect();
        let springs = [1.0, 2.5, 6.0];
        let log_q = DMatrix::from_fn(xs.len(), 3, |row, col| {
            -0.5 * springs[col] * xs[row] * xs[row] - 30.0 * col as f64
        });
        let sizes = [30, 30, 30];
        let cold = solve(&log_q, &sizes, None, &UwhamOptions::default()).unwrap();
        let warm = solve(&log_q, &sizes, Some(&cold.ze), &UwhamOptions::default()).unwrap();
        assert!((&warm.ze - &cold.ze).amax() < 1e-8);
        assert!(cold.ze[2] < cold.ze[1] && cold.ze[1] < 0.0);
    }

    #[test]
    fn unsampled_states_are_estimated_by_reweighting() {
        let samples: Vec<f64> = (0..40).map(|i| (i as f64 * 0.91).cos()).collect();
        let offsets = [0.0, 2.0, 0.5];
        let log_q = offset_states(&samples, &offsets);
        let solution = solve(&log_q, &[30, 0, 10], None, &UwhamOptions::default()).unwrap();
        assert!((solution.ze[1] + 2.0).abs() < 1e-7);
        assert!((solution.ze[2] + 0.5).abs() < 1e-7);
    }

    #[test]
    fn harmonic_free_energy_matches_analytic_value() {
        // u_k(x) = k x² / 2 with k = 1 and 4; ΔF = ½ ln(4).
        let mut rng = StdRng::seed_from_u64(7);
        let mut gaussian = |sigma: f64| {
            let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
            let u2: f64 = rng.gen_range(0.0..1.0);
            sigma * (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
        };
        let springs = [1.0, 4.0];
        let per_state = 4000;
        let mut xs = Vec::new();
        for k in springs {
            for _ in 0..per_state {
                xs.push(gaussian(1.0 / f64::sqrt(k)));
            }
        }
        let log_q = DMatrix::from_fn(xs.len(), 2, |row, col| -0.5 * springs[col] * xs[row] * xs[row]);
        let solution = solve(&log_q, &[per_state, per_state], None, &UwhamOptions::default()).unwrap();

        let delta_f = -solution.ze[1];
        let expected = 0.5 * 4.0_f64.ln();
        let sigma = solution.ve[1].sqrt();
        assert!(sigma > 0.0 && sigma < 0.05, "sigma = {sigma}");
        assert!((delta_f - expected).abs() < 5.0 * sigma + 1e-3, "ΔF = {delta_f}");
    }

    #[test]
    fn warm_start_reaches_the_same_solution() {
        let samples: Vec<f64> = (0..50).map(|i| (i as f64 * 0.53).sin()).collect();
        let log_q = DMatrix::from_fn(samples.len(), 3, |row, col| {
            -(col as f64 + 1.0) * samples[row] * samples[row]
        });
        let sizes = [20, 20, 10];
        let cold = solve(&log_q, &sizes, None, &UwhamOptions::default()).unwrap();
        let warm = solve(&log_q, &sizes, Some(&cold.ze), &UwhamOptions::default()).unwrap();
        assert!(warm.iterations <= 1);
        assert!((&warm.ze - &cold.ze).amax() < 1e-8);
    }

    #[test]
    fn rejects_inconsistent_inputs() {
        let log_q = DMatrix::zeros(4, 2);
        assert_eq!(
            solve(&log_q, &[1, 2], None, &UwhamOptions::default()),
            Err(UwhamError::InconsistentSizes { rows: 4, total: 3 })
        );
        assert_eq!(
            solve(&log_q, &[4], None, &UwhamOptions::default()),
            Err(UwhamError::InconsistentStates {
                columns: 2,
                states: 1
            })
        );
        assert_eq!(
            solve(&DMatrix::zeros(0, 2), &[0, 0], None, &UwhamOptions::default()),
            Err(UwhamError::NoSamples)
        );
    }

    #[test]
    fn log_sum_exp_is_stable() {
        let v = [1000.0, 1000.0];
        assert!((log_sum_exp(v.iter().copied()) - (1000.0 + 2.0_f64.ln())).abs() < 1e-12);
        assert_eq!(log_sum_exp(std::iter::empty::<f64>()), f64::NEG_INFINITY);
    }
}
