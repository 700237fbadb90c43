use serde::{Deserialize, Serialize};
use std::fmt;

/// Boltzmann constant in kcal/(mol·K).
pub const BOLTZMANN_KCAL: f64 = 0.001986209;

/// Direction of the alchemical leg a state belongs to.
///
/// Serialized as `1` (forward, A bound → intermediate) or `-1` (reverse,
/// B bound → intermediate), the convention of ATM output files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i8", try_from = "i8")]
pub enum Direction {
    Forward,
    Reverse,
}

impl From<Direction> for i8 {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Forward => 1,
            Direction::Reverse => -1,
        }
    }
}

impl TryFrom<i8> for Direction {
    type Error = String;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Direction::Forward),
            -1 => Ok(Direction::Reverse),
            other => Err(format!("invalid leg direction {other}, expected 1 or -1")),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", i8::from(*self))
    }
}

/// One thermodynamic state of the alchemical schedule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AtmState {
    pub lambda1: f64,
    pub lambda2: f64,
    pub alpha: f64,
    pub u0: f64,
    pub w0: f64,
    pub direction: Direction,
    pub temperature: f64,
}

impl AtmState {
    #[inline]
    pub fn beta(&self) -> f64 {
        1.0 / (BOLTZMANN_KCAL * self.temperature)
    }

    /// Integrated-logistic bias `W(u)`.
    ///
    /// `(λ2−λ1)/α · ln(1 + e^{−α(u−u0)}) + λ2·u + w0` for `α > 0`, linear otherwise.
    pub fn bias(&self, u: f64) -> f64 {
        let linear = self.lambda2 * u + self.w0;
        if self.alpha > 0.0 {
            (self.lambda2 - self.lambda1) / self.alpha * softplus(-self.alpha * (u - self.u0)) + linear
        } else {
            linear
        }
    }

    /// `dW/du`, the effective λ felt by the perturbation energy.
    pub fn bias_derivative(&self, u: f64) -> f64 {
        if self.alpha > 0.0 {
            (self.lambda2 - self.lambda1) * logistic(self.alpha * (u - self.u0)) + self.lambda1
        } else {
            self.lambda2
        }
    }

    /// Potential energy with this state's bias removed.
    #[inline]
    pub fn unbiased_energy(&self, potential_energy: f64, perturbation_energy: f64) -> f64 {
        potential_energy - self.bias(perturbation_energy)
    }

    /// Reduced (dimensionless) energy `β(E0 + W(u))` of a configuration with
    /// unbiased energy `e0` and perturbation energy `u` in this state.
    #[inline]
    pub fn reduced_energy(&self, e0: f64, u: f64) -> f64 {
        self.beta() * (e0 + self.bias(u))
    }
}

/// `ln(1 + e^x)` without overflow.
fn softplus(x: f64) -> f64 {
    if x > 0.0 {
        x + (-x).exp().ln_1p()
    } else {
        x.exp().ln_1p()
    }
}

/// `1 / (1 + e^{-x})` without overflow.
fn logistic(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(lambda1: f64, lambda2: f64, alpha: f64) -> AtmState {
        AtmState {
            lambda1,
            lambda2,
            alpha,
            u0: 110.0,
            w0: 0.0,
            direction: Direction::Forward,
            temperature: 300.0,
        }
    }

    fn reference_bias(s: &AtmState, u: f64) -> f64 {
        let mut b = s.lambda2 * u + s.w0;
        if s.alpha > 0.0 {
            b += (s.lambda2 - s.lambda1) * (1.0 + (-s.alpha * (u - s.u0)).exp()).ln() / s.alpha;
        }
        b
    }

    #[test]
    fn bias_matches_direct_formula_in_normal_range() {
        let s = state(0.1, 0.5, 0.1);
        for u in [-50.0, 0.0, 42.0, 110.0, 180.0] {
            assert!((s.bias(u) - reference_bias(&s, u)).abs() < 1e-9, "u = {u}");
        }
    }

    #[test]
    fn bias_is_finite_for_extreme_perturbation_energies() {
        let s = state(0.0, 0.5, 0.1);
        assert!(s.bias(-1.0e5).is_finite());
        assert!(s.bias(1.0e5).is_finite());
        assert!(s.bias_derivative(-1.0e5).abs() < 1e-12);
        assert!((s.bias_derivative(1.0e5) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn derivative_matches_finite_difference() {
        let s = state(0.2, 0.5, 0.1);
        let h = 1e-5;
        for u in [30.0, 110.0, 150.0] {
            let numeric = (s.bias(u + h) - s.bias(u - h)) / (2.0 * h);
            assert!((numeric - s.bias_derivative(u)).abs() < 1e-6);
        }
    }

    #[test]
    fn zero_alpha_reduces_to_linear_bias() {
        let s = state(0.3, 0.4, 0.0);
        assert_eq!(s.bias(10.0), 4.0);
        assert_eq!(s.bias_derivative(10.0), 0.4);
    }

    #[test]
    fn reduced_energy_scales_with_beta() {
        let s = state(0.0, 0.0, 0.1);
        let beta = 1.0 / (BOLTZMANN_KCAL * 300.0);
        assert!((s.reduced_energy(-100.0, 5.0) - beta * -100.0).abs() < 1e-9);
        assert!((s.unbiased_energy(-100.0, 5.0) + 100.0).abs() < 1e-12);
    }

    #[test]
    fn direction_serializes_as_signed_integer() {
        assert_eq!(i8::from(Direction::Reverse), -1);
        assert_eq!(Direction::try_from(1), Ok(Direction::Forward));
        assert!(Direction::try_from(0).is_err());
        assert_eq!(Direction::Reverse.to_string(), "-1");
    }
}
