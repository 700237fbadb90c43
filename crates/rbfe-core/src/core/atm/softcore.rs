use serde::{Deserialize, Serialize};

/// Parameters of the rational softcore transform applied to the perturbation
/// energy, which caps the otherwise unbounded energy of clashing configurations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SoftcoreParams {
    /// Asymptotic maximum of the transformed energy (kcal/mol).
    pub umax: f64,
    /// Shape exponent.
    pub acore: f64,
    /// Energy below which the transform is the identity (kcal/mol).
    pub ubcore: f64,
}

impl Default for SoftcoreParams {
    fn default() -> Self {
        Self {
            umax: 200.0,
            acore: 0.0625,
            ubcore: 100.0,
        }
    }
}

impl SoftcoreParams {
    pub fn validate(&self) -> Result<(), String> {
        if !(self.acore > 0.0) {
            return Err(format!("acore must be positive, got {}", self.acore));
        }
        if !(self.umax > self.ubcore) {
            return Err(format!(
                "umax ({}) must exceed ubcore ({})",
                self.umax, self.ubcore
            ));
        }
        Ok(())
    }

    pub fn apply(&self, u: f64) -> f64 {
        if u <= self.ubcore {
            return u;
        }
        let span = self.umax - self.ubcore;
        let y = (u - self.ubcore) / span;
        let ya = y / self.acore;
        let z = 1.0 + 2.0 * ya + 2.0 * ya * ya;
        let za = z.powf(self.acore);
        span * (za - 1.0) / (za + 1.0) + self.ubcore
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_below_the_core_threshold() {
        let sc = SoftcoreParams::default();
        assert_eq!(sc.apply(-35.0), -35.0);
        assert_eq!(sc.apply(100.0), 100.0);
    }

    #[test]
    fn bounded_and_monotonic_above_threshold() {
        let sc = SoftcoreParams::default();
        let mut previous = sc.apply(100.0);
        for u in [101.0, 150.0, 500.0, 1.0e4, 1.0e8] {
            let value = sc.apply(u);
            assert!(value > previous);
            assert!(value < sc.umax);
            previous = value;
        }
    }

    #[test]
    fn continuous_with_unit_slope_at_threshold() {
        let sc = SoftcoreParams::default();
        let h = 1e-6;
        let slope = (sc.apply(sc.ubcore + h) - sc.ubcore) / h;
        assert!((slope - 1.0).abs() < 1e-3);
    }

    #[test]
    fn validate_rejects_inverted_bounds() {
        let sc = SoftcoreParams {
            umax: 50.0,
            ..SoftcoreParams::default()
        };
        assert!(sc.validate().is_err());
        assert!(SoftcoreParams::default().validate().is_ok());
    }
}
