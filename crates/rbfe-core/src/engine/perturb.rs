use super::simulation::Configuration;
use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Deterministic RNG for one retry, independent of dispatch order.
pub(crate) fn retry_rng(seed: u64, cycle: u64, replica: usize, attempt: u32) -> StdRng {
    let mut h = seed ^ 0x9E37_79B9_7F4A_7C15;
    for v in [cycle, replica as u64, u64::from(attempt)] {
        h = (h ^ v).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        h ^= h >> 31;
    }
    StdRng::seed_from_u64(h)
}

/// Displaces every atom by a uniform random vector in `[-magnitude, magnitude]³`.
/// Velocities are dropped so the engine redraws them.
pub(crate) fn perturb<R: Rng + ?Sized>(
    configuration: &Configuration,
    magnitude: f64,
    rng: &mut R,
) -> Configuration {
    if magnitude <= 0.0 {
        return Configuration {
            velocities: None,
            ..configuration.clone()
        };
    }
    let positions = configuration
        .positions
        .iter()
        .map(|p| {
            p + Vector3::new(
                rng.gen_range(-magnitude..=magnitude),
                rng.gen_range(-magnitude..=magnitude),
                rng.gen_range(-magnitude..=magnitude),
            )
        })
        .collect();
    Configuration {
        positions,
        velocities: None,
        snapshot: configuration.snapshot.clone(),
    }
}
