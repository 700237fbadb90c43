/// Statistical inefficiency `g = 1 + 2τ` of a time series, where `τ` is the
/// integrated autocorrelation time.
///
/// The autocorrelation sum is truncated at the first non-positive lag after a
/// short burn-in of three lags. Returns `1.0` for series too short or too
/// flat to estimate.
pub fn statistical_inefficiency(series: &[f64]) -> f64 {
    const MIN_LAGS: usize = 3;

    let n = series.len();
    if n < 2 {
        return 1.0;
    }
    let nf = n as f64;
    let mean = series.iter().sum::<f64>() / nf;
    let deltas: Vec<f64> = series.iter().map(|x| x - mean).collect();
    let variance = deltas.iter().map(|d| d * d).sum::<f64>() / nf;
    if variance <= f64::EPSILON * mean.abs().max(1.0) {
        return 1.0;
    }

    let mut g = 1.0;
    for lag in 1..n - 1 {
        let covariance = deltas[..n - lag]
            .iter()
            .zip(&deltas[lag..])
            .map(|(a, b)| a * b)
            .sum::<f64>()
            / (nf - lag as f64);
        let c = covariance / variance;
        if c <= 0.0 && lag > MIN_LAGS {
            break;
        }
        g += 2.0 * c * (1.0 - lag as f64 / nf);
    }
    g.max(1.0)
}
