//! Gumbel (type I extreme value) distribution.
//!
//! Used for MSV and Viterbi filter score significance. The survival function
//! is `P(S > x) = 1 - exp(-exp(-lambda (x - mu)))`.

/// Right-tail P-value of a Gumbel with location `mu` and slope `lambda`.
///
/// Computed as `-expm1(-exp(-lambda (x - mu)))`, which stays accurate for
/// the tiny tail probabilities the filter thresholds care about.
pub fn surv(x: f64, mu: f64, lambda: f64) -> f64 {
    let y = lambda * (x - mu);
    // For large y, exp(-y) underflows and the survival is exp(-y) itself
    // to first order; branch before the underflow bites.
    if y > 30.0 {
        (-y).exp()
    } else {
        -(-(-y).exp()).exp_m1()
    }
}

/// Maximum-likelihood location fit with a known slope.
///
/// `mu = -(1/lambda) * ln( (1/n) Σ exp(-lambda x_i) )`
pub fn fit_location(samples: &[f64], lambda: f64) -> f64 {
    assert!(!samples.is_empty());
    // Factor out the max to keep the exponentials in range.
    let hi = samples.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let sum: f64 = samples.iter().map(|&x| (-lambda * (x - hi)).exp()).sum();
    hi - (sum / samples.len() as f64).ln() / lambda
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn survival_is_monotone_and_bounded() {
        let (mu, lambda) = (2.0, 0.693);
        let mut prev = 1.0;
        for i in 0..60 {
            let x = -5.0 + i as f64 * 0.5;
            let p = surv(x, mu, lambda);
            assert!(p >= 0.0 && p <= 1.0);
            assert!(p <= prev + 1e-12);
            prev = p;
        }
    }

    #[test]
    fn survival_at_location() {
        // P(S > mu) = 1 - exp(-1) ~= 0.632
        let p = surv(3.0, 3.0, 0.693);
        assert!((p - 0.6321).abs() < 1e-3);
    }

    #[test]
    fn location_fit_recovers_mu() {
        // Deterministic Gumbel quantiles: x_p = mu - ln(-ln(p)) / lambda
        let (mu, lambda) = (5.0, 0.693);
        let samples: Vec<f64> = (1..200)
            .map(|i| {
                let p = i as f64 / 200.0;
                mu - (-(p.ln())).ln() / lambda
            })
            .collect();
        let fitted = fit_location(&samples, lambda);
        assert!((fitted - mu).abs() < 0.05, "fitted {fitted}");
    }
}
