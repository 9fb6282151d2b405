//! Exponential right tail, for Forward score significance.
//!
//! Above a calibrated base point `tau`, Forward bit scores fall off as
//! `P(S > x) = exp(-lambda (x - tau))`, clamped to 1 below the base point.

/// Right-tail P-value of the exponential tail.
pub fn surv(x: f64, tau: f64, lambda: f64) -> f64 {
    if x <= tau {
        1.0
    } else {
        (-lambda * (x - tau)).exp()
    }
}

/// Tail base point from calibration samples: the score at the `tail_mass`
/// quantile from the top. `tail_mass` is the fraction of simulated scores
/// treated as tail (e.g. 0.04).
pub fn fit_tail(samples: &[f64], tail_mass: f64) -> f64 {
    assert!(!samples.is_empty());
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| b.partial_cmp(a).unwrap());
    let k = ((samples.len() as f64 * tail_mass).ceil() as usize)
        .clamp(1, samples.len())
        - 1;
    sorted[k]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn survival_clamps_below_tau() {
        assert_eq!(surv(-10.0, 0.0, 0.693), 1.0);
        assert_eq!(surv(0.0, 0.0, 0.693), 1.0);
        assert!(surv(5.0, 0.0, 0.693) < 0.05);
    }

    #[test]
    fn tail_fit_picks_quantile() {
        let samples: Vec<f64> = (0..100).map(|i| i as f64).collect();
        // top 10% of 0..99 starts at 90
        let tau = fit_tail(&samples, 0.10);
        assert_eq!(tau, 90.0);
    }
}
