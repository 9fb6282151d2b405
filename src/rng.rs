//! Seeded random number source for sampling and calibration.

use rand::{Rng, RngCore, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

/// A reproducible random source. A seed of 0 draws the state from OS
/// entropy; any other seed gives a deterministic stream.
#[derive(Debug, Clone)]
pub struct Randomness {
    rng: Xoshiro256PlusPlus,
    seed: u64,
}

impl Randomness {
    pub fn new(seed: u64) -> Self {
        let rng = if seed == 0 {
            Xoshiro256PlusPlus::from_entropy()
        } else {
            Xoshiro256PlusPlus::seed_from_u64(seed)
        };
        Randomness { rng, seed }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn uniform(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    pub fn next_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }

    /// Sample an index from an unnormalized discrete distribution.
    pub fn choose(&mut self, weights: &[f32]) -> usize {
        let total: f64 = weights.iter().map(|&w| w as f64).sum();
        let mut x = self.uniform() * total;
        for (i, &w) in weights.iter().enumerate() {
            x -= w as f64;
            if x <= 0.0 {
                return i;
            }
        }
        weights.len() - 1
    }

    /// Sample a probability vector of dimension `n` from a symmetric
    /// Dirichlet with concentration `alpha`.
    pub fn dirichlet(&mut self, n: usize, alpha: f64) -> Vec<f32> {
        // Gamma(alpha) via Marsaglia-Tsang, with the alpha < 1 boost.
        let mut draws = Vec::with_capacity(n);
        for _ in 0..n {
            draws.push(self.gamma(alpha) as f32);
        }
        let sum: f32 = draws.iter().sum();
        if sum <= 0.0 {
            return vec![1.0 / n as f32; n];
        }
        draws.iter().map(|&d| d / sum).collect()
    }

    fn gamma(&mut self, alpha: f64) -> f64 {
        if alpha < 1.0 {
            let u = self.uniform().max(f64::MIN_POSITIVE);
            return self.gamma(alpha + 1.0) * u.powf(1.0 / alpha);
        }
        let d = alpha - 1.0 / 3.0;
        let c = 1.0 / (9.0 * d).sqrt();
        loop {
            let x = self.normal();
            let v = (1.0 + c * x).powi(3);
            if v <= 0.0 {
                continue;
            }
            let u = self.uniform().max(f64::MIN_POSITIVE);
            if u.ln() < 0.5 * x * x + d - d * v + d * v.ln() {
                return d * v;
            }
        }
    }

    fn normal(&mut self) -> f64 {
        // Box-Muller
        let u1 = self.uniform().max(f64::MIN_POSITIVE);
        let u2 = self.uniform();
        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }
}
