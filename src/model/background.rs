//! The null model: background residue frequencies plus a geometric length
//! distribution, and the two-state composition null used by the bias filter.

use crate::alphabet::Alphabet;
use crate::errors::{PromerError, Result};

/// Mixture weight of the composition component in the bias-filter null.
const DEFAULT_OMEGA: f32 = 1.0 / 256.0;

#[derive(Debug, Clone)]
pub struct Background {
    pub alphabet: Alphabet,
    /// Residue frequencies over the canonical alphabet; sums to 1.
    pub f: Vec<f32>,
    /// Self-transition of the length model; the null emits a residue and
    /// continues with probability `p1`.
    pub p1: f32,
    /// Configured target length.
    pub l: usize,
    /// Bias-filter mixture weight.
    pub omega: f32,
    /// Model composition installed by `set_filter`, used by `filter_score`.
    filter_composition: Option<Vec<f32>>,
}

impl Background {
    pub fn new(alphabet: Alphabet) -> Self {
        let mut bg = Background {
            alphabet,
            f: alphabet.background(),
            p1: 0.0,
            l: 0,
            omega: DEFAULT_OMEGA,
            filter_composition: None,
        };
        bg.set_length(400);
        bg
    }

    /// A uniform-frequency null, mainly for tests and sampling.
    pub fn uniform(alphabet: Alphabet) -> Self {
        let k = alphabet.k();
        let mut bg = Background::new(alphabet);
        bg.f = vec![1.0 / k as f32; k];
        bg
    }

    /// Reconfigure the geometric length model for an expected length `l`.
    pub fn set_length(&mut self, l: usize) {
        self.l = l;
        self.p1 = l as f32 / (l as f32 + 1.0);
    }

    /// Null score of a length-`l` sequence in nats, emission terms excluded
    /// (profile scores are odds ratios, so emissions cancel).
    pub fn null_score(&self, l: usize) -> f32 {
        l as f32 * self.p1.ln() + (1.0 - self.p1).ln()
    }

    /// Install the model composition that the bias filter mixes with the
    /// background.
    pub fn set_filter(&mut self, composition: &[f32]) -> Result<()> {
        if composition.len() != self.alphabet.k() {
            return Err(PromerError::InvalidParameter(format!(
                "composition has {} entries for a {}-residue alphabet",
                composition.len(),
                self.alphabet.k()
            )));
        }
        self.filter_composition = Some(composition.to_vec());
        Ok(())
    }

    /// Score of the two-state bias-filter null in nats: each residue is
    /// emitted from `(1-omega) f + omega c`, odds taken against `f`, plus
    /// the length model. Without an installed composition this equals
    /// `null_score(len)`.
    pub fn filter_score(&self, seq: &[u8]) -> f32 {
        let base = self.null_score(seq.len());
        let comp = match &self.filter_composition {
            Some(c) => c,
            None => return base,
        };
        let mut nats = 0.0f32;
        for &x in seq {
            if !self.alphabet.is_canonical(x) {
                continue;
            }
            let f = self.f[x as usize].max(f32::MIN_POSITIVE);
            let mix = (1.0 - self.omega) * f + self.omega * comp[x as usize];
            nats += (mix / f).ln();
        }
        base + nats
    }

    /// Sample a background sequence of length `l`.
    pub fn sample_sequence(&self, l: usize, rng: &mut crate::rng::Randomness) -> Vec<u8> {
        (0..l).map(|_| rng.choose(&self.f) as u8).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_model_follows_l() {
        let mut bg = Background::new(Alphabet::Amino);
        bg.set_length(100);
        assert!((bg.p1 - 100.0 / 101.0).abs() < 1e-6);
        // Longer targets pay more length-model mass
        assert!(bg.null_score(100) < bg.null_score(10));
    }

    #[test]
    fn filter_score_without_composition_is_null_score() {
        let bg = Background::new(Alphabet::Dna);
        let seq = vec![0u8, 1, 2, 3, 0, 1];
        assert_eq!(bg.filter_score(&seq), bg.null_score(seq.len()));
    }

    #[test]
    fn filter_score_rewards_matching_composition() {
        let mut bg = Background::new(Alphabet::Dna);
        // Model strongly prefers A; an all-A target gains under the mixture
        bg.set_filter(&[0.97, 0.01, 0.01, 0.01]).unwrap();
        let all_a = vec![0u8; 50];
        assert!(bg.filter_score(&all_a) > bg.null_score(50));
    }
}
