//! Shared fixtures for the integration tests.

use promer::alphabet::{Alphabet, DigitalSequence, TextSequence};
use promer::model::background::Background;
use promer::model::hmm::Hmm;
use promer::model::optimized::OptimizedProfile;
use promer::model::profile::{Profile, ProfileConfig};
use promer::rng::Randomness;

/// A reproducible sampled amino model.
pub fn sample_amino_hmm(m: usize, seed: u64) -> Hmm {
    let mut rng = Randomness::new(seed);
    Hmm::sample(Alphabet::Amino, m, &mut rng).expect("sampling")
}

/// Configure a profile for `hmm` at length `l` with default flags.
pub fn profile_of(hmm: &Hmm, l: usize) -> Profile {
    let bg = Background::new(hmm.alphabet);
    let mut gm = Profile::new(hmm.alphabet);
    gm.configure(hmm, &bg, ProfileConfig { l, ..Default::default() })
        .expect("configure");
    gm
}

pub fn optimize(gm: &Profile) -> OptimizedProfile {
    OptimizedProfile::from_profile(gm).expect("conversion")
}

/// The per-node argmax emission sequence: the strongest possible target.
pub fn consensus_sequence(hmm: &Hmm, name: &str) -> DigitalSequence {
    let seq: Vec<u8> = (1..=hmm.m)
        .map(|k| {
            hmm.mat[k]
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
                .unwrap()
                .0 as u8
        })
        .collect();
    DigitalSequence::new(name, hmm.alphabet, seq)
}

/// Background-sampled decoy sequences.
pub fn decoys(alphabet: Alphabet, n: usize, l: usize, seed: u64) -> Vec<DigitalSequence> {
    let bg = Background::new(alphabet);
    let mut rng = Randomness::new(seed);
    (0..n)
        .map(|i| DigitalSequence::new(&format!("decoy{i}"), alphabet, bg.sample_sequence(l, &mut rng)))
        .collect()
}

pub fn amino_seq(name: &str, residues: &str) -> DigitalSequence {
    TextSequence::new(name, residues)
        .digitize(Alphabet::Amino)
        .expect("digitize")
}

pub fn assert_close(a: f64, b: f64, tol: f64, what: &str) {
    assert!((a - b).abs() <= tol, "{what}: {a} vs {b} (tol {tol})");
}
