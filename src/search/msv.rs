//! The MSV filter: best multiple-ungapped-segment score, computed in
//! saturating 8-bit integer space over the striped `sbv` matrix.
//!
//! The byte DP tracks scores relative to `base`; entry, exit, and re-entry
//! moves are charged as quantized costs (`tbm`, `tec`, `tjb`). The N/C/J
//! loop emissions are free in byte space and restored as a float length
//! correction at the end.

use crate::model::optimized::{OptimizedProfile, SCALE_B};

/// MSV score of `seq` in nats. Returns `f32::INFINITY` when the 8-bit
/// accumulator saturates (the target passes the filter unconditionally)
/// and `f32::NEG_INFINITY` for an empty target.
pub fn msv_filter(om: &OptimizedProfile, seq: &[u8]) -> f32 {
    let m = om.m();
    let l = seq.len();
    if l == 0 {
        return f32::NEG_INFINITY;
    }

    let base = om.base as i32;
    let bias = om.bias as i32;
    let tjb = om.tjb as i32;
    let tbm = om.tbm as i32;
    let tec = om.tec as i32;

    let mut dp = vec![0i32; m + 1];
    let mut xj = 0i32;
    let mut xb = (base - tjb).max(0);

    for &x in seq {
        let entry = (xb - tbm).max(0);
        let mut xe = 0i32;
        let mut diag = 0i32;
        for (k, slot) in dp.iter_mut().enumerate().skip(1) {
            let sc = om.sbv_at(x, k) as i32;
            let mut v = diag.max(entry) + sc - bias;
            if v < 0 {
                v = 0;
            }
            diag = *slot;
            *slot = v;
            if v > xe {
                xe = v;
            }
        }
        if xe >= 255 {
            return f32::INFINITY;
        }
        xj = xj.max(xe - tec);
        xb = (base - tjb).max(xj - tjb).max(0);
    }

    let lf = l as f32;
    let loop_emissions = lf * (lf / (lf + 3.0)).ln();
    let final_move = (3.0 / (lf + 3.0)).ln();
    (xj - base) as f32 / SCALE_B + loop_emissions + final_move
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabet::Alphabet;
    use crate::model::background::Background;
    use crate::model::hmm::Hmm;
    use crate::model::profile::{Profile, ProfileConfig};
    use crate::model::OptimizedProfile;
    use crate::rng::Randomness;

    fn model(seed: u64, m: usize) -> (Hmm, OptimizedProfile, Background) {
        let mut rng = Randomness::new(seed);
        let hmm = Hmm::sample(Alphabet::Amino, m, &mut rng).unwrap();
        let bg = Background::new(Alphabet::Amino);
        let mut p = Profile::new(Alphabet::Amino);
        p.configure(&hmm, &bg, ProfileConfig::default()).unwrap();
        (hmm, OptimizedProfile::from_profile(&p).unwrap(), bg)
    }

    /// A sequence that follows the model consensus.
    fn consensus_seq(hmm: &Hmm) -> Vec<u8> {
        (1..=hmm.m)
            .map(|k| {
                hmm.mat[k]
                    .iter()
                    .enumerate()
                    .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
                    .unwrap()
                    .0 as u8
            })
            .collect()
    }

    #[test]
    fn consensus_outscores_background() {
        let (hmm, mut om, bg) = model(42, 40);
        let cons = consensus_seq(&hmm);
        om.set_length(cons.len());
        let planted = msv_filter(&om, &cons);

        let mut rng = Randomness::new(7);
        let random = bg.sample_sequence(cons.len(), &mut rng);
        let noise = msv_filter(&om, &random);
        assert!(planted > noise, "consensus {planted} vs background {noise}");
    }

    #[test]
    fn empty_target_scores_minus_infinity() {
        let (_, om, _) = model(1, 10);
        assert_eq!(msv_filter(&om, &[]), f32::NEG_INFINITY);
    }

    #[test]
    fn deterministic_across_calls() {
        let (hmm, mut om, _) = model(3, 25);
        let cons = consensus_seq(&hmm);
        om.set_length(cons.len());
        assert_eq!(msv_filter(&om, &cons), msv_filter(&om, &cons));
    }
}
