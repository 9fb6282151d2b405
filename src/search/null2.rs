//! Composition-bias (null2) correction.
//!
//! An envelope's posterior decode picks out which model nodes emitted it;
//! the posterior-weighted mix of their emission odds defines an alternative
//! null. The correction is that null's score with a small prior `omega`,
//! floored so it never rewards a domain.

use crate::model::profile::Profile;
use crate::search::fwdback::{DpMatrix, ST_I, ST_M};
use crate::stats::logsum::logsum;

/// Correction in nats to subtract from an envelope score; always >= 0.
///
/// `pp` is the full-target posterior matrix; `env_from..=env_to` are
/// 1-based target rows.
pub fn null2_correction(
    gm: &Profile,
    pp: &DpMatrix,
    seq: &[u8],
    env_from: usize,
    env_to: usize,
    omega: f32,
) -> f32 {
    let m = gm.m;
    let kp = gm.alphabet.kp();

    // Posterior mass per node over the envelope.
    let mut weights = vec![0.0f32; m + 1];
    let mut total = 0.0f32;
    for i in env_from..=env_to {
        for (k, w) in weights.iter_mut().enumerate().skip(1) {
            let mass = pp.get(i, k, ST_M) + pp.get(i, k, ST_I);
            *w += mass;
            total += mass;
        }
    }
    if total <= 0.0 {
        return 0.0;
    }
    weights.iter_mut().for_each(|w| *w /= total);

    // Expected emission odds per residue code under the weighted nodes.
    let mut odds = vec![1.0f32; kp];
    for (x, slot) in odds.iter_mut().enumerate() {
        if !gm.alphabet.is_residue(x as u8) {
            continue;
        }
        let mut acc = 0.0f32;
        for k in 1..=m {
            let sc = gm.rsc[k][x];
            if sc.is_finite() {
                acc += weights[k] * sc.exp();
            }
        }
        *slot = acc.max(f32::MIN_POSITIVE);
    }

    let raw: f32 = seq[env_from - 1..env_to]
        .iter()
        .map(|&x| odds[x as usize].ln())
        .sum();
    logsum(0.0, raw + omega.ln())
}
