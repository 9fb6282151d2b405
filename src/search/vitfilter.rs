//! The Viterbi filter: full gapped Viterbi in saturating 16-bit word space
//! over the striped `rbv` matrix and the quantized transition words.

use crate::model::optimized::{OptimizedProfile, NEG_INF_W, SCALE_W};
use crate::model::profile::{P_BM, P_DD, P_DM, P_II, P_IM, P_MD, P_MI, P_MM};
use crate::model::profile::{X_C, X_E, X_J, X_LOOP, X_MOVE, X_N};

const NINF: i32 = NEG_INF_W as i32;
const SAT_MAX: i32 = i16::MAX as i32;

/// Saturating add in word space; minus infinity is absorbing.
#[inline]
fn wadd(a: i32, b: i32) -> i32 {
    if a == NINF || b == NINF {
        NINF
    } else {
        (a + b).clamp(NINF + 1, SAT_MAX)
    }
}

/// Viterbi score of `seq` in nats. Returns `f32::INFINITY` when the word
/// accumulator saturates and `f32::NEG_INFINITY` when no path exists.
pub fn viterbi_filter(om: &OptimizedProfile, seq: &[u8]) -> f32 {
    let m = om.m();
    if seq.is_empty() {
        return f32::NEG_INFINITY;
    }
    let local = om.local();

    let xwv = &om.xwv;
    let mut mx = vec![NINF; m + 1];
    let mut ix = vec![NINF; m + 1];
    let mut dx = vec![NINF; m + 1];
    let mut mx_new = vec![NINF; m + 1];
    let mut ix_new = vec![NINF; m + 1];
    let mut dx_new = vec![NINF; m + 1];

    let mut xn = 0i32;
    let mut xj = NINF;
    let mut xc = NINF;
    let mut xb = wadd(xn, xwv[X_N][X_MOVE] as i32);

    for &x in seq {
        let mut xe = NINF;
        mx_new[0] = NINF;
        ix_new[0] = NINF;
        dx_new[0] = NINF;
        for k in 1..=m {
            let tw = &om.twv[k];
            let rsc = om.rbv_at(x, k) as i32;
            let best_in = wadd(mx[k - 1], tw[P_MM] as i32)
                .max(wadd(ix[k - 1], tw[P_IM] as i32))
                .max(wadd(dx[k - 1], tw[P_DM] as i32))
                .max(wadd(xb, tw[P_BM] as i32));
            mx_new[k] = if rsc == NINF { NINF } else { wadd(best_in, rsc) };
            if local || k == m {
                xe = xe.max(mx_new[k]);
            }
            dx_new[k] =
                wadd(mx_new[k - 1], tw[P_MD] as i32).max(wadd(dx_new[k - 1], tw[P_DD] as i32));
            // Inserts emit at background odds (score 0)
            ix_new[k] = wadd(mx[k], tw[P_MI] as i32).max(wadd(ix[k], tw[P_II] as i32));
        }
        if !local {
            xe = xe.max(dx_new[m]);
        }

        xj = wadd(xj, xwv[X_J][X_LOOP] as i32).max(wadd(xe, xwv[X_E][X_LOOP] as i32));
        xc = wadd(xc, xwv[X_C][X_LOOP] as i32).max(wadd(xe, xwv[X_E][X_MOVE] as i32));
        xn = wadd(xn, xwv[X_N][X_LOOP] as i32);
        xb = wadd(xn, xwv[X_N][X_MOVE] as i32).max(wadd(xj, xwv[X_J][X_MOVE] as i32));

        std::mem::swap(&mut mx, &mut mx_new);
        std::mem::swap(&mut ix, &mut ix_new);
        std::mem::swap(&mut dx, &mut dx_new);
    }

    let final_words = wadd(xc, xwv[X_C][X_MOVE] as i32);
    if final_words == NINF {
        f32::NEG_INFINITY
    } else if final_words >= SAT_MAX {
        f32::INFINITY
    } else {
        final_words as f32 / SCALE_W
    }
}
