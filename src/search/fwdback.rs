//! Generic float dynamic programming over a configured profile: Forward,
//! Backward, posterior decoding, and Viterbi with traceback.
//!
//! All scores are in nats, log space. Matrices are dense: rows 0..=L,
//! nodes 0..=M, three core states per cell, five specials per row.

use crate::errors::Result;
use crate::model::profile::{
    Profile, P_BM, P_DD, P_DM, P_II, P_IM, P_MD, P_MI, P_MM, X_B, X_C, X_E, X_J, X_LOOP, X_MOVE,
    X_N,
};
use crate::results::trace::{Trace, TraceState};
use crate::stats::logsum::logsum;

pub const ST_M: usize = 0;
pub const ST_I: usize = 1;
pub const ST_D: usize = 2;

const NEG_INF: f32 = f32::NEG_INFINITY;

/// A dense DP matrix over (row, node, state) plus special-state rows.
#[derive(Debug, Clone)]
pub struct DpMatrix {
    pub l: usize,
    pub m: usize,
    cells: Vec<f32>,
    specials: Vec<f32>,
}

impl DpMatrix {
    pub fn new(l: usize, m: usize) -> Self {
        DpMatrix {
            l,
            m,
            cells: vec![NEG_INF; (l + 1) * (m + 1) * 3],
            specials: vec![NEG_INF; (l + 1) * 5],
        }
    }

    #[inline]
    fn idx(&self, i: usize, k: usize, s: usize) -> usize {
        (i * (self.m + 1) + k) * 3 + s
    }

    #[inline]
    pub fn get(&self, i: usize, k: usize, s: usize) -> f32 {
        self.cells[self.idx(i, k, s)]
    }

    #[inline]
    pub fn set(&mut self, i: usize, k: usize, s: usize, v: f32) {
        let idx = self.idx(i, k, s);
        self.cells[idx] = v;
    }

    #[inline]
    pub fn special(&self, i: usize, x: usize) -> f32 {
        self.specials[i * 5 + x]
    }

    #[inline]
    pub fn set_special(&mut self, i: usize, x: usize, v: f32) {
        self.specials[i * 5 + x] = v;
    }
}

/// Forward algorithm. Returns the filled matrix and the total path score in
/// nats.
pub fn forward(gm: &Profile, seq: &[u8]) -> Result<(DpMatrix, f32)> {
    gm.require_configured()?;
    let (l, m) = (seq.len(), gm.m);
    let mut dp = DpMatrix::new(l, m);

    dp.set_special(0, X_N, 0.0);
    dp.set_special(0, X_B, gm.xsc[X_N][X_MOVE]);

    for i in 1..=l {
        let x = seq[i - 1];
        let mut e = NEG_INF;
        for k in 1..=m {
            let t = &gm.tsc[k];
            let entry = logsum(
                logsum(
                    dp.get(i - 1, k - 1, ST_M) + t[P_MM],
                    dp.get(i - 1, k - 1, ST_I) + t[P_IM],
                ),
                logsum(
                    dp.get(i - 1, k - 1, ST_D) + t[P_DM],
                    dp.special(i - 1, X_B) + t[P_BM],
                ),
            );
            let mv = gm.msc(k, x) + entry;
            dp.set(i, k, ST_M, mv);

            let iv = logsum(
                dp.get(i - 1, k, ST_M) + t[P_MI],
                dp.get(i - 1, k, ST_I) + t[P_II],
            );
            dp.set(i, k, ST_I, iv);

            let dv = logsum(
                dp.get(i, k - 1, ST_M) + t[P_MD],
                dp.get(i, k - 1, ST_D) + t[P_DD],
            );
            dp.set(i, k, ST_D, dv);

            e = logsum(e, mv + gm.match_exit(k));
            e = logsum(e, dv + gm.delete_exit(k));
        }
        dp.set_special(i, X_E, e);
        dp.set_special(
            i,
            X_J,
            logsum(
                dp.special(i - 1, X_J) + gm.xsc[X_J][X_LOOP],
                e + gm.xsc[X_E][X_LOOP],
            ),
        );
        dp.set_special(
            i,
            X_C,
            logsum(
                dp.special(i - 1, X_C) + gm.xsc[X_C][X_LOOP],
                e + gm.xsc[X_E][X_MOVE],
            ),
        );
        dp.set_special(i, X_N, dp.special(i - 1, X_N) + gm.xsc[X_N][X_LOOP]);
        dp.set_special(
            i,
            X_B,
            logsum(
                dp.special(i, X_N) + gm.xsc[X_N][X_MOVE],
                dp.special(i, X_J) + gm.xsc[X_J][X_MOVE],
            ),
        );
    }

    let score = dp.special(l, X_C) + gm.xsc[X_C][X_MOVE];
    Ok((dp, score))
}

/// Backward algorithm. Returns the filled matrix and the total path score
/// (equal to Forward's, up to float noise).
pub fn backward(gm: &Profile, seq: &[u8]) -> Result<(DpMatrix, f32)> {
    gm.require_configured()?;
    let (l, m) = (seq.len(), gm.m);
    let mut dp = DpMatrix::new(l, m);

    dp.set_special(l, X_C, gm.xsc[X_C][X_MOVE]);
    dp.set_special(l, X_E, dp.special(l, X_C) + gm.xsc[X_E][X_MOVE]);
    for k in (1..=m).rev() {
        let exit_d = gm.delete_exit(k) + dp.special(l, X_E);
        let dv = if k < m {
            logsum(exit_d, gm.tsc[k + 1][P_DD] + dp.get(l, k + 1, ST_D))
        } else {
            exit_d
        };
        dp.set(l, k, ST_D, dv);
        let exit_m = gm.match_exit(k) + dp.special(l, X_E);
        let mv = if k < m {
            logsum(exit_m, gm.tsc[k + 1][P_MD] + dp.get(l, k + 1, ST_D))
        } else {
            exit_m
        };
        dp.set(l, k, ST_M, mv);
    }

    for i in (0..l).rev() {
        let x = seq[i]; // residue emitted on row i+1
        let b = {
            let mut acc = NEG_INF;
            for k in 1..=m {
                acc = logsum(acc, gm.tsc[k][P_BM] + gm.msc(k, x) + dp.get(i + 1, k, ST_M));
            }
            acc
        };
        dp.set_special(i, X_B, b);
        dp.set_special(
            i,
            X_J,
            logsum(
                dp.special(i + 1, X_J) + gm.xsc[X_J][X_LOOP],
                b + gm.xsc[X_J][X_MOVE],
            ),
        );
        dp.set_special(
            i,
            X_C,
            dp.special(i + 1, X_C) + gm.xsc[X_C][X_LOOP],
        );
        dp.set_special(
            i,
            X_E,
            logsum(
                dp.special(i, X_J) + gm.xsc[X_E][X_LOOP],
                dp.special(i, X_C) + gm.xsc[X_E][X_MOVE],
            ),
        );
        dp.set_special(
            i,
            X_N,
            logsum(
                dp.special(i + 1, X_N) + gm.xsc[X_N][X_LOOP],
                b + gm.xsc[X_N][X_MOVE],
            ),
        );

        for k in (1..=m).rev() {
            let next_m = if k < m {
                gm.msc(k + 1, x) + dp.get(i + 1, k + 1, ST_M)
            } else {
                NEG_INF
            };
            let dv = logsum(
                logsum(
                    if k < m { gm.tsc[k + 1][P_DM] + next_m } else { NEG_INF },
                    if k < m {
                        gm.tsc[k + 1][P_DD] + dp.get(i, k + 1, ST_D)
                    } else {
                        NEG_INF
                    },
                ),
                gm.delete_exit(k) + dp.special(i, X_E),
            );
            dp.set(i, k, ST_D, dv);

            let iv = logsum(
                if k < m { gm.tsc[k + 1][P_IM] + next_m } else { NEG_INF },
                gm.tsc[k][P_II] + dp.get(i + 1, k, ST_I),
            );
            dp.set(i, k, ST_I, iv);

            let mv = logsum(
                logsum(
                    if k < m { gm.tsc[k + 1][P_MM] + next_m } else { NEG_INF },
                    gm.tsc[k][P_MI] + dp.get(i + 1, k, ST_I),
                ),
                logsum(
                    if k < m {
                        gm.tsc[k + 1][P_MD] + dp.get(i, k + 1, ST_D)
                    } else {
                        NEG_INF
                    },
                    gm.match_exit(k) + dp.special(i, X_E),
                ),
            );
            dp.set(i, k, ST_M, mv);
        }
    }

    let score = dp.special(0, X_N);
    Ok((dp, score))
}

/// Posterior decode: per-cell probabilities and the per-row probability
/// that the residue was emitted by the model core.
#[derive(Debug, Clone)]
pub struct Posterior {
    /// Probabilities for M/I states, linear space.
    pub pp: DpMatrix,
    /// Row occupancy: P(residue i emitted by a core state), `[0..=L]`.
    pub row_occ: Vec<f32>,
}

pub fn posterior(gm: &Profile, fwd: &DpMatrix, bck: &DpMatrix, total: f32) -> Posterior {
    let (l, m) = (fwd.l, gm.m);
    let mut pp = DpMatrix::new(l, m);
    let mut row_occ = vec![0.0f32; l + 1];
    for i in 1..=l {
        let mut occ = 0.0f32;
        for k in 1..=m {
            let pm = (fwd.get(i, k, ST_M) + bck.get(i, k, ST_M) - total).exp();
            let pi = (fwd.get(i, k, ST_I) + bck.get(i, k, ST_I) - total).exp();
            pp.set(i, k, ST_M, pm);
            pp.set(i, k, ST_I, pi);
            occ += pm + pi;
        }
        row_occ[i] = occ.clamp(0.0, 1.0);
    }
    Posterior { pp, row_occ }
}

/// Viterbi with traceback. Returns the optimal path score in nats and the
/// path itself.
pub fn viterbi(gm: &Profile, seq: &[u8]) -> Result<(f32, Trace)> {
    gm.require_configured()?;
    let (l, m) = (seq.len(), gm.m);
    let mut dp = DpMatrix::new(l, m);
    // Backpointers: core cells encode the winning predecessor.
    const FROM_M: u8 = 0;
    const FROM_I: u8 = 1;
    const FROM_D: u8 = 2;
    const FROM_B: u8 = 3;
    let mut bp = vec![0u8; (l + 1) * (m + 1) * 3];
    let idx = |i: usize, k: usize, s: usize| (i * (m + 1) + k) * 3 + s;
    // Special backpointers per row: J from loop?, C from loop?, B from N?
    let mut bp_j_loop = vec![false; l + 1];
    let mut bp_c_loop = vec![false; l + 1];
    let mut bp_b_from_n = vec![true; l + 1];
    // E backpointer: (node, was_delete)
    let mut bp_e = vec![(0usize, false); l + 1];

    dp.set_special(0, X_N, 0.0);
    dp.set_special(0, X_B, gm.xsc[X_N][X_MOVE]);

    for i in 1..=l {
        let x = seq[i - 1];
        let mut e = NEG_INF;
        let mut e_src = (0usize, false);
        for k in 1..=m {
            let t = &gm.tsc[k];
            let cands = [
                (dp.get(i - 1, k - 1, ST_M) + t[P_MM], FROM_M),
                (dp.get(i - 1, k - 1, ST_I) + t[P_IM], FROM_I),
                (dp.get(i - 1, k - 1, ST_D) + t[P_DM], FROM_D),
                (dp.special(i - 1, X_B) + t[P_BM], FROM_B),
            ];
            let (best, who) = cands
                .iter()
                .fold((NEG_INF, FROM_B), |acc, &(v, w)| if v > acc.0 { (v, w) } else { acc });
            let mv = gm.msc(k, x) + best;
            dp.set(i, k, ST_M, mv);
            bp[idx(i, k, ST_M)] = who;

            let (iv, iw) = {
                let a = dp.get(i - 1, k, ST_M) + t[P_MI];
                let b = dp.get(i - 1, k, ST_I) + t[P_II];
                if a >= b {
                    (a, FROM_M)
                } else {
                    (b, FROM_I)
                }
            };
            dp.set(i, k, ST_I, iv);
            bp[idx(i, k, ST_I)] = iw;

            let (dv, dw) = {
                let a = dp.get(i, k - 1, ST_M) + t[P_MD];
                let b = dp.get(i, k - 1, ST_D) + t[P_DD];
                if a >= b {
                    (a, FROM_M)
                } else {
                    (b, FROM_D)
                }
            };
            dp.set(i, k, ST_D, dv);
            bp[idx(i, k, ST_D)] = dw;

            let me = mv + gm.match_exit(k);
            if me > e {
                e = me;
                e_src = (k, false);
            }
            let de = dv + gm.delete_exit(k);
            if de > e {
                e = de;
                e_src = (k, true);
            }
        }
        dp.set_special(i, X_E, e);
        bp_e[i] = e_src;

        let j_loop = dp.special(i - 1, X_J) + gm.xsc[X_J][X_LOOP];
        let j_enter = e + gm.xsc[X_E][X_LOOP];
        dp.set_special(i, X_J, j_loop.max(j_enter));
        bp_j_loop[i] = j_loop > j_enter;

        let c_loop = dp.special(i - 1, X_C) + gm.xsc[X_C][X_LOOP];
        let c_enter = e + gm.xsc[X_E][X_MOVE];
        dp.set_special(i, X_C, c_loop.max(c_enter));
        bp_c_loop[i] = c_loop > c_enter;

        dp.set_special(i, X_N, dp.special(i - 1, X_N) + gm.xsc[X_N][X_LOOP]);
        let b_from_n = dp.special(i, X_N) + gm.xsc[X_N][X_MOVE];
        let b_from_j = dp.special(i, X_J) + gm.xsc[X_J][X_MOVE];
        dp.set_special(i, X_B, b_from_n.max(b_from_j));
        bp_b_from_n[i] = b_from_n >= b_from_j;
    }

    let score = dp.special(l, X_C) + gm.xsc[X_C][X_MOVE];
    let mut trace = Trace::new(m, l);
    if !score.is_finite() {
        return Ok((score, trace));
    }

    // Walk back from C(L) to S, collecting states in reverse.
    let mut rev: Vec<(TraceState, usize, usize)> = vec![(TraceState::T, 0, 0)];
    let mut i = l;
    // Unwind C loop emissions, then the silent C entered from E
    while i > 0 && bp_c_loop[i] {
        rev.push((TraceState::C, 0, i));
        i -= 1;
    }
    rev.push((TraceState::C, 0, 0));
    rev.push((TraceState::E, 0, 0));
    'outer: loop {
        // Enter the core at row i from E
        let (mut k, was_delete) = bp_e[i];
        let mut state = if was_delete { ST_D } else { ST_M };
        loop {
            match state {
                ST_M => {
                    rev.push((TraceState::M, k, i));
                    let from = bp[idx(i, k, ST_M)];
                    i -= 1;
                    k -= 1;
                    match from {
                        0 => state = ST_M,
                        1 => state = ST_I,
                        2 => state = ST_D,
                        _ => break,
                    }
                }
                ST_I => {
                    rev.push((TraceState::I, k, i));
                    let from = bp[idx(i, k, ST_I)];
                    i -= 1;
                    state = if from == 0 { ST_M } else { ST_I };
                }
                _ => {
                    rev.push((TraceState::D, k, i));
                    let from = bp[idx(i, k, ST_D)];
                    k -= 1;
                    state = if from == 0 { ST_M } else { ST_D };
                }
            }
        }
        rev.push((TraceState::B, 0, 0));
        if bp_b_from_n[i] {
            // Unwind N loops to the start
            while i > 0 {
                rev.push((TraceState::N, 0, i));
                i -= 1;
            }
            rev.push((TraceState::N, 0, 0));
            rev.push((TraceState::S, 0, 0));
            break 'outer;
        } else {
            while i > 0 && bp_j_loop[i] {
                rev.push((TraceState::J, 0, i));
                i -= 1;
            }
            rev.push((TraceState::J, 0, 0));
            rev.push((TraceState::E, 0, 0));
            // continue unwinding the previous domain from E at row i
        }
    }

    rev.reverse();
    for (state, k, i) in rev {
        trace.push(state, k, i);
    }
    Ok((score, trace))
}
