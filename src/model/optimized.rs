//! The vector-layout form of a profile: striped, quantized score matrices
//! plus the scalar constants that map integer filter scores back to nats.
//!
//! Striping: for a matrix with `lanes` parallel lanes and stride
//! `Q = ceil(M / lanes)`, lane `z` of stripe `q` holds model node
//! `z*Q + q + 1`. Scalar code addresses nodes through the striped
//! accessors, so the layout is the single source of truth.

use crate::errors::Result;
use crate::model::params::{Cutoffs, EvalueParameters, Offsets};
use crate::model::profile::Profile;

pub use crate::model::profile::{P_BM, P_DD, P_DM, P_II, P_IM, P_MD, P_MI, P_MM};

/// u8 lanes in a 16-byte vector.
pub const BYTE_LANES: usize = 16;
/// i16 lanes in a 16-byte vector.
pub const WORD_LANES: usize = 8;

/// Byte units per nat for the MSV/SSV matrix (scores kept in third-bits).
pub const SCALE_B: f32 = 3.0 / std::f32::consts::LN_2;
/// Word units per nat for the Viterbi matrix (1/500 bit per word).
pub const SCALE_W: f32 = 500.0 / std::f32::consts::LN_2;
/// Offset added to byte-space scores so the DP stays unsigned.
pub const BASE_B: u8 = 190;
/// Sentinel for minus infinity in word space.
pub const NEG_INF_W: i16 = i16::MIN;

#[derive(Debug, Clone)]
pub struct OptimizedProfile {
    /// The float score form this was converted from. Scan mode and domain
    /// postprocessing need it, so it travels with the striped data.
    pub profile: Profile,

    /// Stride of the byte matrix (`ceil(M / 16)`).
    pub qb: usize,
    /// Stride of the word matrix (`ceil(M / 8)`).
    pub qw: usize,
    /// Striped byte-quantized match scores for the MSV/SSV filter,
    /// `[Kp][qb][16]` flattened.
    pub sbv: Vec<u8>,
    /// Striped word-quantized match scores for the Viterbi filter,
    /// `[Kp][qw][8]` flattened.
    pub rbv: Vec<i16>,
    /// Word-quantized transition scores, indexed like `Profile::tsc`.
    pub twv: Vec<[i16; 8]>,
    /// Word-quantized special-state scores, rows E/N/J/B/C.
    pub xwv: [[i16; 2]; 5],

    /// Uniform-entry cost (B to any match) in byte units.
    pub tbm: u8,
    /// Exit cost (E moves) in byte units.
    pub tec: u8,
    /// Re-entry cost (J/N to B) in byte units; tracks the target length.
    pub tjb: u8,
    /// Byte-space offset, see `BASE_B`.
    pub base: u8,
    /// Magnitude of the most negative match score in byte units.
    pub bias: u8,

    pub offsets: Offsets,
}

impl OptimizedProfile {
    /// Deterministic conversion from a configured profile.
    pub fn from_profile(profile: &Profile) -> Result<Self> {
        profile.require_configured()?;
        let m = profile.m;
        let kp = profile.alphabet.kp();
        let qb = m.div_ceil(BYTE_LANES).max(1);
        let qw = m.div_ceil(WORD_LANES).max(1);

        // Byte quantization: bias shifts the most negative finite match
        // score to zero, saturating at u8 range.
        let mut min_sc = 0.0f32;
        for node in 1..=m {
            for x in 0..kp {
                let sc = profile.rsc[node][x];
                if sc.is_finite() {
                    min_sc = min_sc.min(sc);
                }
            }
        }
        let bias = ((-min_sc * SCALE_B).round() as i64).clamp(0, 255) as u8;

        let mut sbv = vec![0u8; kp * qb * BYTE_LANES];
        let mut rbv = vec![NEG_INF_W; kp * qw * WORD_LANES];
        for x in 0..kp {
            for node in 1..=m {
                let sc = profile.rsc[node][x as usize];
                let b = if sc.is_finite() {
                    ((sc * SCALE_B).round() as i64 + bias as i64).clamp(0, 255) as u8
                } else {
                    0
                };
                sbv[Self::stripe_index(x, node, qb, BYTE_LANES)] = b;
                let w = if sc.is_finite() {
                    ((sc * SCALE_W).round() as i64).clamp(NEG_INF_W as i64 + 1, i16::MAX as i64)
                        as i16
                } else {
                    NEG_INF_W
                };
                rbv[Self::stripe_index(x, node, qw, WORD_LANES)] = w;
            }
        }

        let wordify = |sc: f32| -> i16 {
            if sc.is_finite() {
                ((sc * SCALE_W).round() as i64).clamp(NEG_INF_W as i64 + 1, i16::MAX as i64) as i16
            } else {
                NEG_INF_W
            }
        };
        let twv: Vec<[i16; 8]> = profile
            .tsc
            .iter()
            .map(|row| {
                let mut out = [NEG_INF_W; 8];
                for (i, &sc) in row.iter().enumerate() {
                    out[i] = wordify(sc);
                }
                out
            })
            .collect();
        let mut xwv = [[NEG_INF_W; 2]; 5];
        for (row, src) in xwv.iter_mut().zip(profile.xsc.iter()) {
            row[0] = wordify(src[0]);
            row[1] = wordify(src[1]);
        }

        // Uniform MSV entry: 2 / (M (M + 1)).
        let tbm_nats = (2.0 / (m as f32 * (m as f32 + 1.0))).ln();
        let tbm = ((-tbm_nats * SCALE_B).round() as i64).clamp(0, 255) as u8;
        let tec = ((-(0.5f32.ln()) * SCALE_B).round() as i64).clamp(0, 255) as u8;

        let mut om = OptimizedProfile {
            profile: profile.clone(),
            qb,
            qw,
            sbv,
            rbv,
            twv,
            xwv,
            tbm,
            tec,
            tjb: 0,
            base: BASE_B,
            bias,
            offsets: Offsets::default(),
        };
        om.set_length(profile.l);
        Ok(om)
    }

    #[inline]
    fn stripe_index(x: usize, node: usize, q: usize, lanes: usize) -> usize {
        let idx = node - 1;
        let stripe = idx % q;
        let lane = idx / q;
        x * q * lanes + stripe * lanes + lane
    }

    /// Striped byte score for residue `x` at node `k`.
    #[inline]
    pub fn sbv_at(&self, x: u8, k: usize) -> u8 {
        self.sbv[Self::stripe_index(x as usize, k, self.qb, BYTE_LANES)]
    }

    /// Striped word score for residue `x` at node `k`.
    #[inline]
    pub fn rbv_at(&self, x: u8, k: usize) -> i16 {
        self.rbv[Self::stripe_index(x as usize, k, self.qw, WORD_LANES)]
    }

    pub fn m(&self) -> usize {
        self.profile.m
    }

    pub fn l(&self) -> usize {
        self.profile.l
    }

    pub fn name(&self) -> &str {
        &self.profile.name
    }

    pub fn local(&self) -> bool {
        self.profile.local
    }

    pub fn multihit(&self) -> bool {
        self.profile.multihit
    }

    pub fn evalue_parameters(&self) -> Option<EvalueParameters> {
        self.profile.evalue_parameters
    }

    pub fn cutoffs(&self) -> &Cutoffs {
        &self.profile.cutoffs
    }

    /// Reconfigure the length-dependent pieces for a target of length `l`:
    /// the float special transitions and the byte-space re-entry cost.
    pub fn set_length(&mut self, l: usize) {
        self.profile.set_length(l);
        let tjb_nats = (3.0 / (l as f32 + 3.0)).ln();
        self.tjb = ((-tjb_nats * SCALE_B).round() as i64).clamp(0, 255) as u8;
        let wordify = |sc: f32| -> i16 {
            if sc.is_finite() {
                ((sc * SCALE_W).round() as i64).clamp(NEG_INF_W as i64 + 1, i16::MAX as i64) as i16
            } else {
                NEG_INF_W
            }
        };
        for (row, src) in self.xwv.iter_mut().zip(self.profile.xsc.iter()) {
            row[0] = wordify(src[0]);
            row[1] = wordify(src[1]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabet::Alphabet;
    use crate::model::background::Background;
    use crate::model::hmm::Hmm;
    use crate::model::profile::ProfileConfig;
    use crate::rng::Randomness;

    fn om_of(m: usize) -> OptimizedProfile {
        let mut rng = Randomness::new(42);
        let hmm = Hmm::sample(Alphabet::Amino, m, &mut rng).unwrap();
        let bg = Background::new(Alphabet::Amino);
        let mut p = Profile::new(Alphabet::Amino);
        p.configure(&hmm, &bg, ProfileConfig::default()).unwrap();
        OptimizedProfile::from_profile(&p).unwrap()
    }

    #[test]
    fn conversion_preserves_m() {
        for m in [1usize, 7, 16, 17, 100] {
            let om = om_of(m);
            assert_eq!(om.m(), m);
            assert_eq!(om.qb, m.div_ceil(16).max(1));
            assert_eq!(om.qw, m.div_ceil(8).max(1));
        }
    }

    #[test]
    fn conversion_rejects_unconfigured() {
        let p = Profile::new(Alphabet::Amino);
        assert!(OptimizedProfile::from_profile(&p).is_err());
    }

    #[test]
    fn striped_bytes_round_trip_within_quantization() {
        let om = om_of(23);
        for node in 1..=om.m() {
            for x in 0..Alphabet::Amino.k() as u8 {
                let sc = om.profile.rsc[node][x as usize];
                let byte = om.sbv_at(x, node);
                if sc.is_finite() && byte > 0 && byte < 255 {
                    let back = (byte as f32 - om.bias as f32) / SCALE_B;
                    assert!(
                        (back - sc).abs() <= 0.5 / SCALE_B + 1e-6,
                        "node {node} residue {x}: {sc} vs {back}"
                    );
                }
            }
        }
    }

    #[test]
    fn striped_words_round_trip_within_quantization() {
        let om = om_of(23);
        for node in 1..=om.m() {
            for x in 0..Alphabet::Amino.k() as u8 {
                let sc = om.profile.rsc[node][x as usize];
                let w = om.rbv_at(x, node);
                if sc.is_finite() && w != NEG_INF_W {
                    let back = w as f32 / SCALE_W;
                    assert!((back - sc).abs() <= 0.5 / SCALE_W + 1e-6);
                }
            }
        }
    }

    #[test]
    fn set_length_moves_reentry_cost() {
        let mut om = om_of(12);
        om.set_length(100);
        let short = om.tjb;
        om.set_length(100_000);
        let long = om.tjb;
        // Re-entering costs more on longer targets
        assert!(long > short);
        assert_eq!(om.l(), 100_000);
    }
}
