//! The score form of an HMM: log-odds emissions and transitions in nats,
//! configured against a background for an expected target length.
//!
//! Transition scores are indexed by the node they lead *into*; `MI`/`II`
//! are at-node scores. Insert emission odds are zero by construction (insert
//! emissions equal the background), so no insert score table exists.

use crate::alphabet::Alphabet;
use crate::errors::{PromerError, Result};
use crate::model::background::Background;
use crate::model::hmm::{Hmm, T_DD, T_DM, T_II, T_IM, T_MD, T_MI, T_MM};
use crate::model::params::{Cutoffs, EvalueParameters};

/// Transition indices into a profile node's eight-element row.
pub const P_MM: usize = 0;
pub const P_IM: usize = 1;
pub const P_DM: usize = 2;
pub const P_BM: usize = 3;
pub const P_MD: usize = 4;
pub const P_DD: usize = 5;
pub const P_MI: usize = 6;
pub const P_II: usize = 7;

/// Special-state indices.
pub const X_E: usize = 0;
pub const X_N: usize = 1;
pub const X_J: usize = 2;
pub const X_B: usize = 3;
pub const X_C: usize = 4;
pub const X_LOOP: usize = 0;
pub const X_MOVE: usize = 1;

/// Default expected target length.
pub const DEFAULT_L: usize = 400;

#[derive(Debug, Clone)]
pub struct Profile {
    pub m: usize,
    pub l: usize,
    pub alphabet: Alphabet,
    pub local: bool,
    pub multihit: bool,
    configured: bool,

    /// Transition scores in nats, `[0..=M][8]`.
    pub tsc: Vec<[f32; 8]>,
    /// Match emission log-odds in nats, `[0..=M][Kp]`.
    pub rsc: Vec<Vec<f32>>,
    /// Special-state loop/move scores: rows E, N, J, B, C.
    pub xsc: [[f32; 2]; 5],
    /// Expected number of J-state uses (1 for multihit, 0 for unihit).
    pub nj: f32,

    pub name: String,
    pub accession: Option<String>,
    pub description: Option<String>,
    pub consensus: String,
    /// Occupancy-weighted residue composition, for the bias filter.
    pub composition: Option<Vec<f32>>,
    pub evalue_parameters: Option<EvalueParameters>,
    pub cutoffs: Cutoffs,
}

/// Configuration knobs for deriving a profile.
#[derive(Debug, Clone, Copy)]
pub struct ProfileConfig {
    pub l: usize,
    pub multihit: bool,
    pub local: bool,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        ProfileConfig { l: DEFAULT_L, multihit: true, local: true }
    }
}

impl Profile {
    /// An unconfigured profile shell. Scoring against it fails with
    /// `Unconfigured` until `configure` runs.
    pub fn new(alphabet: Alphabet) -> Self {
        Profile {
            m: 0,
            l: 0,
            alphabet,
            local: true,
            multihit: true,
            configured: false,
            tsc: Vec::new(),
            rsc: Vec::new(),
            xsc: [[f32::NEG_INFINITY; 2]; 5],
            nj: 0.0,
            name: String::new(),
            accession: None,
            description: None,
            consensus: String::new(),
            composition: None,
            evalue_parameters: None,
            cutoffs: Cutoffs::default(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    pub fn require_configured(&self) -> Result<()> {
        if self.configured {
            Ok(())
        } else {
            Err(PromerError::Unconfigured)
        }
    }

    /// Derive scores from `hmm` against `bg` under `config`.
    pub fn configure(&mut self, hmm: &Hmm, bg: &Background, config: ProfileConfig) -> Result<()> {
        if hmm.alphabet != bg.alphabet {
            return Err(PromerError::AlphabetMismatch {
                expected: hmm.alphabet.name(),
                got: bg.alphabet.name(),
            });
        }
        self.alphabet = hmm.alphabet;
        let m = hmm.m;
        let kp = self.alphabet.kp();
        self.m = m;
        self.local = config.local;
        self.multihit = config.multihit;
        self.nj = if config.multihit { 1.0 } else { 0.0 };

        let ln = |p: f32| if p > 0.0 { p.ln() } else { f32::NEG_INFINITY };

        // Core transitions, indexed by destination node.
        self.tsc = vec![[f32::NEG_INFINITY; 8]; m + 1];
        for k in 2..=m {
            self.tsc[k][P_MM] = ln(hmm.t[k - 1][T_MM]);
            self.tsc[k][P_IM] = ln(hmm.t[k - 1][T_IM]);
            self.tsc[k][P_DM] = ln(hmm.t[k - 1][T_DM]);
            self.tsc[k][P_MD] = ln(hmm.t[k - 1][T_MD]);
            self.tsc[k][P_DD] = ln(hmm.t[k - 1][T_DD]);
        }
        for k in 1..m {
            self.tsc[k][P_MI] = ln(hmm.t[k][T_MI]);
            self.tsc[k][P_II] = ln(hmm.t[k][T_II]);
        }

        // Entry distribution.
        if config.local {
            // Occupancy-weighted entry spread over all start positions.
            let occ = hmm.occupancy();
            let z: f32 = (1..=m).map(|k| occ[k] * (m - k + 1) as f32).sum();
            for k in 1..=m {
                self.tsc[k][P_BM] = ln(occ[k] / z.max(f32::MIN_POSITIVE));
            }
        } else {
            // Glocal entry at node 1, with leading deletes folded into the
            // entry scores (wing retraction).
            self.tsc[1][P_BM] = ln(1.0 - hmm.t[0][T_MD]);
            let mut chain = ln(hmm.t[0][T_MD]);
            for k in 2..=m {
                self.tsc[k][P_BM] = chain + ln(hmm.t[k - 1][T_DM]);
                chain += ln(hmm.t[k - 1][T_DD]);
            }
        }

        // Match emission odds; degeneracies average their member odds with
        // background weights.
        let k_can = self.alphabet.k();
        self.rsc = vec![vec![f32::NEG_INFINITY; kp]; m + 1];
        for node in 1..=m {
            for x in 0..k_can {
                self.rsc[node][x] = ln(hmm.mat[node][x] / bg.f[x]);
            }
            for code in (k_can as u8)..(kp as u8) {
                if !self.alphabet.is_residue(code) {
                    continue;
                }
                let members = self.alphabet.degenerate_members(code);
                let mut num = 0.0f32;
                let mut den = 0.0f32;
                for &mcode in &members {
                    num += hmm.mat[node][mcode as usize];
                    den += bg.f[mcode as usize];
                }
                self.rsc[node][code as usize] = ln(num / den.max(f32::MIN_POSITIVE));
            }
        }

        // Special states.
        self.xsc = [[f32::NEG_INFINITY; 2]; 5];
        if config.multihit {
            self.xsc[X_E][X_LOOP] = 0.5f32.ln();
            self.xsc[X_E][X_MOVE] = 0.5f32.ln();
        } else {
            self.xsc[X_E][X_MOVE] = 0.0;
        }

        self.name = hmm.name.clone();
        self.accession = hmm.accession.clone();
        self.description = hmm.description.clone();
        self.consensus = hmm
            .consensus
            .clone()
            .unwrap_or_else(|| hmm.derive_consensus());
        self.composition = hmm.composition.clone().or_else(|| {
            let mut scratch = hmm.clone();
            scratch.set_composition();
            scratch.composition
        });
        self.evalue_parameters = hmm.evalue_parameters;
        self.cutoffs = hmm.cutoffs;

        self.configured = true;
        self.set_length(config.l);
        Ok(())
    }

    /// Retune the N/C/J loop scores for a target length `l`.
    pub fn set_length(&mut self, l: usize) {
        self.l = l;
        let pmove = (2.0 + self.nj) / (l as f32 + 2.0 + self.nj);
        let ploop = 1.0 - pmove;
        for state in [X_N, X_J, X_C] {
            self.xsc[state][X_LOOP] = ploop.ln();
            self.xsc[state][X_MOVE] = pmove.ln();
        }
        if !self.multihit {
            self.xsc[X_J] = [f32::NEG_INFINITY; 2];
        }
    }

    /// Match emission score at node `k` for residue code `x`.
    #[inline]
    pub fn msc(&self, k: usize, x: u8) -> f32 {
        self.rsc[k][x as usize]
    }

    /// Score of leaving match node `k` for the end state.
    #[inline]
    pub fn match_exit(&self, k: usize) -> f32 {
        if self.local || k == self.m {
            0.0
        } else {
            f32::NEG_INFINITY
        }
    }

    /// Score of leaving delete node `k` for the end state.
    #[inline]
    pub fn delete_exit(&self, k: usize) -> f32 {
        if k == self.m {
            0.0
        } else {
            f32::NEG_INFINITY
        }
    }
}
