//! The core probabilistic model: per-node match/insert emissions, seven
//! transition kinds, and identifying metadata.
//!
//! Node 0 is the begin node: `mat[0]` is a fixed dummy distribution,
//! `t[0]` carries the begin transitions (`MM` = B->M1, `MD` = B->D1), and
//! `ins[0]` is the N-terminal insert distribution.

use crate::alphabet::Alphabet;
use crate::errors::{PromerError, Result};
use crate::model::params::{Cutoffs, EvalueParameters};
use crate::rng::Randomness;

/// Transition indices within a node's seven-element row.
pub const T_MM: usize = 0;
pub const T_MI: usize = 1;
pub const T_MD: usize = 2;
pub const T_IM: usize = 3;
pub const T_II: usize = 4;
pub const T_DM: usize = 5;
pub const T_DD: usize = 6;

/// Probability-sum tolerance for `validate`.
pub const VALIDATION_TOLERANCE: f32 = 1e-5;

#[derive(Debug, Clone)]
pub struct Hmm {
    pub alphabet: Alphabet,
    /// Match-node count; model "length".
    pub m: usize,
    /// Match emissions, `[0..=M][K]`. Row 0 is a dummy.
    pub mat: Vec<Vec<f32>>,
    /// Insert emissions, `[0..=M][K]`.
    pub ins: Vec<Vec<f32>>,
    /// Transitions, `[0..=M][7]`.
    pub t: Vec<[f32; 7]>,

    pub name: String,
    pub accession: Option<String>,
    pub description: Option<String>,
    /// Command-line provenance, one entry per build step.
    pub command_line: Vec<String>,
    pub creation_time: Option<String>,

    /// Occupancy-weighted mean residue composition.
    pub composition: Option<Vec<f32>>,
    pub checksum: Option<u32>,
    pub consensus: Option<String>,
    pub consensus_structure: Option<String>,
    pub consensus_accessibility: Option<String>,
    pub reference: Option<String>,
    /// Alignment-column map: source MSA column of each match node.
    pub map: Option<Vec<usize>>,
    pub nseq: Option<u32>,
    pub nseq_effective: Option<f32>,

    pub evalue_parameters: Option<EvalueParameters>,
    pub cutoffs: Cutoffs,
}

impl Hmm {
    /// An all-zero model skeleton of `m` nodes, ready for counting.
    pub fn new(alphabet: Alphabet, m: usize, name: &str) -> Result<Self> {
        if m < 1 {
            return Err(PromerError::InvalidParameter("model must have M >= 1 nodes".into()));
        }
        let k = alphabet.k();
        Ok(Hmm {
            alphabet,
            m,
            mat: vec![vec![0.0; k]; m + 1],
            ins: vec![vec![0.0; k]; m + 1],
            t: vec![[0.0; 7]; m + 1],
            name: name.to_string(),
            accession: None,
            description: None,
            command_line: Vec::new(),
            creation_time: None,
            composition: None,
            checksum: None,
            consensus: None,
            consensus_structure: None,
            consensus_accessibility: None,
            reference: None,
            map: None,
            nseq: None,
            nseq_effective: None,
            evalue_parameters: None,
            cutoffs: Cutoffs::default(),
        })
    }

    /// Sample a random model: emissions and transition groups drawn from
    /// uniform Dirichlets, end-node constraints applied.
    pub fn sample(alphabet: Alphabet, m: usize, rng: &mut Randomness) -> Result<Self> {
        let mut hmm = Hmm::new(alphabet, m, "sampled")?;
        let k = alphabet.k();
        for node in 0..=m {
            hmm.mat[node] = rng.dirichlet(k, 1.0);
            hmm.ins[node] = rng.dirichlet(k, 1.0);
            let md = rng.dirichlet(3, 1.0);
            let i2 = rng.dirichlet(2, 1.0);
            let d2 = rng.dirichlet(2, 1.0);
            hmm.t[node] = [md[0], md[1], md[2], i2[0], i2[1], d2[0], d2[1]];
        }
        hmm.fix_boundary_nodes();
        hmm.set_composition();
        hmm.consensus = Some(hmm.derive_consensus());
        hmm.checksum = Some(hmm.compute_checksum());
        Ok(hmm)
    }

    /// Enforce the begin/end node invariants after construction or edits:
    /// the dummy match row at node 0, `D0` absent, and no delete out of the
    /// last node.
    pub fn fix_boundary_nodes(&mut self) {
        self.mat[0].iter_mut().for_each(|p| *p = 0.0);
        self.mat[0][0] = 1.0;
        self.t[0][T_DM] = 1.0;
        self.t[0][T_DD] = 0.0;
        let m = self.m;
        // Last node cannot open a delete; fold that mass into M->M.
        self.t[m][T_MM] += self.t[m][T_MD];
        self.t[m][T_MD] = 0.0;
        self.t[m][T_DM] = 1.0;
        self.t[m][T_DD] = 0.0;
    }

    /// Set every probability parameter to zero (counting form).
    pub fn zero(&mut self) {
        for node in 0..=self.m {
            self.mat[node].iter_mut().for_each(|p| *p = 0.0);
            self.ins[node].iter_mut().for_each(|p| *p = 0.0);
            self.t[node].iter_mut().for_each(|p| *p = 0.0);
        }
    }

    /// Multiply every count by `factor` (effective-number reweighting).
    pub fn scale(&mut self, factor: f32) {
        for node in 0..=self.m {
            self.mat[node].iter_mut().for_each(|p| *p *= factor);
            self.ins[node].iter_mut().for_each(|p| *p *= factor);
            self.t[node].iter_mut().for_each(|p| *p *= factor);
        }
    }

    /// Renormalize all emission rows and transition groups to sum to 1.
    /// Zero rows are replaced with uniform distributions.
    pub fn renormalize(&mut self) {
        fn norm(row: &mut [f32]) {
            let sum: f32 = row.iter().sum();
            if sum > 0.0 {
                row.iter_mut().for_each(|p| *p /= sum);
            } else {
                let u = 1.0 / row.len() as f32;
                row.iter_mut().for_each(|p| *p = u);
            }
        }
        for node in 0..=self.m {
            norm(&mut self.mat[node]);
            norm(&mut self.ins[node]);
            norm(&mut self.t[node][T_MM..=T_MD]);
            norm(&mut self.t[node][T_IM..=T_II]);
            norm(&mut self.t[node][T_DM..=T_DD]);
        }
        self.fix_boundary_nodes();
    }

    /// Check the probability-sum invariants within `eps`.
    pub fn validate(&self, eps: f32) -> Result<()> {
        let check = |sum: f32, what: &str, node: usize| -> Result<()> {
            if (sum - 1.0).abs() > eps {
                return Err(PromerError::InvalidFormat(format!(
                    "{what} distribution at node {node} sums to {sum}"
                )));
            }
            Ok(())
        };
        for node in 0..=self.m {
            check(self.mat[node].iter().sum(), "match emission", node)?;
            check(self.ins[node].iter().sum(), "insert emission", node)?;
            check(self.t[node][T_MM..=T_MD].iter().sum(), "match transition", node)?;
            check(self.t[node][T_IM..=T_II].iter().sum(), "insert transition", node)?;
            check(self.t[node][T_DM..=T_DD].iter().sum(), "delete transition", node)?;
        }
        Ok(())
    }

    /// Probability that each match node is visited, `[0..=M]` with entry 0
    /// unused.
    pub fn occupancy(&self) -> Vec<f32> {
        let mut occ = vec![0.0f32; self.m + 1];
        occ[1] = self.t[0][T_MI] + self.t[0][T_MM];
        for k in 2..=self.m {
            occ[k] = occ[k - 1] * (self.t[k - 1][T_MM] + self.t[k - 1][T_MI])
                + (1.0 - occ[k - 1]) * self.t[k - 1][T_DM];
        }
        occ
    }

    /// Install the occupancy-weighted residue composition.
    pub fn set_composition(&mut self) {
        let occ = self.occupancy();
        let k = self.alphabet.k();
        let mut comp = vec![0.0f32; k];
        let mut total = 0.0f32;
        for node in 1..=self.m {
            // expected insert emissions hanging off this node
            let ins_exp = if self.t[node][T_IM] > 0.0 {
                occ[node] * self.t[node][T_MI] / self.t[node][T_IM]
            } else {
                0.0
            };
            for x in 0..k {
                comp[x] += occ[node] * self.mat[node][x] + ins_exp * self.ins[node][x];
            }
            total += occ[node] + ins_exp;
        }
        if total > 0.0 {
            comp.iter_mut().for_each(|c| *c /= total);
        }
        self.composition = Some(comp);
    }

    /// Majority-rule consensus string: the argmax match residue per node,
    /// uppercase when its probability clears 0.5.
    pub fn derive_consensus(&self) -> String {
        let mut out = String::with_capacity(self.m);
        for node in 1..=self.m {
            let (best, p) = self.mat[node]
                .iter()
                .enumerate()
                .fold((0usize, f32::NEG_INFINITY), |acc, (i, &p)| {
                    if p > acc.1 {
                        (i, p)
                    } else {
                        acc
                    }
                });
            let sym = self.alphabet.sym(best as u8) as char;
            if p >= 0.5 {
                out.push(sym.to_ascii_uppercase());
            } else {
                out.push(sym.to_ascii_lowercase());
            }
        }
        out
    }

    /// FNV-1a over the digitized consensus and the node count. Stable across
    /// platforms; used to detect model/alignment drift.
    pub fn compute_checksum(&self) -> u32 {
        let mut h: u32 = 0x811c9dc5;
        let mut mix = |byte: u8| {
            h ^= byte as u32;
            h = h.wrapping_mul(0x01000193);
        };
        for byte in (self.m as u32).to_le_bytes() {
            mix(byte);
        }
        let consensus = match &self.consensus {
            Some(c) => c.clone(),
            None => self.derive_consensus(),
        };
        for ch in consensus.bytes() {
            mix(ch.to_ascii_uppercase());
        }
        h
    }

    /// Mean relative entropy of the match emissions against `bg`, in bits
    /// per position. The builder's effective-number search drives this to
    /// its `ere` target.
    pub fn mean_match_relative_entropy(&self, bg: &super::background::Background) -> f32 {
        let k = self.alphabet.k();
        let mut total = 0.0f32;
        for node in 1..=self.m {
            for x in 0..k {
                let p = self.mat[node][x];
                if p > 0.0 {
                    total += p * (p / bg.f[x]).log2();
                }
            }
        }
        total / self.m as f32
    }
}
