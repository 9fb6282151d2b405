//! HMM construction: a single-sequence model from a seed, or a profile
//! from aligned columns, with weighting, effective-number scaling, priors,
//! and calibration.

use crate::alphabet::{Alphabet, DigitalSequence};
use crate::build::calibrate::{calibrate, CalibrationConfig};
use crate::build::matrices::{conditional_row, default_gap_probabilities};
use crate::build::prior::{Prior, PriorScheme};
use crate::build::weighting;
use crate::errors::{PromerError, Result};
use crate::model::background::Background;
use crate::model::hmm::{Hmm, T_DD, T_DM, T_II, T_IM, T_MD, T_MI, T_MM, VALIDATION_TOLERANCE};
use crate::model::optimized::OptimizedProfile;
use crate::model::profile::{Profile, ProfileConfig};
use crate::msa::DigitalMsa;
use crate::rng::Randomness;

/// Column-selection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    /// Columns with at least `symfrac` weighted residue occupancy become
    /// match states.
    Fast,
    /// Honor the alignment's reference-column annotation.
    Hand,
}

/// Relative sequence weighting scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Weighting {
    Pb,
    Gsc,
    Blosum,
    None,
    Given,
}

/// How the effective sequence count is chosen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EffectiveNumber {
    /// Bisect the count scale until the mean match relative entropy hits
    /// the `ere` target.
    Entropy,
    /// Saturating exponential in the observed count, tuned by `esigma`.
    Exp,
    /// Number of single-linkage clusters at identity `eid`.
    Clust,
    /// Use the weighted observed count unchanged.
    None,
    /// An explicit count.
    Value(f32),
}

#[derive(Debug, Clone)]
pub struct Builder {
    pub alphabet: Alphabet,
    pub architecture: Architecture,
    pub weighting: Weighting,
    pub effective_number: EffectiveNumber,
    pub prior_scheme: PriorScheme,

    /// Match-column occupancy threshold.
    pub symfrac: f32,
    /// Rows spanning less than this fraction of the alignment are
    /// fragments.
    pub fragthresh: f32,
    /// BLOSUM weighting identity threshold.
    pub wid: f32,
    /// Entropy/exponential effective-number shape parameter.
    pub esigma: f32,
    /// Clustering effective-number identity threshold.
    pub eid: f32,
    /// Target mean relative entropy per match position; alphabet default
    /// when unset.
    pub ere: Option<f32>,
    /// Gap-open probability; score-matrix default when unset.
    pub popen: Option<f32>,
    /// Gap-extend probability; score-matrix default when unset.
    pub pextend: Option<f32>,
    /// Substitution matrix for single-sequence builds (amino only).
    pub score_matrix: String,

    pub calibration: CalibrationConfig,
    /// Calibration RNG seed; 0 means nondeterministic.
    pub seed: u64,

    /// Long-target windowing hints carried on built models.
    pub window_length: Option<usize>,
    pub window_beta: f64,
}

impl Builder {
    pub fn new(alphabet: Alphabet) -> Result<Self> {
        Ok(Builder {
            alphabet,
            architecture: Architecture::Fast,
            weighting: Weighting::Pb,
            effective_number: EffectiveNumber::Entropy,
            prior_scheme: PriorScheme::Alphabet,
            symfrac: 0.5,
            fragthresh: 0.5,
            wid: 0.62,
            esigma: 45.0,
            eid: 0.62,
            ere: None,
            popen: None,
            pextend: None,
            score_matrix: "BLOSUM62".to_string(),
            calibration: CalibrationConfig::default(),
            seed: 42,
            window_length: None,
            window_beta: 1e-7,
        })
    }

    fn validate(&self) -> Result<()> {
        for (name, v) in [("symfrac", self.symfrac), ("fragthresh", self.fragthresh)] {
            if !(0.0..=1.0).contains(&v) {
                return Err(PromerError::InvalidParameter(format!(
                    "{name} must be within [0, 1], got {v}"
                )));
            }
        }
        if let Some(p) = self.popen {
            if !(0.0..0.5).contains(&p) {
                return Err(PromerError::InvalidParameter(format!(
                    "popen must be within [0, 0.5), got {p}"
                )));
            }
        }
        if let Some(p) = self.pextend {
            if !(0.0..1.0).contains(&p) {
                return Err(PromerError::InvalidParameter(format!(
                    "pextend must be within [0, 1), got {p}"
                )));
            }
        }
        if let Some(e) = self.ere {
            if e <= 0.0 {
                return Err(PromerError::InvalidParameter(format!(
                    "ere must be positive, got {e}"
                )));
            }
        }
        Ok(())
    }

    fn default_ere(&self) -> f32 {
        match self.alphabet {
            Alphabet::Amino => 0.59,
            Alphabet::Dna | Alphabet::Rna => 0.62,
        }
    }

    /// Build a model from a single seed sequence: conditional substitution
    /// probabilities for emissions, uniform gap costs for transitions.
    pub fn build(
        &mut self,
        seq: &DigitalSequence,
        bg: &Background,
    ) -> Result<(Hmm, Profile, OptimizedProfile)> {
        self.validate()?;
        if seq.alphabet != self.alphabet {
            return Err(PromerError::AlphabetMismatch {
                expected: self.alphabet.name(),
                got: seq.alphabet.name(),
            });
        }
        if seq.is_empty() {
            return Err(PromerError::EmptyModel);
        }
        let m = seq.len();
        let k = self.alphabet.k();
        let mut hmm = Hmm::new(self.alphabet, m, &seq.name)?;
        hmm.accession = seq.accession.clone();
        hmm.description = seq.description.clone();

        for pos in 1..=m {
            let code = seq.seq[pos - 1];
            hmm.mat[pos] = if self.alphabet.is_canonical(code) {
                conditional_row(self.alphabet, &self.score_matrix, code as usize)?
            } else if self.alphabet.is_residue(code) {
                // Degenerate seed residue: average its members' rows.
                let members = self.alphabet.degenerate_members(code);
                let mut row = vec![0.0f32; k];
                for &mcode in &members {
                    let mrow = conditional_row(self.alphabet, &self.score_matrix, mcode as usize)?;
                    for (slot, p) in row.iter_mut().zip(&mrow) {
                        *slot += p / members.len() as f32;
                    }
                }
                row
            } else {
                bg.f.clone()
            };
        }

        let (dpopen, dpextend) = default_gap_probabilities(self.alphabet);
        let popen = self.popen.unwrap_or(dpopen);
        let pextend = self.pextend.unwrap_or(dpextend);
        for node in 0..=m {
            hmm.ins[node] = bg.f.clone();
            hmm.t[node] = [
                1.0 - 2.0 * popen,
                popen,
                popen,
                1.0 - pextend,
                pextend,
                1.0 - pextend,
                pextend,
            ];
        }
        hmm.fix_boundary_nodes();

        hmm.consensus = Some(
            seq.seq
                .iter()
                .map(|&c| (self.alphabet.sym(c) as char).to_ascii_uppercase())
                .collect(),
        );
        hmm.nseq = Some(1);
        hmm.nseq_effective = Some(1.0);
        hmm.set_composition();
        hmm.checksum = Some(hmm.compute_checksum());
        self.finish(hmm, bg, m)
    }

    /// Build a profile model from aligned columns.
    pub fn build_msa(
        &mut self,
        msa: &DigitalMsa,
        bg: &Background,
    ) -> Result<(Hmm, Profile, OptimizedProfile)> {
        self.validate()?;
        if msa.alphabet != self.alphabet {
            return Err(PromerError::AlphabetMismatch {
                expected: self.alphabet.name(),
                got: msa.alphabet.name(),
            });
        }
        if msa.nseq() == 0 || msa.alen() == 0 {
            return Err(PromerError::EmptyModel);
        }

        let weights = match self.weighting {
            Weighting::Pb => weighting::position_based(msa),
            Weighting::Gsc => weighting::gsc(msa),
            Weighting::Blosum => weighting::blosum(msa, self.wid),
            Weighting::None => vec![1.0; msa.nseq()],
            Weighting::Given => msa.weights.clone(),
        };

        let match_node = self.select_columns(msa, &weights)?;
        let m = match_node.iter().flatten().count();
        if m == 0 {
            return Err(PromerError::EmptyModel);
        }

        let mut hmm = Hmm::new(self.alphabet, m, msa.name.as_deref().unwrap_or("aln"))?;
        hmm.accession = msa.accession.clone();
        hmm.zero();
        let mut wsum = 0.0f32;
        for (row_idx, row) in msa.rows.iter().enumerate() {
            let w = weights[row_idx];
            let span = match msa.span(row_idx) {
                Some(s) => s,
                None => continue,
            };
            wsum += w;
            let fragment =
                (span.2 as f32) / (msa.alen() as f32) < self.fragthresh;
            let (first, last) = if fragment { (span.0, span.1) } else { (0, msa.alen() - 1) };
            self.count_row(&mut hmm, row, &match_node, first, last, w);
        }
        if wsum <= 0.0 {
            return Err(PromerError::EmptyModel);
        }

        let neff = self.effective_count(&hmm, bg, wsum, msa);
        hmm.scale(neff / wsum);
        if let Some(prior) = Prior::for_scheme(self.prior_scheme, self.alphabet) {
            prior.apply(&mut hmm);
        }
        hmm.renormalize();
        // Insert emissions are pinned to the background; the profile scores
        // them as zero odds.
        for node in 0..=m {
            hmm.ins[node] = bg.f.clone();
        }

        hmm.nseq = Some(msa.nseq() as u32);
        hmm.nseq_effective = Some(neff);
        hmm.map = Some(
            match_node
                .iter()
                .enumerate()
                .filter_map(|(col, k)| k.map(|_| col + 1))
                .collect(),
        );
        hmm.reference = Some(
            match_node
                .iter()
                .map(|k| if k.is_some() { 'x' } else { '.' })
                .collect(),
        );
        hmm.consensus = Some(hmm.derive_consensus());
        hmm.set_composition();
        hmm.checksum = Some(hmm.compute_checksum());
        self.finish(hmm, bg, msa.alen())
    }

    /// Map alignment columns to match nodes, or None for insert columns.
    fn select_columns(&self, msa: &DigitalMsa, weights: &[f32]) -> Result<Vec<Option<usize>>> {
        let alen = msa.alen();
        let is_match: Vec<bool> = match self.architecture {
            Architecture::Hand => msa
                .rf
                .clone()
                .ok_or_else(|| {
                    PromerError::InvalidParameter(
                        "hand architecture requires reference annotation".to_string(),
                    )
                })?,
            Architecture::Fast => (0..alen)
                .map(|col| {
                    let mut wres = 0.0f32;
                    let mut wtot = 0.0f32;
                    for (row_idx, row) in msa.rows.iter().enumerate() {
                        let code = row[col];
                        if code == msa.alphabet.missing_code() {
                            continue;
                        }
                        wtot += weights[row_idx];
                        if msa.alphabet.is_residue(code) {
                            wres += weights[row_idx];
                        }
                    }
                    wtot > 0.0 && wres / wtot >= self.symfrac
                })
                .collect(),
        };
        let mut node = 0usize;
        Ok(is_match
            .into_iter()
            .map(|m| {
                if m {
                    node += 1;
                    Some(node)
                } else {
                    None
                }
            })
            .collect())
    }

    /// Accumulate one row's weighted emission and transition counts.
    fn count_row(
        &self,
        hmm: &mut Hmm,
        row: &[u8],
        match_node: &[Option<usize>],
        first: usize,
        last: usize,
        w: f32,
    ) {
        // 0 = match-ish (begin), 1 = insert, 2 = delete
        let mut prev_state = 0u8;
        let mut prev_node = 0usize;
        let mut last_match = match_node[..first].iter().flatten().last().copied().unwrap_or(0);

        let mut transition = |hmm: &mut Hmm, from: (u8, usize), to_state: u8| {
            let idx = match (from.0, to_state) {
                (0, 0) => Some(T_MM),
                (0, 1) => Some(T_MI),
                (0, 2) => Some(T_MD),
                (1, 0) => Some(T_IM),
                (1, 1) => Some(T_II),
                (2, 0) => Some(T_DM),
                (2, 2) => Some(T_DD),
                // delete<->insert adjacencies are not expressible
                _ => None,
            };
            if let Some(t) = idx {
                hmm.t[from.1][t] += w;
            }
        };

        for col in first..=last {
            let code = row[col];
            match match_node[col] {
                Some(k) => {
                    if hmm.alphabet.is_residue(code) {
                        self.count_emission(&mut hmm.mat[k], code, w);
                        transition(hmm, (prev_state, prev_node), 0);
                        prev_state = 0;
                    } else {
                        transition(hmm, (prev_state, prev_node), 2);
                        prev_state = 2;
                    }
                    prev_node = k;
                    last_match = k;
                }
                None => {
                    if hmm.alphabet.is_residue(code) {
                        self.count_emission(&mut hmm.ins[last_match], code, w);
                        transition(hmm, (prev_state, prev_node), 1);
                        prev_state = 1;
                        prev_node = last_match;
                    }
                }
            }
        }
        // Exit to the end state.
        let exit = match prev_state {
            0 => T_MM,
            1 => T_IM,
            _ => T_DM,
        };
        hmm.t[prev_node][exit] += w;
    }

    fn count_emission(&self, row: &mut [f32], code: u8, w: f32) {
        if self.alphabet.is_canonical(code) {
            row[code as usize] += w;
        } else {
            let members = self.alphabet.degenerate_members(code);
            let share = w / members.len() as f32;
            for &mcode in &members {
                row[mcode as usize] += share;
            }
        }
    }

    /// Effective sequence count per the configured method.
    fn effective_count(&self, counts: &Hmm, bg: &Background, wsum: f32, msa: &DigitalMsa) -> f32 {
        match self.effective_number {
            EffectiveNumber::Value(v) => v.max(f32::MIN_POSITIVE),
            EffectiveNumber::None => wsum,
            EffectiveNumber::Clust => {
                weighting::single_linkage_clusters(msa, self.eid).1 as f32
            }
            EffectiveNumber::Exp => {
                (self.esigma * (1.0 - (-wsum / self.esigma).exp())).clamp(1.0, wsum)
            }
            EffectiveNumber::Entropy => {
                let prior = match Prior::for_scheme(self.prior_scheme, self.alphabet) {
                    Some(p) => p,
                    // Without pseudocounts the entropy is scale-invariant.
                    None => return wsum,
                };
                let target = self
                    .ere
                    .unwrap_or_else(|| self.default_ere())
                    .max(self.esigma / (2.0 * counts.m as f32));
                let entropy_at = |neff: f32| -> f32 {
                    let mut h = counts.clone();
                    h.scale(neff / wsum);
                    prior.apply(&mut h);
                    h.renormalize();
                    h.mean_match_relative_entropy(bg)
                };
                if entropy_at(wsum) <= target {
                    return wsum;
                }
                let (mut lo, mut hi) = (0.0f32, wsum);
                for _ in 0..32 {
                    let mid = 0.5 * (lo + hi);
                    if entropy_at(mid) > target {
                        hi = mid;
                    } else {
                        lo = mid;
                    }
                }
                0.5 * (lo + hi)
            }
        }
    }

    /// Validate the count-normalized model, configure its profile at `l`,
    /// convert, and calibrate.
    fn finish(
        &mut self,
        mut hmm: Hmm,
        bg: &Background,
        l: usize,
    ) -> Result<(Hmm, Profile, OptimizedProfile)> {
        hmm.validate(VALIDATION_TOLERANCE)?;
        let mut gm = Profile::new(self.alphabet);
        gm.configure(&hmm, bg, ProfileConfig { l, multihit: true, local: true })?;
        let mut om = OptimizedProfile::from_profile(&gm)?;

        let mut rng = Randomness::new(self.seed);
        let mut cal_bg = bg.clone();
        let params = calibrate(&mut om, &mut cal_bg, &self.calibration, &mut rng);
        hmm.evalue_parameters = Some(params);
        gm.evalue_parameters = Some(params);
        om.profile.evalue_parameters = Some(params);
        om.set_length(l);
        Ok((hmm, gm, om))
    }
}
