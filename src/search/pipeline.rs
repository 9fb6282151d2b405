//! The scoring cascade: length reconfig, MSV filter, bias filter, Viterbi
//! filter, Forward, then domain definition. Targets that survive every
//! stage become hits in a `TopHits` accumulator.
//!
//! One pipeline drives one worker. For parallel searches, clone the
//! pipeline per worker, score disjoint target chunks into private
//! accumulators, and merge.

use rayon::prelude::*;

use crate::alphabet::{Alphabet, DigitalSequence};
use crate::build::builder::Builder;
use crate::build::calibrate::{calibrate, CalibrationConfig};
use crate::errors::{PromerError, Result};
use crate::model::background::Background;
use crate::model::hmm::Hmm;
use crate::model::optimized::OptimizedProfile;
use crate::model::profile::{Profile, ProfileConfig};
use crate::msa::DigitalMsa;
use crate::results::hits::{Domain, Domains, Hit};
use crate::results::tophits::{SearchMode, SortKey, TopHits, Thresholds};
use crate::rng::Randomness;
use crate::search::domaindef::define_domains;
use crate::search::fwdback::{backward, forward, posterior};
use crate::search::msv::msv_filter;
use crate::search::vitfilter::viterbi_filter;
use crate::stats::{exponential, gumbel, nats_to_bits};

/// Default filter survival thresholds.
pub const DEFAULT_F1: f64 = 0.02;
pub const DEFAULT_F2: f64 = 1e-3;
pub const DEFAULT_F3: f64 = 1e-5;

/// Model/length hints used to preconfigure an HMM query before the first
/// target fixes the real length.
pub const M_HINT: usize = 100;
pub const L_HINT: usize = 100;

/// Everything tunable about a pipeline, with the documented defaults.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// MSV filter survival threshold.
    pub f1: f64,
    /// Viterbi filter survival threshold.
    pub f2: f64,
    /// Forward filter survival threshold.
    pub f3: f64,
    /// Run the composition bias filter after MSV.
    pub bias_filter: bool,
    /// Apply the null2 correction during domain definition.
    pub null2: bool,
    /// Reporting and inclusion thresholds.
    pub thresholds: Thresholds,
    /// Override for the sequence search-space size.
    pub z: Option<f64>,
    /// Override for the domain search-space size.
    pub dom_z: Option<f64>,
    /// Seed for lazy calibration of uncalibrated queries.
    pub seed: u64,
    /// Profile configuration for HMM queries.
    pub multihit: bool,
    pub local: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            f1: DEFAULT_F1,
            f2: DEFAULT_F2,
            f3: DEFAULT_F3,
            bias_filter: true,
            null2: true,
            thresholds: Thresholds::default(),
            z: None,
            dom_z: None,
            seed: 42,
            multihit: true,
            local: true,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, v) in [("F1", self.f1), ("F2", self.f2), ("F3", self.f3)] {
            if !(0.0..=1.0).contains(&v) {
                return Err(PromerError::InvalidParameter(format!(
                    "{name} must be within [0, 1], got {v}"
                )));
            }
        }
        for (name, v) in [
            ("E", self.thresholds.e),
            ("domE", self.thresholds.dom_e),
            ("incE", self.thresholds.inc_e),
            ("incdomE", self.thresholds.incdom_e),
        ] {
            if v <= 0.0 {
                return Err(PromerError::InvalidParameter(format!(
                    "{name} must be positive, got {v}"
                )));
            }
        }
        if let Some(z) = self.z {
            if z <= 0.0 {
                return Err(PromerError::InvalidParameter(format!("Z must be positive, got {z}")));
            }
        }
        Ok(())
    }
}

/// A query in any of its three forms; the HMM arm derives the other two.
pub enum PipelineQuery<'a> {
    Hmm(&'a Hmm),
    Profile(&'a Profile),
    Optimized(&'a OptimizedProfile),
}

impl<'a> From<&'a Hmm> for PipelineQuery<'a> {
    fn from(h: &'a Hmm) -> Self {
        PipelineQuery::Hmm(h)
    }
}

impl<'a> From<&'a Profile> for PipelineQuery<'a> {
    fn from(p: &'a Profile) -> Self {
        PipelineQuery::Profile(p)
    }
}

impl<'a> From<&'a OptimizedProfile> for PipelineQuery<'a> {
    fn from(o: &'a OptimizedProfile) -> Self {
        PipelineQuery::Optimized(o)
    }
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    pub alphabet: Alphabet,
    pub config: PipelineConfig,
    bg: Background,
    pub searched_models: u64,
    pub searched_nodes: u64,
    pub searched_sequences: u64,
    pub searched_residues: u64,
}

impl Pipeline {
    pub fn new(alphabet: Alphabet, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Pipeline {
            alphabet,
            config,
            bg: Background::new(alphabet),
            searched_models: 0,
            searched_nodes: 0,
            searched_sequences: 0,
            searched_residues: 0,
        })
    }

    /// Reset accumulated search statistics. Configuration, thresholds, and
    /// overrides survive.
    pub fn clear(&mut self) {
        self.searched_models = 0;
        self.searched_nodes = 0;
        self.searched_sequences = 0;
        self.searched_residues = 0;
        self.bg = Background::new(self.alphabet);
    }

    /// Resolve a query into a private optimized profile, lazily calibrating
    /// score distributions when the model carries none.
    pub fn prepare_query(&mut self, query: PipelineQuery<'_>) -> Result<OptimizedProfile> {
        let mut om = match query {
            PipelineQuery::Hmm(hmm) => {
                if hmm.alphabet != self.alphabet {
                    return Err(PromerError::AlphabetMismatch {
                        expected: self.alphabet.name(),
                        got: hmm.alphabet.name(),
                    });
                }
                let mut gm = Profile::new(self.alphabet);
                gm.configure(
                    hmm,
                    &self.bg,
                    ProfileConfig {
                        l: L_HINT,
                        multihit: self.config.multihit,
                        local: self.config.local,
                    },
                )?;
                OptimizedProfile::from_profile(&gm)?
            }
            PipelineQuery::Profile(gm) => {
                gm.require_configured()?;
                if gm.alphabet != self.alphabet {
                    return Err(PromerError::AlphabetMismatch {
                        expected: self.alphabet.name(),
                        got: gm.alphabet.name(),
                    });
                }
                OptimizedProfile::from_profile(gm)?
            }
            PipelineQuery::Optimized(om) => {
                if om.profile.alphabet != self.alphabet {
                    return Err(PromerError::AlphabetMismatch {
                        expected: self.alphabet.name(),
                        got: om.profile.alphabet.name(),
                    });
                }
                om.clone()
            }
        };
        if om.evalue_parameters().is_none() {
            let mut rng = Randomness::new(self.config.seed);
            let mut bg = self.bg.clone();
            let params = calibrate(&mut om, &mut bg, &CalibrationConfig::default(), &mut rng);
            om.profile.evalue_parameters = Some(params);
        }
        if let Some(comp) = om.profile.composition.clone() {
            self.bg.set_filter(&comp)?;
        }
        Ok(om)
    }

    /// Search one query model against a block of target sequences.
    pub fn search_hmm(
        &mut self,
        query: PipelineQuery<'_>,
        targets: &[DigitalSequence],
    ) -> Result<TopHits> {
        let mut om = self.prepare_query(query)?;
        let (mut hits, passed) = self.run_search(&mut om, targets, 0)?;
        let z = self.config.z.unwrap_or(targets.len() as f64);
        let dom_z = self.config.dom_z.unwrap_or(passed as f64);
        hits.finalize(z, dom_z);
        Ok(hits)
    }

    /// Search one query model against targets with a rayon worker pool; one
    /// cloned pipeline and accumulator per chunk, merged at the end.
    pub fn search_hmm_parallel(
        &mut self,
        query: PipelineQuery<'_>,
        targets: &[DigitalSequence],
        chunk_size: usize,
    ) -> Result<TopHits> {
        let om = self.prepare_query(query)?;
        let chunk = chunk_size.max(1);
        let shards: Vec<Result<TopHits>> = targets
            .par_chunks(chunk)
            .enumerate()
            .map(|(ci, block)| {
                let mut worker = self.clone();
                let mut om = om.clone();
                let (mut shard, passed) = worker.run_search(&mut om, block, ci * chunk)?;
                shard.set_default_sizes(block.len() as f64, passed as f64);
                Ok(shard)
            })
            .collect();
        let mut collected = Vec::with_capacity(shards.len());
        for shard in shards {
            collected.push(shard?);
        }
        let mut head = TopHits::new(om.name(), om.profile.accession.as_deref(), SearchMode::Search);
        head.thresholds = self.config.thresholds;
        head.cutoff_pair = self.resolve_cutoffs(&om)?;
        if let Some(z) = self.config.z {
            head.set_z(z);
        }
        if let Some(dz) = self.config.dom_z {
            head.set_dom_z(dz);
        }
        let mut merged = head.merge(collected)?;
        merged.sort(SortKey::Key);
        Ok(merged)
    }

    /// Build a single-sequence model from `query`, then search with it.
    pub fn search_seq(
        &mut self,
        query: &DigitalSequence,
        targets: &[DigitalSequence],
        builder: Option<&mut Builder>,
    ) -> Result<TopHits> {
        if query.alphabet != self.alphabet {
            return Err(PromerError::AlphabetMismatch {
                expected: self.alphabet.name(),
                got: query.alphabet.name(),
            });
        }
        let mut default_builder;
        let builder = match builder {
            Some(b) => b,
            None => {
                default_builder = Builder::new(self.alphabet)?;
                &mut default_builder
            }
        };
        let bg = self.bg.clone();
        let (_, _, om) = builder.build(query, &bg)?;
        self.search_hmm(PipelineQuery::Optimized(&om), targets)
    }

    /// Build a model from an alignment, then search with it.
    pub fn search_msa(
        &mut self,
        query: &DigitalMsa,
        targets: &[DigitalSequence],
        builder: Option<&mut Builder>,
    ) -> Result<TopHits> {
        if query.alphabet != self.alphabet {
            return Err(PromerError::AlphabetMismatch {
                expected: self.alphabet.name(),
                got: query.alphabet.name(),
            });
        }
        let mut default_builder;
        let builder = match builder {
            Some(b) => b,
            None => {
                default_builder = Builder::new(self.alphabet)?;
                &mut default_builder
            }
        };
        let bg = self.bg.clone();
        let (_, _, om) = builder.build_msa(query, &bg)?;
        self.search_hmm(PipelineQuery::Optimized(&om), targets)
    }

    /// Scan one sequence against a stream of models. Each model is scored
    /// against the single target; hits are per-model.
    pub fn scan_seq<I>(&mut self, query: &DigitalSequence, models: I) -> Result<TopHits>
    where
        I: IntoIterator<Item = Result<OptimizedProfile>>,
    {
        if query.alphabet != self.alphabet {
            return Err(PromerError::AlphabetMismatch {
                expected: self.alphabet.name(),
                got: query.alphabet.name(),
            });
        }
        let mut hits = TopHits::new(&query.name, query.accession.as_deref(), SearchMode::Scan);
        hits.thresholds = self.config.thresholds;
        let mut n_models = 0usize;
        let mut passed = 0usize;
        for (idx, model) in models.into_iter().enumerate() {
            let model = model?;
            let mut om = self.prepare_query(PipelineQuery::Optimized(&model))?;
            if hits.cutoff_pair.is_none() {
                hits.cutoff_pair = self.resolve_cutoffs(&om)?;
            }
            n_models += 1;
            self.searched_models += 1;
            self.searched_nodes += om.m() as u64;
            if self.process_target(&mut om, query, idx, &mut hits, true)? {
                passed += 1;
            }
        }
        self.searched_sequences += 1;
        self.searched_residues += query.len() as u64;
        hits.searched_models = n_models as u64;
        hits.searched_sequences = 1;
        hits.searched_residues = query.len() as u64;
        let z = self.config.z.unwrap_or(n_models as f64);
        let dom_z = self.config.dom_z.unwrap_or(passed as f64);
        hits.finalize(z, dom_z);
        Ok(hits)
    }

    fn resolve_cutoffs(&self, om: &OptimizedProfile) -> Result<Option<(f32, f32)>> {
        match self.config.thresholds.bit_cutoffs {
            None => Ok(None),
            Some(sel) => om.cutoffs().require(sel, om.name()).map(Some),
        }
    }

    /// Inner search loop: score every target, append survivors. Returns the
    /// unfinalized accumulator and the count of targets that reached domain
    /// definition.
    fn run_search(
        &mut self,
        om: &mut OptimizedProfile,
        targets: &[DigitalSequence],
        base_idx: usize,
    ) -> Result<(TopHits, usize)> {
        let mut hits = TopHits::new(om.name(), om.profile.accession.as_deref(), SearchMode::Search);
        hits.thresholds = self.config.thresholds;
        hits.cutoff_pair = self.resolve_cutoffs(om)?;
        if let Some(z) = self.config.z {
            hits.set_z(z);
        }
        if let Some(dz) = self.config.dom_z {
            hits.set_dom_z(dz);
        }
        let mut passed = 0usize;
        for (i, target) in targets.iter().enumerate() {
            if target.alphabet != self.alphabet {
                return Err(PromerError::AlphabetMismatch {
                    expected: self.alphabet.name(),
                    got: target.alphabet.name(),
                });
            }
            if self.process_target(om, target, base_idx + i, &mut hits, false)? {
                passed += 1;
            }
        }
        self.searched_models += 1;
        self.searched_nodes += om.m() as u64;
        hits.searched_models = 1;
        hits.searched_nodes = om.m() as u64;
        hits.searched_sequences = targets.len() as u64;
        hits.searched_residues = targets.iter().map(|t| t.len() as u64).sum();
        self.searched_sequences += targets.len() as u64;
        self.searched_residues += hits.searched_residues;
        Ok((hits, passed))
    }

    /// Run the cascade for one (model, target) pair. Returns true when the
    /// pair survived the Forward stage and produced a hit.
    pub(crate) fn process_target(
        &mut self,
        om: &mut OptimizedProfile,
        target: &DigitalSequence,
        seqidx: usize,
        hits: &mut TopHits,
        scan_mode: bool,
    ) -> Result<bool> {
        let l = target.len();
        if l == 0 {
            // Degenerate target: tallied, never scored.
            return Ok(false);
        }
        let params = om
            .evalue_parameters()
            .expect("prepare_query guarantees calibration");

        // Stage 0: length reconfig.
        self.bg.set_length(l);
        om.set_length(l);
        let null = self.bg.null_score(l);

        // Stage 1: MSV filter.
        let msv = msv_filter(om, &target.seq);
        let msv_bits = nats_to_bits(msv - null);
        let p_msv = gumbel::surv(msv_bits as f64, params.m_mu as f64, params.m_lambda as f64);
        if p_msv > self.config.f1 {
            return Ok(false);
        }

        // Stage 2: bias filter, rescoring MSV against the composition null.
        if self.config.bias_filter {
            let filter_null = self.bg.filter_score(&target.seq);
            let bias_bits = nats_to_bits(msv - filter_null);
            let p_bias =
                gumbel::surv(bias_bits as f64, params.m_mu as f64, params.m_lambda as f64);
            if p_bias > self.config.f1 {
                return Ok(false);
            }
        }

        // Stage 3: Viterbi filter.
        let vit = viterbi_filter(om, &target.seq);
        let vit_bits = nats_to_bits(vit - null);
        let p_vit = gumbel::surv(vit_bits as f64, params.v_mu as f64, params.v_lambda as f64);
        if p_vit > self.config.f2 {
            return Ok(false);
        }

        // Stage 4: Forward.
        let (fwd_matrix, fwd) = forward(&om.profile, &target.seq)?;
        let pre_score = nats_to_bits(fwd - null);
        let p_fwd =
            exponential::surv(pre_score as f64, params.f_tau as f64, params.f_lambda as f64);
        if p_fwd > self.config.f3 {
            return Ok(false);
        }

        // Stage 5: posterior decoding and domain definition.
        let (bck_matrix, _) = backward(&om.profile, &target.seq)?;
        let post = posterior(&om.profile, &fwd_matrix, &bck_matrix, fwd);
        let candidates = define_domains(
            &om.profile,
            &self.bg,
            target,
            &post,
            &params,
            self.config.null2,
            self.bg.omega,
        )?;
        if candidates.is_empty() {
            return Ok(false);
        }

        let bias: f32 = candidates.iter().map(|c| c.bias).sum();
        let sum_score: f32 = candidates.iter().map(|c| c.score).sum();
        let best_domain = candidates
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.score.partial_cmp(&b.1.score).unwrap())
            .map(|(i, _)| i)
            .unwrap_or(0);
        // The complete-sequence score covers every domain path; reconcile
        // rounding drift so the best domain never outranks its own hit.
        let score = (pre_score - bias).max(candidates[best_domain].score);
        let pvalue =
            exponential::surv(score as f64, params.f_tau as f64, params.f_lambda as f64);

        let domains = Domains(
            candidates
                .into_iter()
                .map(|c| Domain {
                    env_from: c.env_from,
                    env_to: c.env_to,
                    ali_from: c.ali_from,
                    ali_to: c.ali_to,
                    hmm_from: c.hmm_from,
                    hmm_to: c.hmm_to,
                    score: c.score,
                    bias: c.bias,
                    envelope_score: c.envelope_score,
                    c_evalue: 0.0,
                    i_evalue: 0.0,
                    pvalue: c.pvalue,
                    reported: false,
                    included: false,
                    alignment: c.alignment,
                    trace: Some(c.trace),
                })
                .collect(),
        );

        // In scan mode the hit names the model; in search mode, the target.
        let (name, accession, description) = if scan_mode {
            (
                om.name().to_string(),
                om.profile.accession.clone(),
                om.profile.description.clone(),
            )
        } else {
            (target.name.clone(), target.accession.clone(), target.description.clone())
        };

        hits.append(Hit {
            name,
            accession,
            description,
            score,
            pre_score,
            sum_score,
            bias,
            evalue: 0.0,
            pvalue,
            best_domain,
            domains,
            seqidx,
            target_length: l,
            reported: false,
            included: false,
            new: false,
            dropped: false,
            duplicate: false,
        });
        Ok(true)
    }
}
