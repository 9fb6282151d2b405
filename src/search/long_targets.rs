//! Windowed search for long nucleotide targets.
//!
//! A target is scanned in overlapping blocks so memory stays bounded by the
//! block length, not the target length. Inside a passing block, the full
//! cascade runs over bounded subwindows; seam duplicates from the overlaps
//! are flagged and dropped at merge. Envelope coordinates always refer to
//! the original full-length target, with `env_from > env_to` marking a
//! crick-strand hit.

use crate::alphabet::{Alphabet, DigitalSequence};
use crate::errors::{PromerError, Result};
use crate::model::scoredata::ScoreData;
use crate::results::tophits::{SearchMode, SortKey, Strand, TopHits};
use crate::search::msv::msv_filter;
use crate::search::pipeline::{Pipeline, PipelineQuery};
use crate::stats::{gumbel, nats_to_bits};

/// Default scan block length.
pub const DEFAULT_BLOCK_LENGTH: usize = 262_144;

#[derive(Debug, Clone)]
pub struct LongTargetsConfig {
    /// Length of the overlapping blocks a target is cut into.
    pub block_length: usize,
    /// Filter window lengths for the MSV, Viterbi, and Forward stages.
    pub b1: usize,
    pub b2: usize,
    pub b3: usize,
    pub strand: Strand,
}

impl Default for LongTargetsConfig {
    fn default() -> Self {
        LongTargetsConfig {
            block_length: DEFAULT_BLOCK_LENGTH,
            b1: 110,
            b2: 240,
            b3: 1000,
            strand: Strand::Both,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LongTargetsPipeline {
    pub pipeline: Pipeline,
    pub config: LongTargetsConfig,
}

impl LongTargetsPipeline {
    pub fn new(pipeline: Pipeline, config: LongTargetsConfig) -> Result<Self> {
        if pipeline.alphabet == Alphabet::Amino {
            return Err(PromerError::InvalidParameter(
                "long-target search requires a nucleic alphabet".to_string(),
            ));
        }
        if config.block_length < 2 {
            return Err(PromerError::InvalidParameter(format!(
                "block length {} is too small",
                config.block_length
            )));
        }
        Ok(LongTargetsPipeline { pipeline, config })
    }

    /// Search a query model against long targets, strand-aware.
    pub fn search_hmm(
        &mut self,
        query: PipelineQuery<'_>,
        targets: &[DigitalSequence],
    ) -> Result<TopHits> {
        let om = self.pipeline.prepare_query(query)?;
        let m = om.m();
        let block = self.config.block_length;
        let score_data = ScoreData::new(&om.profile, &om);
        // A window seam must hold the longest hit the score tables allow.
        let overlap = score_data.max_hit_extent().max(128).min(block / 2);

        let mut shards: Vec<TopHits> = Vec::new();
        let mut passed_total = 0usize;
        let mut residues = 0u64;

        for (tidx, target) in targets.iter().enumerate() {
            if target.alphabet != self.pipeline.alphabet {
                return Err(PromerError::AlphabetMismatch {
                    expected: self.pipeline.alphabet.name(),
                    got: target.alphabet.name(),
                });
            }
            residues += target.len() as u64;
            let l = target.len();
            let mut start = 0usize;
            loop {
                let end = (start + block).min(l);
                let window = &target.seq[start..end];

                if matches!(self.config.strand, Strand::Watson | Strand::Both) {
                    let mut shard = self.scan_window(&om, &score_data, target, window, tidx)?;
                    translate_watson(&mut shard, start);
                    passed_total += shard.len();
                    shards.push(shard);
                }
                if matches!(self.config.strand, Strand::Crick | Strand::Both) {
                    let mut rc = DigitalSequence::new(&target.name, target.alphabet, window.to_vec());
                    rc.reverse_complement_in_place()?;
                    let mut shard = self.scan_window(&om, &score_data, target, &rc.seq, tidx)?;
                    translate_crick(&mut shard, end);
                    passed_total += shard.len();
                    shards.push(shard);
                }

                if end == l {
                    break;
                }
                start = end - overlap;
            }
        }

        let mut head = TopHits::new(om.name(), om.profile.accession.as_deref(), SearchMode::Search);
        head.thresholds = self.pipeline.config.thresholds;
        head.long_targets = true;
        head.strand = Some(self.config.strand);
        head.block_length = Some(block);
        head.set_z(self.pipeline.config.z.unwrap_or(targets.len() as f64));
        head.set_dom_z(self.pipeline.config.dom_z.unwrap_or((passed_total as f64).max(1.0)));
        head.searched_sequences = targets.len() as u64;
        head.searched_residues = residues;
        head.searched_models = 1;
        head.searched_nodes = m as u64;

        let mut merged = head.merge(shards)?;
        merged.sort(SortKey::Key);
        Ok(merged)
    }

    /// Run the cascade over one block: a best-case score-table reject, a
    /// whole-block MSV reject, then the full pipeline over bounded
    /// subwindows.
    fn scan_window(
        &mut self,
        om: &crate::model::optimized::OptimizedProfile,
        score_data: &ScoreData,
        target: &DigitalSequence,
        window: &[u8],
        seqidx: usize,
    ) -> Result<TopHits> {
        let mut om = om.clone();
        let mut shard =
            TopHits::new(om.name(), om.profile.accession.as_deref(), SearchMode::Search);
        shard.thresholds = self.pipeline.config.thresholds;
        shard.long_targets = true;

        let params = om.evalue_parameters().expect("calibrated");
        om.set_length(window.len());
        let mut bg_l = crate::model::background::Background::new(target.alphabet);
        bg_l.set_length(window.len());
        let null = bg_l.null_score(window.len());

        // Best-case reject: even granting every residue its table maximum
        // with no entry or exit costs, the window cannot pass the filter.
        let ub_bits = nats_to_bits(score_data.msv_upper_bound(window) - null);
        let p_ub = gumbel::surv(ub_bits as f64, params.m_mu as f64, params.m_lambda as f64);
        if p_ub > self.pipeline.config.f1 {
            return Ok(shard);
        }

        // Fast reject on the whole block.
        let msv = msv_filter(&om, window);
        let p = gumbel::surv(
            nats_to_bits(msv - null) as f64,
            params.m_mu as f64,
            params.m_lambda as f64,
        );
        if p > self.pipeline.config.f1 {
            return Ok(shard);
        }

        // Bounded subwindows keep the Forward matrices small; the overlap
        // comes from the score tables so a hit can never straddle a seam
        // uncovered.
        let extent = score_data.max_hit_extent();
        let sub_len = self.config.b3.max(extent).min(window.len().max(1));
        let sub_overlap = extent.min(sub_len / 2);
        let mut s = 0usize;
        loop {
            let e = (s + sub_len).min(window.len());
            // The same best-case reject, per subwindow: the true filter
            // score never exceeds the table bound, so a skipped subwindow
            // could not have passed stage 1.
            bg_l.set_length(e - s);
            let sub_ub = nats_to_bits(
                score_data.msv_upper_bound(&window[s..e]) - bg_l.null_score(e - s),
            );
            let p_sub =
                gumbel::surv(sub_ub as f64, params.m_mu as f64, params.m_lambda as f64);
            if p_sub > self.pipeline.config.f1 {
                if e == window.len() {
                    break;
                }
                s = e - sub_overlap;
                continue;
            }
            let sub = DigitalSequence {
                name: target.name.clone(),
                accession: target.accession.clone(),
                description: target.description.clone(),
                alphabet: target.alphabet,
                seq: window[s..e].to_vec(),
            };
            let before = shard.len();
            self.pipeline.process_target(&mut om, &sub, seqidx, &mut shard, false)?;
            // Lift subwindow coordinates to window coordinates.
            for hit in shard.iter_mut().skip(before) {
                for dom in hit.domains.0.iter_mut() {
                    dom.env_from += s;
                    dom.env_to += s;
                    dom.ali_from += s;
                    dom.ali_to += s;
                    dom.alignment.target_from += s;
                    dom.alignment.target_to += s;
                    if let Some(trace) = dom.trace.as_mut() {
                        for step in trace.steps.iter_mut() {
                            if step.i > 0 {
                                step.i += s;
                            }
                        }
                    }
                }
            }
            if e == window.len() {
                break;
            }
            s = e - sub_overlap;
        }
        Ok(shard)
    }
}

/// Shift window-local coordinates to target coordinates on the watson
/// strand.
fn translate_watson(shard: &mut TopHits, offset: usize) {
    for hit in shard.iter_mut() {
        for dom in hit.domains.0.iter_mut() {
            dom.env_from += offset;
            dom.env_to += offset;
            dom.ali_from += offset;
            dom.ali_to += offset;
            dom.alignment.target_from += offset;
            dom.alignment.target_to += offset;
            if let Some(trace) = dom.trace.as_mut() {
                for step in trace.steps.iter_mut() {
                    if step.i > 0 {
                        step.i += offset;
                    }
                }
            }
        }
    }
}

/// Map reverse-complement window coordinates back to forward-strand target
/// coordinates. Position `j` of a complemented window ending at forward
/// offset `end` is forward position `end - j + 1`, so every crick hit
/// reports `env_from > env_to`.
fn translate_crick(shard: &mut TopHits, end: usize) {
    for hit in shard.iter_mut() {
        for dom in hit.domains.0.iter_mut() {
            dom.env_from = end - dom.env_from + 1;
            dom.env_to = end - dom.env_to + 1;
            dom.ali_from = end - dom.ali_from + 1;
            dom.ali_to = end - dom.ali_to + 1;
            dom.alignment.target_from = end - dom.alignment.target_from + 1;
            dom.alignment.target_to = end - dom.alignment.target_to + 1;
            // The path is expressed in complemented coordinates; it cannot
            // be lifted to the forward strand.
            dom.trace = None;
        }
    }
}
