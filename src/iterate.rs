//! Iterative search: alternate searching and model rebuilding until the
//! set of included hits stops changing.

use rustc_hash::FxHashSet;

use crate::align::trace_aligner::{stack_traces, TraceEntry};
use crate::alphabet::DigitalSequence;
use crate::build::builder::Builder;
use crate::errors::{PromerError, Result};
use crate::model::background::Background;
use crate::model::hmm::Hmm;
use crate::msa::DigitalMsa;
use crate::results::tophits::TopHits;
use crate::search::pipeline::{Pipeline, PipelineQuery};

/// One round's outcome: the model that will drive the next round, this
/// round's hits, the alignment the model was rebuilt from, and the
/// convergence state.
pub struct IterationResult {
    pub hmm: Hmm,
    pub hits: TopHits,
    pub msa: DigitalMsa,
    pub converged: bool,
    pub iteration: usize,
}

/// Caller hook to adjust inclusion flags between search and rebuild.
pub type SelectHits<'a> = Box<dyn FnMut(&mut TopHits) + 'a>;

pub struct IterativeSearch<'a> {
    pipeline: &'a mut Pipeline,
    builder: &'a mut Builder,
    targets: &'a [DigitalSequence],
    /// The seed sequence, kept in every rebuilt alignment so the model
    /// stays anchored on the original query.
    query_seq: Option<DigitalSequence>,
    hmm: Hmm,
    ranking: FxHashSet<String>,
    select_hits: Option<SelectHits<'a>>,
    converged: bool,
    iteration: usize,
}

impl<'a> IterativeSearch<'a> {
    /// Start from a seed sequence: round 1 searches a single-sequence
    /// model.
    pub fn from_seq(
        pipeline: &'a mut Pipeline,
        builder: &'a mut Builder,
        query: &DigitalSequence,
        targets: &'a [DigitalSequence],
    ) -> Result<Self> {
        let bg = Background::new(pipeline.alphabet);
        let (hmm, _, _) = builder.build(query, &bg)?;
        Ok(IterativeSearch {
            pipeline,
            builder,
            targets,
            query_seq: Some(query.clone()),
            hmm,
            ranking: FxHashSet::default(),
            select_hits: None,
            converged: false,
            iteration: 0,
        })
    }

    /// Start from an existing model.
    pub fn from_hmm(
        pipeline: &'a mut Pipeline,
        builder: &'a mut Builder,
        query: Hmm,
        targets: &'a [DigitalSequence],
    ) -> Result<Self> {
        if query.alphabet != pipeline.alphabet {
            return Err(PromerError::AlphabetMismatch {
                expected: pipeline.alphabet.name(),
                got: query.alphabet.name(),
            });
        }
        Ok(IterativeSearch {
            pipeline,
            builder,
            targets,
            query_seq: None,
            hmm: query,
            ranking: FxHashSet::default(),
            select_hits: None,
            converged: false,
            iteration: 0,
        })
    }

    pub fn set_select_hits(&mut self, hook: SelectHits<'a>) {
        self.select_hits = Some(hook);
    }

    pub fn converged(&self) -> bool {
        self.converged
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Alignment of this round's included hits plus the anchoring query.
    fn rebuild_msa(&self, hits: &TopHits) -> Result<DigitalMsa> {
        let alphabet = self.pipeline.alphabet;
        let mut entries: Vec<TraceEntry<'_>> = Vec::new();
        let mut m = self.hmm.m;

        // Anchor row: the seed aligned to the current model.
        let aligner = crate::align::TraceAligner::new(alphabet);
        let anchor_traces = match &self.query_seq {
            Some(q) => Some((q, aligner.compute_traces(&self.hmm, std::slice::from_ref(q))?)),
            None => None,
        };
        if let Some((q, traces)) = &anchor_traces {
            m = m.max(traces[0].m);
            entries.push(TraceEntry {
                name: q.name.clone(),
                residues: &q.seq,
                trace: &traces[0],
            });
        }
        for hit in hits.included() {
            let target = match self.targets.iter().find(|s| s.name == hit.name) {
                Some(t) => t,
                None => continue,
            };
            for dom in hit.domains.included() {
                if let Some(trace) = &dom.trace {
                    entries.push(TraceEntry {
                        name: format!("{}/{}-{}", hit.name, dom.ali_from, dom.ali_to),
                        residues: &target.seq,
                        trace,
                    });
                }
            }
        }
        let mut text = stack_traces(m, alphabet, &entries, false, true);
        text.name = Some(self.hmm.name.clone());
        text.digitize(alphabet)
    }

    fn step(&mut self) -> Result<IterationResult> {
        self.iteration += 1;
        let mut hits = self
            .pipeline
            .search_hmm(PipelineQuery::Hmm(&self.hmm), self.targets)?;
        if let Some(hook) = self.select_hits.as_mut() {
            hook(&mut hits);
        }
        for hit in hits.iter_mut() {
            hit.new = hit.included && !self.ranking.contains(&hit.name);
        }

        let n_new = hits.compare_ranking(&self.ranking);
        let n_included = hits.included_len();
        if self.iteration > 1 && n_new == 0 && n_included == self.ranking.len() {
            self.converged = true;
        }
        self.ranking = hits.included().map(|h| h.name.clone()).collect();

        let msa = self.rebuild_msa(&hits)?;
        if !self.converged && msa.nseq() > 0 {
            let bg = Background::new(self.pipeline.alphabet);
            let name = self.hmm.name.clone();
            let (mut new_hmm, _, _) = self.builder.build_msa(&msa, &bg)?;
            new_hmm.name = name;
            self.hmm = new_hmm;
        }

        Ok(IterationResult {
            hmm: self.hmm.clone(),
            hits,
            msa,
            converged: self.converged,
            iteration: self.iteration,
        })
    }
}

impl<'a> Iterator for IterativeSearch<'a> {
    type Item = Result<IterationResult>;

    /// Yields one round per call; after the converged round, returns None.
    fn next(&mut self) -> Option<Self::Item> {
        if self.converged {
            return None;
        }
        Some(self.step())
    }
}

impl Pipeline {
    /// Start a jackhmmer-style refinement loop from a seed sequence.
    pub fn iterate_seq<'a>(
        &'a mut self,
        builder: &'a mut Builder,
        query: &DigitalSequence,
        targets: &'a [DigitalSequence],
    ) -> Result<IterativeSearch<'a>> {
        IterativeSearch::from_seq(self, builder, query, targets)
    }

    /// Start a refinement loop from an existing model.
    pub fn iterate_hmm<'a>(
        &'a mut self,
        builder: &'a mut Builder,
        query: Hmm,
        targets: &'a [DigitalSequence],
    ) -> Result<IterativeSearch<'a>> {
        IterativeSearch::from_hmm(self, builder, query, targets)
    }
}
