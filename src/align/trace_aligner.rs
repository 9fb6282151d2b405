//! Align sequences to a model by Viterbi, and stack state paths into an
//! alignment.

use crate::alphabet::{Alphabet, DigitalSequence};
use crate::errors::{PromerError, Result};
use crate::model::background::Background;
use crate::model::hmm::Hmm;
use crate::model::profile::{Profile, ProfileConfig};
use crate::msa::{AnyMsa, TextMsa};
use crate::results::trace::{Trace, TraceState, Traces};
use crate::search::fwdback::viterbi;

/// Computes and stacks alignments of sequences against one model. No
/// search thresholds are involved; every sequence gets a path.
#[derive(Debug, Clone)]
pub struct TraceAligner {
    pub alphabet: Alphabet,
}

/// One row to stack: display name, the residues the trace indexes into,
/// and the path itself.
pub struct TraceEntry<'a> {
    pub name: String,
    pub residues: &'a [u8],
    pub trace: &'a Trace,
}

impl TraceAligner {
    pub fn new(alphabet: Alphabet) -> Self {
        TraceAligner { alphabet }
    }

    /// Viterbi-align each sequence to the model, glocal and single-hit, so
    /// paths cover the model end to end.
    pub fn compute_traces(&self, hmm: &Hmm, sequences: &[DigitalSequence]) -> Result<Traces> {
        let bg = Background::new(self.alphabet);
        let mut gm = Profile::new(self.alphabet);
        gm.configure(hmm, &bg, ProfileConfig { l: 400, multihit: false, local: false })?;
        let mut traces = Traces::default();
        for seq in sequences {
            gm.set_length(seq.len());
            let (_, trace) = viterbi(&gm, &seq.seq)?;
            traces.0.push(trace);
        }
        Ok(traces)
    }

    /// Stack traces into an MSA, expanding insert states into their own
    /// columns.
    pub fn align_traces(
        &self,
        hmm: &Hmm,
        sequences: &[DigitalSequence],
        traces: &Traces,
        digitize: bool,
        trim: bool,
        all_consensus_cols: bool,
    ) -> Result<AnyMsa> {
        for trace in traces.iter() {
            if !trace.is_empty() && trace.m != hmm.m {
                return Err(PromerError::ModelSizeMismatch { left: hmm.m, right: trace.m });
            }
        }
        let entries: Vec<TraceEntry<'_>> = sequences
            .iter()
            .zip(traces.iter())
            .map(|(seq, trace)| TraceEntry {
                name: seq.name.clone(),
                residues: &seq.seq,
                trace,
            })
            .collect();
        let text = stack_traces(hmm.m, self.alphabet, &entries, trim, all_consensus_cols);
        if digitize {
            Ok(AnyMsa::Digital(text.digitize(self.alphabet)?))
        } else {
            Ok(AnyMsa::Text(text))
        }
    }
}

/// Stack core path segments into alignment rows.
///
/// Match nodes map to consensus columns (uppercase residues, `-` for
/// deletes); inserts expand into per-node column blocks (lowercase, `.`
/// padding). Unless `all_consensus_cols` is set, match columns no trace
/// visits are dropped; `trim` additionally drops insert blocks outside the
/// span of visited match columns.
pub(crate) fn stack_traces(
    m: usize,
    alphabet: Alphabet,
    entries: &[TraceEntry<'_>],
    trim: bool,
    all_consensus_cols: bool,
) -> TextMsa {
    // Insert width per node (0..=m: block k sits after match column k).
    let mut ins_width = vec![0usize; m + 1];
    let mut match_used = vec![false; m + 1];
    for entry in entries {
        let mut per_node = vec![0usize; m + 1];
        for step in &entry.trace.steps {
            match step.state {
                TraceState::M => match_used[step.k] = true,
                TraceState::I => per_node[step.k] += 1,
                _ => {}
            }
        }
        for (k, &w) in per_node.iter().enumerate() {
            ins_width[k] = ins_width[k].max(w);
        }
    }

    let keep_match: Vec<bool> = (0..=m)
        .map(|k| k > 0 && (all_consensus_cols || match_used[k]))
        .collect();
    let first_used = (1..=m).find(|&k| keep_match[k]).unwrap_or(1);
    let last_used = (1..=m).rev().find(|&k| keep_match[k]).unwrap_or(m);

    // Column layout: ins block 0, then per node k: match col, ins block k.
    let mut match_col = vec![usize::MAX; m + 1];
    let mut ins_col = vec![usize::MAX; m + 1];
    let mut width = 0usize;
    let ins_kept = |k: usize| -> bool {
        ins_width[k] > 0 && (!trim || (k >= first_used && k < last_used))
    };
    if ins_kept(0) {
        ins_col[0] = width;
        width += ins_width[0];
    }
    for k in 1..=m {
        if keep_match[k] {
            match_col[k] = width;
            width += 1;
        }
        if ins_kept(k) {
            ins_col[k] = width;
            width += ins_width[k];
        }
    }

    let mut names = Vec::with_capacity(entries.len());
    let mut rows = Vec::with_capacity(entries.len());
    for entry in entries {
        let mut row: Vec<u8> = (0..width).map(|_| b'.').collect();
        for k in 1..=m {
            if match_col[k] != usize::MAX {
                row[match_col[k]] = b'-';
            }
        }
        let mut ins_used = vec![0usize; m + 1];
        for step in &entry.trace.steps {
            match step.state {
                TraceState::M => {
                    if match_col[step.k] != usize::MAX {
                        row[match_col[step.k]] =
                            alphabet.sym(entry.residues[step.i - 1]).to_ascii_uppercase();
                    }
                }
                TraceState::I => {
                    if ins_col[step.k] != usize::MAX && ins_used[step.k] < ins_width[step.k] {
                        row[ins_col[step.k] + ins_used[step.k]] =
                            alphabet.sym(entry.residues[step.i - 1]).to_ascii_lowercase();
                        ins_used[step.k] += 1;
                    }
                }
                _ => {}
            }
        }
        names.push(entry.name.clone());
        rows.push(String::from_utf8(row).expect("ascii row"));
    }

    let rf: String = {
        let mut rf = vec![b'.'; width];
        for k in 1..=m {
            if match_col[k] != usize::MAX {
                rf[match_col[k]] = b'x';
            }
        }
        String::from_utf8(rf).expect("ascii rf")
    };

    TextMsa { name: None, accession: None, names, rows, rf: Some(rf) }
}
