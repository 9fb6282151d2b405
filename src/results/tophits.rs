//! The hit accumulator: append during a search, then threshold, sort,
//! merge, and render.

use std::cmp::Ordering;

use rustc_hash::FxHashSet;

use crate::errors::{PromerError, Result};
use crate::model::params::BitCutoffSelector;
use crate::results::hits::Hit;

/// Which loop the accumulator was filled by: one query against many
/// sequences, or one sequence against many models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Search,
    Scan,
}

/// Strand selection for nucleotide searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strand {
    Watson,
    Crick,
    Both,
}

impl std::str::FromStr for Strand {
    type Err = PromerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "watson" => Ok(Strand::Watson),
            "crick" => Ok(Strand::Crick),
            "both" => Ok(Strand::Both),
            other => Err(PromerError::InvalidParameter(format!("unknown strand '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    /// E-value ascending, name, then input order.
    Key,
    /// Original target order.
    Seqidx,
}

/// Reporting and inclusion thresholds, in the pipeline's units: E-values
/// as expectations, `T`-style values in bits.
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub e: f64,
    pub t: Option<f32>,
    pub dom_e: f64,
    pub dom_t: Option<f32>,
    pub inc_e: f64,
    pub inc_t: Option<f32>,
    pub incdom_e: f64,
    pub incdom_t: Option<f32>,
    pub bit_cutoffs: Option<BitCutoffSelector>,
}

impl Default for Thresholds {
    fn default() -> Self {
        Thresholds {
            e: 10.0,
            t: None,
            dom_e: 10.0,
            dom_t: None,
            inc_e: 0.01,
            inc_t: None,
            incdom_e: 0.01,
            incdom_t: None,
            bit_cutoffs: None,
        }
    }
}

/// Compare E-values, treating both as equal when they are close enough to
/// zero for the difference to be numerical noise.
fn evalue_cmp(a: f64, b: f64) -> Ordering {
    const EPSILON: f64 = 1.0e-180;
    if a < EPSILON && b < EPSILON {
        Ordering::Equal
    } else if a < b {
        Ordering::Less
    } else if a > b {
        Ordering::Greater
    } else {
        Ordering::Equal
    }
}

#[derive(Debug, Clone)]
pub struct TopHits {
    pub query_name: String,
    pub query_accession: Option<String>,
    pub mode: SearchMode,
    hits: Vec<Hit>,

    z: f64,
    dom_z: f64,
    z_explicit: bool,
    domz_explicit: bool,

    pub thresholds: Thresholds,
    /// Resolved bit-cutoff pair when `thresholds.bit_cutoffs` is set.
    pub cutoff_pair: Option<(f32, f32)>,

    pub searched_models: u64,
    pub searched_nodes: u64,
    pub searched_sequences: u64,
    pub searched_residues: u64,

    pub long_targets: bool,
    pub strand: Option<Strand>,
    pub block_length: Option<usize>,

    sorted_by: Option<SortKey>,
}

impl TopHits {
    pub fn new(query_name: &str, query_accession: Option<&str>, mode: SearchMode) -> Self {
        TopHits {
            query_name: query_name.to_string(),
            query_accession: query_accession.map(str::to_string),
            mode,
            hits: Vec::new(),
            z: 0.0,
            dom_z: 0.0,
            z_explicit: false,
            domz_explicit: false,
            thresholds: Thresholds::default(),
            cutoff_pair: None,
            searched_models: 0,
            searched_nodes: 0,
            searched_sequences: 0,
            searched_residues: 0,
            long_targets: false,
            strand: None,
            block_length: None,
            sorted_by: None,
        }
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Hit> {
        self.hits.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Hit> {
        self.hits.iter_mut()
    }

    pub fn hits(&self) -> &[Hit] {
        &self.hits
    }

    /// Append a fully-formed hit. Atomic with respect to one target; resets
    /// any sort order.
    pub fn append(&mut self, hit: Hit) {
        self.hits.push(hit);
        self.sorted_by = None;
    }

    pub fn z(&self) -> f64 {
        self.z
    }

    pub fn dom_z(&self) -> f64 {
        self.dom_z
    }

    /// Override the sequence search-space size. Survives merges.
    pub fn set_z(&mut self, z: f64) {
        self.z = z;
        self.z_explicit = true;
    }

    /// Override the domain search-space size. Survives merges.
    pub fn set_dom_z(&mut self, dom_z: f64) {
        self.dom_z = dom_z;
        self.domz_explicit = true;
    }

    /// Install default search-space sizes unless explicit overrides are in
    /// force.
    pub fn set_default_sizes(&mut self, z: f64, dom_z: f64) {
        if !self.z_explicit {
            self.z = z;
        }
        if !self.domz_explicit {
            self.dom_z = dom_z.max(1.0);
        }
    }

    /// Recompute hit and domain E-values against the current `Z`/`domZ`.
    pub fn compute_evalues(&mut self) {
        for hit in &mut self.hits {
            hit.evalue = hit.pvalue * self.z;
            for dom in &mut hit.domains.0 {
                dom.c_evalue = dom.pvalue * self.dom_z;
                dom.i_evalue = dom.pvalue * self.z;
            }
        }
    }

    /// Set `reported`/`included` flags in place; collection length is
    /// unchanged. Bit cutoffs, when resolved, override every numeric
    /// threshold; otherwise a set `T` overrides `E`.
    pub fn apply_thresholds(&mut self) {
        let th = self.thresholds;
        let cut = self.cutoff_pair;
        for hit in &mut self.hits {
            if hit.duplicate {
                hit.reported = false;
                hit.included = false;
                continue;
            }
            hit.reported = match (cut, th.t) {
                (Some((seq_cut, _)), _) => hit.score >= seq_cut,
                (None, Some(t)) => hit.score >= t,
                (None, None) => hit.evalue <= th.e,
            };
            hit.included = hit.reported
                && match (cut, th.inc_t) {
                    (Some((seq_cut, _)), _) => hit.score >= seq_cut,
                    (None, Some(t)) => hit.score >= t,
                    (None, None) => hit.evalue <= th.inc_e,
                };
            for dom in &mut hit.domains.0 {
                dom.reported = hit.reported
                    && match (cut, th.dom_t) {
                        (Some((_, dom_cut)), _) => dom.score >= dom_cut,
                        (None, Some(t)) => dom.score >= t,
                        (None, None) => dom.c_evalue <= th.dom_e,
                    };
                dom.included = hit.included
                    && dom.reported
                    && match (cut, th.incdom_t) {
                        (Some((_, dom_cut)), _) => dom.score >= dom_cut,
                        (None, Some(t)) => dom.score >= t,
                        (None, None) => dom.i_evalue <= th.incdom_e,
                    };
            }
        }
    }

    /// Stable sort. `Key` orders by (E-value, name, seqidx); `Seqidx`
    /// restores input order.
    pub fn sort(&mut self, by: SortKey) {
        match by {
            SortKey::Key => self.hits.sort_by(|a, b| {
                evalue_cmp(a.evalue, b.evalue)
                    .then_with(|| a.name.cmp(&b.name))
                    .then_with(|| a.seqidx.cmp(&b.seqidx))
            }),
            SortKey::Seqidx => self.hits.sort_by(|a, b| a.seqidx.cmp(&b.seqidx)),
        }
        self.sorted_by = Some(by);
        self.assign_backreferences();
    }

    pub fn is_sorted(&self, by: SortKey) -> bool {
        self.sorted_by == Some(by)
    }

    fn assign_backreferences(&mut self) {
        for (h, hit) in self.hits.iter_mut().enumerate() {
            for (d, dom) in hit.domains.0.iter_mut().enumerate() {
                dom.alignment.parent = Some((h, d));
            }
        }
    }

    /// Post-process after a search: default sizes, E-values, thresholds,
    /// key order.
    pub fn finalize(&mut self, default_z: f64, default_dom_z: f64) {
        self.set_default_sizes(default_z, default_dom_z);
        self.compute_evalues();
        self.apply_thresholds();
        self.sort(SortKey::Key);
    }

    /// Merge shards produced by parallel workers (or window batches) into
    /// one accumulator. Search spaces are summed unless an explicit
    /// override is in force; E-values are recomputed against the combined
    /// sizes and thresholds re-applied. The result is unsorted: merge
    /// precedes sorting.
    pub fn merge(mut self, others: Vec<TopHits>) -> Result<TopHits> {
        for other in others {
            if other.mode != self.mode {
                return Err(PromerError::InvalidParameter(
                    "cannot merge accumulators from different search modes".to_string(),
                ));
            }
            if other.query_name != self.query_name {
                return Err(PromerError::InvalidParameter(format!(
                    "cannot merge results for queries '{}' and '{}'",
                    self.query_name, other.query_name
                )));
            }
            if other.z_explicit {
                self.z = other.z;
                self.z_explicit = true;
            } else if !self.z_explicit {
                self.z += other.z;
            }
            if other.domz_explicit {
                self.dom_z = other.dom_z;
                self.domz_explicit = true;
            } else if !self.domz_explicit {
                self.dom_z += other.dom_z;
            }
            self.searched_models += other.searched_models;
            self.searched_nodes += other.searched_nodes;
            self.searched_sequences += other.searched_sequences;
            self.searched_residues += other.searched_residues;
            self.hits.extend(other.hits);
        }
        self.sorted_by = None;
        if self.long_targets {
            self.flag_window_duplicates();
        }
        self.compute_evalues();
        self.apply_thresholds();
        Ok(self)
    }

    /// Two hits from overlapping windows of the same target with the same
    /// best-domain envelope are seam artifacts; keep the better score.
    fn flag_window_duplicates(&mut self) {
        let mut seen: rustc_hash::FxHashMap<(String, usize, usize), (usize, f32)> =
            rustc_hash::FxHashMap::default();
        for idx in 0..self.hits.len() {
            let (name, env, score) = {
                let hit = &self.hits[idx];
                let env = hit
                    .best_domain()
                    .map(|d| (d.env_from, d.env_to))
                    .unwrap_or((0, 0));
                (hit.name.clone(), env, hit.score)
            };
            match seen.entry((name, env.0, env.1)) {
                std::collections::hash_map::Entry::Vacant(v) => {
                    v.insert((idx, score));
                }
                std::collections::hash_map::Entry::Occupied(mut o) => {
                    let (kept_idx, kept_score) = *o.get();
                    if score > kept_score {
                        self.hits[kept_idx].duplicate = true;
                        o.insert((idx, score));
                    } else {
                        self.hits[idx].duplicate = true;
                    }
                }
            }
        }
    }

    /// Number of included hits absent from `keyhash`; the iterative driver
    /// uses zero as its convergence signal.
    pub fn compare_ranking(&self, keyhash: &FxHashSet<String>) -> usize {
        self.hits
            .iter()
            .filter(|h| h.included && !keyhash.contains(&h.name))
            .count()
    }

    /// Reconstruct an alignment of the included hits by stacking each
    /// included domain's trace. `sequences` supplies the target residues,
    /// matched by hit name. Crick-strand long-target domains carry no
    /// forward-strand trace and are skipped.
    pub fn to_msa(
        &self,
        alphabet: crate::alphabet::Alphabet,
        sequences: &[crate::alphabet::DigitalSequence],
        trim: bool,
        digitize: bool,
        all_consensus_cols: bool,
    ) -> Result<crate::msa::AnyMsa> {
        use crate::align::trace_aligner::{stack_traces, TraceEntry};
        let mut entries = Vec::new();
        let mut m = 0usize;
        for hit in self.included() {
            let target = sequences.iter().find(|s| s.name == hit.name);
            let target = match target {
                Some(t) => t,
                None => continue,
            };
            for dom in hit.domains.included() {
                if let Some(trace) = &dom.trace {
                    m = m.max(trace.m);
                    entries.push(TraceEntry {
                        name: format!("{}/{}-{}", hit.name, dom.ali_from, dom.ali_to),
                        residues: &target.seq,
                        trace,
                    });
                }
            }
        }
        let mut text = stack_traces(m, alphabet, &entries, trim, all_consensus_cols);
        text.name = Some(self.query_name.clone());
        text.accession = self.query_accession.clone();
        if digitize {
            Ok(crate::msa::AnyMsa::Digital(text.digitize(alphabet)?))
        } else {
            Ok(crate::msa::AnyMsa::Text(text))
        }
    }

    /// Render the hit tables; see `report::tables` for the formats.
    pub fn write<W: std::io::Write>(
        &self,
        out: &mut W,
        format: crate::report::tables::TableFormat,
        header: bool,
    ) -> std::io::Result<()> {
        crate::report::tables::write_table(self, out, format, header)
    }

    pub fn reported(&self) -> impl Iterator<Item = &Hit> {
        self.hits.iter().filter(|h| h.reported)
    }

    pub fn reported_len(&self) -> usize {
        self.hits.iter().filter(|h| h.reported).count()
    }

    pub fn included(&self) -> impl Iterator<Item = &Hit> {
        self.hits.iter().filter(|h| h.included)
    }

    pub fn included_len(&self) -> usize {
        self.hits.iter().filter(|h| h.included).count()
    }
}

impl std::ops::Index<usize> for TopHits {
    type Output = Hit;
    fn index(&self, i: usize) -> &Hit {
        &self.hits[i]
    }
}
