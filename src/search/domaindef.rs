//! Domain definition: decompose a posterior decode into envelopes, rescore
//! each envelope, and build its alignment.

use crate::alphabet::DigitalSequence;
use crate::errors::Result;
use crate::model::background::Background;
use crate::model::params::EvalueParameters;
use crate::model::profile::Profile;
use crate::results::hits::Alignment;
use crate::results::trace::{Trace, TraceState};
use crate::search::fwdback::{forward, viterbi, Posterior, ST_I, ST_M};
use crate::search::null2::null2_correction;
use crate::stats::{exponential, nats_to_bits};

/// Occupancy a row must reach for a region to count as homologous.
const RT1: f32 = 0.25;
/// Occupancy at which a region's edges are trimmed.
const RT2: f32 = 0.10;

/// One defined envelope with its scores and display alignment, before E-value
/// assignment.
#[derive(Debug, Clone)]
pub struct DomainCandidate {
    pub env_from: usize,
    pub env_to: usize,
    pub ali_from: usize,
    pub ali_to: usize,
    pub hmm_from: usize,
    pub hmm_to: usize,
    pub envelope_score: f32,
    pub score: f32,
    pub bias: f32,
    pub pvalue: f64,
    pub alignment: Alignment,
    pub trace: Trace,
}

/// Find maximal runs of rows with occupancy above `RT2` that contain at
/// least one row at or above `RT1`. Returns 1-based inclusive bounds.
fn regions(row_occ: &[f32]) -> Vec<(usize, usize)> {
    let l = row_occ.len() - 1;
    let mut out = Vec::new();
    let mut start: Option<usize> = None;
    let mut anchored = false;
    for i in 1..=l {
        if row_occ[i] > RT2 {
            if start.is_none() {
                start = Some(i);
            }
            if row_occ[i] >= RT1 {
                anchored = true;
            }
        } else if let Some(s) = start.take() {
            if anchored {
                out.push((s, i - 1));
            }
            anchored = false;
        }
    }
    if let (Some(s), true) = (start, anchored) {
        out.push((s, l));
    }
    out
}

/// Decompose `seq` into domains. Envelope rescoring stays on the
/// full-sequence footing: the profile and null keep the full target
/// length, and residues outside the envelope are charged as flank loop
/// emissions. A domain's score therefore never exceeds what the complete
/// sequence scored.
pub fn define_domains(
    gm: &Profile,
    bg: &Background,
    seq: &DigitalSequence,
    post: &Posterior,
    params: &EvalueParameters,
    null2_enabled: bool,
    omega: f32,
) -> Result<Vec<DomainCandidate>> {
    use crate::model::profile::{X_LOOP, X_N};
    let full_null = bg.null_score(seq.len());
    let mut out = Vec::new();
    for (ia, ib) in regions(&post.row_occ) {
        let env_len = ib - ia + 1;
        let env_seq = &seq.seq[ia - 1..ib];

        let (_, fwd_env) = forward(gm, env_seq)?;
        let flank = (seq.len() - env_len) as f32 * gm.xsc[X_N][X_LOOP];
        let envelope_score = nats_to_bits(fwd_env + flank - full_null);

        let bias_nats = if null2_enabled {
            null2_correction(gm, &post.pp, &seq.seq, ia, ib, omega)
        } else {
            0.0
        };
        let score = nats_to_bits(fwd_env + flank - full_null - bias_nats);
        let bias = nats_to_bits(bias_nats);
        let pvalue =
            exponential::surv(score as f64, params.f_tau as f64, params.f_lambda as f64);

        let (_, mut trace) = viterbi(gm, env_seq)?;
        // Lift the envelope-local path into full-target coordinates and
        // annotate it from the full-target posterior.
        for step in trace.steps.iter_mut() {
            if step.i > 0 {
                step.i += ia - 1;
            }
        }
        let posteriors: Vec<f32> = trace
            .steps
            .iter()
            .map(|s| match s.state {
                TraceState::M => post.pp.get(s.i, s.k, ST_M),
                TraceState::I => post.pp.get(s.i, s.k, ST_I),
                _ => 0.0,
            })
            .collect();
        trace.posteriors = Some(posteriors);
        trace.l = seq.len();

        let (ali_from, ali_to) = trace.target_span().unwrap_or((ia, ib));
        let (hmm_from, hmm_to) = trace.model_span().unwrap_or((0, 0));
        let alignment = render_alignment(gm, seq, &trace);

        out.push(DomainCandidate {
            env_from: ia,
            env_to: ib,
            ali_from,
            ali_to,
            hmm_from,
            hmm_to,
            envelope_score,
            score,
            bias,
            pvalue,
            alignment,
            trace,
        });
    }
    Ok(out)
}

/// Render the three display lines of a domain alignment from its trace.
pub fn render_alignment(gm: &Profile, seq: &DigitalSequence, trace: &Trace) -> Alignment {
    let mut hmm_line = String::new();
    let mut mid_line = String::new();
    let mut target_line = String::new();
    let mut posterior_line = String::new();

    let consensus: Vec<char> = gm.consensus.chars().collect();
    let pp = trace.posteriors.as_deref();
    let pp_char = |p: f32| -> char {
        let d = (p * 10.0).round() as i32;
        if d >= 10 {
            '*'
        } else {
            char::from_digit(d.max(0) as u32, 10).unwrap_or('0')
        }
    };

    for (idx, step) in trace.steps.iter().enumerate() {
        match step.state {
            TraceState::M => {
                let cons = consensus.get(step.k - 1).copied().unwrap_or('x');
                let res = gm.alphabet.sym(seq.seq[step.i - 1]).to_ascii_uppercase() as char;
                hmm_line.push(cons);
                target_line.push(res);
                if cons.to_ascii_uppercase() == res {
                    mid_line.push(res);
                } else if gm.msc(step.k, seq.seq[step.i - 1]) > 0.0 {
                    mid_line.push('+');
                } else {
                    mid_line.push(' ');
                }
                posterior_line.push(pp_char(pp.map_or(0.0, |p| p[idx])));
            }
            TraceState::I => {
                hmm_line.push('.');
                target_line
                    .push(gm.alphabet.sym(seq.seq[step.i - 1]).to_ascii_lowercase() as char);
                mid_line.push(' ');
                posterior_line.push(pp_char(pp.map_or(0.0, |p| p[idx])));
            }
            TraceState::D => {
                hmm_line.push(consensus.get(step.k - 1).copied().unwrap_or('x'));
                target_line.push('-');
                mid_line.push(' ');
                posterior_line.push('.');
            }
            _ => {}
        }
    }

    let (hmm_from, hmm_to) = trace.model_span().unwrap_or((0, 0));
    let (target_from, target_to) = trace.target_span().unwrap_or((0, 0));
    Alignment {
        hmm_from,
        hmm_to,
        hmm_name: gm.name.clone(),
        hmm_accession: gm.accession.clone(),
        target_from,
        target_to,
        target_name: seq.name.clone(),
        hmm_line,
        mid_line,
        target_line,
        posterior_line,
        parent: None,
    }
}
