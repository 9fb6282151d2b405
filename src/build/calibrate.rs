//! Score-distribution calibration.
//!
//! Each scorer is run against sequences sampled from the background; the
//! MSV and Viterbi Gumbel locations come from a fixed-slope ML fit, the
//! Forward tail base from a tail quantile. The slope gets a small
//! edge-effect correction that tightens with model length.

use crate::model::background::Background;
use crate::model::optimized::OptimizedProfile;
use crate::model::params::EvalueParameters;
use crate::rng::Randomness;
use crate::search::fwdback::forward;
use crate::search::msv::msv_filter;
use crate::search::vitfilter::viterbi_filter;
use crate::stats::{exponential, gumbel, nats_to_bits, LN2};

/// Simulation sizes for the three calibrations: MSV (`em_*`), Viterbi
/// (`ev_*`), Forward (`ef_*`, with tail mass `eft`).
#[derive(Debug, Clone, Copy)]
pub struct CalibrationConfig {
    pub em_l: usize,
    pub em_n: usize,
    pub ev_l: usize,
    pub ev_n: usize,
    pub ef_l: usize,
    pub ef_n: usize,
    pub eft: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        CalibrationConfig {
            em_l: 200,
            em_n: 200,
            ev_l: 200,
            ev_n: 200,
            ef_l: 100,
            ef_n: 200,
            eft: 0.04,
        }
    }
}

/// The shared Gumbel/tail slope: ln 2 with an edge correction.
pub fn lambda_for(m: usize) -> f64 {
    LN2 as f64 + 1.44 / m as f64
}

/// Calibrate all three score distributions for a model. The optimized
/// profile's length configuration is clobbered.
pub fn calibrate(
    om: &mut OptimizedProfile,
    bg: &mut Background,
    cfg: &CalibrationConfig,
    rng: &mut Randomness,
) -> EvalueParameters {
    let lambda = lambda_for(om.m());

    let mut msv_scores = Vec::with_capacity(cfg.em_n);
    om.set_length(cfg.em_l);
    bg.set_length(cfg.em_l);
    let null = bg.null_score(cfg.em_l);
    for _ in 0..cfg.em_n {
        let seq = bg.sample_sequence(cfg.em_l, rng);
        let sc = msv_filter(om, &seq);
        if sc.is_finite() {
            msv_scores.push(nats_to_bits(sc - null) as f64);
        }
    }
    let m_mu = gumbel::fit_location(&msv_scores, lambda);

    let mut vit_scores = Vec::with_capacity(cfg.ev_n);
    om.set_length(cfg.ev_l);
    bg.set_length(cfg.ev_l);
    let null = bg.null_score(cfg.ev_l);
    for _ in 0..cfg.ev_n {
        let seq = bg.sample_sequence(cfg.ev_l, rng);
        let sc = viterbi_filter(om, &seq);
        if sc.is_finite() {
            vit_scores.push(nats_to_bits(sc - null) as f64);
        }
    }
    let v_mu = gumbel::fit_location(&vit_scores, lambda);

    let mut fwd_scores = Vec::with_capacity(cfg.ef_n);
    om.set_length(cfg.ef_l);
    bg.set_length(cfg.ef_l);
    let null = bg.null_score(cfg.ef_l);
    for _ in 0..cfg.ef_n {
        let seq = bg.sample_sequence(cfg.ef_l, rng);
        if let Ok((_, sc)) = forward(&om.profile, &seq) {
            fwd_scores.push(nats_to_bits(sc - null) as f64);
        }
    }
    let f_tau = exponential::fit_tail(&fwd_scores, cfg.eft);

    EvalueParameters {
        m_mu: m_mu as f32,
        m_lambda: lambda as f32,
        v_mu: v_mu as f32,
        v_lambda: lambda as f32,
        f_tau: f_tau as f32,
        f_lambda: lambda as f32,
    }
}
