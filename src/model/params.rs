//! Per-model metadata: score-distribution parameters, bit-score cutoff
//! pairs, and pressed-database offsets.

use crate::errors::{PromerError, Result};

/// Calibrated score-distribution parameters.
///
/// MSV and Viterbi filter scores are Gumbel-distributed with locations
/// `m_mu` / `v_mu` and slopes `m_lambda` / `v_lambda`; Forward bit scores
/// have an exponential right tail based at `f_tau` with slope `f_lambda`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvalueParameters {
    pub m_mu: f32,
    pub m_lambda: f32,
    pub v_mu: f32,
    pub v_lambda: f32,
    pub f_tau: f32,
    pub f_lambda: f32,
}

/// Which model-embedded bit-score pair overrides the numeric thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitCutoffSelector {
    Gathering,
    Trusted,
    Noise,
}

impl BitCutoffSelector {
    pub fn name(&self) -> &'static str {
        match self {
            BitCutoffSelector::Gathering => "gathering",
            BitCutoffSelector::Trusted => "trusted",
            BitCutoffSelector::Noise => "noise",
        }
    }
}

impl std::str::FromStr for BitCutoffSelector {
    type Err = PromerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "gathering" | "ga" => Ok(BitCutoffSelector::Gathering),
            "trusted" | "tc" => Ok(BitCutoffSelector::Trusted),
            "noise" | "nc" => Ok(BitCutoffSelector::Noise),
            other => Err(PromerError::InvalidParameter(format!(
                "unknown bit cutoff selector '{other}'"
            ))),
        }
    }
}

/// Model-embedded bit-score cutoff pairs (sequence score, domain score).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Cutoffs {
    pub gathering: Option<(f32, f32)>,
    pub trusted: Option<(f32, f32)>,
    pub noise: Option<(f32, f32)>,
}

impl Cutoffs {
    pub fn get(&self, which: BitCutoffSelector) -> Option<(f32, f32)> {
        match which {
            BitCutoffSelector::Gathering => self.gathering,
            BitCutoffSelector::Trusted => self.trusted,
            BitCutoffSelector::Noise => self.noise,
        }
    }

    pub fn require(&self, which: BitCutoffSelector, model: &str) -> Result<(f32, f32)> {
        self.get(which).ok_or_else(|| PromerError::MissingCutoffs {
            model: model.to_string(),
            kind: which.name(),
        })
    }
}

/// Byte positions of a model within the three pressed-database files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Offsets {
    /// Offset of the binary model record in the `.h3m` file.
    pub model: Option<u64>,
    /// Offset of the filter record in the `.h3f` file.
    pub filter: Option<u64>,
    /// Offset of the full profile record in the `.h3p` file.
    pub profile: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn selector_parses_both_spellings() {
        assert_eq!(BitCutoffSelector::from_str("ga").unwrap(), BitCutoffSelector::Gathering);
        assert_eq!(BitCutoffSelector::from_str("Trusted").unwrap(), BitCutoffSelector::Trusted);
        assert!(BitCutoffSelector::from_str("strict").is_err());
    }

    #[test]
    fn missing_pair_is_reported_with_model_name() {
        let c = Cutoffs::default();
        let err = c.require(BitCutoffSelector::Gathering, "PF00001").unwrap_err();
        assert!(err.to_string().contains("PF00001"));
    }
}
