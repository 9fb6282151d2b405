//! Dirichlet pseudocount priors for model estimation.

use crate::alphabet::Alphabet;
use crate::errors::{PromerError, Result};
use crate::model::hmm::{Hmm, T_DD, T_DM, T_II, T_IM, T_MD, T_MI, T_MM};

/// Which pseudocount scheme the builder blends into observed counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorScheme {
    /// Plus-one smoothing on every distribution.
    Laplace,
    /// Alphabet-tuned Dirichlet: background-proportional emission
    /// concentrations, fixed transition concentrations.
    Alphabet,
    /// No pseudocounts; zero counts stay zero.
    None,
}

impl std::str::FromStr for PriorScheme {
    type Err = PromerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "laplace" => Ok(PriorScheme::Laplace),
            "alphabet" => Ok(PriorScheme::Alphabet),
            "none" => Ok(PriorScheme::None),
            other => Err(PromerError::InvalidParameter(format!("unknown prior scheme '{other}'"))),
        }
    }
}

/// Concrete Dirichlet concentrations for one alphabet.
#[derive(Debug, Clone)]
pub struct Prior {
    pub match_alpha: Vec<f32>,
    pub insert_alpha: Vec<f32>,
    pub trans_match: [f32; 3],
    pub trans_insert: [f32; 2],
    pub trans_delete: [f32; 2],
}

impl Prior {
    pub fn for_scheme(scheme: PriorScheme, alphabet: Alphabet) -> Option<Prior> {
        match scheme {
            PriorScheme::None => None,
            PriorScheme::Laplace => {
                let k = alphabet.k();
                Some(Prior {
                    match_alpha: vec![1.0; k],
                    insert_alpha: vec![1.0; k],
                    trans_match: [1.0; 3],
                    trans_insert: [1.0; 2],
                    trans_delete: [1.0; 2],
                })
            }
            PriorScheme::Alphabet => {
                let bg = alphabet.background();
                // Amino models see fewer counts per residue type; give them
                // proportionally heavier emission concentrations.
                let emission_weight = match alphabet {
                    Alphabet::Amino => 2.0,
                    Alphabet::Dna | Alphabet::Rna => 1.0,
                };
                Some(Prior {
                    match_alpha: bg.iter().map(|f| f * emission_weight).collect(),
                    insert_alpha: bg.iter().map(|f| f * 10.0).collect(),
                    trans_match: [2.0, 0.2, 0.2],
                    trans_insert: [1.2, 0.8],
                    trans_delete: [1.2, 0.8],
                })
            }
        }
    }

    /// Add the concentrations to a count-form model. The caller
    /// renormalizes afterwards.
    pub fn apply(&self, hmm: &mut Hmm) {
        for node in 0..=hmm.m {
            for (x, a) in self.match_alpha.iter().enumerate() {
                hmm.mat[node][x] += a;
            }
            for (x, a) in self.insert_alpha.iter().enumerate() {
                hmm.ins[node][x] += a;
            }
            hmm.t[node][T_MM] += self.trans_match[0];
            hmm.t[node][T_MI] += self.trans_match[1];
            hmm.t[node][T_MD] += self.trans_match[2];
            hmm.t[node][T_IM] += self.trans_insert[0];
            hmm.t[node][T_II] += self.trans_insert[1];
            hmm.t[node][T_DM] += self.trans_delete[0];
            hmm.t[node][T_DD] += self.trans_delete[1];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn laplace_smooths_zero_counts() {
        let mut hmm = Hmm::new(Alphabet::Dna, 3, "t").unwrap();
        let prior = Prior::for_scheme(PriorScheme::Laplace, Alphabet::Dna).unwrap();
        prior.apply(&mut hmm);
        hmm.renormalize();
        hmm.validate(1e-5).unwrap();
        // uniform after smoothing pure zeros
        assert!((hmm.mat[1][0] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn none_scheme_has_no_prior() {
        assert!(Prior::for_scheme(PriorScheme::None, Alphabet::Amino).is_none());
    }

    #[test]
    fn alphabet_prior_tracks_background() {
        let prior = Prior::for_scheme(PriorScheme::Alphabet, Alphabet::Amino).unwrap();
        // Leucine is more common than tryptophan in the background
        let l = Alphabet::Amino.index(b'L').unwrap() as usize;
        let w = Alphabet::Amino.index(b'W').unwrap() as usize;
        assert!(prior.match_alpha[l] > prior.match_alpha[w]);
    }
}
