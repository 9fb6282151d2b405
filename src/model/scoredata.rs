//! Auxiliary per-model score tables bound to a (Profile, OptimizedProfile)
//! pair. The long-target windower consults them to size its seam overlap
//! and subwindows, and to reject windows whose best case cannot reach the
//! MSV threshold.

use crate::model::optimized::{OptimizedProfile, SCALE_B};
use crate::model::profile::{Profile, P_II};

#[derive(Debug, Clone)]
pub struct ScoreData {
    /// Total symbol count of the alphabet the tables cover.
    pub kp: usize,
    /// Model length the tables were built for.
    pub m: usize,
    /// Best match score over all nodes, per residue code, in nats.
    pub max_match: Vec<f32>,
    /// Best byte-space score per residue code.
    pub max_byte: Vec<u8>,
    /// Upper bound on the per-residue score anywhere in the model.
    pub score_ceiling: f32,
    /// Magnitude of the cheapest insert-extension cost, in nats.
    pub insert_cost: f32,
    /// Byte-space offset of `max_byte`, copied from the optimized profile.
    pub bias: u8,
}

impl ScoreData {
    pub fn new(profile: &Profile, om: &OptimizedProfile) -> Self {
        let kp = profile.alphabet.kp();
        let mut max_match = vec![f32::NEG_INFINITY; kp];
        let mut max_byte = vec![0u8; kp];
        for x in 0..kp {
            for node in 1..=profile.m {
                max_match[x] = max_match[x].max(profile.rsc[node][x]);
                max_byte[x] = max_byte[x].max(om.sbv_at(x as u8, node));
            }
        }
        let score_ceiling = max_match
            .iter()
            .copied()
            .filter(|s| s.is_finite())
            .fold(0.0f32, f32::max);
        let mut insert_cost = f32::INFINITY;
        for node in 1..profile.m {
            let cost = -profile.tsc[node][P_II];
            if cost.is_finite() {
                insert_cost = insert_cost.min(cost);
            }
        }
        let insert_cost = if insert_cost.is_finite() { insert_cost.max(0.01) } else { 0.01 };
        ScoreData {
            kp,
            m: profile.m,
            max_match,
            max_byte,
            score_ceiling,
            insert_cost,
            bias: om.bias,
        }
    }

    /// Longest extent a reportable hit can plausibly span: the model
    /// length plus however many insert extensions its best-case score
    /// surplus can pay for, capped at 32 model lengths.
    pub fn max_hit_extent(&self) -> usize {
        let surplus = self.m as f32 * self.score_ceiling.max(0.0);
        let inserts = (surplus / self.insert_cost) as usize;
        (self.m + inserts).min(self.m.saturating_mul(32))
    }

    /// Upper bound on any MSV segment-set score of `seq`, in nats: every
    /// residue contributes its best byte surplus, and all entry, exit, and
    /// length costs are ignored. The true filter score never exceeds this.
    pub fn msv_upper_bound(&self, seq: &[u8]) -> f32 {
        let surplus: u32 = seq
            .iter()
            .map(|&x| self.max_byte[x as usize].saturating_sub(self.bias) as u32)
            .sum();
        surplus as f32 / SCALE_B
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabet::Alphabet;
    use crate::model::background::Background;
    use crate::model::hmm::Hmm;
    use crate::model::profile::ProfileConfig;
    use crate::rng::Randomness;
    use crate::search::msv::msv_filter;

    fn fixture() -> (Profile, OptimizedProfile, Background) {
        let mut rng = Randomness::new(42);
        let hmm = Hmm::sample(Alphabet::Dna, 9, &mut rng).unwrap();
        let bg = Background::new(Alphabet::Dna);
        let mut p = Profile::new(Alphabet::Dna);
        p.configure(&hmm, &bg, ProfileConfig::default()).unwrap();
        let om = OptimizedProfile::from_profile(&p).unwrap();
        (p, om, bg)
    }

    #[test]
    fn tables_cover_every_code() {
        let (p, om, _) = fixture();
        let sd = ScoreData::new(&p, &om);
        assert_eq!(sd.kp, Alphabet::Dna.kp());
        assert_eq!(sd.max_match.len(), sd.kp);
        assert!(sd.score_ceiling >= 0.0);
        assert!(sd.insert_cost > 0.0);
    }

    #[test]
    fn hit_extent_covers_the_model() {
        let (p, om, _) = fixture();
        let sd = ScoreData::new(&p, &om);
        let extent = sd.max_hit_extent();
        assert!(extent >= sd.m);
        assert!(extent <= sd.m * 32);
    }

    #[test]
    fn upper_bound_dominates_the_filter_score() {
        let (p, mut om, bg) = fixture();
        let sd = ScoreData::new(&p, &om);
        let mut rng = Randomness::new(7);
        for _ in 0..8 {
            let seq = bg.sample_sequence(60, &mut rng);
            om.set_length(seq.len());
            let msv = msv_filter(&om, &seq);
            if msv.is_finite() {
                assert!(
                    sd.msv_upper_bound(&seq) >= msv,
                    "bound {} below filter score {msv}",
                    sd.msv_upper_bound(&seq)
                );
            }
        }
    }
}
