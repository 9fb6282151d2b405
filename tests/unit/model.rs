//! Model-family invariants.

use promer::alphabet::Alphabet;
use promer::model::background::Background;
use promer::model::hmm::{Hmm, VALIDATION_TOLERANCE};
use promer::model::optimized::OptimizedProfile;
use promer::model::profile::{Profile, ProfileConfig};
use promer::model::scoredata::ScoreData;
use promer::rng::Randomness;

use super::helpers::{optimize, profile_of, sample_amino_hmm};

#[test]
fn emission_and_transition_rows_are_distributions() {
    for seed in [1u64, 2, 3] {
        let hmm = sample_amino_hmm(25, seed);
        hmm.validate(VALIDATION_TOLERANCE).expect("sampled model validates");
        for node in 0..=hmm.m {
            let mat: f32 = hmm.mat[node].iter().sum();
            let ins: f32 = hmm.ins[node].iter().sum();
            assert!((mat - 1.0).abs() <= VALIDATION_TOLERANCE);
            assert!((ins - 1.0).abs() <= VALIDATION_TOLERANCE);
        }
    }
}

#[test]
fn profile_configure_preserves_m_for_all_lengths() {
    let hmm = sample_amino_hmm(33, 42);
    for l in [1usize, 7, 100, 400, 3000] {
        let gm = profile_of(&hmm, l);
        assert_eq!(gm.m, hmm.m);
        assert_eq!(gm.l, l);
        assert!(gm.local);
        assert!(gm.multihit);
    }
}

#[test]
fn optimized_conversion_preserves_m() {
    for m in [1usize, 8, 16, 17, 64, 129] {
        let hmm = sample_amino_hmm(m, 7);
        let om = optimize(&profile_of(&hmm, 400));
        assert_eq!(om.m(), hmm.m);
    }
}

#[test]
fn conversion_is_deterministic() {
    let hmm = sample_amino_hmm(19, 5);
    let gm = profile_of(&hmm, 250);
    let a = OptimizedProfile::from_profile(&gm).unwrap();
    let b = OptimizedProfile::from_profile(&gm).unwrap();
    assert_eq!(a.sbv, b.sbv);
    assert_eq!(a.rbv, b.rbv);
    assert_eq!((a.tbm, a.tec, a.base, a.bias), (b.tbm, b.tec, b.base, b.bias));
}

#[test]
fn alignment_of_striped_buffers_survives_clone() {
    let hmm = sample_amino_hmm(21, 9);
    let om = optimize(&profile_of(&hmm, 400));
    let cloned = om.clone();
    assert_eq!(om.sbv, cloned.sbv);
    assert_eq!(om.rbv, cloned.rbv);
    for node in 1..=om.m() {
        for x in 0..Alphabet::Amino.kp() as u8 {
            assert_eq!(om.sbv_at(x, node), cloned.sbv_at(x, node));
        }
    }
}

#[test]
fn unconfigured_profile_reports_unconfigured() {
    let gm = Profile::new(Alphabet::Dna);
    assert!(matches!(
        OptimizedProfile::from_profile(&gm),
        Err(promer::PromerError::Unconfigured)
    ));
}

#[test]
fn alphabet_mismatch_in_configure_is_rejected() {
    let mut rng = Randomness::new(4);
    let hmm = Hmm::sample(Alphabet::Dna, 10, &mut rng).unwrap();
    let bg = Background::new(Alphabet::Amino);
    let mut gm = Profile::new(Alphabet::Dna);
    let err = gm.configure(&hmm, &bg, ProfileConfig::default()).unwrap_err();
    assert!(matches!(err, promer::PromerError::AlphabetMismatch { .. }));
}

#[test]
fn score_data_bounds_the_windower() {
    let hmm = sample_amino_hmm(12, 11);
    let gm = profile_of(&hmm, 400);
    let mut om = optimize(&gm);
    let sd = ScoreData::new(&gm, &om);
    assert_eq!(sd.kp, Alphabet::Amino.kp());

    // The seam bound covers the whole model but stays finite.
    let extent = sd.max_hit_extent();
    assert!(extent >= hmm.m);
    assert!(extent <= hmm.m * 32);

    // The byte table dominates the real filter score on any target, so
    // windows rejected on the bound could never have passed the filter.
    let bg = Background::new(Alphabet::Amino);
    let mut rng = Randomness::new(19);
    for _ in 0..6 {
        let seq = bg.sample_sequence(80, &mut rng);
        om.set_length(seq.len());
        let msv = promer::search::msv::msv_filter(&om, &seq);
        if msv.is_finite() {
            assert!(sd.msv_upper_bound(&seq) >= msv);
        }
    }
}
