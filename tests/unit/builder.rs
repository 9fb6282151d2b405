//! Builder scenarios.

use promer::alphabet::Alphabet;
use promer::build::{Architecture, Builder, EffectiveNumber, Weighting};
use promer::model::background::Background;
use promer::msa::TextMsa;
use promer::PromerError;

use super::helpers::amino_seq;

fn toy_msa(rows: &[&str]) -> promer::DigitalMsa {
    TextMsa {
        name: Some("toy".to_string()),
        accession: None,
        names: (0..rows.len()).map(|i| format!("s{i}")).collect(),
        rows: rows.iter().map(|r| r.to_string()).collect(),
        rf: None,
    }
    .digitize(Alphabet::Amino)
    .unwrap()
}

#[test]
fn triple_is_internally_consistent() {
    let seq = amino_seq("q1", "IRGIYNIIKSVAEDIEIGIIPPSKDHVTISSFKSPRIADT");
    let bg = Background::new(Alphabet::Amino);
    let (hmm, gm, om) = Builder::new(Alphabet::Amino).unwrap().build(&seq, &bg).unwrap();
    assert_eq!(hmm.m, seq.len());
    assert_eq!(gm.m, hmm.m);
    assert_eq!(om.m(), hmm.m);
    // Profile configured at the seed's length
    assert_eq!(gm.l, seq.len());
    assert!(hmm.evalue_parameters.is_some());
    assert_eq!(
        hmm.evalue_parameters.unwrap(),
        om.evalue_parameters().unwrap()
    );
}

#[test]
fn gap_dominated_columns_give_empty_model() {
    // Scenario: every column at least 50% gaps with symfrac 0.5
    let msa = toy_msa(&["A-C-", "-G-T", "A-C-", "-G-T"]);
    let bg = Background::new(Alphabet::Amino);
    let mut builder = Builder::new(Alphabet::Amino).unwrap();
    builder.symfrac = 0.75;
    let err = builder.build_msa(&msa, &bg).unwrap_err();
    assert!(matches!(err, PromerError::EmptyModel));
}

#[test]
fn weighting_schemes_produce_valid_models() {
    let msa = toy_msa(&[
        "ACDEFGHIKLMNPQRS",
        "ACDEFGHIKLMNPQRS",
        "ACDEFGHIKAMNPQRS",
        "TVWYACDEFGHIKLMN",
    ]);
    let bg = Background::new(Alphabet::Amino);
    for scheme in [Weighting::Pb, Weighting::Gsc, Weighting::Blosum, Weighting::None] {
        let mut builder = Builder::new(Alphabet::Amino).unwrap();
        builder.weighting = scheme;
        let (hmm, _, _) = builder.build_msa(&msa, &bg).unwrap();
        assert_eq!(hmm.m, 16, "scheme {scheme:?}");
        hmm.validate(1e-4).unwrap();
    }
}

#[test]
fn effective_number_reduces_with_redundancy() {
    let msa = toy_msa(&[
        "ACDEFGHIKLMNPQRS",
        "ACDEFGHIKLMNPQRS",
        "ACDEFGHIKLMNPQRS",
        "ACDEFGHIKLMNPQRS",
    ]);
    let bg = Background::new(Alphabet::Amino);
    let mut builder = Builder::new(Alphabet::Amino).unwrap();
    builder.effective_number = EffectiveNumber::Clust;
    let (hmm, _, _) = builder.build_msa(&msa, &bg).unwrap();
    // Four identical rows are one cluster
    assert!((hmm.nseq_effective.unwrap() - 1.0).abs() < 1e-6);
    assert_eq!(hmm.nseq, Some(4));
}

#[test]
fn hand_architecture_follows_rf() {
    let mut msa = toy_msa(&["ACDE", "ACDE", "ACDE"]);
    msa.rf = Some(vec![true, true, false, true]);
    let bg = Background::new(Alphabet::Amino);
    let mut builder = Builder::new(Alphabet::Amino).unwrap();
    builder.architecture = Architecture::Hand;
    let (hmm, _, _) = builder.build_msa(&msa, &bg).unwrap();
    assert_eq!(hmm.m, 3);
    assert_eq!(hmm.map, Some(vec![1, 2, 4]));
}

#[test]
fn invalid_parameters_are_rejected_up_front() {
    let seq = amino_seq("q", "ACDEFG");
    let bg = Background::new(Alphabet::Amino);

    let mut b = Builder::new(Alphabet::Amino).unwrap();
    b.symfrac = -0.1;
    assert!(matches!(b.build(&seq, &bg).unwrap_err(), PromerError::InvalidParameter(_)));

    let mut b = Builder::new(Alphabet::Amino).unwrap();
    b.popen = Some(0.9);
    assert!(matches!(b.build(&seq, &bg).unwrap_err(), PromerError::InvalidParameter(_)));
}

#[test]
fn calibration_is_reproducible_for_fixed_seed() {
    let seq = amino_seq("q", "IRGIYNIIKSVAEDIEIGIIPPSKDHVTISSFKSPRIADT");
    let bg = Background::new(Alphabet::Amino);
    let (a, _, _) = Builder::new(Alphabet::Amino).unwrap().build(&seq, &bg).unwrap();
    let (b, _, _) = Builder::new(Alphabet::Amino).unwrap().build(&seq, &bg).unwrap();
    assert_eq!(a.evalue_parameters, b.evalue_parameters);
}
