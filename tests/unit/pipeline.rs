//! Search cascade scenarios, both loop directions.

use promer::alphabet::Alphabet;
use promer::model::background::Background;
use promer::results::tophits::{SearchMode, SortKey};
use promer::search::pipeline::{Pipeline, PipelineConfig, PipelineQuery};
use promer::PromerError;

use super::helpers::{amino_seq, consensus_sequence, decoys, optimize, profile_of, sample_amino_hmm};

fn amino_pipeline() -> Pipeline {
    Pipeline::new(Alphabet::Amino, PipelineConfig::default()).unwrap()
}

#[test]
fn sampled_model_finds_its_own_consensus() {
    // A sampled model searched against a database holding its own
    // consensus among decoys reports exactly that one target.
    let hmm = sample_amino_hmm(40, 42);
    let mut targets = decoys(Alphabet::Amino, 8, 40, 101);
    targets.push(consensus_sequence(&hmm, "planted"));

    let mut pipeline = amino_pipeline();
    let hits = pipeline.search_hmm(PipelineQuery::Hmm(&hmm), &targets).unwrap();

    assert_eq!(hits.reported_len(), 1);
    let hit = hits.reported().next().unwrap();
    assert_eq!(hit.name, "planted");
    assert!(hit.best_domain().unwrap().score > 0.0);
    assert!(hit.evalue < 1.0);
}

#[test]
fn single_sequence_query_finds_itself() {
    let query = amino_seq("query", "IRGIYNIIKSVAEDIEIGIIPPSKDHVTISSFKSPRIADT");
    let mut targets = decoys(Alphabet::Amino, 6, 40, 55);
    targets.push(query.clone());

    let mut pipeline = amino_pipeline();
    let hits = pipeline.search_seq(&query, &targets, None).unwrap();
    assert_eq!(hits.reported_len(), 1);
    assert_eq!(hits.reported().next().unwrap().name, "query");
}

#[test]
fn identical_targets_score_identically() {
    // Two identical sequences give two hits with equal scores, and the
    // seqidx sort restores input order.
    let hmm = sample_amino_hmm(30, 7);
    let twin_a = consensus_sequence(&hmm, "twin_a");
    let mut twin_b = twin_a.clone();
    twin_b.name = "twin_b".to_string();
    let targets = vec![twin_a, twin_b];

    let mut pipeline = amino_pipeline();
    let mut hits = pipeline.search_hmm(PipelineQuery::Hmm(&hmm), &targets).unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].score, hits[1].score);

    hits.sort(SortKey::Seqidx);
    let order: Vec<usize> = hits.iter().map(|h| h.seqidx).collect();
    assert_eq!(order, [0, 1]);
}

#[test]
fn missing_bit_cutoffs_error() {
    let hmm = sample_amino_hmm(20, 3);
    assert!(hmm.cutoffs.gathering.is_none());
    let targets = decoys(Alphabet::Amino, 2, 30, 5);

    let mut config = PipelineConfig::default();
    config.thresholds.bit_cutoffs = Some("gathering".parse().unwrap());
    let mut pipeline = Pipeline::new(Alphabet::Amino, config).unwrap();
    let err = pipeline.search_hmm(PipelineQuery::Hmm(&hmm), &targets).unwrap_err();
    assert!(matches!(err, PromerError::MissingCutoffs { .. }));
}

#[test]
fn alphabet_mismatch_errors() {
    let mut pipeline = Pipeline::new(Alphabet::Dna, PipelineConfig::default()).unwrap();
    let query = amino_seq("q", "IRGIY");
    let targets = decoys(Alphabet::Dna, 1, 20, 2);
    assert!(matches!(
        pipeline.search_seq(&query, &targets, None).unwrap_err(),
        PromerError::AlphabetMismatch { .. }
    ));
}

#[test]
fn filter_cascade_is_ordered_forward_over_viterbi() {
    // The Forward score dominates the Viterbi score (sum over paths vs
    // best path), up to quantization slack in the word filter.
    let hmm = sample_amino_hmm(25, 13);
    let gm = profile_of(&hmm, 40);
    let om = optimize(&gm);
    let bg = Background::new(Alphabet::Amino);
    let mut rng = promer::Randomness::new(31);
    for _ in 0..5 {
        let seq = bg.sample_sequence(40, &mut rng);
        let vit = promer::search::vitfilter::viterbi_filter(&om, &seq);
        let (_, fwd) = promer::search::fwdback::forward(&gm, &seq).unwrap();
        assert!(vit.is_finite(), "background targets must not saturate");
        assert!(fwd + 0.1 >= vit, "forward {fwd} vs viterbi {vit}");
    }

    // A saturating strong hit reports positive infinity, which the
    // cascade treats as an unconditional pass.
    let strong = consensus_sequence(&hmm, "t");
    let vit = promer::search::vitfilter::viterbi_filter(&om, &strong.seq);
    if !vit.is_finite() {
        assert_eq!(vit, f32::INFINITY);
    }
}

#[test]
fn hit_invariants_hold_for_reported_hits() {
    let hmm = sample_amino_hmm(35, 21);
    let mut targets = decoys(Alphabet::Amino, 5, 35, 77);
    targets.push(consensus_sequence(&hmm, "planted"));

    let mut pipeline = amino_pipeline();
    let hits = pipeline.search_hmm(PipelineQuery::Hmm(&hmm), &targets).unwrap();
    for hit in hits.reported() {
        assert!(hit.bias >= 0.0);
        let best = hit.best_domain().unwrap();
        assert!(best.score <= hit.score + 1e-4);
        for dom in hit.domains.iter() {
            if dom.included {
                assert!(dom.reported, "included domain must be reported");
            }
            assert!(dom.pvalue >= 0.0 && dom.pvalue <= 1.0);
        }
        assert!(hit.evalue >= 0.0);
    }
}

#[test]
fn search_and_scan_agree() {
    // One query model against one sequence gives the same hit through
    // both loop directions, modulo the mode field and hit naming.
    let hmm = sample_amino_hmm(40, 42);
    let target = consensus_sequence(&hmm, "t0");

    let mut pipeline = amino_pipeline();
    let search_hits = pipeline
        .search_hmm(PipelineQuery::Hmm(&hmm), std::slice::from_ref(&target))
        .unwrap();

    let om = optimize(&profile_of(&hmm, 400));
    let mut pipeline2 = amino_pipeline();
    let scan_hits = pipeline2.scan_seq(&target, vec![Ok(om)]).unwrap();

    assert_eq!(search_hits.mode, SearchMode::Search);
    assert_eq!(scan_hits.mode, SearchMode::Scan);
    assert_eq!(search_hits.len(), 1);
    assert_eq!(scan_hits.len(), 1);
    let (s, c) = (&search_hits[0], &scan_hits[0]);
    assert!((s.score - c.score).abs() < 1e-3);
    assert!((s.pvalue - c.pvalue).abs() < 1e-9 * s.pvalue.max(1e-300));
    assert_eq!(s.domains.len(), c.domains.len());
    let (sd, cd) = (&s.domains[0], &c.domains[0]);
    assert_eq!((sd.env_from, sd.env_to), (cd.env_from, cd.env_to));
}

#[test]
fn parallel_search_matches_serial() {
    let hmm = sample_amino_hmm(30, 17);
    let mut targets = decoys(Alphabet::Amino, 12, 30, 23);
    targets.insert(4, consensus_sequence(&hmm, "planted"));

    let mut serial = amino_pipeline();
    let expected = serial.search_hmm(PipelineQuery::Hmm(&hmm), &targets).unwrap();

    let mut parallel = amino_pipeline();
    let got = parallel
        .search_hmm_parallel(PipelineQuery::Hmm(&hmm), &targets, 4)
        .unwrap();

    assert_eq!(expected.len(), got.len());
    assert!((expected.z() - got.z()).abs() < 1e-9);
    for (a, b) in expected.iter().zip(got.iter()) {
        assert_eq!(a.name, b.name);
        assert!((a.score - b.score).abs() < 1e-4);
        assert!((a.evalue - b.evalue).abs() <= 1e-9 * a.evalue.max(1e-300));
    }
}

#[test]
fn clear_resets_counters_but_keeps_config() {
    let hmm = sample_amino_hmm(20, 2);
    let targets = decoys(Alphabet::Amino, 3, 25, 3);
    let mut config = PipelineConfig::default();
    config.thresholds.e = 5.0;
    let mut pipeline = Pipeline::new(Alphabet::Amino, config).unwrap();
    pipeline.search_hmm(PipelineQuery::Hmm(&hmm), &targets).unwrap();
    assert_eq!(pipeline.searched_sequences, 3);
    pipeline.clear();
    assert_eq!(pipeline.searched_sequences, 0);
    assert_eq!(pipeline.config.thresholds.e, 5.0);
}

#[test]
fn empty_targets_are_tallied_not_fatal() {
    let hmm = sample_amino_hmm(15, 8);
    let targets = vec![
        promer::DigitalSequence::new("empty", Alphabet::Amino, Vec::new()),
        consensus_sequence(&hmm, "real"),
    ];
    let mut pipeline = amino_pipeline();
    let hits = pipeline.search_hmm(PipelineQuery::Hmm(&hmm), &targets).unwrap();
    assert_eq!(hits.searched_sequences, 2);
    assert_eq!(hits.reported_len(), 1);
}

#[test]
fn invalid_filter_threshold_is_rejected() {
    let config = PipelineConfig { f1: 1.5, ..PipelineConfig::default() };
    assert!(matches!(
        Pipeline::new(Alphabet::Amino, config).unwrap_err(),
        PromerError::InvalidParameter(_)
    ));
}
