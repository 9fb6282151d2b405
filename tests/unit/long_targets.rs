//! Windowed nucleotide search.

use promer::alphabet::{Alphabet, DigitalSequence};
use promer::model::background::Background;
use promer::model::hmm::Hmm;
use promer::results::tophits::Strand;
use promer::rng::Randomness;
use promer::search::long_targets::{LongTargetsConfig, LongTargetsPipeline};
use promer::search::pipeline::{Pipeline, PipelineConfig, PipelineQuery};

fn dna_model(m: usize, seed: u64) -> Hmm {
    let mut rng = Randomness::new(seed);
    Hmm::sample(Alphabet::Dna, m, &mut rng).unwrap()
}

fn consensus_of(hmm: &Hmm) -> Vec<u8> {
    (1..=hmm.m)
        .map(|k| {
            hmm.mat[k]
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
                .unwrap()
                .0 as u8
        })
        .collect()
}

/// Random target with `insert` planted at 0-based `at`.
fn planted_target(len: usize, at: usize, insert: &[u8], seed: u64) -> DigitalSequence {
    let bg = Background::new(Alphabet::Dna);
    let mut rng = Randomness::new(seed);
    let mut seq = bg.sample_sequence(len, &mut rng);
    seq[at..at + insert.len()].copy_from_slice(insert);
    DigitalSequence::new("chr_test", Alphabet::Dna, seq)
}

fn long_pipeline(strand: Strand) -> LongTargetsPipeline {
    let pipeline = Pipeline::new(Alphabet::Dna, PipelineConfig::default()).unwrap();
    let config = LongTargetsConfig { strand, ..LongTargetsConfig::default() };
    LongTargetsPipeline::new(pipeline, config).unwrap()
}

#[test]
fn watson_hit_reports_forward_coordinates() {
    let hmm = dna_model(50, 42);
    let cons = consensus_of(&hmm);
    let at = 100_000usize;
    let target = planted_target(200_000, at, &cons, 7);

    let mut lt = long_pipeline(Strand::Watson);
    let hits = lt.search_hmm(PipelineQuery::Hmm(&hmm), std::slice::from_ref(&target)).unwrap();

    assert!(hits.long_targets);
    assert_eq!(hits.strand, Some(Strand::Watson));
    let found = hits.reported().find(|h| {
        h.domains.iter().any(|d| {
            d.env_from <= d.env_to
                && d.env_from.abs_diff(at + 1) < 200
                && d.env_to.abs_diff(at + cons.len()) < 200
        })
    });
    assert!(found.is_some(), "planted watson hit not recovered");
}

#[test]
fn crick_hit_reports_inverted_coordinates() {
    // Scenario: a 600 kb target carrying one reverse-strand instance of
    // the model's consensus reports the hit with env_from > env_to in
    // forward coordinates.
    let hmm = dna_model(50, 42);
    let mut rc = DigitalSequence::new("c", Alphabet::Dna, consensus_of(&hmm));
    rc.reverse_complement_in_place().unwrap();
    let at = 300_000usize;
    let target = planted_target(600_000, at, &rc.seq, 11);

    let mut lt = long_pipeline(Strand::Both);
    let hits = lt.search_hmm(PipelineQuery::Hmm(&hmm), std::slice::from_ref(&target)).unwrap();

    let planted_span = (at + 1, at + rc.seq.len());
    let found = hits.reported().find(|h| {
        h.domains.iter().any(|d| {
            d.env_from > d.env_to
                && d.env_to.abs_diff(planted_span.0) < 200
                && d.env_from.abs_diff(planted_span.1) < 200
        })
    });
    assert!(found.is_some(), "planted crick hit not recovered");
}

#[test]
fn block_metadata_is_carried() {
    let hmm = dna_model(20, 3);
    let cons = consensus_of(&hmm);
    let target = planted_target(4_000, 1_000, &cons, 5);

    let pipeline = Pipeline::new(Alphabet::Dna, PipelineConfig::default()).unwrap();
    let config = LongTargetsConfig {
        block_length: 2_048,
        strand: Strand::Both,
        ..LongTargetsConfig::default()
    };
    let mut lt = LongTargetsPipeline::new(pipeline, config).unwrap();
    let hits = lt.search_hmm(PipelineQuery::Hmm(&hmm), std::slice::from_ref(&target)).unwrap();
    assert_eq!(hits.block_length, Some(2_048));
    assert!(hits.long_targets);
    // envelope coordinates always refer to the full-length target
    for hit in hits.reported() {
        for dom in hit.domains.iter() {
            assert!(dom.env_from <= target.len());
            assert!(dom.env_to <= target.len());
        }
    }
}
