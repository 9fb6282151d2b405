//! Aggregation semantics: sorting, merging, thresholds, MSA rebuild.

use promer::alphabet::Alphabet;
use promer::results::tophits::{SortKey, TopHits};
use promer::search::pipeline::{Pipeline, PipelineConfig, PipelineQuery};
use promer::AnyMsa;

use super::helpers::{consensus_sequence, decoys, sample_amino_hmm};

fn search_fixture() -> (promer::Hmm, Vec<promer::DigitalSequence>, TopHits) {
    let hmm = sample_amino_hmm(30, 42);
    let mut targets = decoys(Alphabet::Amino, 4, 30, 9);
    targets.push(consensus_sequence(&hmm, "planted_a"));
    let mut second = consensus_sequence(&hmm, "planted_b");
    // a couple of mismatches so the two planted targets rank apart
    second.seq[0] = (second.seq[0] + 1) % 20;
    second.seq[5] = (second.seq[5] + 1) % 20;
    targets.push(second);
    let mut pipeline = Pipeline::new(Alphabet::Amino, PipelineConfig::default()).unwrap();
    let hits = pipeline.search_hmm(PipelineQuery::Hmm(&hmm), &targets).unwrap();
    (hmm, targets, hits)
}

#[test]
fn sort_is_stable_and_repeatable() {
    let (_, _, mut hits) = search_fixture();
    assert!(hits.is_sorted(SortKey::Key));
    let order1: Vec<String> = hits.iter().map(|h| h.name.clone()).collect();
    hits.sort(SortKey::Key);
    let order2: Vec<String> = hits.iter().map(|h| h.name.clone()).collect();
    assert_eq!(order1, order2);
    // E-values ascend through the ranking
    let evalues: Vec<f64> = hits.iter().map(|h| h.evalue).collect();
    for pair in evalues.windows(2) {
        assert!(pair[0] <= pair[1]);
    }
}

#[test]
fn merge_is_order_independent_after_sorting() {
    let (hmm, targets, _) = search_fixture();
    let (left, right) = targets.split_at(3);

    let mut p1 = Pipeline::new(Alphabet::Amino, PipelineConfig::default()).unwrap();
    let a = p1.search_hmm(PipelineQuery::Hmm(&hmm), left).unwrap();
    let mut p2 = Pipeline::new(Alphabet::Amino, PipelineConfig::default()).unwrap();
    let b = p2.search_hmm(PipelineQuery::Hmm(&hmm), right).unwrap();

    let mut ab = a.clone().merge(vec![b.clone()]).unwrap();
    let mut ba = b.merge(vec![a]).unwrap();
    ab.sort(SortKey::Key);
    ba.sort(SortKey::Key);

    assert_eq!(ab.len(), ba.len());
    assert!((ab.z() - ba.z()).abs() < 1e-9);
    for (x, y) in ab.iter().zip(ba.iter()) {
        assert_eq!(x.name, y.name);
        assert!((x.evalue - y.evalue).abs() <= 1e-12 * x.evalue.max(1e-300));
    }
}

#[test]
fn merged_evalues_use_summed_search_space() {
    let (hmm, targets, whole) = search_fixture();
    let (left, right) = targets.split_at(3);

    let mut p1 = Pipeline::new(Alphabet::Amino, PipelineConfig::default()).unwrap();
    let a = p1.search_hmm(PipelineQuery::Hmm(&hmm), left).unwrap();
    let mut p2 = Pipeline::new(Alphabet::Amino, PipelineConfig::default()).unwrap();
    let b = p2.search_hmm(PipelineQuery::Hmm(&hmm), right).unwrap();
    let merged = a.merge(vec![b]).unwrap();

    assert!((merged.z() - whole.z()).abs() < 1e-9);
    for hit in merged.iter() {
        let original = whole.iter().find(|h| h.name == hit.name).unwrap();
        assert!((hit.evalue - original.evalue).abs() <= 1e-9 * original.evalue.max(1e-300));
    }
}

#[test]
fn reported_and_included_views_expose_lengths() {
    let (_, _, hits) = search_fixture();
    assert_eq!(hits.reported().count(), hits.reported_len());
    assert_eq!(hits.included().count(), hits.included_len());
    assert!(hits.included_len() <= hits.reported_len());
    for hit in hits.included() {
        assert!(hit.reported, "included hit must be reported");
    }
}

#[test]
fn to_msa_stacks_included_domains() {
    let (hmm, targets, hits) = search_fixture();
    assert!(hits.included_len() >= 1);
    let msa = hits
        .to_msa(Alphabet::Amino, &targets, false, true, true)
        .unwrap();
    match msa {
        AnyMsa::Digital(d) => {
            assert!(d.nseq() >= 1);
            assert!(d.alen() >= hmm.m);
            assert_eq!(d.alphabet, Alphabet::Amino);
        }
        AnyMsa::Text(_) => panic!("asked for a digital alignment"),
    }
}

#[test]
fn tables_render_without_panicking() {
    use promer::report::TableFormat;
    let (_, _, hits) = search_fixture();
    for format in [TableFormat::Targets, TableFormat::Domains, TableFormat::Pfam] {
        let mut out = Vec::new();
        hits.write(&mut out, format, true).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("planted_a"), "{format:?} output misses the hit");
    }
}

#[test]
fn pfam_format_renders_three_blocks() {
    use promer::report::TableFormat;
    let (_, _, hits) = search_fixture();
    let mut out = Vec::new();
    hits.write(&mut out, TableFormat::Pfam, true).unwrap();
    let text = String::from_utf8(out).unwrap();

    let seq_at = text.find("# Sequence scores").expect("sequence block");
    let dom_at = text.find("# Domain scores").expect("domain block");
    let ali_at = text.find("# Alignments").expect("alignment block");
    assert!(seq_at < dom_at && dom_at < ali_at, "blocks out of order");

    // The hit appears in every block; the alignment block carries the
    // aligned display lines.
    let seq_block = &text[seq_at..dom_at];
    let dom_block = &text[dom_at..ali_at];
    let ali_block = &text[ali_at..];
    assert!(seq_block.contains("planted_a"));
    assert!(dom_block.contains("planted_a"));
    assert!(ali_block.contains(">> planted_a"));
    assert!(ali_block.contains("PP"));
}
