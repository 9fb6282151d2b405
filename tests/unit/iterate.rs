//! The search-and-rebuild driver.

use promer::alphabet::Alphabet;
use promer::build::Builder;
use promer::search::pipeline::{Pipeline, PipelineConfig};

use super::helpers::{amino_seq, decoys};

const QUERY: &str = "IRGIYNIIKSVAEDIEIGIIPPSKDHVTISSFKSPRIADT";

#[test]
fn self_search_converges_in_two_rounds() {
    // A database holding only the query converges as soon as the ranking
    // repeats: round 2.
    let query = amino_seq("query", QUERY);
    let targets = vec![query.clone()];

    let mut pipeline = Pipeline::new(Alphabet::Amino, PipelineConfig::default()).unwrap();
    let mut builder = Builder::new(Alphabet::Amino).unwrap();
    let search = pipeline.iterate_seq(&mut builder, &query, &targets).unwrap();

    let mut rounds = 0usize;
    let mut converged = false;
    for result in search.take(4) {
        let result = result.unwrap();
        rounds = result.iteration;
        converged = result.converged;
        assert_eq!(result.iteration, rounds);
        assert!(result.hits.included_len() >= 1);
        if converged {
            break;
        }
    }
    assert!(converged, "did not converge in {rounds} rounds");
    assert!(rounds <= 2, "converged only after {rounds} rounds");
}

#[test]
fn iteration_counts_from_one() {
    let query = amino_seq("query", QUERY);
    let mut targets = decoys(Alphabet::Amino, 4, 40, 3);
    targets.push(query.clone());

    let mut pipeline = Pipeline::new(Alphabet::Amino, PipelineConfig::default()).unwrap();
    let mut builder = Builder::new(Alphabet::Amino).unwrap();
    let mut search = pipeline.iterate_seq(&mut builder, &query, &targets).unwrap();

    let first = search.next().unwrap().unwrap();
    assert_eq!(first.iteration, 1);
    assert!(!first.converged, "cannot converge before a ranking exists");
    assert!(first.msa.nseq() >= 1);
}

#[test]
fn driver_stops_after_convergence() {
    let query = amino_seq("query", QUERY);
    let targets = vec![query.clone()];

    let mut pipeline = Pipeline::new(Alphabet::Amino, PipelineConfig::default()).unwrap();
    let mut builder = Builder::new(Alphabet::Amino).unwrap();
    let search = pipeline.iterate_seq(&mut builder, &query, &targets).unwrap();

    let results: Vec<_> = search.take(10).collect::<Result<_, _>>().unwrap();
    let last = results.last().unwrap();
    assert!(last.converged);
    // take(10) got fewer items: iteration ended itself
    assert!(results.len() < 10);
}

#[test]
fn select_hits_hook_can_drop_everything() {
    let query = amino_seq("query", QUERY);
    let targets = vec![query.clone()];

    let mut pipeline = Pipeline::new(Alphabet::Amino, PipelineConfig::default()).unwrap();
    let mut builder = Builder::new(Alphabet::Amino).unwrap();
    let mut search = pipeline.iterate_seq(&mut builder, &query, &targets).unwrap();
    search.set_select_hits(Box::new(|hits| {
        for hit in hits.iter_mut() {
            hit.included = false;
        }
    }));

    let first = search.next().unwrap().unwrap();
    assert_eq!(first.hits.included_len(), 0);
    // The anchor row keeps the rebuild alive even with nothing included
    assert!(first.msa.nseq() >= 1);
}
