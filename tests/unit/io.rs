//! Text and pressed format round-trips.

use std::fs;
use std::path::PathBuf;

use promer::io::hmmfile::{write_hmm, HmmFile};
use promer::io::{is_pressed, press, HmmPressedFile};
use promer::model::params::Cutoffs;
use promer::PromerError;

use super::helpers::sample_amino_hmm;

fn scratch_path(tag: &str) -> PathBuf {
    let mut p = std::env::temp_dir();
    p.push(format!("promer-test-{tag}-{}", std::process::id()));
    p
}

fn annotated_model() -> promer::Hmm {
    let mut hmm = sample_amino_hmm(12, 42);
    hmm.name = "test_model".to_string();
    hmm.accession = Some("PM00042".to_string());
    hmm.description = Some("a sampled test model".to_string());
    hmm.nseq = Some(7);
    hmm.nseq_effective = Some(3.5);
    hmm.command_line = vec!["promer build toy.sto".to_string()];
    hmm.cutoffs = Cutoffs {
        gathering: Some((25.0, 20.0)),
        trusted: Some((30.0, 28.0)),
        noise: None,
    };
    hmm.evalue_parameters = Some(promer::model::params::EvalueParameters {
        m_mu: -8.5,
        m_lambda: 0.71,
        v_mu: -9.1,
        v_lambda: 0.71,
        f_tau: -4.2,
        f_lambda: 0.71,
    });
    hmm
}

fn assert_models_match(a: &promer::Hmm, b: &promer::Hmm, tol: f32) {
    assert_eq!(a.name, b.name);
    assert_eq!(a.m, b.m);
    assert_eq!(a.alphabet, b.alphabet);
    assert_eq!(a.accession, b.accession);
    assert_eq!(a.description, b.description);
    assert_eq!(a.nseq, b.nseq);
    assert_eq!(a.checksum, b.checksum);
    assert_eq!(a.cutoffs, b.cutoffs);
    assert_eq!(a.consensus, b.consensus);
    let pa = a.evalue_parameters.unwrap();
    let pb = b.evalue_parameters.unwrap();
    assert!((pa.m_mu - pb.m_mu).abs() < 1e-4);
    assert!((pa.f_lambda - pb.f_lambda).abs() < 1e-4);
    for node in 0..=a.m {
        for x in 0..a.alphabet.k() {
            assert!(
                (a.mat[node][x] - b.mat[node][x]).abs() < tol,
                "match emission drift at node {node}"
            );
            assert!((a.ins[node][x] - b.ins[node][x]).abs() < tol);
        }
        for t in 0..7 {
            assert!((a.t[node][t] - b.t[node][t]).abs() < tol);
        }
    }
}

#[test]
fn text_format_round_trips() {
    let hmm = annotated_model();
    let path = scratch_path("text");
    let mut buffer = Vec::new();
    write_hmm(&hmm, &mut buffer).unwrap();
    fs::write(&path, &buffer).unwrap();

    let mut file = HmmFile::open(&path).unwrap();
    let back = file.read_next().unwrap().expect("one record");
    assert!(file.read_next().unwrap().is_none());
    assert_models_match(&hmm, &back, 1e-4);
    fs::remove_file(&path).ok();
}

#[test]
fn text_reader_iterates_and_rewinds() {
    let mut first = annotated_model();
    first.name = "model_one".to_string();
    let mut second = sample_amino_hmm(8, 9);
    second.name = "model_two".to_string();

    let path = scratch_path("multi");
    let mut buffer = Vec::new();
    write_hmm(&first, &mut buffer).unwrap();
    write_hmm(&second, &mut buffer).unwrap();
    fs::write(&path, &buffer).unwrap();

    let mut file = HmmFile::open(&path).unwrap();
    let names: Vec<String> = (&mut file).map(|h| h.unwrap().name).collect();
    assert_eq!(names, ["model_one", "model_two"]);

    file.rewind().unwrap();
    let again = file.read_next().unwrap().unwrap();
    assert_eq!(again.name, "model_one");

    assert!(!file.closed());
    file.close();
    file.close(); // idempotent
    assert!(file.closed());
    assert!(file.read_next().is_err());
    fs::remove_file(&path).ok();
}

#[test]
fn trailing_garbage_ends_iteration_cleanly() {
    let hmm = annotated_model();
    let path = scratch_path("garbage");
    let mut buffer = Vec::new();
    write_hmm(&hmm, &mut buffer).unwrap();
    buffer.extend_from_slice(b"# leftover notes\nnot a model\n");
    fs::write(&path, &buffer).unwrap();

    let mut file = HmmFile::open(&path).unwrap();
    assert!(file.read_next().unwrap().is_some());
    assert!(file.read_next().unwrap().is_none());
    fs::remove_file(&path).ok();
}

#[test]
fn leading_garbage_is_a_format_error() {
    let path = scratch_path("badlead");
    fs::write(&path, b"this is not an HMM file\n").unwrap();
    let mut file = HmmFile::open(&path).unwrap();
    assert!(matches!(
        file.read_next().unwrap_err(),
        PromerError::InvalidFormat(_)
    ));
    fs::remove_file(&path).ok();
}

#[test]
fn foreign_version_tag_is_unsupported() {
    let path = scratch_path("version");
    fs::write(&path, b"HMMER2.0 [2.3.2]\n").unwrap();
    let mut file = HmmFile::open(&path).unwrap();
    assert!(matches!(
        file.read_next().unwrap_err(),
        PromerError::UnsupportedVersion(_)
    ));
    fs::remove_file(&path).ok();
}

#[test]
fn pressed_database_round_trips() {
    let mut first = annotated_model();
    first.name = "pressed_one".to_string();
    let mut second = sample_amino_hmm(20, 5);
    second.name = "pressed_two".to_string();

    let stem = scratch_path("press");
    assert!(!is_pressed(&stem));
    let n = press([&first, &second], &stem).unwrap();
    assert_eq!(n, 2);
    assert!(is_pressed(&stem));

    let mut db = HmmPressedFile::open(&stem).unwrap();
    assert_eq!(db.len(), 2);
    let om1 = db.read_next().unwrap().unwrap();
    let om2 = db.read_next().unwrap().unwrap();
    assert!(db.read_next().unwrap().is_none());
    assert_eq!(om1.name(), "pressed_one");
    assert_eq!(om2.name(), "pressed_two");
    assert_eq!(om1.m(), first.m);
    assert_eq!(om2.m(), second.m);
    // Offsets point into the companion files
    assert!(om1.offsets.model.is_some());
    assert!(om1.offsets.filter.is_some());
    assert!(om1.offsets.profile.is_some());
    assert!(om2.offsets.model.unwrap() > om1.offsets.model.unwrap());

    db.rewind().unwrap();
    let again = db.read_next().unwrap().unwrap();
    assert_eq!(again.name(), "pressed_one");

    for suffix in [".h3m", ".h3f", ".h3i", ".h3p"] {
        let mut p = stem.clone().into_os_string();
        p.push(suffix);
        fs::remove_file(PathBuf::from(p)).ok();
    }
}

#[test]
fn corrupt_pressed_index_is_detected() {
    let hmm = annotated_model();
    let stem = scratch_path("corrupt");
    press([&hmm], &stem).unwrap();
    // Clobber the index magic
    let mut idx = stem.clone().into_os_string();
    idx.push(".h3i");
    let idx = PathBuf::from(idx);
    let mut bytes = fs::read(&idx).unwrap();
    bytes[0] ^= 0xff;
    fs::write(&idx, &bytes).unwrap();

    assert!(matches!(
        HmmPressedFile::open(&stem).unwrap_err(),
        PromerError::CorruptFile(_) | PromerError::EndianMismatch(_)
    ));
    for suffix in [".h3m", ".h3f", ".h3i", ".h3p"] {
        let mut p = stem.clone().into_os_string();
        p.push(suffix);
        fs::remove_file(PathBuf::from(p)).ok();
    }
}
