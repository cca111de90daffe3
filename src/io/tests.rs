use rstest::*;

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::{tempdir, TempDir};

use crate::io::{read_alignment, read_newick_from_file, read_sequences, DataError};

fn write_temp(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn reading_hcg_fasta() {
    let sequences = read_sequences(Path::new("./data/hcg.fasta")).unwrap();
    assert_eq!(sequences.len(), 3);
    let ids: Vec<&str> = sequences.iter().map(|rec| rec.id()).collect();
    assert_eq!(ids, ["human", "chimp", "gorilla"]);
    for seq in sequences {
        assert_eq!(seq.seq().len(), 768);
    }
}

#[test]
fn reading_unaligned_fasta() {
    let dir = tempdir().unwrap();
    let path = write_temp(&dir, "seqs.fasta", ">A\nA\n>B\nac\n>C\nGT\n>D\nACGT\n");
    let corr_lengths = [1, 2, 2, 4];
    let sequences = read_sequences(&path).unwrap();
    assert_eq!(sequences.len(), 4);
    for (i, seq) in sequences.iter().enumerate() {
        assert_eq!(seq.seq().len(), corr_lengths[i]);
    }
    assert_eq!(sequences[1].seq(), b"AC");
}

#[rstest]
#[case::empty_sequence_name(">\nACGT\n", "Expecting id")]
#[case::garbage_sequence(">A\nAC\u{e9}T\n", "Non-ascii character found")]
#[case::weird_chars(">A\nAC!T\n", "Invalid nucleotide sequence")]
#[case::protein(">A\nMKLV\n", "Invalid nucleotide sequence")]
#[case::empty_file("", "No sequences found")]
fn reading_incorrect_fasta(#[case] content: &str, #[case] exp_error: &str) {
    let dir = tempdir().unwrap();
    let path = write_temp(&dir, "bad.fasta", content);
    let res = read_sequences(&path);
    assert!(res.is_err());
    assert!(res.unwrap_err().to_string().contains(exp_error));
}

#[test]
fn invalid_sequences_raise_data_errors() {
    let dir = tempdir().unwrap();
    let path = write_temp(&dir, "bad.fasta", ">A\nAC!T\n");
    let err = read_sequences(&path).unwrap_err();
    assert!(err.downcast_ref::<DataError>().is_some());
}

#[test]
fn reading_nonexistent_fasta() {
    assert!(read_sequences(Path::new("./data/sequences_nonexistent.fasta")).is_err());
}

#[test]
fn read_sequences_weird_gap_chars() {
    let dir = tempdir().unwrap();
    let underscore = write_temp(&dir, "u.fasta", ">A\nAC__GT\n>B\nA_CG_t\n");
    let asterisk = write_temp(&dir, "a.fasta", ">A\nAC**GT\n>B\nA*CG*t\n");
    let mixed = write_temp(&dir, "m.fasta", ">A\nAC.~GT\n>B\nA.CG~t\n");
    let normal = write_temp(&dir, "n.fasta", ">A\nAC--GT\n>B\nA-CG-T\n");

    let sequences = read_sequences(&normal).unwrap();
    for other in [underscore, asterisk, mixed] {
        let other = read_sequences(&other).unwrap();
        assert_eq!(other.len(), sequences.len());
        for (seq, other) in sequences.iter().zip(other.iter()) {
            assert_eq!(seq.seq(), other.seq());
        }
    }
}

#[test]
fn reading_newick_file() {
    let trees = read_newick_from_file(&PathBuf::from("./data/hcg.newick")).unwrap();
    assert_eq!(trees.len(), 1);
    assert_eq!(trees[0].n(), 3);
    assert!(trees[0].is_binary());
    assert_eq!(trees[0].leaf_ids(), vec!["human", "chimp", "gorilla"]);
}

#[test]
fn reading_bad_newick_file() {
    let dir = tempdir().unwrap();
    let path = write_temp(&dir, "bad.newick", "((A:1,B:1):1,C:2");
    assert!(read_newick_from_file(&path).is_err());
    assert!(read_newick_from_file(&dir.path().join("missing.newick")).is_err());
}

#[test]
fn reading_alignment_compresses_columns() {
    let dir = tempdir().unwrap();
    let path = write_temp(&dir, "aln.fasta", ">A\nAC~A\n>B\nag.a\n");
    let patterns = read_alignment(&path).unwrap();
    assert_eq!(patterns.ids(), ["A", "B"]);
    assert_eq!(patterns.site_count(), 4);
    assert_eq!(patterns.pattern_count(), 3);
    assert_eq!(patterns.weights(), &[2.0, 1.0, 1.0]);
    assert_eq!(patterns.pattern_sequence(0), b"AC-");
    assert_eq!(patterns.pattern_sequence(1), b"AG-");
}

#[test]
fn reading_unaligned_alignment() {
    let dir = tempdir().unwrap();
    let path = write_temp(&dir, "aln.fasta", ">A\nACGT\n>B\nACG\n");
    let err = read_alignment(&path).unwrap_err();
    assert!(err.downcast_ref::<DataError>().is_some());
}
