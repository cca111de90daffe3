use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::bail;
use bio::io::fasta::{Reader, Record};
use log::{info, warn};

use crate::alignment::{is_dna_word, SitePatterns, GAP};
use crate::tree::{tree_parser, Tree};
use crate::Result;

/// Characters other than `-` that some aligners write for gaps.
const GAP_VARIANTS: &[u8] = b"_*.~";

pub(crate) struct DataError {
    pub(crate) message: String,
}

impl fmt::Debug for DataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for DataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for DataError {}

fn normalise_nucleotides(seq: &[u8]) -> Vec<u8> {
    seq.iter()
        .map(|c| match c.to_ascii_uppercase() {
            c if GAP_VARIANTS.contains(&c) => GAP,
            c => c,
        })
        .collect()
}

/// Reads nucleotide records from a fasta file. Sequences come back in uppercase with every
/// gap written as `-`; anything that is not a nucleotide, IUPAC code or gap is an error.
///
/// # Example
/// ```
/// use std::path::Path;
/// use phylo_beagle::io::read_sequences;
/// let records = read_sequences(Path::new("./data/hcg.fasta")).unwrap();
/// assert_eq!(records[2].id(), "gorilla");
/// ```
pub fn read_sequences(path: &Path) -> Result<Vec<Record>> {
    info!("Reading sequences from file {}", path.display());
    let mut records = Vec::new();
    for result in Reader::from_file(path)?.records() {
        let rec = result?;
        if let Err(e) = rec.check() {
            bail!(DataError {
                message: e.to_string()
            });
        }
        let seq = normalise_nucleotides(rec.seq());
        if !is_dna_word(&seq) {
            bail!(DataError {
                message: format!(
                    "Invalid nucleotide sequence encountered for {}: {}",
                    rec.id(),
                    String::from_utf8_lossy(&seq)
                )
            });
        }
        records.push(Record::with_attrs(rec.id(), rec.desc(), &seq));
    }
    if records.is_empty() {
        bail!(DataError {
            message: format!("No sequences found in file {}", path.display())
        });
    }
    info!("Read {} sequences", records.len());
    Ok(records)
}

/// Reads an alignment and compresses it into site patterns.
pub fn read_alignment(path: &Path) -> Result<SitePatterns> {
    SitePatterns::from_records(&read_sequences(path)?)
}

/// Reads every newick tree in a file. Unrooted trees are rooted at their trifurcation with
/// a zero length branch.
pub fn read_newick_from_file(path: &Path) -> Result<Vec<Tree>> {
    info!("Reading newick trees from file {}", path.display());
    let trees = tree_parser::from_newick(&fs::read_to_string(path)?)?;
    if trees.len() > 1 {
        warn!("{} holds {} trees", path.display(), trees.len());
    }
    Ok(trees)
}

#[cfg(test)]
mod tests;
