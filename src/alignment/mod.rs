use std::collections::HashMap;

use anyhow::bail;
use bio::io::fasta::Record;
use itertools::Itertools;
use lazy_static::lazy_static;
use log::info;

use crate::io::DataError;
use crate::Result;

pub static NUCLEOTIDES: &[u8] = b"ACGT";
pub static AMB_NUCLEOTIDES: &[u8] = b"RYSWKMBDHVNX";
pub static GAP: u8 = b'-';

/// Compact code used for gaps, unknown and ambiguous characters.
pub const DNA_UNKNOWN: usize = 4;

lazy_static! {
    static ref NUCLEOTIDE_INDEX: [usize; 256] = {
        let mut index = [DNA_UNKNOWN; 256];
        for (i, &char) in NUCLEOTIDES.iter().enumerate() {
            index[char as usize] = i;
            index[char.to_ascii_lowercase() as usize] = i;
        }
        index[b'U' as usize] = 3;
        index[b'u' as usize] = 3;
        index
    };
    static ref DNA_SETS: Vec<[f64; 4]> = (0..=255u8).map(dna_set).collect();
}

fn dna_set(char: u8) -> [f64; 4] {
    match char.to_ascii_uppercase() {
        b'A' => [1.0, 0.0, 0.0, 0.0],
        b'C' => [0.0, 1.0, 0.0, 0.0],
        b'G' => [0.0, 0.0, 1.0, 0.0],
        b'T' | b'U' => [0.0, 0.0, 0.0, 1.0],
        b'R' => [1.0, 0.0, 1.0, 0.0],
        b'Y' => [0.0, 1.0, 0.0, 1.0],
        b'S' => [0.0, 1.0, 1.0, 0.0],
        b'W' => [1.0, 0.0, 0.0, 1.0],
        b'K' => [0.0, 0.0, 1.0, 1.0],
        b'M' => [1.0, 1.0, 0.0, 0.0],
        b'B' => [0.0, 1.0, 1.0, 1.0],
        b'D' => [1.0, 0.0, 1.0, 1.0],
        b'H' => [1.0, 1.0, 0.0, 1.0],
        b'V' => [1.0, 1.0, 1.0, 0.0],
        _ => [1.0; 4],
    }
}

/// Compact state of a nucleotide in ACGT order, [`DNA_UNKNOWN`] for anything else.
///
/// # Example
/// ```
/// use phylo_beagle::alignment::dna_state;
/// assert_eq!(dna_state(b'g'), 2);
/// assert_eq!(dna_state(b'U'), 3);
/// assert_eq!(dna_state(b'-'), 4);
/// ```
pub fn dna_state(char: u8) -> usize {
    NUCLEOTIDE_INDEX[char as usize]
}

/// Tip partials of a character: 1.0 for every nucleotide the IUPAC code allows.
/// Gaps and unknown characters allow all four.
pub fn dna_partials(char: u8) -> [f64; 4] {
    DNA_SETS[char as usize]
}

pub fn is_dna_word(word: &[u8]) -> bool {
    word.iter().all(|c| {
        let c = c.to_ascii_uppercase();
        NUCLEOTIDES.contains(&c) || AMB_NUCLEOTIDES.contains(&c) || c == b'U' || c == GAP
    })
}

/// Aligned sequences compressed into unique columns.
///
/// Every taxon's sequence is stored over the unique columns only, `weights[p]` counts how
/// often pattern `p` occurs and `site_to_pattern[s]` maps column `s` back to its pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct SitePatterns {
    ids: Vec<String>,
    patterns: Vec<Vec<u8>>,
    weights: Vec<f64>,
    site_to_pattern: Vec<usize>,
}

impl SitePatterns {
    pub fn from_records(records: &[Record]) -> Result<SitePatterns> {
        if records.is_empty() {
            bail!(DataError {
                message: String::from("Cannot compress an empty alignment")
            });
        }
        let site_count = records[0].seq().len();
        if let Some(rec) = records.iter().find(|rec| rec.seq().len() != site_count) {
            bail!(DataError {
                message: format!(
                    "Sequences are not aligned, {} has length {} instead of {}",
                    rec.id(),
                    rec.seq().len(),
                    site_count
                )
            });
        }

        if let Some(id) = records.iter().map(|rec| rec.id()).duplicates().next() {
            bail!(DataError {
                message: format!("Sequence {} appears more than once", id)
            });
        }

        let sequences: Vec<Vec<u8>> = records
            .iter()
            .map(|rec| rec.seq().to_ascii_uppercase())
            .collect();
        let mut lookup = HashMap::<Vec<u8>, usize>::new();
        let mut columns = Vec::<Vec<u8>>::new();
        let mut weights = Vec::<f64>::new();
        let mut site_to_pattern = Vec::with_capacity(site_count);
        for site in 0..site_count {
            let column: Vec<u8> = sequences.iter().map(|seq| seq[site]).collect();
            let pattern = *lookup.entry(column.clone()).or_insert_with(|| {
                columns.push(column);
                weights.push(0.0);
                weights.len() - 1
            });
            weights[pattern] += 1.0;
            site_to_pattern.push(pattern);
        }

        let patterns = (0..records.len())
            .map(|taxon| columns.iter().map(|column| column[taxon]).collect())
            .collect();
        info!(
            "Compressed {} columns of {} sequences into {} patterns",
            site_count,
            records.len(),
            columns.len()
        );
        Ok(SitePatterns {
            ids: records.iter().map(|rec| rec.id().to_string()).collect(),
            patterns,
            weights,
            site_to_pattern,
        })
    }

    pub fn taxon_count(&self) -> usize {
        self.ids.len()
    }

    pub fn pattern_count(&self) -> usize {
        self.weights.len()
    }

    pub fn site_count(&self) -> usize {
        self.site_to_pattern.len()
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn taxon_index(&self, id: &str) -> Option<usize> {
        self.ids.iter().position(|taxon| taxon == id)
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn site_to_pattern(&self) -> &[usize] {
        &self.site_to_pattern
    }

    /// Characters of one taxon over the unique patterns.
    pub fn pattern_sequence(&self, taxon: usize) -> &[u8] {
        &self.patterns[taxon]
    }

    pub fn states(&self, taxon: usize) -> Vec<usize> {
        self.patterns[taxon].iter().map(|&c| dna_state(c)).collect()
    }

    pub fn partials(&self, taxon: usize) -> Vec<f64> {
        self.patterns[taxon]
            .iter()
            .flat_map(|&c| dna_partials(c))
            .collect()
    }

    /// Whether any pattern of the taxon needs partials instead of compact states.
    pub fn has_ambiguity(&self, taxon: usize) -> bool {
        self.patterns[taxon]
            .iter()
            .any(|&c| dna_state(c) == DNA_UNKNOWN && dna_partials(c) != [1.0; 4])
    }

    /// Spreads per-pattern values back over the original columns.
    pub fn expand(&self, pattern_values: &[f64]) -> Vec<f64> {
        self.site_to_pattern
            .iter()
            .map(|&pattern| pattern_values[pattern])
            .collect()
    }
}
