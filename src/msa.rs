//! Multiple sequence alignments, text and digital.

use crate::alphabet::Alphabet;
use crate::errors::{PromerError, Result};

/// A text or digital alignment, depending on what the producer was asked
/// for.
#[derive(Debug, Clone)]
pub enum AnyMsa {
    Text(TextMsa),
    Digital(DigitalMsa),
}

impl AnyMsa {
    pub fn nseq(&self) -> usize {
        match self {
            AnyMsa::Text(m) => m.nseq(),
            AnyMsa::Digital(m) => m.nseq(),
        }
    }

    pub fn into_digital(self, alphabet: Alphabet) -> Result<DigitalMsa> {
        match self {
            AnyMsa::Text(m) => m.digitize(alphabet),
            AnyMsa::Digital(m) => Ok(m),
        }
    }
}

/// An alignment over ASCII rows. Gaps are `-` (or `.`); lowercase residues
/// mark insert columns when produced by the trace aligner.
#[derive(Debug, Clone)]
pub struct TextMsa {
    pub name: Option<String>,
    pub accession: Option<String>,
    pub names: Vec<String>,
    pub rows: Vec<String>,
    /// Reference-column annotation: `x` marks a consensus column.
    pub rf: Option<String>,
}

impl TextMsa {
    pub fn nseq(&self) -> usize {
        self.rows.len()
    }

    pub fn alen(&self) -> usize {
        self.rows.first().map_or(0, |r| r.len())
    }

    pub fn digitize(&self, alphabet: Alphabet) -> Result<DigitalMsa> {
        let mut rows = Vec::with_capacity(self.rows.len());
        for (name, row) in self.names.iter().zip(&self.rows) {
            let mut digital = Vec::with_capacity(row.len());
            for ch in row.bytes() {
                match alphabet.index(ch) {
                    Some(code) => digital.push(code),
                    None => {
                        return Err(PromerError::InvalidFormat(format!(
                            "symbol '{}' in row '{}' not in {} alphabet",
                            ch as char,
                            name,
                            alphabet.name()
                        )))
                    }
                }
            }
            rows.push(digital);
        }
        let nseq = rows.len();
        Ok(DigitalMsa {
            name: self.name.clone(),
            accession: self.accession.clone(),
            alphabet,
            names: self.names.clone(),
            rows,
            weights: vec![1.0; nseq],
            rf: self
                .rf
                .as_ref()
                .map(|rf| rf.bytes().map(|c| c == b'x' || c == b'X').collect()),
        })
    }
}

/// An alignment in digital encoding. All rows share one length (`alen`) and
/// one alphabet; per-row weights default to 1.
#[derive(Debug, Clone)]
pub struct DigitalMsa {
    pub name: Option<String>,
    pub accession: Option<String>,
    pub alphabet: Alphabet,
    pub names: Vec<String>,
    pub rows: Vec<Vec<u8>>,
    pub weights: Vec<f32>,
    /// Consensus-column annotation used by the `hand` architecture.
    pub rf: Option<Vec<bool>>,
}

impl DigitalMsa {
    pub fn new(alphabet: Alphabet, names: Vec<String>, rows: Vec<Vec<u8>>) -> Result<Self> {
        let alen = rows.first().map_or(0, |r| r.len());
        if rows.iter().any(|r| r.len() != alen) {
            return Err(PromerError::InvalidFormat("ragged alignment rows".to_string()));
        }
        if names.len() != rows.len() {
            return Err(PromerError::InvalidFormat("name/row count mismatch".to_string()));
        }
        let nseq = rows.len();
        Ok(DigitalMsa {
            name: None,
            accession: None,
            alphabet,
            names,
            rows,
            weights: vec![1.0; nseq],
            rf: None,
        })
    }

    pub fn nseq(&self) -> usize {
        self.rows.len()
    }

    pub fn alen(&self) -> usize {
        self.rows.first().map_or(0, |r| r.len())
    }

    /// Residue span of a row: (first residue column, last residue column,
    /// residue count), or None for an all-gap row.
    pub fn span(&self, idx: usize) -> Option<(usize, usize, usize)> {
        let row = &self.rows[idx];
        let first = row.iter().position(|&c| self.alphabet.is_residue(c))?;
        let last = row.iter().rposition(|&c| self.alphabet.is_residue(c))?;
        let count = row.iter().filter(|&&c| self.alphabet.is_residue(c)).count();
        Some((first, last, count))
    }

    /// Fractional identity between two rows over columns where both carry a
    /// residue.
    pub fn pairwise_identity(&self, a: usize, b: usize) -> f32 {
        let (ra, rb) = (&self.rows[a], &self.rows[b]);
        let mut shared = 0usize;
        let mut ident = 0usize;
        for (&x, &y) in ra.iter().zip(rb) {
            if self.alphabet.is_residue(x) && self.alphabet.is_residue(y) {
                shared += 1;
                if x == y {
                    ident += 1;
                }
            }
        }
        if shared == 0 {
            0.0
        } else {
            ident as f32 / shared as f32
        }
    }

    pub fn textize(&self) -> TextMsa {
        let rows = self
            .rows
            .iter()
            .map(|row| row.iter().map(|&c| self.alphabet.sym(c) as char).collect())
            .collect();
        TextMsa {
            name: self.name.clone(),
            accession: self.accession.clone(),
            names: self.names.clone(),
            rows,
            rf: self
                .rf
                .as_ref()
                .map(|rf| rf.iter().map(|&m| if m { 'x' } else { '.' }).collect()),
        }
    }
}
