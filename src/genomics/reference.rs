//! Reference-genome accessors.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use rust_htslib::faidx;
use thiserror::Error;

/// Errors opening or querying a reference genome.
#[derive(Debug, Error)]
pub enum ReferenceError {
    /// htslib failed to open or query the indexed FASTA.
    #[error("faidx error: {0}")]
    Faidx(#[from] rust_htslib::errors::Error),
}

/// Read-only view of a reference genome with 1-based coordinates.
pub trait ReferenceGenome {
    /// Index of the sequence called `name`.
    fn index_of(&self, name: &str) -> Option<usize>;

    /// Length of sequence `index`.
    fn length(&self, index: usize) -> Option<u32>;

    /// Upper-cased base at 1-based `position` of sequence `index`.
    fn base(&self, index: usize, position: u32) -> Option<u8>;
}

/// Reference genome fully loaded into memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryReference {
    names: Vec<String>,
    by_name: HashMap<String, usize>,
    sequences: Vec<Vec<u8>>,
}

impl InMemoryReference {
    /// Create an empty reference.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named sequence and return its index.
    pub fn push(&mut self, name: impl Into<String>, sequence: impl AsRef<[u8]>) -> usize {
        let name = name.into();
        let index = self.sequences.len();
        self.by_name.insert(name.clone(), index);
        self.names.push(name);
        self.sequences.push(sequence.as_ref().to_ascii_uppercase());
        index
    }

    /// Sequence names in insertion order.
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

impl ReferenceGenome for InMemoryReference {
    fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    fn length(&self, index: usize) -> Option<u32> {
        self.sequences.get(index).map(|seq| seq.len() as u32)
    }

    fn base(&self, index: usize, position: u32) -> Option<u8> {
        let offset = position.checked_sub(1)? as usize;
        self.sequences.get(index)?.get(offset).copied()
    }
}

/// Indexed FASTA (`.fai`) accessed through htslib.
pub struct FaidxReference {
    reader: faidx::Reader,
    names: Vec<String>,
}

impl fmt::Debug for FaidxReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FaidxReference")
            .field("names", &self.names)
            .finish_non_exhaustive()
    }
}

impl FaidxReference {
    /// Open `path`; htslib builds the `.fai` index when it is missing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ReferenceError> {
        let reader = faidx::Reader::from_path(path)?;
        let names = reader.seq_names()?;
        Ok(Self { reader, names })
    }
}

impl ReferenceGenome for FaidxReference {
    fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    fn length(&self, index: usize) -> Option<u32> {
        let name = self.names.get(index)?;
        u32::try_from(self.reader.fetch_seq_len(name)).ok()
    }

    fn base(&self, index: usize, position: u32) -> Option<u8> {
        let name = self.names.get(index)?;
        let offset = position.checked_sub(1)? as usize;
        let seq = self.reader.fetch_seq_string(name, offset, offset).ok()?;
        seq.bytes().next().map(|b| b.to_ascii_uppercase())
    }
}
