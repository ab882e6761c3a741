//! Parsing of `samtools mpileup` text lines and per-site allele tallies.

use thiserror::Error;

use crate::genomics::{AlleleClass, NUM_ALLELE_CLASSES};

/// Errors raised while parsing a single pileup line.
///
/// These are record-local: callers skip the offending line and continue.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PileupFormatError {
    /// Line has fewer columns than the fixed chrom/pos/ref prefix plus one group.
    #[error("pileup line has {0} columns, expected at least 4")]
    TooFewColumns(usize),
    /// Position column is not a positive integer.
    #[error("invalid position '{0}'")]
    InvalidPosition(String),
    /// Reference column is not a single A/C/G/T/N base.
    #[error("invalid reference base '{0}'")]
    InvalidReference(String),
    /// Per-input depth column is not an integer.
    #[error("invalid depth '{0}'")]
    InvalidDepth(String),
}

/// One site observation parsed from a pileup line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PileupRecord {
    /// Chromosome name as printed by the pileup generator.
    pub chrom: String,
    /// 1-based position.
    pub position: u32,
    /// Upper-cased reference base.
    pub reference: u8,
    /// Concatenated base-call strings of every input file.
    pub bases: Vec<u8>,
    /// Sum of the per-input depth columns.
    pub depth: u32,
}

impl PileupRecord {
    /// Parse one tab-separated pileup line.
    pub fn parse(line: &str) -> Result<Self, PileupFormatError> {
        let fields: Vec<&str> = line.trim_end_matches(['\r', '\n']).split('\t').collect();
        if fields.len() < 4 {
            return Err(PileupFormatError::TooFewColumns(fields.len()));
        }

        let position = parse_position(fields[1])?;

        let reference = match fields[2].as_bytes() {
            [base] if matches!(base.to_ascii_uppercase(), b'A' | b'C' | b'G' | b'T' | b'N') => {
                base.to_ascii_uppercase()
            }
            _ => return Err(PileupFormatError::InvalidReference(fields[2].to_string())),
        };

        let mut depth = 0u32;
        let mut bases = Vec::new();
        for group in fields[3..].chunks(3) {
            let input_depth: u32 = group[0]
                .parse()
                .map_err(|_| PileupFormatError::InvalidDepth(group[0].to_string()))?;
            depth = depth.saturating_add(input_depth);
            if let Some(calls) = group.get(1) {
                bases.extend_from_slice(calls.as_bytes());
            }
        }

        Ok(Self {
            chrom: fields[0].to_string(),
            position,
            reference,
            bases,
            depth,
        })
    }

    /// Iterate over the classified base calls of this site.
    pub fn base_calls(&self) -> BaseCallScanner<'_> {
        BaseCallScanner::new(&self.bases)
    }
}

/// Extract only the position column of a pileup line.
pub fn parse_position(field: &str) -> Result<u32, PileupFormatError> {
    match field.parse::<u32>() {
        Ok(position) if position > 0 => Ok(position),
        _ => Err(PileupFormatError::InvalidPosition(field.to_string())),
    }
}

/// A classified symbol from a pileup base string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseCall {
    /// `.` or `,`: the read matches the reference.
    Reference,
    /// Mismatching base.
    Base(AlleleClass),
    /// `+N...` or `-N...` marker with its length.
    Indel {
        /// [`AlleleClass::Insertion`] or [`AlleleClass::Deletion`].
        class: AlleleClass,
        /// Number of inserted/deleted bases.
        length: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Normal,
    /// Consume `remaining` characters without classifying them.
    SkipPair { remaining: u32 },
    ReadingIndelLength {
        class: AlleleClass,
        length: u32,
        digits: usize,
    },
}

/// Cursor over a pileup base string.
///
/// `^` consumes the following two characters as a pair, indel markers read
/// their run-length digits and then skip that many bases, `$`, `*` and any
/// unknown symbol are ignored.
#[derive(Debug, Clone)]
pub struct BaseCallScanner<'a> {
    bases: &'a [u8],
    cursor: usize,
    state: ScanState,
}

impl<'a> BaseCallScanner<'a> {
    /// Start scanning at the beginning of `bases`.
    pub fn new(bases: &'a [u8]) -> Self {
        Self {
            bases,
            cursor: 0,
            state: ScanState::Normal,
        }
    }
}

impl Iterator for BaseCallScanner<'_> {
    type Item = BaseCall;

    fn next(&mut self) -> Option<BaseCall> {
        while let Some(&byte) = self.bases.get(self.cursor) {
            match self.state {
                ScanState::Normal => {
                    self.cursor += 1;
                    match byte {
                        b'.' | b',' => return Some(BaseCall::Reference),
                        b'^' => self.state = ScanState::SkipPair { remaining: 2 },
                        b'+' | b'-' => {
                            let class = if byte == b'+' {
                                AlleleClass::Insertion
                            } else {
                                AlleleClass::Deletion
                            };
                            self.state = ScanState::ReadingIndelLength {
                                class,
                                length: 0,
                                digits: 0,
                            };
                        }
                        other => {
                            if let Some(class) = AlleleClass::from_base(other) {
                                return Some(BaseCall::Base(class));
                            }
                        }
                    }
                }
                ScanState::SkipPair { remaining } => {
                    self.cursor += 1;
                    self.state = if remaining > 1 {
                        ScanState::SkipPair {
                            remaining: remaining - 1,
                        }
                    } else {
                        ScanState::Normal
                    };
                }
                ScanState::ReadingIndelLength {
                    class,
                    length,
                    digits,
                } => {
                    if byte.is_ascii_digit() {
                        self.cursor += 1;
                        self.state = ScanState::ReadingIndelLength {
                            class,
                            length: length
                                .saturating_mul(10)
                                .saturating_add(u32::from(byte - b'0')),
                            digits: digits + 1,
                        };
                        continue;
                    }
                    // A marker without digits carries no length; rescan this byte normally.
                    if digits == 0 {
                        self.state = ScanState::Normal;
                        continue;
                    }
                    self.state = if length > 0 {
                        ScanState::SkipPair { remaining: length }
                    } else {
                        ScanState::Normal
                    };
                    return Some(BaseCall::Indel { class, length });
                }
            }
        }

        let pending = self.state;
        self.state = ScanState::Normal;
        match pending {
            ScanState::ReadingIndelLength {
                class,
                length,
                digits,
            } if digits > 0 => Some(BaseCall::Indel { class, length }),
            _ => None,
        }
    }
}

/// Per-site allele counters reused across the sites of one sample.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlleleTally {
    counts: [u32; NUM_ALLELE_CLASSES],
    insertion_lengths: Vec<u32>,
    deletion_lengths: Vec<u32>,
    observations: u32,
}

impl AlleleTally {
    /// Create an empty tally.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear every counter and length set.
    pub fn reset(&mut self) {
        self.counts = [0; NUM_ALLELE_CLASSES];
        self.insertion_lengths.clear();
        self.deletion_lengths.clear();
        self.observations = 0;
    }

    /// Record one base call. Reference matches are not allele-class observations.
    pub fn observe(&mut self, call: BaseCall) {
        let class = match call {
            BaseCall::Reference => return,
            BaseCall::Base(class) => class,
            BaseCall::Indel { class, length } => {
                let lengths = match class {
                    AlleleClass::Insertion => &mut self.insertion_lengths,
                    _ => &mut self.deletion_lengths,
                };
                if !lengths.contains(&length) {
                    lengths.push(length);
                }
                class
            }
        };
        self.counts[class.index()] += 1;
        self.observations += 1;
    }

    /// Reset, then tally every base call of `record`.
    pub fn tally_record(&mut self, record: &PileupRecord) {
        self.reset();
        for call in record.base_calls() {
            self.observe(call);
        }
    }

    /// Count for one allele class.
    pub fn count(&self, class: AlleleClass) -> u32 {
        self.counts[class.index()]
    }

    /// Counts in allele-code order.
    pub fn counts(&self) -> &[u32; NUM_ALLELE_CLASSES] {
        &self.counts
    }

    /// Number of classified (non-reference) observations.
    pub fn observations(&self) -> u32 {
        self.observations
    }

    /// Distinct insertion lengths in first-observed order.
    pub fn insertion_lengths(&self) -> &[u32] {
        &self.insertion_lengths
    }

    /// Distinct deletion lengths in first-observed order.
    pub fn deletion_lengths(&self) -> &[u32] {
        &self.deletion_lengths
    }

    /// Number of distinct indel types seen at this site.
    pub fn indel_type_count(&self) -> usize {
        self.insertion_lengths.len() + self.deletion_lengths.len()
    }

    /// Classes ordered by descending count; ties keep allele-code order.
    pub fn ranked(&self) -> [AlleleClass; NUM_ALLELE_CLASSES] {
        let mut ranked = AlleleClass::ALL;
        ranked.sort_by(|a, b| self.count(*b).cmp(&self.count(*a)));
        ranked
    }
}
