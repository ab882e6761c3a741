//! Position-sorted variation library used as the genotyping target set.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::ops::Range;
use std::path::Path;

use flate2::read::MultiGzDecoder;
use thiserror::Error;

use crate::genomics::SiteAllele;

/// Errors loading a variation library.
#[derive(Debug, Error)]
pub enum LibraryError {
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// A row could not be parsed.
    #[error("line {line}: {reason}")]
    Malformed {
        /// 1-based line number.
        line: usize,
        /// Description of the problem.
        reason: String,
    },
    /// Positions are not strictly ascending.
    #[error("line {line}: position {position} does not follow {previous}")]
    Unsorted {
        /// 1-based line number.
        line: usize,
        /// Offending position.
        position: u32,
        /// Position of the previous row.
        previous: u32,
    },
    /// Rows belong to more than one chromosome.
    #[error("line {line}: chromosome {found} differs from {expected}")]
    MixedChromosomes {
        /// 1-based line number.
        line: usize,
        /// Chromosome of the first row.
        expected: u16,
        /// Chromosome of the offending row.
        found: u16,
    },
    /// File has no sites.
    #[error("variation library is empty")]
    Empty,
}

/// One library site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibrarySite {
    /// 1-based position.
    pub position: u32,
    /// Alternate alleles in file order.
    pub alternates: Vec<SiteAllele>,
}

/// Immutable, strictly ascending table of known sites on one chromosome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariationLibrary {
    chrom: u16,
    positions: Vec<u32>,
    alternates: Vec<Vec<SiteAllele>>,
}

impl VariationLibrary {
    /// Build a library from already sorted sites.
    pub fn from_sites(
        chrom: u16,
        sites: impl IntoIterator<Item = LibrarySite>,
    ) -> Result<Self, LibraryError> {
        let mut positions = Vec::new();
        let mut alternates = Vec::new();
        for (idx, site) in sites.into_iter().enumerate() {
            if let Some(&previous) = positions.last() {
                if site.position <= previous {
                    return Err(LibraryError::Unsorted {
                        line: idx + 1,
                        position: site.position,
                        previous,
                    });
                }
            }
            if site.alternates.is_empty() {
                return Err(LibraryError::Malformed {
                    line: idx + 1,
                    reason: format!("site {} has no alternate allele", site.position),
                });
            }
            positions.push(site.position);
            alternates.push(site.alternates);
        }
        if positions.is_empty() {
            return Err(LibraryError::Empty);
        }
        Ok(Self {
            chrom,
            positions,
            alternates,
        })
    }

    /// Load a library file; `.gz` paths are decompressed transparently.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, LibraryError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        if path.extension().is_some_and(|ext| ext == "gz") {
            Self::from_reader(BufReader::new(MultiGzDecoder::new(file)))
        } else {
            Self::from_reader(BufReader::new(file))
        }
    }

    /// Parse `chrom \t position \t alt[,alt...]` rows; `#` lines are ignored.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, LibraryError> {
        let mut chrom = None;
        let mut sites = Vec::new();
        let mut previous: Option<u32> = None;

        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let line_no = idx + 1;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let malformed = |reason: String| LibraryError::Malformed {
                line: line_no,
                reason,
            };

            let mut fields = trimmed.split('\t');
            let (Some(chrom_field), Some(pos_field), Some(alt_field)) =
                (fields.next(), fields.next(), fields.next())
            else {
                return Err(malformed("expected chrom, position and alleles".to_string()));
            };
            let row_chrom: u16 = chrom_field
                .parse()
                .map_err(|_| malformed(format!("invalid chromosome '{chrom_field}'")))?;
            let position: u32 = pos_field
                .parse()
                .ok()
                .filter(|&p| p > 0)
                .ok_or_else(|| malformed(format!("invalid position '{pos_field}'")))?;
            let alternates = alt_field
                .split(',')
                .map(|token| token.parse::<SiteAllele>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| malformed(err.to_string()))?;

            match chrom {
                None => chrom = Some(row_chrom),
                Some(expected) if expected != row_chrom => {
                    return Err(LibraryError::MixedChromosomes {
                        line: line_no,
                        expected,
                        found: row_chrom,
                    });
                }
                Some(_) => {}
            }
            if let Some(prev) = previous {
                if position <= prev {
                    return Err(LibraryError::Unsorted {
                        line: line_no,
                        position,
                        previous: prev,
                    });
                }
            }
            previous = Some(position);
            sites.push(LibrarySite {
                position,
                alternates,
            });
        }

        let chrom = chrom.ok_or(LibraryError::Empty)?;
        Self::from_sites(chrom, sites)
    }

    /// Chromosome id of every site.
    pub fn chrom(&self) -> u16 {
        self.chrom
    }

    /// Number of sites.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Whether the library has no sites.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Ascending site positions.
    pub fn positions(&self) -> &[u32] {
        &self.positions
    }

    /// Position of site `index`.
    pub fn position(&self, index: usize) -> u32 {
        self.positions[index]
    }

    /// Alternate alleles of site `index`.
    pub fn alternates(&self, index: usize) -> &[SiteAllele] {
        &self.alternates[index]
    }

    /// Index range of the sites inside `[start, end)`.
    pub fn index_range(&self, region: Range<u32>) -> Range<usize> {
        let lo = self.positions.partition_point(|&p| p < region.start);
        let hi = self.positions.partition_point(|&p| p < region.end);
        lo..hi.max(lo)
    }

    /// Sub-library restricted to `[start, end)`; `None` when no site falls inside.
    pub fn restrict(&self, region: Range<u32>) -> Option<Self> {
        let range = self.index_range(region);
        if range.is_empty() {
            return None;
        }
        Some(Self {
            chrom: self.chrom,
            positions: self.positions[range.clone()].to_vec(),
            alternates: self.alternates[range].to_vec(),
        })
    }

    /// Write the `chrom \t position` list consumed by `samtools mpileup -l`.
    pub fn write_positions<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for position in &self.positions {
            writeln!(out, "{}\t{}", self.chrom, position)?;
        }
        out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genomics::AlleleClass;

    const LIBRARY: &str = "#chrom\tpos\talts\n1\t102\tT\n1\t150\tG,D2\n1\t230\tI1\n";

    #[test]
    fn parses_sites() {
        let library = VariationLibrary::from_reader(LIBRARY.as_bytes()).unwrap();
        assert_eq!(library.chrom(), 1);
        assert_eq!(library.positions(), &[102, 150, 230]);
        assert_eq!(
            library.alternates(1),
            &[
                SiteAllele::snp(AlleleClass::G),
                SiteAllele::indel(AlleleClass::Deletion, 2)
            ]
        );
    }

    #[test]
    fn restricts_to_region() {
        let library = VariationLibrary::from_reader(LIBRARY.as_bytes()).unwrap();
        assert_eq!(library.index_range(100..151), 0..2);
        assert_eq!(library.index_range(151..230), 2..2);
        let sub = library.restrict(150..1_000).unwrap();
        assert_eq!(sub.positions(), &[150, 230]);
        assert!(library.restrict(1..100).is_none());
    }

    #[test]
    fn rejects_unsorted_and_mixed_rows() {
        let unsorted = "1\t10\tA\n1\t10\tC\n";
        assert!(matches!(
            VariationLibrary::from_reader(unsorted.as_bytes()),
            Err(LibraryError::Unsorted { line: 2, .. })
        ));
        let mixed = "1\t10\tA\n2\t20\tC\n";
        assert!(matches!(
            VariationLibrary::from_reader(mixed.as_bytes()),
            Err(LibraryError::MixedChromosomes { expected: 1, found: 2, .. })
        ));
        assert!(matches!(
            VariationLibrary::from_reader("1\t10\tX\n".as_bytes()),
            Err(LibraryError::Malformed { line: 1, .. })
        ));
        assert!(matches!(
            VariationLibrary::from_reader("# nothing\n".as_bytes()),
            Err(LibraryError::Empty)
        ));
    }

    #[test]
    fn writes_position_list() {
        let library = VariationLibrary::from_reader(LIBRARY.as_bytes()).unwrap();
        let mut out = Vec::new();
        library.write_positions(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "1\t102\n1\t150\n1\t230\n");
    }
}
