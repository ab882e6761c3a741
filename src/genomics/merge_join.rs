//! Ordered merge of a sample's pileup stream against the variation library.

use std::io::{self, Write};

use thiserror::Error;
use tracing::warn;

use crate::genomics::{
    BaseCall, GenotypeCall, GenotypeLikelihoodEngine, PileupRecord, SiteAllele, VariationLibrary,
};

/// Errors that end a sample's merge-join.
#[derive(Debug, Error)]
pub enum MergeJoinError {
    /// The pileup emitted a position before an unconsumed library position.
    #[error("pileup position {pileup} precedes unconsumed library position {library}")]
    OrderingViolation {
        /// Library position still waiting for its record.
        library: u32,
        /// Offending pileup position.
        pileup: u32,
    },
    /// Reading the pileup or writing genotypes failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Counts of one finished merge-join.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MergeJoinSummary {
    /// Library sites emitted (always the library length on success).
    pub sites: usize,
    /// Sites with a called genotype.
    pub called: usize,
    /// Sites emitted as `./.`.
    pub missing: usize,
    /// Pileup lines skipped as unparseable.
    pub skipped_lines: usize,
}

/// Per-allele depths at a library site, reference first.
///
/// Indel alleles are matched by their `+`/`-` markers; every indel read also
/// shows a reference match for the anchor base, so indel counts are removed
/// from the reference depth.
pub fn count_allele_depths(record: &PileupRecord, alternates: &[SiteAllele]) -> Vec<u32> {
    let mut depths = vec![0u32; alternates.len() + 1];
    for call in record.base_calls() {
        let class = match call {
            BaseCall::Reference => {
                depths[0] += 1;
                continue;
            }
            BaseCall::Base(class) | BaseCall::Indel { class, .. } => class,
        };
        for (idx, alt) in alternates.iter().enumerate() {
            if alt.class == class {
                depths[idx + 1] += 1;
            }
        }
    }
    for (idx, alt) in alternates.iter().enumerate() {
        if alt.class.is_indel() {
            depths[0] = depths[0].saturating_sub(depths[idx + 1]);
        }
    }
    depths
}

/// Walks the library in order, consuming pileup records as their positions come up.
///
/// Yields exactly one [`GenotypeCall`] per library site.
#[derive(Debug)]
pub struct StreamMergeJoin<'a, I> {
    library: &'a VariationLibrary,
    engine: &'a GenotypeLikelihoodEngine,
    lines: I,
    current: Option<PileupRecord>,
    next_site: usize,
    summary: MergeJoinSummary,
    failed: bool,
}

impl<'a, I> StreamMergeJoin<'a, I>
where
    I: Iterator<Item = io::Result<String>>,
{
    /// Prepare a merge-join over `lines`.
    pub fn new(
        library: &'a VariationLibrary,
        engine: &'a GenotypeLikelihoodEngine,
        lines: I,
    ) -> Self {
        Self {
            library,
            engine,
            lines,
            current: None,
            next_site: 0,
            summary: MergeJoinSummary::default(),
            failed: false,
        }
    }

    /// Load the next parseable pileup record, or `None` at end of stream.
    fn advance(&mut self) -> Result<(), MergeJoinError> {
        self.current = None;
        for line in self.lines.by_ref() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            match PileupRecord::parse(&line) {
                Ok(record) => {
                    self.current = Some(record);
                    break;
                }
                Err(err) => {
                    self.summary.skipped_lines += 1;
                    warn!(error = %err, "skipping unparseable pileup line");
                }
            }
        }
        Ok(())
    }

    fn call_site(&mut self, index: usize) -> Result<GenotypeCall, MergeJoinError> {
        if index == 0 {
            self.advance()?;
        }
        let target = self.library.position(index);
        let Some(record) = self.current.as_ref() else {
            return Ok(GenotypeCall::Missing);
        };
        if record.position > target {
            return Ok(GenotypeCall::Missing);
        }
        if record.position < target {
            return Err(MergeJoinError::OrderingViolation {
                library: target,
                pileup: record.position,
            });
        }
        let depths = count_allele_depths(record, self.library.alternates(index));
        let call = self.engine.call(&depths);
        self.advance()?;
        Ok(call)
    }

    /// Counters accumulated so far.
    pub fn summary(&self) -> MergeJoinSummary {
        self.summary
    }

    /// Write one genotype line per library site to `out`.
    pub fn write_to<W: Write>(mut self, out: &mut W) -> Result<MergeJoinSummary, MergeJoinError> {
        while let Some(call) = self.next() {
            writeln!(out, "{}", call?)?;
        }
        out.flush()?;
        Ok(self.summary)
    }
}

impl<I> Iterator for StreamMergeJoin<'_, I>
where
    I: Iterator<Item = io::Result<String>>,
{
    type Item = Result<GenotypeCall, MergeJoinError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.next_site >= self.library.len() {
            return None;
        }
        let index = self.next_site;
        self.next_site += 1;
        match self.call_site(index) {
            Ok(call) => {
                self.summary.sites += 1;
                match call {
                    GenotypeCall::Missing => self.summary.missing += 1,
                    GenotypeCall::Called(_) => self.summary.called += 1,
                }
                Some(Ok(call))
            }
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genomics::{AlleleClass, FactorialTable, LibrarySite};

    fn engine() -> GenotypeLikelihoodEngine {
        GenotypeLikelihoodEngine::new(0.05, FactorialTable::new(150).unwrap()).unwrap()
    }

    fn library(positions: &[u32]) -> VariationLibrary {
        VariationLibrary::from_sites(
            1,
            positions.iter().map(|&position| LibrarySite {
                position,
                alternates: vec![SiteAllele::snp(AlleleClass::T)],
            }),
        )
        .unwrap()
    }

    fn lines(raw: &[&str]) -> impl Iterator<Item = io::Result<String>> {
        raw.iter()
            .map(|l| Ok(l.to_string()))
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[test]
    fn counts_reference_alternate_and_indel_depths() {
        let record = PileupRecord::parse("1\t10\tA\t6\t..+1C,T-2AAt\tIIIIII").unwrap();
        let alts = [
            SiteAllele::snp(AlleleClass::T),
            SiteAllele::indel(AlleleClass::Insertion, 1),
        ];
        assert_eq!(count_allele_depths(&record, &alts), vec![2, 2, 1]);

        let del = [SiteAllele::indel(AlleleClass::Deletion, 2)];
        assert_eq!(count_allele_depths(&record, &del), vec![2, 1]);
    }

    #[test]
    fn emits_one_line_per_library_site() {
        let library = library(&[5, 10, 15, 20]);
        let engine = engine();
        let pileup = lines(&[
            "1\t10\tA\t10\t.......TTT\tIIIIIIIIII",
            "1\t20\tA\t4\t....\tIIII",
        ]);
        let mut out = Vec::new();
        let summary = StreamMergeJoin::new(&library, &engine, pileup)
            .write_to(&mut out)
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        let rows: Vec<_> = text.lines().collect();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0], "./.");
        assert!(rows[1].starts_with("0/1:7,3:"));
        assert_eq!(rows[2], "./.");
        assert!(rows[3].starts_with("0/0:4,0:"));
        assert_eq!(summary.called, 2);
        assert_eq!(summary.missing, 2);
    }

    #[test]
    fn empty_pileup_is_all_missing() {
        let library = library(&[1, 2, 3]);
        let engine = engine();
        let calls: Vec<_> = StreamMergeJoin::new(&library, &engine, lines(&[]))
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(calls, vec![GenotypeCall::Missing; 3]);
    }

    #[test]
    fn unexpected_pileup_position_is_fatal() {
        let library = library(&[10, 20]);
        let engine = engine();
        let pileup = lines(&["1\t10\tA\t1\t.\tI", "1\t15\tA\t1\t.\tI"]);
        let results: Vec<_> = StreamMergeJoin::new(&library, &engine, pileup).collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(
            results[1],
            Err(MergeJoinError::OrderingViolation {
                library: 20,
                pileup: 15
            })
        ));
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let library = library(&[10]);
        let engine = engine();
        let pileup = lines(&["garbage", "1\t10\tA\t2\tTT\tII"]);
        let mut join = StreamMergeJoin::new(&library, &engine, pileup);
        let call = join.next().unwrap().unwrap();
        assert!(matches!(call, GenotypeCall::Called(ref c) if c.alleles == (1, 1)));
        assert_eq!(join.summary().skipped_lines, 1);
        assert!(join.next().is_none());
    }
}
