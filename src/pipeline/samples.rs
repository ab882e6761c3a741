//! Sample-to-alignment-files table.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::info;

use crate::pipeline::ConfigError;

/// One sample and the alignment files pooled into its pileup.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleEntry {
    /// Sample name, used for output file names and VCF columns.
    pub name: String,
    /// Expected sequencing coverage.
    pub coverage: f64,
    /// Alignment files, sorted.
    pub files: Vec<PathBuf>,
}

/// Samples of a run, sorted by name.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleTable {
    samples: Vec<SampleEntry>,
}

impl SampleTable {
    /// Build a table from entries; names must be unique.
    pub fn new(mut samples: Vec<SampleEntry>) -> Result<Self, ConfigError> {
        if samples.is_empty() {
            return Err(ConfigError::NoSamples);
        }
        let mut seen = HashSet::new();
        for sample in &samples {
            if !seen.insert(sample.name.as_str()) {
                return Err(ConfigError::DuplicateSample(sample.name.clone()));
            }
        }
        for sample in samples.iter_mut() {
            sample.files.sort();
        }
        samples.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(Self { samples })
    }

    /// Read a table file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let table = Self::from_reader(BufReader::new(File::open(path)?))?;
        let files: usize = table.samples.iter().map(|s| s.files.len()).sum();
        info!(
            path = %path.display(),
            samples = table.len(),
            files,
            "loaded sample table"
        );
        Ok(table)
    }

    /// Parse `name \t coverage \t file [\t file...]` rows after one header line.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, ConfigError> {
        let mut samples = Vec::new();
        for (idx, line) in reader.lines().enumerate().skip(1) {
            let line = line?;
            let line_no = idx + 1;
            if line.trim().is_empty() {
                continue;
            }
            let invalid = |reason: String| ConfigError::SampleTable {
                line: line_no,
                reason,
            };
            let fields: Vec<&str> = line.trim_end().split('\t').collect();
            if fields.len() < 3 {
                return Err(invalid(
                    "expected name, coverage and at least one alignment file".to_string(),
                ));
            }
            let coverage: f64 = fields[1]
                .parse()
                .ok()
                .filter(|c: &f64| *c > 0.0 && c.is_finite())
                .ok_or_else(|| invalid(format!("invalid coverage '{}'", fields[1])))?;
            samples.push(SampleEntry {
                name: fields[0].to_string(),
                coverage,
                files: fields[2..].iter().map(PathBuf::from).collect(),
            });
        }
        Self::new(samples)
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the table is empty (never true for a constructed table).
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples in name order.
    pub fn samples(&self) -> &[SampleEntry] {
        &self.samples
    }

    /// Sample names in name order.
    pub fn names(&self) -> Vec<String> {
        self.samples.iter().map(|s| s.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorts_samples_and_files() {
        let text = "Taxa\tCoverage\tBams\nzeta\t5.5\tb.bam\ta.bam\nalpha\t3\tx.bam\n";
        let table = SampleTable::from_reader(text.as_bytes()).unwrap();
        assert_eq!(table.names(), vec!["alpha".to_string(), "zeta".to_string()]);
        assert_eq!(
            table.samples()[1].files,
            vec![PathBuf::from("a.bam"), PathBuf::from("b.bam")]
        );
        assert_eq!(table.samples()[1].coverage, 5.5);
    }

    #[test]
    fn duplicate_names_are_fatal() {
        let text = "header\ns1\t3\ta.bam\ns1\t4\tb.bam\n";
        assert!(matches!(
            SampleTable::from_reader(text.as_bytes()),
            Err(ConfigError::DuplicateSample(name)) if name == "s1"
        ));
    }

    #[test]
    fn rejects_bad_rows() {
        assert!(matches!(
            SampleTable::from_reader("header\ns1\t3\n".as_bytes()),
            Err(ConfigError::SampleTable { line: 2, .. })
        ));
        assert!(matches!(
            SampleTable::from_reader("header\ns1\tzero\ta.bam\n".as_bytes()),
            Err(ConfigError::SampleTable { line: 2, .. })
        ));
        assert!(matches!(
            SampleTable::from_reader("header\n".as_bytes()),
            Err(ConfigError::NoSamples)
        ));
    }
}
