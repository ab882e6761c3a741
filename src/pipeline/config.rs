//! Run configuration for discovery and genotyping.
//!
//! Both configs are plain structs with defaults, consuming `with_*` builders
//! and a [`validate`](DiscoveryConfig::validate) step run before any task is
//! spawned.

use std::ops::Range;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::genomics::{
    BinError, LibraryError, LikelihoodError, ReferenceError, ReferenceGenome, ThresholdError,
    ThresholdPolicy, DEFAULT_BIN_WIDTH, DEFAULT_ERROR_RATE, DEFAULT_MAX_FACTORIAL,
};

/// Default mapping-quality floor passed to the pileup generator during discovery.
pub const DEFAULT_MAPPING_QUALITY: u8 = 30;
/// Default base-quality floor passed to the pileup generator during discovery.
pub const DEFAULT_BASE_QUALITY: u8 = 20;

/// Problems detected before fan-out.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Region string could not be parsed.
    #[error("invalid region '{0}': expected <chrom> or <chrom>:<start>,<end>")]
    InvalidRegion(String),
    /// Region bounds are inverted or start at zero.
    #[error("invalid region bounds {start}..={end}")]
    InvalidBounds {
        /// First position.
        start: u32,
        /// Last position (inclusive).
        end: u32,
    },
    /// Chromosome is absent from the reference.
    #[error("chromosome {0} not found in reference")]
    UnknownChromosome(u16),
    /// Library and region name different chromosomes.
    #[error("variation library is on chromosome {library}, region is on {region}")]
    ChromosomeMismatch {
        /// Chromosome of the library.
        library: u16,
        /// Chromosome of the requested region.
        region: u16,
    },
    /// No library site falls inside the region.
    #[error("no variation library site inside {start}..{end}")]
    EmptyLibraryRegion {
        /// Region start.
        start: u32,
        /// Region end (exclusive).
        end: u32,
    },
    /// A library site lies past the end of the reference sequence.
    #[error("library position {0} is outside the reference sequence")]
    SiteOutsideReference(u32),
    /// Malformed sample table row.
    #[error("sample table line {line}: {reason}")]
    SampleTable {
        /// 1-based line number.
        line: usize,
        /// Description of the problem.
        reason: String,
    },
    /// Sample table has no samples.
    #[error("sample table lists no samples")]
    NoSamples,
    /// Same sample name listed twice.
    #[error("sample '{0}' is listed more than once")]
    DuplicateSample(String),
    /// Zero worker threads requested.
    #[error("thread count must be > 0")]
    InvalidThreads,
    /// Threshold policy is inconsistent.
    #[error(transparent)]
    Threshold(#[from] ThresholdError),
    /// Engine parameters are invalid.
    #[error(transparent)]
    Likelihood(#[from] LikelihoodError),
    /// Bin width is invalid.
    #[error(transparent)]
    Bins(#[from] BinError),
    /// Library could not be loaded.
    #[error("variation library: {0}")]
    Library(#[from] LibraryError),
    /// Reference could not be opened.
    #[error("reference genome: {0}")]
    Reference(#[from] ReferenceError),
    /// Sample table could not be read.
    #[error("sample table: {0}")]
    Io(#[from] std::io::Error),
}

/// `chrom` or `chrom:start,end` with an inclusive end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RegionSpec {
    /// Numeric chromosome id.
    pub chrom: u16,
    /// Inclusive `(start, end)`; `None` covers the whole chromosome.
    pub bounds: Option<(u32, u32)>,
}

impl RegionSpec {
    /// Whole-chromosome region.
    pub fn chromosome(chrom: u16) -> Self {
        Self {
            chrom,
            bounds: None,
        }
    }

    /// Half-open `[start, end)` range on `reference`.
    pub fn resolve<G: ReferenceGenome + ?Sized>(
        &self,
        reference: &G,
    ) -> Result<Range<u32>, ConfigError> {
        let index = reference
            .index_of(&self.chrom.to_string())
            .ok_or(ConfigError::UnknownChromosome(self.chrom))?;
        match self.bounds {
            Some((start, end)) => Ok(start..end + 1),
            None => {
                let length = reference
                    .length(index)
                    .ok_or(ConfigError::UnknownChromosome(self.chrom))?;
                Ok(1..length + 1)
            }
        }
    }
}

impl FromStr for RegionSpec {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidRegion(s.to_string());
        let (chrom, bounds) = match s.split_once(':') {
            None => (s, None),
            Some((chrom, range)) => {
                let (start, end) = range.split_once(',').ok_or_else(invalid)?;
                let start: u32 = start.trim().parse().map_err(|_| invalid())?;
                let end: u32 = end.trim().parse().map_err(|_| invalid())?;
                (chrom, Some((start, end)))
            }
        };
        let chrom = chrom.trim().parse().map_err(|_| invalid())?;
        if let Some((start, end)) = bounds {
            if start == 0 || end < start || end == u32::MAX {
                return Err(ConfigError::InvalidBounds { start, end });
            }
        }
        Ok(Self { chrom, bounds })
    }
}

fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn check_threads(threads: usize) -> Result<(), ConfigError> {
    if threads == 0 {
        return Err(ConfigError::InvalidThreads);
    }
    Ok(())
}

/// Settings of a variant-discovery run.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Indexed FASTA reference.
    pub reference: PathBuf,
    /// Sample table.
    pub samples: PathBuf,
    /// Output directory; one sub-directory per sample is created.
    pub output_dir: PathBuf,
    /// Region to scan.
    pub region: RegionSpec,
    /// `samtools` executable.
    pub samtools: PathBuf,
    /// Minimum mapping quality for the pileup generator.
    pub mapping_quality: u8,
    /// Minimum base quality for the pileup generator.
    pub base_quality: u8,
    /// Site-level discovery thresholds.
    pub thresholds: ThresholdPolicy,
    /// Width of output bins.
    pub bin_width: u32,
    /// Worker threads (samples processed concurrently).
    pub threads: usize,
    /// Fail the run when any sample fails.
    pub strict: bool,
}

impl DiscoveryConfig {
    /// Config with default thresholds and quality floors.
    pub fn new(
        reference: impl Into<PathBuf>,
        samples: impl Into<PathBuf>,
        region: RegionSpec,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            reference: reference.into(),
            samples: samples.into(),
            output_dir: output_dir.into(),
            region,
            samtools: PathBuf::from("samtools"),
            mapping_quality: DEFAULT_MAPPING_QUALITY,
            base_quality: DEFAULT_BASE_QUALITY,
            thresholds: ThresholdPolicy::default(),
            bin_width: DEFAULT_BIN_WIDTH,
            threads: default_threads(),
            strict: false,
        }
    }

    /// Use a different `samtools` executable.
    pub fn with_samtools(mut self, samtools: impl Into<PathBuf>) -> Self {
        self.samtools = samtools.into();
        self
    }

    /// Override the pileup quality floors.
    pub fn with_qualities(mut self, mapping_quality: u8, base_quality: u8) -> Self {
        self.mapping_quality = mapping_quality;
        self.base_quality = base_quality;
        self
    }

    /// Override the discovery thresholds.
    pub fn with_thresholds(mut self, thresholds: ThresholdPolicy) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Override the bin width.
    pub fn with_bin_width(mut self, bin_width: u32) -> Self {
        self.bin_width = bin_width;
        self
    }

    /// Override the worker count.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Toggle strict mode.
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Reject inconsistent settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.thresholds.validate()?;
        check_threads(self.threads)?;
        if self.bin_width == 0 || self.bin_width > crate::genomics::codec::MAX_BIN_WIDTH {
            return Err(BinError::InvalidWidth(self.bin_width).into());
        }
        Ok(())
    }
}

/// Settings of a genotyping run.
#[derive(Debug, Clone)]
pub struct GenotypeConfig {
    /// Indexed FASTA reference.
    pub reference: PathBuf,
    /// Sample table.
    pub samples: PathBuf,
    /// Variation library file.
    pub library: PathBuf,
    /// Output directory.
    pub output_dir: PathBuf,
    /// Region to genotype.
    pub region: RegionSpec,
    /// `samtools` executable.
    pub samtools: PathBuf,
    /// Combined sequencing and alignment error rate.
    pub error_rate: f64,
    /// Depth above which allele counts are rescaled.
    pub max_factorial: u32,
    /// Worker threads (samples processed concurrently).
    pub threads: usize,
    /// Fail on failed samples or short intermediates instead of padding with `./.`.
    pub strict: bool,
    /// Value of the `##fileDate` header line, omitted when `None`.
    pub file_date: Option<String>,
    /// Keep per-sample intermediates after assembly.
    pub keep_intermediates: bool,
}

impl GenotypeConfig {
    /// Config with the default error rate and factorial cap.
    pub fn new(
        reference: impl Into<PathBuf>,
        samples: impl Into<PathBuf>,
        library: impl Into<PathBuf>,
        region: RegionSpec,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            reference: reference.into(),
            samples: samples.into(),
            library: library.into(),
            output_dir: output_dir.into(),
            region,
            samtools: PathBuf::from("samtools"),
            error_rate: DEFAULT_ERROR_RATE,
            max_factorial: DEFAULT_MAX_FACTORIAL,
            threads: default_threads(),
            strict: false,
            file_date: None,
            keep_intermediates: false,
        }
    }

    /// Use a different `samtools` executable.
    pub fn with_samtools(mut self, samtools: impl Into<PathBuf>) -> Self {
        self.samtools = samtools.into();
        self
    }

    /// Override the combined error rate.
    pub fn with_error_rate(mut self, error_rate: f64) -> Self {
        self.error_rate = error_rate;
        self
    }

    /// Override the factorial cap.
    pub fn with_max_factorial(mut self, max_factorial: u32) -> Self {
        self.max_factorial = max_factorial;
        self
    }

    /// Override the worker count.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Toggle strict mode.
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Set the `##fileDate` header value.
    pub fn with_file_date(mut self, date: impl Into<String>) -> Self {
        self.file_date = Some(date.into());
        self
    }

    /// Keep the per-sample genotype files after the final VCF is written.
    pub fn with_keep_intermediates(mut self, keep: bool) -> Self {
        self.keep_intermediates = keep;
        self
    }

    /// Reject inconsistent settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_threads(self.threads)?;
        if !(self.error_rate > 0.0 && self.error_rate < 1.0) {
            return Err(LikelihoodError::InvalidErrorRate(self.error_rate).into());
        }
        if self.max_factorial == 0 {
            return Err(LikelihoodError::InvalidCap.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genomics::InMemoryReference;

    fn reference() -> InMemoryReference {
        let mut reference = InMemoryReference::new();
        reference.push("1", "ACGTACGTAC");
        reference
    }

    #[test]
    fn parses_region_forms() {
        assert_eq!(
            "3".parse::<RegionSpec>().unwrap(),
            RegionSpec::chromosome(3)
        );
        assert_eq!(
            "1:100,200".parse::<RegionSpec>().unwrap(),
            RegionSpec {
                chrom: 1,
                bounds: Some((100, 200))
            }
        );
        assert!("chr1".parse::<RegionSpec>().is_err());
        assert!("1:100-200".parse::<RegionSpec>().is_err());
        assert!(matches!(
            "1:200,100".parse::<RegionSpec>(),
            Err(ConfigError::InvalidBounds { .. })
        ));
    }

    #[test]
    fn resolves_against_reference() {
        let reference = reference();
        assert_eq!(RegionSpec::chromosome(1).resolve(&reference).unwrap(), 1..11);
        let region: RegionSpec = "1:3,5".parse().unwrap();
        assert_eq!(region.resolve(&reference).unwrap(), 3..6);
        assert!(matches!(
            RegionSpec::chromosome(2).resolve(&reference),
            Err(ConfigError::UnknownChromosome(2))
        ));
    }

    #[test]
    fn validation_catches_bad_settings() {
        let region = RegionSpec::chromosome(1);
        let config = DiscoveryConfig::new("ref.fa", "samples.txt", region, "out");
        assert!(config.clone().validate().is_ok());
        assert!(config.clone().with_threads(0).validate().is_err());
        assert!(config.with_bin_width(0).validate().is_err());

        let genotype = GenotypeConfig::new("ref.fa", "samples.txt", "lib.txt", region, "out");
        assert!(genotype.clone().validate().is_ok());
        assert!(genotype.clone().with_error_rate(1.0).validate().is_err());
        assert!(genotype.with_max_factorial(0).validate().is_err());
    }
}
