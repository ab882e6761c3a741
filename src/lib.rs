//! # pilecall
//!
//! Variant discovery and population genotyping from alignment pileups.
//!
//! ## Pipeline
//!
//! 1. **Discovery**: each sample's pileup is scanned site by site; sites that
//!    pass the [`ThresholdPolicy`](genomics::ThresholdPolicy) are packed into
//!    one `i32` each and streamed into gzip-compressed per-bin files.
//! 2. **Genotyping**: each sample's pileup at the positions of a
//!    [`VariationLibrary`](genomics::VariationLibrary) is merge-joined against
//!    the library and genotyped with a multinomial likelihood model.
//! 3. **Assembly**: the per-sample genotype files are read in lock-step and
//!    merged into a single multi-sample VCF.
//!
//! ## Usage Example
//!
//! ```ignore
//! use pilecall::genomics::FaidxReference;
//! use pilecall::pipeline::{run_genotyping, GenotypeConfig, SamtoolsPileup};
//!
//! let config = GenotypeConfig::new("ref.fa", "samples.txt", "lib.txt", "1".parse()?, "out");
//! let reference = FaidxReference::open(&config.reference)?;
//! let pileup = SamtoolsPileup::new(&config.samtools, &config.reference);
//! let report = run_genotyping(&config, &reference, &pileup)?;
//! println!("{} sites written to {}", report.sites, report.vcf.display());
//! ```

#![warn(missing_docs, missing_debug_implementations)]
#![allow(clippy::new_without_default)]

pub mod genomics; // Parsers, filters, codecs and likelihood engines
pub mod pipeline; // Per-sample workers, coordinator and assembler

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub use genomics::{
    GenotypeCall, GenotypeLikelihoodEngine, RegionBinner, ThresholdPolicy, VariationLibrary,
};
pub use pipeline::{
    run_discovery, run_genotyping, DiscoveryConfig, GenotypeConfig, RegionSpec,
};

/// Errors surfaced by discovery and genotyping runs.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Invalid configuration or input tables; fatal before fan-out.
    #[error("configuration error: {0}")]
    Configuration(#[from] pipeline::ConfigError),

    /// A directory or output file could not be created.
    #[error("cannot access {}: {source}", path.display())]
    Resource {
        /// Offending path.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },

    /// A sample's pileup disagreed with the library order.
    #[error(transparent)]
    MergeJoin(#[from] genomics::MergeJoinError),

    /// A sample's discovery pass failed.
    #[error(transparent)]
    Discovery(#[from] pipeline::DiscoveryError),

    /// An encoded bin file could not be written or read.
    #[error(transparent)]
    BinFile(#[from] genomics::BinFileError),

    /// The pileup generator failed.
    #[error("external process error: {0}")]
    ExternalProcess(#[from] pipeline::PileupSourceError),

    /// Intermediate genotype files could not be assembled.
    #[error(transparent)]
    Assembly(#[from] pipeline::AssemblyError),

    /// A sample task panicked.
    #[error("task for sample {sample} panicked: {message}")]
    TaskPanicked {
        /// Sample of the task.
        sample: String,
        /// Panic payload.
        message: String,
    },

    /// Strict mode: some sample tasks failed.
    #[error("{failed} of {total} sample tasks failed")]
    FailedTasks {
        /// Failed tasks.
        failed: usize,
        /// All tasks.
        total: usize,
    },

    /// The worker pool could not be built.
    #[error("thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// Other I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_errors_roll_up() {
        let err: PipelineError = pipeline::ConfigError::NoSamples.into();
        assert!(err.to_string().starts_with("configuration error"));

        let err: PipelineError = genomics::MergeJoinError::OrderingViolation {
            library: 20,
            pileup: 15,
        }
        .into();
        assert!(matches!(err, PipelineError::MergeJoin(_)));
    }
}
