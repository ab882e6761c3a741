//! Genomics primitives shared by the discovery and genotyping pipelines.
//!
//! Leaf components (pileup parsing, allele tallies, region bins, the variant
//! codec, the variation library and the factorial table) sit underneath the
//! filter, likelihood and merge-join engines driven by [`crate::pipeline`].

mod types;
mod pileup;
mod filter;
mod bins;
pub mod codec;
mod binfile;
mod library;
mod likelihood;
mod reference;
mod merge_join;
mod vcf;

pub use types::{AlleleClass, AlleleParseError, SiteAllele, NUM_ALLELE_CLASSES};
pub use pileup::{
    parse_position, AlleleTally, BaseCall, BaseCallScanner, PileupFormatError, PileupRecord,
};
pub use filter::{FilterOutcome, RejectReason, ThresholdError, ThresholdPolicy};
pub use bins::{BinError, RegionBinner, DEFAULT_BIN_WIDTH};
pub use codec::{CodecError, CodedVariant, SENTINEL};
pub use binfile::{BinFileError, BinHeader, EncodedBinReader, EncodedBinWriter, BIN_FILE_EXTENSION};
pub use library::{LibraryError, LibrarySite, VariationLibrary};
pub use likelihood::{
    genotype_index, FactorialTable, GenotypeCall, GenotypeLikelihoodEngine, LikelihoodError,
    SampleGenotypeCall, DEFAULT_ERROR_RATE, DEFAULT_MAX_FACTORIAL,
};
pub use reference::{FaidxReference, InMemoryReference, ReferenceError, ReferenceGenome};
pub use merge_join::{count_allele_depths, MergeJoinError, MergeJoinSummary, StreamMergeJoin};
pub use vcf::{write_header, write_row, SiteRow, SiteStats};
