//! Discovery and genotyping runs built on the [`crate::genomics`] engines.
//!
//! A run loads its shared read-only tables once, fans out one task per sample
//! through the [`Coordinator`] and, for genotyping, assembles the per-sample
//! results into the final VCF.

mod config;
mod samples;
mod pileup_source;
mod coordinator;
mod discovery;
mod genotype;
mod assembler;

pub use config::{
    ConfigError, DiscoveryConfig, GenotypeConfig, RegionSpec, DEFAULT_BASE_QUALITY,
    DEFAULT_MAPPING_QUALITY,
};
pub use samples::{SampleEntry, SampleTable};
pub use pileup_source::{
    PileupProvider, PileupRequest, PileupSourceError, PileupStream, SamtoolsPileup, StaticPileup,
};
pub use coordinator::{Coordinator, CoordinatorReport, TaskOutcome};
pub use discovery::{
    run_discovery, DiscoveryError, DiscoveryReport, DiscoverySummary, DiscoveryWorker,
    DISCOVERY_PROGRESS_INTERVAL,
};
pub use genotype::{
    final_vcf_path, intermediate_path, position_list_path, run_genotyping, GenotypeReport,
    GenotypeWorker, GENOTYPE_PROGRESS_INTERVAL, INDIVIDUAL_DIR, MPILEUP_DIR, VCF_DIR,
};
pub use assembler::{
    remove_intermediates, AssemblyError, AssemblySummary, ResultAssembler, SampleInput,
};
