use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use pilecall::genomics::{EncodedBinReader, FaidxReference, ThresholdPolicy};
use pilecall::pipeline::{
    run_discovery, run_genotyping, DiscoveryConfig, GenotypeConfig, RegionSpec, SamtoolsPileup,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pilecall", about = "Variant discovery and population genotyping from pileups")]
struct Cli {
    /// Log debug messages (RUST_LOG takes precedence).
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Indexed reference genome (FASTA with .fai); chromosomes are named by number.
    #[arg(long)]
    reference: PathBuf,
    /// Sample table: header line, then `name<TAB>coverage<TAB>bam...`.
    #[arg(long)]
    samples: PathBuf,
    /// Region as `chrom` or `chrom:start,end` (inclusive end).
    #[arg(long)]
    region: RegionSpec,
    /// Output directory.
    #[arg(long)]
    out: PathBuf,
    /// samtools executable.
    #[arg(long, default_value = "samtools")]
    samtools: PathBuf,
    /// Samples processed concurrently (defaults to available cores).
    #[arg(long)]
    threads: Option<usize>,
    /// Fail the run if any sample fails.
    #[arg(long)]
    strict: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Discover candidate variants per sample into encoded bin files.
    Discover {
        #[command(flatten)]
        common: CommonArgs,
        /// Minimum mapping quality.
        #[arg(long, default_value_t = pilecall::pipeline::DEFAULT_MAPPING_QUALITY)]
        mapping_quality: u8,
        /// Minimum base quality.
        #[arg(long, default_value_t = pilecall::pipeline::DEFAULT_BASE_QUALITY)]
        base_quality: u8,
        /// Minimum depth count.
        #[arg(long, default_value_t = 2)]
        min_depth: u32,
        /// Minimum depth ratio to the sample coverage.
        #[arg(long, default_value_t = 0.2)]
        min_depth_ratio: f64,
        /// Maximum depth ratio to the sample coverage.
        #[arg(long, default_value_t = 3.0)]
        max_depth_ratio: f64,
        /// Homozygous ratio.
        #[arg(long, default_value_t = 0.8)]
        homozygous_ratio: f64,
        /// Heterozygous ratio.
        #[arg(long, default_value_t = 0.4)]
        heterozygous_ratio: f64,
        /// Third-allele depth ratio.
        #[arg(long, default_value_t = 0.2)]
        third_allele_ratio: f64,
        /// Maximum distinct indel types at a site.
        #[arg(long, default_value_t = 1)]
        max_indel_types: usize,
        /// Bin width in bases.
        #[arg(long, default_value_t = pilecall::genomics::DEFAULT_BIN_WIDTH)]
        bin_width: u32,
    },
    /// Genotype every sample at the variation library sites and write a VCF.
    Genotype {
        #[command(flatten)]
        common: CommonArgs,
        /// Variation library (`chrom<TAB>pos<TAB>alt[,alt]`, optionally gzipped).
        #[arg(long)]
        library: PathBuf,
        /// Combined sequencing and alignment error rate.
        #[arg(long, default_value_t = pilecall::genomics::DEFAULT_ERROR_RATE)]
        error_rate: f64,
        /// Value of the ##fileDate header line.
        #[arg(long)]
        file_date: Option<String>,
        /// Keep the per-sample genotype files.
        #[arg(long)]
        keep_intermediates: bool,
    },
    /// Print the records of an encoded discovery bin file.
    Inspect {
        /// `.ing.gz` file written by `discover`.
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Discover {
            common,
            mapping_quality,
            base_quality,
            min_depth,
            min_depth_ratio,
            max_depth_ratio,
            homozygous_ratio,
            heterozygous_ratio,
            third_allele_ratio,
            max_indel_types,
            bin_width,
        } => {
            let thresholds = ThresholdPolicy {
                min_depth,
                min_depth_ratio,
                max_depth_ratio,
                homozygous_ratio,
                heterozygous_ratio,
                third_allele_ratio,
                max_indel_types,
            };
            let mut config =
                DiscoveryConfig::new(&common.reference, &common.samples, common.region, &common.out)
                    .with_samtools(&common.samtools)
                    .with_qualities(mapping_quality, base_quality)
                    .with_thresholds(thresholds)
                    .with_bin_width(bin_width)
                    .with_strict(common.strict);
            if let Some(threads) = common.threads {
                config = config.with_threads(threads);
            }
            run_discover(config)?
        }
        Commands::Genotype {
            common,
            library,
            error_rate,
            file_date,
            keep_intermediates,
        } => {
            let mut config = GenotypeConfig::new(
                &common.reference,
                &common.samples,
                library,
                common.region,
                &common.out,
            )
            .with_samtools(&common.samtools)
            .with_error_rate(error_rate)
            .with_strict(common.strict)
            .with_keep_intermediates(keep_intermediates);
            if let Some(threads) = common.threads {
                config = config.with_threads(threads);
            }
            if let Some(date) = file_date {
                config = config.with_file_date(date);
            }
            run_genotype(config)?
        }
        Commands::Inspect { file } => run_inspect(file)?,
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run_discover(config: DiscoveryConfig) -> Result<()> {
    let reference = FaidxReference::open(&config.reference).with_context(|| {
        format!("failed to open reference {}", config.reference.display())
    })?;
    let pileup = SamtoolsPileup::new(&config.samtools, &config.reference)
        .with_qualities(config.mapping_quality, config.base_quality);
    let report =
        run_discovery(&config, &reference, &pileup).context("variant discovery failed")?;

    let accepted: u64 = report
        .tasks
        .outcomes
        .iter()
        .filter_map(|o| o.result.as_ref().ok())
        .map(|s| s.accepted)
        .sum();
    info!(
        samples = report.tasks.outcomes.len(),
        failed = report.tasks.failed(),
        accepted,
        "discovery finished"
    );
    if report.tasks.failed() > 0 {
        warn!(
            "discovery failed for samples: {}",
            report.tasks.failed_samples().join(", ")
        );
    }
    Ok(())
}

fn run_genotype(config: GenotypeConfig) -> Result<()> {
    let reference = FaidxReference::open(&config.reference).with_context(|| {
        format!("failed to open reference {}", config.reference.display())
    })?;
    let pileup = SamtoolsPileup::new(&config.samtools, &config.reference);
    let report = run_genotyping(&config, &reference, &pileup).context("genotyping failed")?;

    info!(
        sites = report.sites,
        samples = report.assembly.samples,
        failed = report.tasks.failed(),
        vcf = %report.vcf.display(),
        "genotyping finished"
    );
    Ok(())
}

fn run_inspect(path: PathBuf) -> Result<()> {
    let reader = EncodedBinReader::open(&path)
        .with_context(|| format!("failed to open bin file {}", path.display()))?;
    let header = reader.header().clone();
    println!(
        "# sample={}\tchrom={}\tstart={}\tend={}",
        header.sample, header.chrom, header.start, header.end
    );
    for record in reader {
        let record = record.with_context(|| format!("corrupt record in {}", path.display()))?;
        println!(
            "{}\t{}\t{}\t{}",
            header.chrom,
            record.position(header.start),
            record.allele,
            record.indel_length
        );
    }
    Ok(())
}
