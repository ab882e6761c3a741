//! Variant discovery: pileup lines in, per-bin encoded files out.

use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::ops::Range;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::genomics::{
    codec, AlleleTally, BinHeader, EncodedBinWriter, FilterOutcome, PileupRecord, ReferenceGenome,
    RegionBinner, ThresholdPolicy,
};
use crate::pipeline::{
    Coordinator, CoordinatorReport, DiscoveryConfig, PileupProvider, PileupRequest, SampleEntry,
    SampleTable,
};
use crate::PipelineError;

/// Samples between discovery progress messages.
pub const DISCOVERY_PROGRESS_INTERVAL: usize = 50;

/// Discovery-specific failures of one sample.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Pileup positions went backwards.
    #[error("pileup position {position} does not follow {previous}")]
    NonAscending {
        /// Last accepted position.
        previous: u32,
        /// Offending position.
        position: u32,
    },
}

/// Counters of one sample's discovery pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DiscoverySummary {
    /// Pileup lines read.
    pub lines: u64,
    /// Lines that could not be parsed.
    pub malformed: u64,
    /// Sites written as coded records.
    pub accepted: u64,
    /// Accepted sites dropped because they could not be placed or encoded.
    pub dropped: u64,
    /// Bin files written.
    pub bins: usize,
}

struct OpenBin {
    index: usize,
    writer: EncodedBinWriter<BufWriter<File>>,
}

/// Filters one sample's pileup and streams accepted sites into bin files.
pub struct DiscoveryWorker<'a> {
    sample: &'a SampleEntry,
    chrom: u16,
    binner: &'a RegionBinner,
    policy: &'a ThresholdPolicy,
    out_dir: PathBuf,
    tally: AlleleTally,
    open: Option<OpenBin>,
    last_position: Option<u32>,
    summary: DiscoverySummary,
}

impl std::fmt::Debug for DiscoveryWorker<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryWorker")
            .field("sample", &self.sample.name)
            .field("chrom", &self.chrom)
            .field("out_dir", &self.out_dir)
            .field("summary", &self.summary)
            .finish_non_exhaustive()
    }
}

impl<'a> DiscoveryWorker<'a> {
    /// Worker writing into `out_dir` (the sample's own directory).
    pub fn new(
        sample: &'a SampleEntry,
        chrom: u16,
        binner: &'a RegionBinner,
        policy: &'a ThresholdPolicy,
        out_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            sample,
            chrom,
            binner,
            policy,
            out_dir: out_dir.into(),
            tally: AlleleTally::new(),
            open: None,
            last_position: None,
            summary: DiscoverySummary::default(),
        }
    }

    /// Classify one pileup line and record it when it is a callable variant.
    pub fn process_line(&mut self, line: &str) -> Result<(), PipelineError> {
        self.summary.lines += 1;
        let record = match PileupRecord::parse(line) {
            Ok(record) => record,
            Err(err) => {
                self.summary.malformed += 1;
                debug!(sample = %self.sample.name, error = %err, "skipping pileup line");
                return Ok(());
            }
        };
        if self.policy.admits_depth(record.depth, self.sample.coverage).is_some() {
            return Ok(());
        }
        self.tally.reset();
        self.tally.tally_record(&record);
        let FilterOutcome::Accept {
            allele,
            indel_length,
        } = self.policy.evaluate(&self.tally, record.depth, self.sample.coverage)
        else {
            return Ok(());
        };

        if let Some(previous) = self.last_position {
            if record.position <= previous {
                return Err(DiscoveryError::NonAscending {
                    previous,
                    position: record.position,
                }
                .into());
            }
        }
        self.last_position = Some(record.position);

        let Some(index) = self.binner.locate(record.position) else {
            self.summary.dropped += 1;
            warn!(sample = %self.sample.name, position = record.position, "site outside region");
            return Ok(());
        };
        let Some(bin) = self.binner.bin(index) else {
            self.summary.dropped += 1;
            return Ok(());
        };
        match codec::encode(record.position - bin.start, allele, indel_length) {
            Ok(code) => {
                self.bin_for(index)?.write_record(code)?;
                self.summary.accepted += 1;
            }
            Err(err) => {
                self.summary.dropped += 1;
                warn!(sample = %self.sample.name, position = record.position, error = %err, "cannot encode site");
            }
        }
        Ok(())
    }

    /// Writer of bin `index`, opening it (and closing the previous one) on first use.
    fn bin_for(
        &mut self,
        index: usize,
    ) -> Result<&mut EncodedBinWriter<BufWriter<File>>, PipelineError> {
        if self.open.as_ref().map(|open| open.index) != Some(index) {
            self.close_bin()?;
            let bin = self.binner.bin(index).ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidInput, "bin index out of range")
            })?;
            let header = BinHeader {
                sample: self.sample.name.clone(),
                chrom: self.chrom,
                start: bin.start,
                end: bin.end,
            };
            let path = self.out_dir.join(header.file_name());
            let writer = EncodedBinWriter::create(&path, &header)?;
            self.open = Some(OpenBin { index, writer });
        }
        match self.open.as_mut() {
            Some(open) => Ok(&mut open.writer),
            None => Err(io::Error::new(io::ErrorKind::Other, "no open bin").into()),
        }
    }

    fn close_bin(&mut self) -> Result<(), PipelineError> {
        if let Some(open) = self.open.take() {
            let records = open.writer.records();
            open.writer.finish()?;
            self.summary.bins += 1;
            debug!(sample = %self.sample.name, bin = open.index, records, "closed bin");
        }
        Ok(())
    }

    /// Process every line of `lines`, then close the open bin.
    pub fn run<I>(mut self, lines: I) -> Result<DiscoverySummary, PipelineError>
    where
        I: IntoIterator<Item = io::Result<String>>,
    {
        for line in lines {
            self.process_line(&line?)?;
        }
        self.finish()
    }

    /// Close the open bin with its sentinel.
    pub fn finish(mut self) -> Result<DiscoverySummary, PipelineError> {
        self.close_bin()?;
        Ok(self.summary)
    }
}

/// Totals of a discovery run.
#[derive(Debug)]
pub struct DiscoveryReport {
    /// Region that was scanned.
    pub region: Range<u32>,
    /// Per-sample outcomes.
    pub tasks: CoordinatorReport<DiscoverySummary>,
}

fn create_dir(path: &Path) -> Result<(), PipelineError> {
    fs::create_dir_all(path).map_err(|source| PipelineError::Resource {
        path: path.to_path_buf(),
        source,
    })
}

/// Discover variants of every sample in the table.
pub fn run_discovery<G, P>(
    config: &DiscoveryConfig,
    reference: &G,
    provider: &P,
) -> Result<DiscoveryReport, PipelineError>
where
    G: ReferenceGenome + ?Sized,
    P: PileupProvider,
{
    config.validate()?;
    let region = config.region.resolve(reference)?;
    let binner = RegionBinner::new(region.start, region.end, config.bin_width)
        .map_err(crate::pipeline::ConfigError::from)?;
    let table = SampleTable::from_path(&config.samples)?;
    info!(
        chrom = config.region.chrom,
        start = region.start,
        end = region.end,
        bins = binner.len(),
        samples = table.len(),
        "starting variant discovery"
    );

    create_dir(&config.output_dir)?;
    for sample in table.samples() {
        create_dir(&config.output_dir.join(&sample.name))?;
    }

    let chrom = config.region.chrom;
    let coordinator = Coordinator::new(config.threads, "discovery")?
        .with_progress_interval(DISCOVERY_PROGRESS_INTERVAL);
    let tasks = coordinator.run(table.samples(), |sample| {
        let mut stream = provider.open(
            sample,
            PileupRequest::Region {
                chrom,
                region: &region,
            },
        )?;
        let worker = DiscoveryWorker::new(
            sample,
            chrom,
            &binner,
            &config.thresholds,
            config.output_dir.join(&sample.name),
        );
        let summary = worker.run(stream.by_ref())?;
        stream.finish()?;
        info!(
            sample = %sample.name,
            accepted = summary.accepted,
            bins = summary.bins,
            "discovery complete"
        );
        Ok(summary)
    });

    if config.strict && tasks.failed() > 0 {
        return Err(PipelineError::FailedTasks {
            failed: tasks.failed(),
            total: tasks.outcomes.len(),
        });
    }
    Ok(DiscoveryReport { region, tasks })
}
