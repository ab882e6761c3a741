//! Genotyping: every sample against the variation library, then assembly.

use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::ops::Range;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::genomics::{
    FactorialTable, GenotypeLikelihoodEngine, MergeJoinSummary, ReferenceGenome, StreamMergeJoin,
    VariationLibrary,
};
use crate::pipeline::{
    remove_intermediates, AssemblySummary, ConfigError, Coordinator, CoordinatorReport,
    GenotypeConfig, PileupProvider, PileupRequest, ResultAssembler, SampleInput, SampleTable,
};
use crate::PipelineError;

/// Samples between genotyping progress messages.
pub const GENOTYPE_PROGRESS_INTERVAL: usize = 10;
/// Working directory reserved for raw pileups.
pub const MPILEUP_DIR: &str = "mpileup";
/// Working directory of per-sample genotype files.
pub const INDIVIDUAL_DIR: &str = "indiVCF";
/// Directory of final VCFs.
pub const VCF_DIR: &str = "VCF";

/// `<dir>/<sample>.chr<NNN>.indi.vcf`
pub fn intermediate_path(dir: &Path, sample: &str, chrom: u16) -> PathBuf {
    dir.join(format!("{sample}.chr{chrom:03}.indi.vcf"))
}

/// `<out>/<chrom>_<start>_<end>.pos.txt`
pub fn position_list_path(out: &Path, chrom: u16, region: &Range<u32>) -> PathBuf {
    out.join(format!("{chrom}_{}_{}.pos.txt", region.start, region.end))
}

/// `<out>/VCF/chr<NNN>.vcf`
pub fn final_vcf_path(out: &Path, chrom: u16) -> PathBuf {
    out.join(VCF_DIR).join(format!("chr{chrom:03}.vcf"))
}

/// Writes one sample's genotype intermediate.
#[derive(Debug, Clone, Copy)]
pub struct GenotypeWorker<'a> {
    library: &'a VariationLibrary,
    engine: &'a GenotypeLikelihoodEngine,
    out_dir: &'a Path,
}

impl<'a> GenotypeWorker<'a> {
    /// Worker writing intermediates into `out_dir`.
    pub fn new(
        library: &'a VariationLibrary,
        engine: &'a GenotypeLikelihoodEngine,
        out_dir: &'a Path,
    ) -> Self {
        Self {
            library,
            engine,
            out_dir,
        }
    }

    /// Path of `sample`'s intermediate.
    pub fn output_path(&self, sample: &str) -> PathBuf {
        intermediate_path(self.out_dir, sample, self.library.chrom())
    }

    /// Genotype `sample` from its pileup `lines`.
    pub fn genotype<I>(&self, sample: &str, lines: I) -> Result<MergeJoinSummary, PipelineError>
    where
        I: Iterator<Item = io::Result<String>>,
    {
        let path = self.output_path(sample);
        let file = File::create(&path).map_err(|source| PipelineError::Resource {
            path: path.clone(),
            source,
        })?;
        let mut writer = BufWriter::new(file);
        let summary = StreamMergeJoin::new(self.library, self.engine, lines).write_to(&mut writer)?;
        Ok(summary)
    }
}

/// Totals of a genotyping run.
#[derive(Debug)]
pub struct GenotypeReport {
    /// Region that was genotyped.
    pub region: Range<u32>,
    /// Library sites inside the region.
    pub sites: usize,
    /// Final VCF.
    pub vcf: PathBuf,
    /// Per-sample outcomes.
    pub tasks: CoordinatorReport<MergeJoinSummary>,
    /// Assembly counters.
    pub assembly: AssemblySummary,
}

fn create_dir(path: &Path) -> Result<(), PipelineError> {
    fs::create_dir_all(path).map_err(|source| PipelineError::Resource {
        path: path.to_path_buf(),
        source,
    })
}

/// Genotype every sample at the library sites of the region and write the final VCF.
pub fn run_genotyping<G, P>(
    config: &GenotypeConfig,
    reference: &G,
    provider: &P,
) -> Result<GenotypeReport, PipelineError>
where
    G: ReferenceGenome + ?Sized,
    P: PileupProvider,
{
    config.validate()?;
    let chrom = config.region.chrom;
    let region = config.region.resolve(reference)?;
    let table = SampleTable::from_path(&config.samples)?;

    let library = VariationLibrary::from_path(&config.library).map_err(ConfigError::from)?;
    if library.chrom() != chrom {
        return Err(ConfigError::ChromosomeMismatch {
            library: library.chrom(),
            region: chrom,
        }
        .into());
    }
    let library = library
        .restrict(region.clone())
        .ok_or(ConfigError::EmptyLibraryRegion {
            start: region.start,
            end: region.end,
        })?;
    let chrom_index = reference
        .index_of(&chrom.to_string())
        .ok_or(ConfigError::UnknownChromosome(chrom))?;
    let reference_bases = library
        .positions()
        .iter()
        .map(|&position| {
            reference
                .base(chrom_index, position)
                .ok_or(ConfigError::SiteOutsideReference(position))
        })
        .collect::<Result<Vec<u8>, _>>()?;
    info!(
        chrom,
        start = region.start,
        end = region.end,
        sites = library.len(),
        samples = table.len(),
        "starting genotyping"
    );

    let output = config.output_dir.as_path();
    let working_dirs = [output.join(MPILEUP_DIR), output.join(INDIVIDUAL_DIR)];
    for dir in &working_dirs {
        create_dir(dir)?;
    }
    create_dir(&output.join(VCF_DIR))?;
    let positions = position_list_path(output, chrom, &region);
    let mut list = BufWriter::new(File::create(&positions).map_err(|source| {
        PipelineError::Resource {
            path: positions.clone(),
            source,
        }
    })?);
    library.write_positions(&mut list)?;
    drop(list);

    let factorials = FactorialTable::new(config.max_factorial).map_err(ConfigError::from)?;
    let engine =
        GenotypeLikelihoodEngine::new(config.error_rate, factorials).map_err(ConfigError::from)?;
    let worker = GenotypeWorker::new(&library, &engine, &working_dirs[1]);

    let coordinator = Coordinator::new(config.threads, "genotyping")?
        .with_progress_interval(GENOTYPE_PROGRESS_INTERVAL);
    let tasks = coordinator.run(table.samples(), |sample| {
        let mut stream = provider.open(
            sample,
            PileupRequest::Positions {
                chrom,
                positions: &positions,
            },
        )?;
        let summary = worker.genotype(&sample.name, stream.by_ref())?;
        stream.finish()?;
        info!(
            sample = %sample.name,
            called = summary.called,
            missing = summary.missing,
            "genotyping complete"
        );
        Ok(summary)
    });
    if config.strict && tasks.failed() > 0 {
        return Err(PipelineError::FailedTasks {
            failed: tasks.failed(),
            total: tasks.outcomes.len(),
        });
    }

    let inputs: Vec<SampleInput> = table
        .samples()
        .iter()
        .map(|sample| SampleInput {
            name: sample.name.clone(),
            path: worker.output_path(&sample.name),
        })
        .collect();
    let vcf = final_vcf_path(output, chrom);
    let assembly = ResultAssembler::new(&library, &reference_bases)
        .with_strict(config.strict)
        .with_file_date(config.file_date.as_deref())
        .assemble_to_path(&inputs, &vcf)?;
    if !config.keep_intermediates {
        remove_intermediates(&inputs, &working_dirs);
    }

    Ok(GenotypeReport {
        region,
        sites: library.len(),
        vcf,
        tasks,
        assembly,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genomics::{AlleleClass, LibrarySite, SiteAllele, DEFAULT_ERROR_RATE};
    use tempfile::tempdir;

    #[test]
    fn output_paths_follow_naming_scheme() {
        let out = Path::new("out");
        assert_eq!(
            intermediate_path(&out.join(INDIVIDUAL_DIR), "s1", 7),
            PathBuf::from("out/indiVCF/s1.chr007.indi.vcf")
        );
        assert_eq!(final_vcf_path(out, 12), PathBuf::from("out/VCF/chr012.vcf"));
        assert_eq!(
            position_list_path(out, 1, &(100..111)),
            PathBuf::from("out/1_100_111.pos.txt")
        );
    }

    #[test]
    fn worker_writes_one_line_per_site() {
        let dir = tempdir().unwrap();
        let library = VariationLibrary::from_sites(
            1,
            [102, 105].into_iter().map(|position| LibrarySite {
                position,
                alternates: vec![SiteAllele::snp(AlleleClass::T)],
            }),
        )
        .unwrap();
        let engine =
            GenotypeLikelihoodEngine::new(DEFAULT_ERROR_RATE, FactorialTable::new(150).unwrap())
                .unwrap();
        let worker = GenotypeWorker::new(&library, &engine, dir.path());
        let lines = vec![Ok("1\t102\tA\t10\t.......TTT\tIIIIIIIIII".to_string())];
        let summary = worker.genotype("s1", lines.into_iter()).unwrap();
        assert_eq!(summary.sites, 2);
        let text = fs::read_to_string(dir.path().join("s1.chr001.indi.vcf")).unwrap();
        let rows: Vec<_> = text.lines().collect();
        assert!(rows[0].starts_with("0/1:7,3:"));
        assert_eq!(rows[1], "./.");
    }
}
