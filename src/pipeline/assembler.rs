//! Lock-step merge of per-sample genotype files into one multi-sample VCF.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Lines, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use crate::genomics::{write_header, write_row, GenotypeCall, SiteRow, SiteStats, VariationLibrary};
use crate::PipelineError;

/// Intermediate files that cannot be assembled.
#[derive(Debug, Error)]
pub enum AssemblyError {
    /// An intermediate does not hold one line per library site.
    #[error("sample {sample}: expected {expected} genotype lines, found {found}")]
    LineCount {
        /// Sample name.
        sample: String,
        /// Library sites in the region.
        expected: usize,
        /// Lines in the file.
        found: usize,
    },
    /// An intermediate line is not a genotype field.
    #[error("sample {sample}: malformed genotype on line {line}")]
    MalformedGenotype {
        /// Sample name.
        sample: String,
        /// 1-based line number.
        line: usize,
    },
    /// An intermediate is missing.
    #[error("sample {sample}: intermediate {} is missing", path.display())]
    MissingIntermediate {
        /// Sample name.
        sample: String,
        /// Expected path.
        path: PathBuf,
    },
}

/// One sample's genotype intermediate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleInput {
    /// Sample name, used as the VCF column header.
    pub name: String,
    /// Path of the per-sample genotype file.
    pub path: PathBuf,
}

/// Counters of one assembly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AssemblySummary {
    /// Rows written.
    pub sites: usize,
    /// Sample columns.
    pub samples: usize,
    /// Samples whose file was missing, short or malformed and got padded with `./.`.
    pub padded_samples: usize,
}

struct SampleCursor {
    name: String,
    lines: Option<Lines<BufReader<File>>>,
    line: usize,
    padded: bool,
}

impl SampleCursor {
    fn pad(&mut self, reason: &str) {
        if !self.padded {
            warn!(sample = %self.name, line = self.line, "{reason}; padding with ./.");
            self.padded = true;
        }
    }
}

/// Builds the final VCF from per-sample intermediates.
#[derive(Debug, Clone)]
pub struct ResultAssembler<'a> {
    library: &'a VariationLibrary,
    reference_bases: &'a [u8],
    strict: bool,
    file_date: Option<&'a str>,
}

impl<'a> ResultAssembler<'a> {
    /// Assembler over `library`; `reference_bases[i]` is the base at site `i`.
    pub fn new(library: &'a VariationLibrary, reference_bases: &'a [u8]) -> Self {
        Self {
            library,
            reference_bases,
            strict: false,
            file_date: None,
        }
    }

    /// Fail on short or malformed intermediates instead of padding them.
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Write a `##fileDate` header line.
    pub fn with_file_date(mut self, date: Option<&'a str>) -> Self {
        self.file_date = date;
        self
    }

    fn verify(&self, input: &SampleInput) -> Result<(), PipelineError> {
        let file = File::open(&input.path).map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                PipelineError::from(AssemblyError::MissingIntermediate {
                    sample: input.name.clone(),
                    path: input.path.clone(),
                })
            } else {
                PipelineError::Resource {
                    path: input.path.clone(),
                    source: err,
                }
            }
        })?;
        let mut found = 0;
        for line in BufReader::new(file).lines() {
            line?;
            found += 1;
        }
        if found != self.library.len() {
            return Err(AssemblyError::LineCount {
                sample: input.name.clone(),
                expected: self.library.len(),
                found,
            }
            .into());
        }
        Ok(())
    }

    /// Merge `inputs` (in column order) into a VCF written to `out`.
    pub fn assemble<W: Write>(
        &self,
        inputs: &[SampleInput],
        out: &mut W,
    ) -> Result<AssemblySummary, PipelineError> {
        if self.strict {
            for input in inputs {
                self.verify(input)?;
            }
        }

        let mut cursors = Vec::with_capacity(inputs.len());
        for input in inputs {
            let lines = match File::open(&input.path) {
                Ok(file) => Some(BufReader::new(file).lines()),
                Err(err) if err.kind() == io::ErrorKind::NotFound && !self.strict => None,
                Err(source) => {
                    return Err(PipelineError::Resource {
                        path: input.path.clone(),
                        source,
                    })
                }
            };
            let mut cursor = SampleCursor {
                name: input.name.clone(),
                lines,
                line: 0,
                padded: false,
            };
            if cursor.lines.is_none() {
                cursor.pad("intermediate is missing");
            }
            cursors.push(cursor);
        }

        let names: Vec<String> = inputs.iter().map(|i| i.name.clone()).collect();
        write_header(out, &names, self.file_date)?;

        let mut genotypes: Vec<String> = Vec::with_capacity(cursors.len());
        for site in 0..self.library.len() {
            let alternates = self.library.alternates(site);
            let mut stats = SiteStats::new(alternates.len() + 1);
            genotypes.clear();
            for cursor in cursors.iter_mut() {
                cursor.line += 1;
                let line = match cursor.lines.as_mut().and_then(Iterator::next) {
                    Some(line) => line?,
                    None => {
                        cursor.pad("intermediate ended early");
                        genotypes.push(GenotypeCall::Missing.to_string());
                        continue;
                    }
                };
                match GenotypeCall::parse(&line) {
                    Some(call) => {
                        stats.add(&call);
                        genotypes.push(line);
                    }
                    None if self.strict => {
                        return Err(AssemblyError::MalformedGenotype {
                            sample: cursor.name.clone(),
                            line: cursor.line,
                        }
                        .into());
                    }
                    None => {
                        cursor.pad("malformed genotype line");
                        genotypes.push(GenotypeCall::Missing.to_string());
                    }
                }
            }
            let row = SiteRow {
                chrom: self.library.chrom(),
                position: self.library.position(site),
                reference: self.reference_bases.get(site).copied().unwrap_or(b'N'),
                alternates,
            };
            write_row(out, row, &stats, &genotypes)?;
        }
        out.flush()?;

        Ok(AssemblySummary {
            sites: self.library.len(),
            samples: inputs.len(),
            padded_samples: cursors.iter().filter(|c| c.padded).count(),
        })
    }

    /// Assemble into a file at `path`.
    pub fn assemble_to_path(
        &self,
        inputs: &[SampleInput],
        path: &Path,
    ) -> Result<AssemblySummary, PipelineError> {
        let file = File::create(path).map_err(|source| PipelineError::Resource {
            path: path.to_path_buf(),
            source,
        })?;
        let mut writer = BufWriter::new(file);
        let summary = self.assemble(inputs, &mut writer)?;
        info!(
            path = %path.display(),
            sites = summary.sites,
            samples = summary.samples,
            "final VCF written"
        );
        Ok(summary)
    }
}

/// Delete the intermediates, then the working directories once empty.
pub fn remove_intermediates(inputs: &[SampleInput], directories: &[PathBuf]) {
    for input in inputs {
        if let Err(err) = fs::remove_file(&input.path) {
            if err.kind() != io::ErrorKind::NotFound {
                warn!(path = %input.path.display(), error = %err, "cannot remove intermediate");
            }
        }
    }
    for dir in directories {
        if let Err(err) = fs::remove_dir(dir) {
            warn!(path = %dir.display(), error = %err, "cannot remove working directory");
        }
    }
}
