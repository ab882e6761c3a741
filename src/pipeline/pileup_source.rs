//! Per-sample pileup line streams.
//!
//! Production runs spawn `samtools mpileup` and read its stdout line by line;
//! the child is reaped when the stream is finished or dropped. Tests serve
//! canned lines through [`StaticPileup`].

use std::collections::{HashMap, HashSet};
use std::ffi::OsString;
use std::io::{self, BufRead, BufReader};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;

use thiserror::Error;
use tracing::{debug, warn};

use crate::pipeline::SampleEntry;

/// Failures of the external pileup generator.
#[derive(Debug, Error)]
pub enum PileupSourceError {
    /// The generator could not be started.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying error.
        source: io::Error,
    },
    /// The generator exited unsuccessfully.
    #[error("pileup generator for sample {sample} exited with {status}")]
    Exit {
        /// Sample being piled up.
        sample: String,
        /// Exit status as reported by the OS.
        status: String,
    },
    /// No pileup is available for the sample.
    #[error("no pileup available for sample {0}")]
    Unavailable(String),
    /// Waiting on the generator failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// What part of the genome to pile up.
#[derive(Debug, Clone, Copy)]
pub enum PileupRequest<'a> {
    /// Every position of `[start, end)` on `chrom`.
    Region {
        /// Chromosome id.
        chrom: u16,
        /// Half-open region.
        region: &'a Range<u32>,
    },
    /// Only the positions listed in `positions` on `chrom`.
    Positions {
        /// Chromosome id.
        chrom: u16,
        /// `chrom \t position` list file.
        positions: &'a Path,
    },
}

/// Source of per-sample pileup streams, shared across worker threads.
pub trait PileupProvider: Sync {
    /// Open the pileup of `sample`.
    fn open(
        &self,
        sample: &SampleEntry,
        request: PileupRequest<'_>,
    ) -> Result<PileupStream, PileupSourceError>;
}

struct ChildGuard {
    sample: String,
    child: Child,
    stderr: Option<JoinHandle<()>>,
}

impl ChildGuard {
    fn wait(mut self) -> Result<(), PileupSourceError> {
        let status = self.child.wait()?;
        if let Some(handle) = self.stderr.take() {
            let _ = handle.join();
        }
        if status.success() {
            Ok(())
        } else {
            Err(PileupSourceError::Exit {
                sample: self.sample.clone(),
                status: status.to_string(),
            })
        }
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            debug!(sample = %self.sample, "killing unfinished pileup generator");
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
        if let Some(handle) = self.stderr.take() {
            let _ = handle.join();
        }
    }
}

/// Line stream of one sample's pileup.
pub struct PileupStream {
    lines: Box<dyn Iterator<Item = io::Result<String>> + Send>,
    child: Option<ChildGuard>,
}

impl std::fmt::Debug for PileupStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PileupStream")
            .field("external", &self.child.is_some())
            .finish_non_exhaustive()
    }
}

impl PileupStream {
    /// Stream over in-memory lines.
    pub fn from_lines(lines: Vec<String>) -> Self {
        Self {
            lines: Box::new(lines.into_iter().map(Ok::<String, io::Error>)),
            child: None,
        }
    }

    fn from_child(sample: &str, mut child: Child) -> Result<Self, PileupSourceError> {
        let stdout: ChildStdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "child stdout not captured"))?;
        let stderr = child.stderr.take().map(|stderr| {
            let sample = sample.to_string();
            std::thread::spawn(move || {
                for line in BufReader::new(stderr).lines().map_while(Result::ok) {
                    // mpileup announces itself on stderr with "[mpileup] ..." lines.
                    if !line.starts_with("[m") {
                        warn!(sample = %sample, "{line}");
                    }
                }
            })
        });
        Ok(Self {
            lines: Box::new(BufReader::new(stdout).lines()),
            child: Some(ChildGuard {
                sample: sample.to_string(),
                child,
                stderr,
            }),
        })
    }

    /// Wait for the generator and check its exit status.
    pub fn finish(mut self) -> Result<(), PileupSourceError> {
        match self.child.take() {
            Some(guard) => {
                // Drain what is left so the child never blocks on a full pipe.
                for line in self.lines.by_ref() {
                    line?;
                }
                guard.wait()
            }
            None => Ok(()),
        }
    }
}

impl Iterator for PileupStream {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.lines.next()
    }
}

/// Runs `samtools mpileup` for each sample.
#[derive(Debug, Clone)]
pub struct SamtoolsPileup {
    samtools: PathBuf,
    reference: PathBuf,
    mapping_quality: u8,
    base_quality: u8,
}

impl SamtoolsPileup {
    /// Generator with the genotyping quality floors (`-q 20 -Q 20`).
    pub fn new(samtools: impl Into<PathBuf>, reference: impl Into<PathBuf>) -> Self {
        Self {
            samtools: samtools.into(),
            reference: reference.into(),
            mapping_quality: 20,
            base_quality: 20,
        }
    }

    /// Override the mapping and base quality floors.
    pub fn with_qualities(mut self, mapping_quality: u8, base_quality: u8) -> Self {
        self.mapping_quality = mapping_quality;
        self.base_quality = base_quality;
        self
    }

    /// Arguments passed to `samtools` for `sample`.
    pub fn command_args(&self, sample: &SampleEntry, request: PileupRequest<'_>) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "mpileup".into(),
            "-A".into(),
            "-B".into(),
            "-q".into(),
            self.mapping_quality.to_string().into(),
            "-Q".into(),
            self.base_quality.to_string().into(),
            "-f".into(),
            self.reference.clone().into_os_string(),
        ];
        args.extend(sample.files.iter().map(|f| f.clone().into_os_string()));
        match request {
            PileupRequest::Region { chrom, region } => {
                args.push("-r".into());
                args.push(format!("{chrom}:{}-{}", region.start, region.end - 1).into());
            }
            PileupRequest::Positions { chrom, positions } => {
                args.push("-l".into());
                args.push(positions.as_os_str().to_owned());
                args.push("-r".into());
                args.push(chrom.to_string().into());
            }
        }
        args
    }
}

impl PileupProvider for SamtoolsPileup {
    fn open(
        &self,
        sample: &SampleEntry,
        request: PileupRequest<'_>,
    ) -> Result<PileupStream, PileupSourceError> {
        let args = self.command_args(sample, request);
        debug!(sample = %sample.name, ?args, "spawning samtools");
        let child = Command::new(&self.samtools)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| PileupSourceError::Spawn {
                program: self.samtools.display().to_string(),
                source,
            })?;
        PileupStream::from_child(&sample.name, child)
    }
}

/// Canned pileup lines keyed by sample name.
#[derive(Debug, Clone, Default)]
pub struct StaticPileup {
    lines: HashMap<String, Vec<String>>,
    unavailable: HashSet<String>,
}

impl StaticPileup {
    /// Provider with no lines for any sample.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `lines` for `sample`.
    pub fn with_sample<I, S>(mut self, sample: impl Into<String>, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lines
            .insert(sample.into(), lines.into_iter().map(Into::into).collect());
        self
    }

    /// Make opening `sample` fail.
    pub fn with_unavailable(mut self, sample: impl Into<String>) -> Self {
        self.unavailable.insert(sample.into());
        self
    }
}

impl PileupProvider for StaticPileup {
    fn open(
        &self,
        sample: &SampleEntry,
        _request: PileupRequest<'_>,
    ) -> Result<PileupStream, PileupSourceError> {
        if self.unavailable.contains(&sample.name) {
            return Err(PileupSourceError::Unavailable(sample.name.clone()));
        }
        let lines = self.lines.get(&sample.name).cloned().unwrap_or_default();
        Ok(PileupStream::from_lines(lines))
    }
}
