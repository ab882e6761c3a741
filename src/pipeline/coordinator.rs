//! Bounded fan-out of per-sample tasks.
//!
//! Every sample is one task on a dedicated `rayon` pool. A task's failure,
//! panics included, is recorded in its [`TaskOutcome`] and never reaches the
//! other tasks. [`Coordinator::run`] returns once every task has finished.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{error, info};

use crate::pipeline::SampleEntry;
use crate::PipelineError;

/// Result of one sample task.
#[derive(Debug)]
pub struct TaskOutcome<T> {
    /// Sample the task ran for.
    pub sample: String,
    /// Task value or the reason it failed.
    pub result: Result<T, PipelineError>,
}

/// Outcomes of every task, in sample order.
#[derive(Debug)]
pub struct CoordinatorReport<T> {
    /// One outcome per sample.
    pub outcomes: Vec<TaskOutcome<T>>,
}

impl<T> CoordinatorReport<T> {
    /// Number of tasks that succeeded.
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    /// Number of tasks that failed.
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// Names of the failed samples.
    pub fn failed_samples(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.result.is_err())
            .map(|o| o.sample.as_str())
            .collect()
    }
}

/// Logs every `interval` completed tasks.
#[derive(Debug)]
struct ProgressCounter<'a> {
    label: &'a str,
    interval: usize,
    total: usize,
    done: AtomicUsize,
}

impl ProgressCounter<'_> {
    fn tick(&self) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        if done % self.interval == 0 {
            info!("{}: {} of {} samples finished", self.label, done, self.total);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Fixed-width worker pool running one task per sample.
#[derive(Debug)]
pub struct Coordinator {
    pool: ThreadPool,
    label: String,
    progress_interval: usize,
}

impl Coordinator {
    /// Pool of `threads` workers; `label` prefixes progress messages.
    pub fn new(threads: usize, label: impl Into<String>) -> Result<Self, PipelineError> {
        let label = label.into();
        let prefix = label.clone();
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(move |i| format!("{prefix}-{i}"))
            .build()?;
        Ok(Self {
            pool,
            label,
            progress_interval: 10,
        })
    }

    /// Log progress every `interval` completed samples.
    pub fn with_progress_interval(mut self, interval: usize) -> Self {
        self.progress_interval = interval.max(1);
        self
    }

    /// Number of worker threads.
    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run `task` once per sample and wait for all of them.
    pub fn run<T, F>(&self, samples: &[SampleEntry], task: F) -> CoordinatorReport<T>
    where
        T: Send,
        F: Fn(&SampleEntry) -> Result<T, PipelineError> + Sync,
    {
        let progress = ProgressCounter {
            label: &self.label,
            interval: self.progress_interval,
            total: samples.len(),
            done: AtomicUsize::new(0),
        };
        let outcomes: Vec<TaskOutcome<T>> = self.pool.install(|| {
            samples
                .par_iter()
                .map(|sample| {
                    let result = panic::catch_unwind(AssertUnwindSafe(|| task(sample)))
                        .unwrap_or_else(|payload| {
                            Err(PipelineError::TaskPanicked {
                                sample: sample.name.clone(),
                                message: panic_message(payload.as_ref()),
                            })
                        });
                    if let Err(err) = &result {
                        error!(sample = %sample.name, error = %err, "{} task failed", self.label);
                    }
                    progress.tick();
                    TaskOutcome {
                        sample: sample.name.clone(),
                        result,
                    }
                })
                .collect()
        });
        let report = CoordinatorReport { outcomes };
        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            "{} finished for {} samples",
            self.label,
            samples.len()
        );
        report
    }
}
