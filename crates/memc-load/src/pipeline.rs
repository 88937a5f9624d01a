//! Pipeline supervisor
//!
//! ```text
//! readers (1 per file) --> line queue --> parse workers --> job queue --> upload workers --> memcached
//!    spawn_blocking         bounded        async tasks       bounded       async tasks
//! ```
//!
//! Shutdown is a three-phase drain. The supervisor keeps one sender of each
//! queue and drops it only after the stage feeding that queue has finished:
//!
//! 1. join every reader, then close the line queue
//! 2. join every parse worker, then close the job queue
//! 3. join every upload worker and read the counters
//!
//! Closing earlier would drop work; never closing would leave consumers
//! waiting forever.

use futures::future::join_all;
use glob::MatchOptions;
use memc_common::{LoadError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::metrics::{Counters, Totals};
use crate::reader::{read_file, FileReport};
use crate::router::ShardRouter;
use crate::worker::{parse_worker, upload_worker, EncodedJob, WorkerReport};

/// Worker counts and queue capacities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub parse_workers: usize,
    pub upload_workers: usize,
    /// Line queue capacity
    pub lines_capacity: usize,
    /// Job queue capacity
    pub jobs_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            parse_workers: 3,
            upload_workers: 6,
            lines_capacity: 100,
            jobs_capacity: 300,
        }
    }
}

/// Final accounting for one run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub processed: u64,
    pub errors: u64,
    /// Non-empty lines read across all files
    pub lines: u64,
    pub files_committed: usize,
    pub files_failed: usize,
    pub files: Vec<FileReport>,
    pub elapsed: Duration,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Processed: {}, Errors: {}", self.processed, self.errors)
    }
}

/// Runs files through readers, parse workers and upload workers
pub struct Pipeline {
    config: PipelineConfig,
    router: Arc<ShardRouter>,
    counters: Arc<Counters>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, router: ShardRouter) -> Self {
        Self {
            config,
            router: Arc::new(router),
            counters: Arc::new(Counters::new()),
        }
    }

    /// Share externally owned counters (e.g. to observe a run in progress)
    pub fn with_counters(mut self, counters: Arc<Counters>) -> Self {
        self.counters = counters;
        self
    }

    pub fn counters(&self) -> Arc<Counters> {
        self.counters.clone()
    }

    /// Load `files` and wait until every line has settled
    pub async fn run(&self, files: Vec<PathBuf>) -> RunSummary {
        let started = Instant::now();
        let (line_tx, line_rx) = flume::bounded::<String>(self.config.lines_capacity);
        let (job_tx, job_rx) = flume::bounded::<EncodedJob>(self.config.jobs_capacity);

        let uploaders: Vec<JoinHandle<WorkerReport>> = (0..self.config.upload_workers)
            .map(|id| tokio::spawn(upload_worker(id, job_rx.clone(), self.counters.clone())))
            .collect();
        drop(job_rx);

        let parsers: Vec<JoinHandle<WorkerReport>> = (0..self.config.parse_workers)
            .map(|id| {
                tokio::spawn(parse_worker(
                    id,
                    line_rx.clone(),
                    job_tx.clone(),
                    self.router.clone(),
                    self.counters.clone(),
                ))
            })
            .collect();
        drop(line_rx);

        info!(files = files.len(), "Main: making tasks from files...");
        let mut readers = JoinSet::new();
        for path in files {
            let lines = line_tx.clone();
            let counters = self.counters.clone();
            readers.spawn_blocking(move || read_file(&path, &lines, &counters));
        }

        let mut reports = Vec::new();
        let mut panicked = 0;
        while let Some(joined) = readers.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => {
                    error!("Reader task failed: {}", e);
                    panicked += 1;
                },
            }
        }

        info!("Main: close line queue and wait parse workers");
        drop(line_tx);
        join_workers("parse", parsers).await;

        info!("Main: close job queue and wait upload workers");
        drop(job_tx);
        join_workers("upload", uploaders).await;

        let files_committed = reports.iter().filter(|r| r.is_committed()).count();
        let Totals {
            lines,
            processed,
            errors,
        } = self.counters.snapshot();
        let summary = RunSummary {
            processed,
            errors,
            lines,
            files_committed,
            files_failed: reports.len() - files_committed + panicked,
            files: reports,
            elapsed: started.elapsed(),
        };

        info!(
            lines = summary.lines,
            files_committed = summary.files_committed,
            files_failed = summary.files_failed,
            elapsed_secs = summary.elapsed.as_secs_f64(),
            "Main: All tasks done! {}",
            summary
        );
        summary
    }
}

async fn join_workers(stage: &'static str, handles: Vec<JoinHandle<WorkerReport>>) {
    for joined in join_all(handles).await {
        match joined {
            Ok(report) => debug!(
                stage,
                worker = report.id,
                handled = report.handled,
                failed = report.failed,
                "Worker joined"
            ),
            Err(e) => error!(stage, "Worker task failed: {}", e),
        }
    }
}

/// Make a relative pattern absolute against the working directory
pub fn absolute_pattern(raw: &str) -> Result<String> {
    if Path::new(raw).is_absolute() {
        return Ok(raw.to_string());
    }
    Ok(pattern_under(&std::env::current_dir()?, raw))
}

/// Join a relative pattern onto `base`, matching `base` literally
pub fn pattern_under(base: &Path, raw: &str) -> String {
    let escaped = glob::Pattern::escape(&base.to_string_lossy());
    let relative = raw.strip_prefix("./").unwrap_or(raw);
    Path::new(&escaped)
        .join(relative)
        .to_string_lossy()
        .into_owned()
}

/// Expand the input pattern into files, oldest name first
///
/// Dot-prefixed (already committed) files never match.
pub fn resolve_pattern(raw: &str) -> Result<Vec<PathBuf>> {
    let pattern = absolute_pattern(raw)?;
    let options = MatchOptions {
        require_literal_leading_dot: true,
        ..MatchOptions::new()
    };

    let entries = glob::glob_with(&pattern, options).map_err(|e| LoadError::Pattern {
        pattern: raw.to_string(),
        message: e.to_string(),
    })?;

    let mut files = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) if path.is_file() => files.push(path),
            Ok(path) => debug!("Skipping non-file {}", path.display()),
            Err(e) => warn!("Couldn't read {}: {}", e.path().display(), e),
        }
    }
    files.sort();
    Ok(files)
}
