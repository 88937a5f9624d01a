//! Gzipped TSV file reader
//!
//! Streams one input file into the line queue and, once every line has been
//! queued without error, commits the file by renaming `/dir/name.tsv.gz` to
//! `/dir/.name.tsv.gz`. Any failure leaves the file where it was, so the next
//! run loads it again.
//!
//! Reading is synchronous (gzip decoding and a blocking queue send); the
//! supervisor runs each reader on the blocking pool.

use flate2::read::MultiGzDecoder;
use memc_common::{LoadError, Result};
use serde::Serialize;
use std::ffi::OsString;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

use crate::metrics::Counters;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Reader lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReaderState {
    Opening,
    Decompressing,
    Streaming,
    Draining,
    Committed,
    Failed,
}

impl ReaderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReaderState::Opening => "opening",
            ReaderState::Decompressing => "decompressing",
            ReaderState::Streaming => "streaming",
            ReaderState::Draining => "draining",
            ReaderState::Committed => "committed",
            ReaderState::Failed => "failed",
        }
    }
}

/// Outcome of reading one file
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    /// Non-empty lines handed to the line queue
    pub lines: u64,
    /// `Committed` or `Failed`
    pub state: ReaderState,
    /// State the reader was in when it failed
    pub failed_in: Option<ReaderState>,
    pub error: Option<String>,
}

impl FileReport {
    pub fn is_committed(&self) -> bool {
        self.state == ReaderState::Committed
    }
}

/// Read `path` into `lines`, then commit it
///
/// Blocks while the line queue is full.
pub fn read_file(path: &Path, lines: &flume::Sender<String>, counters: &Counters) -> FileReport {
    info!("Processing: {}", path.display());

    let mut state = ReaderState::Opening;
    let mut sent = 0u64;
    let result = stream_lines(path, lines, counters, &mut state, &mut sent).and_then(|()| {
        let committed = dot_rename(path)?;
        debug!(from = %path.display(), to = %committed.display(), "Renamed");
        Ok(())
    });

    match result {
        Ok(()) => {
            info!(lines = sent, "Committed: {}", path.display());
            FileReport {
                path: path.to_path_buf(),
                lines: sent,
                state: ReaderState::Committed,
                failed_in: None,
                error: None,
            }
        },
        Err(e) => {
            error!(
                state = state.as_str(),
                lines = sent,
                error = %e,
                "Couldn't load {}",
                path.display()
            );
            FileReport {
                path: path.to_path_buf(),
                lines: sent,
                state: ReaderState::Failed,
                failed_in: Some(state),
                error: Some(e.to_string()),
            }
        },
    }
}

fn stream_lines(
    path: &Path,
    lines: &flume::Sender<String>,
    counters: &Counters,
    state: &mut ReaderState,
    sent: &mut u64,
) -> Result<()> {
    let file = File::open(path)?;

    *state = ReaderState::Decompressing;
    let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, MultiGzDecoder::new(file));
    // Forces the gzip header to be parsed before any line is queued
    reader.fill_buf()?;

    *state = ReaderState::Streaming;
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        if buf.last() == Some(&b'\n') {
            buf.pop();
        }
        if buf.is_empty() || buf == b"\r" {
            continue;
        }

        let line = String::from_utf8_lossy(&buf).into_owned();
        counters.record_line();
        if lines.send(line).is_err() {
            counters.retract_line();
            return Err(LoadError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "line queue closed",
            )));
        }
        *sent += 1;
    }

    *state = ReaderState::Draining;
    Ok(())
}

/// Committed form of `path`: same directory, basename prefixed with a dot
pub fn committed_path(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?;
    let mut dotted = OsString::from(".");
    dotted.push(name);
    Some(path.with_file_name(dotted))
}

/// Mark `path` as loaded by renaming it to its committed form
pub fn dot_rename(path: &Path) -> io::Result<PathBuf> {
    let target = committed_path(path).ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "path has no file name")
    })?;
    std::fs::rename(path, &target)?;
    Ok(target)
}
