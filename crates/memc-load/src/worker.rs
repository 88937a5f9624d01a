//! Parse/encode and upload workers
//!
//! Both pools loop until their input queue is closed *and* drained; that is
//! the only way a worker halts. Every item taken from a queue ends in exactly
//! one outcome: forwarded, `processed += 1`, or `errors += 1`.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::backend::Backend;
use crate::metrics::Counters;
use crate::proto::encode_record;
use crate::record::parse_line;
use crate::router::ShardRouter;

/// A record ready for upload
pub struct EncodedJob {
    pub backend: Arc<dyn Backend>,
    pub key: String,
    pub payload: Vec<u8>,
}

impl std::fmt::Debug for EncodedJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodedJob")
            .field("backend", &self.backend.addr())
            .field("key", &self.key)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

/// What a worker did before halting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub id: usize,
    /// Items taken from the input queue
    pub handled: u64,
    /// Items that ended in `errors += 1`
    pub failed: u64,
}

/// Turn raw lines into upload jobs
pub async fn parse_worker(
    id: usize,
    lines: flume::Receiver<String>,
    jobs: flume::Sender<EncodedJob>,
    router: Arc<ShardRouter>,
    counters: Arc<Counters>,
) -> WorkerReport {
    let mut report = WorkerReport {
        id,
        ..WorkerReport::default()
    };

    while let Ok(line) = lines.recv_async().await {
        report.handled += 1;

        let job = match prepare_job(&line, &router) {
            Ok(job) => job,
            Err(e) => {
                warn!(worker = id, category = e.category(), "Dropping line: {}", e);
                counters.record_error();
                report.failed += 1;
                continue;
            },
        };

        if let Err(e) = jobs.send_async(job).await {
            let job = e.into_inner();
            warn!(worker = id, key = %job.key, "Job queue closed, dropping job");
            counters.record_error();
            report.failed += 1;
        }
    }

    debug!(worker = id, handled = report.handled, failed = report.failed, "Parse worker halted");
    report
}

fn prepare_job(line: &str, router: &ShardRouter) -> memc_common::Result<EncodedJob> {
    let record = parse_line(line)?;
    let backend = router.route(&record.dev_type)?.clone();
    let (key, payload) = encode_record(&record)?;
    Ok(EncodedJob {
        backend,
        key,
        payload,
    })
}

/// Send jobs to their backends
pub async fn upload_worker(
    id: usize,
    jobs: flume::Receiver<EncodedJob>,
    counters: Arc<Counters>,
) -> WorkerReport {
    let mut report = WorkerReport {
        id,
        ..WorkerReport::default()
    };

    while let Ok(job) = jobs.recv_async().await {
        report.handled += 1;

        match job.backend.set(&job.key, &job.payload).await {
            Ok(()) => counters.record_processed(),
            Err(e) => {
                warn!(worker = id, key = %job.key, "Couldn't set to memcached: {}", e);
                counters.record_error();
                report.failed += 1;
            },
        }
    }

    debug!(worker = id, handled = report.handled, failed = report.failed, "Upload worker halted");
    report
}
