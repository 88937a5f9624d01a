//! End-to-end pipeline tests
//!
//! Runs real gzipped files through readers, parse workers and upload
//! workers with in-process backends standing in for memcached.

mod common;

use common::{write_gz, GatedBackend, RecordingBackend, RefusingBackend, SlowBackend};
use memc_load::proto::decode_user_apps;
use memc_load::{
    resolve_pattern, Backend, Counters, DeviceType, DryRunBackend, MemcacheClient, Pipeline,
    PipelineConfig, ShardRouter,
};
use std::sync::Arc;
use std::time::Duration;

fn dry_router() -> ShardRouter {
    ShardRouter::from_fn(|dev_type| Arc::new(DryRunBackend::new(dev_type.as_str())))
}

fn lines(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|s| s.to_string()).collect()
}

// ============================================================================
// Single-file outcomes
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_valid_line_is_stored_and_file_committed() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_gz(
        dir.path(),
        "input.tsv.gz",
        &lines(&["idfa\tabc123\t55.5\t42.0\t1,2,3"]),
    );

    let idfa = RecordingBackend::new("idfa");
    let router = dry_router().with_backend(DeviceType::Idfa, idfa.clone());
    let summary = Pipeline::new(PipelineConfig::default(), router)
        .run(vec![path.clone()])
        .await;

    assert_eq!(summary.processed, 1);
    assert_eq!(summary.errors, 0);
    assert_eq!(summary.to_string(), "Processed: 1, Errors: 0");

    let stored = idfa.stored();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].0, "idfa:abc123");
    let decoded = decode_user_apps(&stored[0].1).unwrap();
    assert_eq!(decoded.apps, vec![1, 2, 3]);
    assert_eq!(decoded.lat, Some(55.5));
    assert_eq!(decoded.lon, Some(42.0));

    assert!(!path.exists());
    assert!(dir.path().join(".input.tsv.gz").exists());
    assert_eq!(summary.files_committed, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_short_line_is_an_error_but_file_commits() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_gz(dir.path(), "input.tsv.gz", &lines(&["idfa\tabc\t1.0\t2.0"]));

    let idfa = RecordingBackend::new("idfa");
    let router = dry_router().with_backend(DeviceType::Idfa, idfa.clone());
    let summary = Pipeline::new(PipelineConfig::default(), router)
        .run(vec![path])
        .await;

    assert_eq!(summary.processed, 0);
    assert_eq!(summary.errors, 1);
    assert!(idfa.stored().is_empty());
    assert_eq!(summary.files_committed, 1);
    assert!(dir.path().join(".input.tsv.gz").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unknown_device_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_gz(dir.path(), "input.tsv.gz", &lines(&["xyz\tabc\t1.0\t2.0\t1"]));

    let backends: Vec<_> = DeviceType::ALL
        .iter()
        .map(|d| RecordingBackend::new(d.as_str()))
        .collect();
    let router = {
        let mut i = 0;
        ShardRouter::from_fn(|_| {
            let backend: Arc<dyn Backend> = backends[i].clone();
            i += 1;
            backend
        })
    };
    let summary = Pipeline::new(PipelineConfig::default(), router)
        .run(vec![path])
        .await;

    assert_eq!(summary.processed, 0);
    assert_eq!(summary.errors, 1);
    assert!(backends.iter().all(|b| b.stored().is_empty()));
}

// ============================================================================
// Multiple files and reruns
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_files_commit_independently() {
    let dir = tempfile::tempdir().unwrap();
    write_gz(
        dir.path(),
        "20170929000100.tsv.gz",
        &lines(&["gaid\tb1\t1\t2\t7", "gaid\tb2\t1\t2\t8", "bad line"]),
    );
    write_gz(
        dir.path(),
        "20170929000000.tsv.gz",
        &lines(&["idfa\ta1\t1\t2\t5", "dvid\ta2\t1\t2\t6"]),
    );

    let pattern = format!("{}/*.tsv.gz", dir.path().display());
    let files = resolve_pattern(&pattern).unwrap();
    assert_eq!(files[0], dir.path().join("20170929000000.tsv.gz"));
    assert_eq!(files[1], dir.path().join("20170929000100.tsv.gz"));

    let summary = Pipeline::new(PipelineConfig::default(), dry_router())
        .run(files)
        .await;

    assert_eq!(summary.processed, 4);
    assert_eq!(summary.errors, 1);
    assert_eq!(summary.lines, 5);
    assert_eq!(summary.files_committed, 2);
    assert_eq!(summary.files_failed, 0);
    assert!(dir.path().join(".20170929000000.tsv.gz").exists());
    assert!(dir.path().join(".20170929000100.tsv.gz").exists());

    // Committed files never match again
    let rerun = resolve_pattern(&pattern).unwrap();
    assert!(rerun.is_empty());
    let summary = Pipeline::new(PipelineConfig::default(), dry_router())
        .run(rerun)
        .await;
    assert_eq!(summary.to_string(), "Processed: 0, Errors: 0");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unreadable_file_is_not_committed() {
    let dir = tempfile::tempdir().unwrap();
    let good = write_gz(dir.path(), "a.tsv.gz", &lines(&["adid\tx\t1\t2\t3"]));
    let bad = dir.path().join("b.tsv.gz");
    std::fs::write(&bad, "adid\ty\t1\t2\t3\n").unwrap();

    let summary = Pipeline::new(PipelineConfig::default(), dry_router())
        .run(vec![good, bad.clone()])
        .await;

    assert_eq!(summary.processed, 1);
    assert_eq!(summary.files_committed, 1);
    assert_eq!(summary.files_failed, 1);
    assert!(bad.exists());
    let failed = summary.files.iter().find(|r| !r.is_committed()).unwrap();
    assert_eq!(failed.path, bad);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_no_files() {
    let summary = Pipeline::new(PipelineConfig::default(), dry_router())
        .run(Vec::new())
        .await;
    assert_eq!(summary.processed, 0);
    assert_eq!(summary.errors, 0);
    assert_eq!(summary.files_committed, 0);
}

// ============================================================================
// Backend failures
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_refusing_backend_counts_every_line_as_error() {
    let dir = tempfile::tempdir().unwrap();
    let input: Vec<String> = (0..100)
        .map(|i| format!("gaid\tdev{}\t1.0\t2.0\t{}", i, i))
        .collect();
    let path = write_gz(dir.path(), "input.tsv.gz", &input);

    let router = dry_router().with_backend(DeviceType::Gaid, Arc::new(RefusingBackend));
    let summary = Pipeline::new(PipelineConfig::default(), router)
        .run(vec![path])
        .await;

    assert_eq!(summary.processed, 0);
    assert_eq!(summary.errors, 100);
    // Upload failures do not undo the commit
    assert_eq!(summary.files_committed, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unreachable_memcached_terminates() {
    // Grab a free port, then close the listener so connects are refused
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let addr = format!("127.0.0.1:{}", port);

    let dir = tempfile::tempdir().unwrap();
    let input: Vec<String> = (0..20)
        .map(|i| format!("gaid\tdev{}\t1.0\t2.0\t{}", i, i))
        .collect();
    let path = write_gz(dir.path(), "input.tsv.gz", &input);

    let client = MemcacheClient::new(addr, Duration::from_millis(200), 7);
    let router = dry_router().with_backend(DeviceType::Gaid, Arc::new(client));
    let summary = tokio::time::timeout(
        Duration::from_secs(30),
        Pipeline::new(PipelineConfig::default(), router).run(vec![path]),
    )
    .await
    .expect("pipeline did not terminate");

    assert_eq!(summary.processed, 0);
    assert_eq!(summary.errors, 20);
}

// ============================================================================
// Load and backpressure
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_bounded_in_flight_under_load() {
    let dir = tempfile::tempdir().unwrap();
    let input: Vec<String> = (0..10_000)
        .map(|i| {
            let dev_type = DeviceType::ALL[i % 4];
            if i % 97 == 0 {
                format!("{}\tdev{}\tbroken", dev_type, i)
            } else {
                format!("{}\tdev{}\t{}.5\t{}.25\t{},{}", dev_type, i, i % 90, i % 180, i, i + 1)
            }
        })
        .collect();
    let path = write_gz(dir.path(), "load.tsv.gz", &input);

    let counters = Arc::new(Counters::new());
    let slow = SlowBackend::new(counters.clone());
    let router = ShardRouter::from_fn(|_| slow.clone() as Arc<dyn Backend>);

    let config = PipelineConfig {
        parse_workers: 4,
        upload_workers: 8,
        lines_capacity: 50,
        jobs_capacity: 50,
    };
    let pipeline = Pipeline::new(config, router).with_counters(counters.clone());
    let summary = tokio::time::timeout(Duration::from_secs(60), pipeline.run(vec![path]))
        .await
        .expect("pipeline did not terminate");

    let broken = (0..10_000).filter(|i| i % 97 == 0).count() as u64;
    assert_eq!(summary.lines, 10_000);
    assert_eq!(summary.processed + summary.errors, 10_000);
    assert_eq!(summary.errors, broken);
    assert_eq!(slow.stores(), summary.processed);
    assert_eq!(counters.in_flight(), 0);

    // queues + one item per worker + one blocked reader send
    let bound = 50 + 50 + 4 + 8 + 1;
    assert!(
        slow.peak_in_flight() <= bound,
        "peak in-flight {} exceeds {}",
        slow.peak_in_flight(),
        bound
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stalled_backend_bounds_read_ahead() {
    let dir = tempfile::tempdir().unwrap();
    let input: Vec<String> = (0..10_000)
        .map(|i| format!("{}\tdev{}\t1.0\t2.0\t{}", DeviceType::ALL[i % 4], i, i))
        .collect();
    let path = write_gz(dir.path(), "stalled.tsv.gz", &input);

    let gated = GatedBackend::closed();
    let router = ShardRouter::from_fn(|_| gated.clone() as Arc<dyn Backend>);
    let config = PipelineConfig {
        parse_workers: 4,
        upload_workers: 8,
        lines_capacity: 50,
        jobs_capacity: 50,
    };
    let counters = Arc::new(Counters::new());
    let pipeline = Pipeline::new(config, router).with_counters(counters.clone());
    let run = tokio::spawn(async move { pipeline.run(vec![path]).await });

    tokio::time::sleep(Duration::from_millis(500)).await;

    // queues + one item per worker + the reader's pending send
    let bound = 50 + 50 + 4 + 8 + 1;
    assert!(
        counters.lines() <= bound,
        "read {} lines with uploads stalled, bound is {}",
        counters.lines(),
        bound
    );
    assert_eq!(counters.processed(), 0);
    assert!(!run.is_finished());

    gated.open();
    let summary = tokio::time::timeout(Duration::from_secs(60), run)
        .await
        .expect("pipeline did not terminate")
        .unwrap();
    assert_eq!(summary.processed, 10_000);
    assert_eq!(summary.errors, 0);
}
