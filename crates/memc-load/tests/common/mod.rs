//! Shared fixtures for pipeline tests

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use memc_common::{LoadError, Result};
use memc_load::{Backend, Counters};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Write `lines` as a gzipped TSV file
pub fn write_gz(dir: &Path, name: &str, lines: &[String]) -> PathBuf {
    let path = dir.join(name);
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    for line in lines {
        encoder.write_all(line.as_bytes()).unwrap();
        encoder.write_all(b"\n").unwrap();
    }
    std::fs::write(&path, encoder.finish().unwrap()).unwrap();
    path
}

/// Backend that keeps every stored key and payload
#[derive(Default)]
pub struct RecordingBackend {
    addr: String,
    stored: Mutex<Vec<(String, Vec<u8>)>>,
}

impl RecordingBackend {
    pub fn new(addr: &str) -> Arc<Self> {
        Arc::new(Self {
            addr: addr.to_string(),
            stored: Mutex::new(Vec::new()),
        })
    }

    pub fn stored(&self) -> Vec<(String, Vec<u8>)> {
        self.stored.lock().unwrap().clone()
    }
}

#[async_trait]
impl Backend for RecordingBackend {
    fn addr(&self) -> &str {
        &self.addr
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.stored
            .lock()
            .unwrap()
            .push((key.to_string(), value.to_vec()));
        Ok(())
    }
}

/// Backend that rejects every store
pub struct RefusingBackend;

#[async_trait]
impl Backend for RefusingBackend {
    fn addr(&self) -> &str {
        "refusing:0"
    }

    async fn set(&self, _key: &str, _value: &[u8]) -> Result<()> {
        Err(LoadError::backend("refusing:0", "connection refused"))
    }
}

/// Backend that yields before each store and tracks the peak number of
/// unsettled lines
pub struct SlowBackend {
    counters: Arc<Counters>,
    peak: AtomicU64,
    stores: AtomicU64,
}

impl SlowBackend {
    pub fn new(counters: Arc<Counters>) -> Arc<Self> {
        Arc::new(Self {
            counters,
            peak: AtomicU64::new(0),
            stores: AtomicU64::new(0),
        })
    }

    pub fn peak_in_flight(&self) -> u64 {
        self.peak.load(Ordering::Relaxed)
    }

    pub fn stores(&self) -> u64 {
        self.stores.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Backend for SlowBackend {
    fn addr(&self) -> &str {
        "slow:0"
    }

    async fn set(&self, _key: &str, _value: &[u8]) -> Result<()> {
        self.peak
            .fetch_max(self.counters.in_flight(), Ordering::Relaxed);
        tokio::task::yield_now().await;
        self.stores.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Backend whose stores wait until the test opens the gate
pub struct GatedBackend {
    gate: tokio::sync::Semaphore,
}

impl GatedBackend {
    pub fn closed() -> Arc<Self> {
        Arc::new(Self {
            gate: tokio::sync::Semaphore::new(0),
        })
    }

    /// Let every pending and future store through
    pub fn open(&self) {
        self.gate.close();
    }
}

#[async_trait]
impl Backend for GatedBackend {
    fn addr(&self) -> &str {
        "gated:0"
    }

    async fn set(&self, _key: &str, _value: &[u8]) -> Result<()> {
        // Acquire fails once the semaphore is closed
        let _ = self.gate.acquire().await;
        Ok(())
    }
}
