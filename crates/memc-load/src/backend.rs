//! Storage backends that receive encoded jobs
//!
//! Upload workers only talk to `dyn Backend`, so the shard router can hand
//! out a real memcached client, a dry-run sink, or a test double.

use async_trait::async_trait;
use memc_common::Result;
use tracing::debug;

/// A shard that accepts `SET` commands
#[async_trait]
pub trait Backend: Send + Sync {
    /// `host:port` (or another label) used in logs
    fn addr(&self) -> &str;

    /// Store `value` under `key` with no flags and no expiration
    async fn set(&self, key: &str, value: &[u8]) -> Result<()>;
}

/// Backend for `--dry` runs: accepts everything, stores nothing
#[derive(Debug, Clone)]
pub struct DryRunBackend {
    addr: String,
}

impl DryRunBackend {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

#[async_trait]
impl Backend for DryRunBackend {
    fn addr(&self) -> &str {
        &self.addr
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        debug!(addr = %self.addr, key = %key, bytes = value.len(), "Dry run SET");
        Ok(())
    }
}
