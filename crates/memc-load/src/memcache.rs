//! Async memcached client (text protocol, `set` only)
//!
//! One client per shard, shared by every upload worker. Each `set` checks out
//! an idle connection (or dials a new one), writes
//! `set <key> 0 0 <bytes>\r\n<data>\r\n` and expects `STORED`.
//!
//! - The socket timeout bounds the dial and the whole request/reply round trip
//! - At most `max_idle` connections are kept for reuse; extra ones are closed
//! - A connection is only reused after a clean `STORED` reply

use async_trait::async_trait;
use memc_common::{LoadError, Result};
use std::io;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::backend::Backend;

/// Socket read/write timeout for memcached clients
pub const SOCKET_TIMEOUT: Duration = Duration::from_millis(200);

/// Longest key memcached accepts
pub const MAX_KEY_LENGTH: usize = 250;

type Connection = BufStream<TcpStream>;

/// Client for a single memcached server
pub struct MemcacheClient {
    addr: String,
    timeout: Duration,
    max_idle: usize,
    idle: Mutex<Vec<Connection>>,
}

impl MemcacheClient {
    /// Create a client; no connection is made until the first `set`
    pub fn new(addr: impl Into<String>, timeout: Duration, max_idle: usize) -> Self {
        Self {
            addr: addr.into(),
            timeout,
            max_idle,
            idle: Mutex::new(Vec::with_capacity(max_idle)),
        }
    }

    /// Number of pooled idle connections
    pub fn idle_connections(&self) -> usize {
        self.pool().len()
    }

    /// Store `value` under `key` (flags 0, no expiration)
    pub async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        validate_key(key)?;

        let mut conn = self.checkout().await?;
        let reply = match timeout(self.timeout, store(&mut conn, key, value)).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => return Err(LoadError::backend(&self.addr, e)),
            Err(_) => return Err(self.timed_out()),
        };

        if reply == "STORED" {
            self.checkin(conn);
            Ok(())
        } else {
            Err(LoadError::backend(
                &self.addr,
                format!("unexpected reply {:?} for key {:?}", reply, key),
            ))
        }
    }

    async fn checkout(&self) -> Result<Connection> {
        let pooled = self.pool().pop();
        if let Some(conn) = pooled {
            return Ok(conn);
        }

        debug!(addr = %self.addr, "Dialing memcached");
        let stream = match timeout(self.timeout, TcpStream::connect(&self.addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(LoadError::backend(&self.addr, e)),
            Err(_) => return Err(self.timed_out()),
        };
        stream
            .set_nodelay(true)
            .map_err(|e| LoadError::backend(&self.addr, e))?;

        Ok(BufStream::new(stream))
    }

    fn checkin(&self, conn: Connection) {
        let mut idle = self.pool();
        if idle.len() < self.max_idle {
            idle.push(conn);
        }
    }

    // Poisoning is ignored; the Vec is never left half-updated
    fn pool(&self) -> MutexGuard<'_, Vec<Connection>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn timed_out(&self) -> LoadError {
        LoadError::backend(&self.addr, format!("timed out after {:?}", self.timeout))
    }
}

impl std::fmt::Debug for MemcacheClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemcacheClient")
            .field("addr", &self.addr)
            .field("timeout", &self.timeout)
            .field("max_idle", &self.max_idle)
            .finish()
    }
}

#[async_trait]
impl Backend for MemcacheClient {
    fn addr(&self) -> &str {
        &self.addr
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        MemcacheClient::set(self, key, value).await
    }
}

/// Reject keys memcached would refuse: too long, whitespace or control bytes
pub fn validate_key(key: &str) -> Result<()> {
    let legal = key.len() <= MAX_KEY_LENGTH && key.bytes().all(|b| b > b' ' && b != 0x7f);
    if legal {
        Ok(())
    } else {
        Err(LoadError::MalformedKey(key.to_string()))
    }
}

async fn store(conn: &mut Connection, key: &str, value: &[u8]) -> io::Result<String> {
    let header = format!("set {} 0 0 {}\r\n", key, value.len());
    conn.write_all(header.as_bytes()).await?;
    conn.write_all(value).await?;
    conn.write_all(b"\r\n").await?;
    conn.flush().await?;

    let mut reply = String::new();
    if conn.read_line(&mut reply).await? == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed before reply",
        ));
    }
    Ok(reply.trim_end().to_string())
}
