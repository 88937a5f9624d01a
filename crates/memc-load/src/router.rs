//! Device-type shard routing
//!
//! Every recognized device type owns exactly one backend; the table is built
//! once at startup and only read afterwards.

use memc_common::{LoadError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::backend::{Backend, DryRunBackend};
use crate::config::LoaderConfig;
use crate::memcache::{MemcacheClient, SOCKET_TIMEOUT};
use crate::record::DeviceType;

/// Maps device-type tags to their backends
#[derive(Clone)]
pub struct ShardRouter {
    shards: HashMap<DeviceType, Arc<dyn Backend>>,
}

impl ShardRouter {
    /// Build a router with one backend per device type
    pub fn from_fn<F>(mut make_backend: F) -> Self
    where
        F: FnMut(DeviceType) -> Arc<dyn Backend>,
    {
        let shards = DeviceType::ALL
            .into_iter()
            .map(|dev_type| (dev_type, make_backend(dev_type)))
            .collect();
        Self { shards }
    }

    /// Memcached clients (or dry-run sinks) for the configured addresses
    pub fn from_config(config: &LoaderConfig) -> Self {
        Self::from_fn(|dev_type| {
            let addr = config.address(dev_type);
            info!(
                dev_type = %dev_type,
                addr = %addr,
                max_idle = config.maxconn,
                dry = config.dry,
                "Configured shard"
            );
            let backend: Arc<dyn Backend> = if config.dry {
                Arc::new(DryRunBackend::new(addr))
            } else {
                Arc::new(MemcacheClient::new(addr, SOCKET_TIMEOUT, config.maxconn))
            };
            backend
        })
    }

    /// Replace the backend of a single device type
    pub fn with_backend(mut self, dev_type: DeviceType, backend: Arc<dyn Backend>) -> Self {
        self.shards.insert(dev_type, backend);
        self
    }

    /// Backend owning `dev_type`, or `UnknownDevice`
    pub fn route(&self, dev_type: &str) -> Result<&Arc<dyn Backend>> {
        let parsed: DeviceType = dev_type.parse()?;
        self.shards
            .get(&parsed)
            .ok_or_else(|| LoadError::UnknownDevice(dev_type.to_string()))
    }
}

impl std::fmt::Debug for ShardRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for dev_type in DeviceType::ALL {
            if let Some(backend) = self.shards.get(&dev_type) {
                map.entry(&dev_type.as_str(), &backend.addr());
            }
        }
        map.finish()
    }
}
