//! memc-load Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Loads gzipped installed-apps TSV dumps into four memcached servers, one
//! per device type (`idfa`, `gaid`, `adid`, `dvid`).
//!
//! # Pipeline
//!
//! - **Readers** ([`reader`]): one per input file, stream decompressed lines
//!   into a bounded line queue and commit the file by dot-renaming it
//! - **Parse workers** ([`worker::parse_worker`]): parse, route and encode
//!   lines into upload jobs
//! - **Upload workers** ([`worker::upload_worker`]): store each job in its
//!   shard's memcached
//!
//! The [`pipeline::Pipeline`] supervisor drains the stages in order and
//! reports `Processed: N, Errors: M`.
//!
//! # Example
//!
//! ```no_run
//! use memc_load::{resolve_pattern, LoaderConfig, Pipeline, ShardRouter};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = LoaderConfig {
//!         dry: true,
//!         ..LoaderConfig::default()
//!     };
//!     let files = resolve_pattern(&config.pattern)?;
//!     let pipeline = Pipeline::new(config.pipeline(), ShardRouter::from_config(&config));
//!     let summary = pipeline.run(files).await;
//!     println!("{}", summary);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod config;
pub mod memcache;
pub mod metrics;
pub mod pipeline;
pub mod proto;
pub mod reader;
pub mod record;
pub mod router;
pub mod worker;

pub use backend::{Backend, DryRunBackend};
pub use config::{Cli, LoaderConfig};
pub use memcache::MemcacheClient;
pub use metrics::{Counters, Totals};
pub use pipeline::{resolve_pattern, Pipeline, PipelineConfig, RunSummary};
pub use record::{parse_line, AppsInstalled, DeviceType};
pub use router::ShardRouter;
