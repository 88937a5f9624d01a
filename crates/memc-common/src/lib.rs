//! memc-load common library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling and logging for the memc-load workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`LoadError`] covers every failure the loader can
//!   observe, from malformed input lines to memcached replies
//! - **Logging**: `tracing` subscriber setup driven by [`logging::LogConfig`]
//!
//! # Example
//!
//! ```no_run
//! use memc_common::{LoadError, Result};
//!
//! fn check_fields(fields: &[&str]) -> Result<()> {
//!     if fields.len() != 5 {
//!         return Err(LoadError::BadLine(fields.join("\t")));
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{LoadError, Result};
