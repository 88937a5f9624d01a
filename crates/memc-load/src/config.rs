//! Loader configuration
//!
//! Command-line flags (each also readable from a `MEMC_*` environment
//! variable) are parsed into [`Cli`] and validated into [`LoaderConfig`].

use clap::Parser;
use memc_common::{LoadError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::pipeline::PipelineConfig;
use crate::record::DeviceType;

pub const DEFAULT_PATTERN: &str = "./test_data/*.tsv.gz";

#[derive(Parser, Debug, Clone)]
#[command(name = "memc-load")]
#[command(author, version, about = "Load installed-apps TSV dumps into sharded memcached")]
pub struct Cli {
    /// Number of parse/encode workers
    #[arg(long, env = "MEMC_WORKERS", default_value_t = 3)]
    pub workers: usize,

    /// Number of memcached upload workers
    #[arg(long, env = "MEMC_MCWORKERS", default_value_t = 6)]
    pub mcworkers: usize,

    /// Capacity of the raw line queue
    #[arg(long, env = "MEMC_JOBSLEN", default_value_t = 100)]
    pub jobslen: usize,

    /// Capacity of the encoded job queue
    #[arg(long, env = "MEMC_MCJOBSLEN", default_value_t = 300)]
    pub mcjobslen: usize,

    /// Idle connections kept per memcached server [default: mcworkers + 1]
    #[arg(long, env = "MEMC_MAXCONN")]
    pub maxconn: Option<usize>,

    /// Input file pattern; dot-prefixed (already loaded) files never match
    #[arg(long, env = "MEMC_PATTERN", default_value = DEFAULT_PATTERN)]
    pub pattern: String,

    /// Append log output to this file instead of stdout (empty: stdout)
    #[arg(long, env = "MEMC_LOG", default_value = "")]
    pub log: String,

    /// host:port of the idfa memcached
    #[arg(long, env = "MEMC_IDFA", default_value = "127.0.0.1:33013")]
    pub idfa: String,

    /// host:port of the gaid memcached
    #[arg(long, env = "MEMC_GAID", default_value = "127.0.0.1:33014")]
    pub gaid: String,

    /// host:port of the adid memcached
    #[arg(long, env = "MEMC_ADID", default_value = "127.0.0.1:33015")]
    pub adid: String,

    /// host:port of the dvid memcached
    #[arg(long, env = "MEMC_DVID", default_value = "127.0.0.1:33016")]
    pub dvid: String,

    /// Parse and encode everything but skip memcached
    #[arg(long)]
    pub dry: bool,

    /// Run the protobuf self-check and exit
    #[arg(short, long)]
    pub test: bool,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

/// Validated loader settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoaderConfig {
    pub workers: usize,
    pub mcworkers: usize,
    pub jobslen: usize,
    pub mcjobslen: usize,
    pub maxconn: usize,
    pub pattern: String,
    pub log: Option<PathBuf>,
    pub idfa: String,
    pub gaid: String,
    pub adid: String,
    pub dvid: String,
    pub dry: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            mcworkers: 6,
            jobslen: 100,
            mcjobslen: 300,
            maxconn: 7,
            pattern: DEFAULT_PATTERN.to_string(),
            log: None,
            idfa: "127.0.0.1:33013".to_string(),
            gaid: "127.0.0.1:33014".to_string(),
            adid: "127.0.0.1:33015".to_string(),
            dvid: "127.0.0.1:33016".to_string(),
            dry: false,
        }
    }
}

impl TryFrom<Cli> for LoaderConfig {
    type Error = LoadError;

    fn try_from(cli: Cli) -> Result<Self> {
        let config = Self {
            workers: cli.workers,
            mcworkers: cli.mcworkers,
            jobslen: cli.jobslen,
            mcjobslen: cli.mcjobslen,
            maxconn: cli.maxconn.unwrap_or(cli.mcworkers + 1),
            pattern: cli.pattern,
            log: Some(cli.log).filter(|path| !path.is_empty()).map(PathBuf::from),
            idfa: cli.idfa,
            gaid: cli.gaid,
            adid: cli.adid,
            dvid: cli.dvid,
            dry: cli.dry,
        };

        config.validate()?;
        Ok(config)
    }
}

impl LoaderConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let counts = [
            ("workers", self.workers),
            ("mcworkers", self.mcworkers),
            ("jobslen", self.jobslen),
            ("mcjobslen", self.mcjobslen),
            ("maxconn", self.maxconn),
        ];
        for (name, value) in counts {
            if value == 0 {
                return Err(LoadError::Config(format!("{} must be greater than 0", name)));
            }
        }

        if self.pattern.is_empty() {
            return Err(LoadError::Config("pattern must not be empty".to_string()));
        }

        for dev_type in DeviceType::ALL {
            let addr = self.address(dev_type);
            let valid = addr
                .rsplit_once(':')
                .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
            if !valid {
                return Err(LoadError::Config(format!(
                    "{} address must be host:port, got {:?}",
                    dev_type, addr
                )));
            }
        }

        Ok(())
    }

    /// Memcached address for a device type
    pub fn address(&self, dev_type: DeviceType) -> &str {
        match dev_type {
            DeviceType::Idfa => &self.idfa,
            DeviceType::Gaid => &self.gaid,
            DeviceType::Adid => &self.adid,
            DeviceType::Dvid => &self.dvid,
        }
    }

    /// Worker counts and queue capacities for the pipeline
    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            parse_workers: self.workers,
            upload_workers: self.mcworkers,
            lines_capacity: self.jobslen,
            jobs_capacity: self.mcjobslen,
        }
    }
}
