//! memc-load - installed-apps memcached loader

use anyhow::{Context, Result};
use clap::Parser;
use memc_common::logging::{init_logging, LogConfig, LogLevel};
use memc_load::{proto, resolve_pattern, Cli, LoaderConfig, Pipeline, ShardRouter};
use tracing::{debug, info};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let verbose = cli.verbose;
    let self_test = cli.test;
    let config = LoaderConfig::try_from(cli)?;

    let mut log_config = LogConfig::from_env()?;
    if verbose || config.dry {
        log_config = log_config.with_level(LogLevel::Debug);
    }
    if let Some(ref path) = config.log {
        log_config = log_config.append_to(path);
    }
    let _guard = init_logging(&log_config)?;

    info!("Memc loader started with options: {}", serde_json::to_string(&config)?);

    if self_test {
        proto::self_check().context("Protobuf self-check failed")?;
        info!("Protobuf self-check passed");
        return Ok(());
    }

    let router = ShardRouter::from_config(&config);
    debug!(?router, "Shards ready");

    let files = resolve_pattern(&config.pattern)
        .with_context(|| format!("Couldn't resolve pattern {}", config.pattern))?;
    if files.is_empty() {
        info!("No files match {}", config.pattern);
    }

    let summary = Pipeline::new(config.pipeline(), router).run(files).await;
    debug!(
        files_committed = summary.files_committed,
        files_failed = summary.files_failed,
        "Run finished"
    );

    Ok(())
}
