use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use scriptgate_core::{spawn_watchdog, sweep_pending_promotions, EngineConfig, METRICS};
use scriptgate_state::{FsProjectStore, ProjectStore};
use tokio::sync::watch;
use tracing::{info, Level};

/// Promotion watchdog: periodically evaluates finished rerenders that asked
/// to be auto-promoted and whose evaluation was never recorded.
#[derive(Parser)]
#[command(name = "scriptgated")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// TOML config file
    #[arg(long, env = "SCRIPTGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Project store directory
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Sweep interval in seconds (overrides config)
    #[arg(long)]
    interval: Option<u64>,

    /// Run a single sweep and exit
    #[arg(long)]
    once: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,

    #[arg(short, long)]
    verbose: bool,
}

fn load_config(args: &Args) -> Result<EngineConfig> {
    let mut config =
        EngineConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    if let Some(dir) = &args.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(secs) = args.interval {
        config.promotion.watchdog_interval_secs = secs;
    }
    Ok(config)
}

async fn run(args: Args) -> Result<()> {
    let config = load_config(&args)?;
    let store: Arc<dyn ProjectStore> = Arc::new(
        FsProjectStore::new(&config.data_dir)
            .with_context(|| format!("failed to open project store at {:?}", config.data_dir))?,
    );
    info!(data_dir = %config.data_dir.display(), "scriptgated starting");

    if args.once {
        let report = sweep_pending_promotions(store.as_ref(), &config.promotion).await?;
        info!(
            roots = report.roots,
            evaluated = report.evaluated,
            promoted = report.promoted,
            errors = report.errors,
            "sweep finished"
        );
        METRICS.flush();
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let watchdog = spawn_watchdog(store, config.promotion.clone(), shutdown_rx);

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutdown requested");
    let _ = shutdown_tx.send(true);
    watchdog.await.context("watchdog task panicked")?;
    METRICS.flush();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    scriptgate_core::init_tracing(args.json, level);
    run(args).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let dir = tempfile::tempdir().unwrap();
        let args = Args::try_parse_from([
            "scriptgated",
            "--data-dir",
            dir.path().to_str().unwrap(),
            "--interval",
            "5",
            "--once",
        ])
        .unwrap();
        let config = load_config(&args).unwrap();
        assert_eq!(config.data_dir, dir.path());
        assert_eq!(config.promotion.watchdog_interval_secs, 5);
        assert!(args.once);
    }

    #[tokio::test]
    async fn single_sweep_on_empty_store_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let args = Args::try_parse_from([
            "scriptgated",
            "--data-dir",
            dir.path().to_str().unwrap(),
            "--once",
        ])
        .unwrap();
        run(args).await.unwrap();
        assert!(dir.path().join("projects").is_dir());
    }
}
