use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

use keyward::config::Config;
use keyward::directory::Directory;
use keyward::metrics::Metrics;
use keyward::refresh::Refresher;
use keyward::scripts;
use keyward::server::{self, AppState};

#[derive(Debug, Parser)]
#[command(name = "keyward", version, about = "SSH public key distribution server")]
struct Args {
    /// Path to the TOML directory configuration
    #[arg(long, default_value = "config.toml", env = "KEYWARD_CONFIG")]
    config: PathBuf,

    /// Listen address
    #[arg(long, default_value = "0.0.0.0:8080", env = "KEYWARD_ADDR")]
    addr: SocketAddr,

    /// External base URL baked into generated client scripts
    #[arg(long, default_value = "http://localhost:8080", env = "KEYWARD_URL")]
    url: String,

    /// Seconds between key refresh passes
    #[arg(long, default_value_t = 300, env = "KEYWARD_KEYFETCH_INTERVAL",
          value_parser = clap::value_parser!(u64).range(1..))]
    keyfetch_interval: u64,

    /// Per-request timeout in seconds for remote key fetches
    #[arg(long, default_value_t = 10, env = "KEYWARD_FETCH_TIMEOUT")]
    fetch_timeout: u64,

    /// Print the rendered auth.sh to stdout and exit
    #[arg(long)]
    auth_script: bool,

    /// Print the rendered setup.sh to stdout and exit
    #[arg(long)]
    setup_script: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.auth_script {
        print!("{}", scripts::auth_script(&args.url));
        return Ok(());
    }
    if args.setup_script {
        print!("{}", scripts::setup_script(&args.url));
        return Ok(());
    }

    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    fmt().with_env_filter(filter).init();

    info!(
        "keyward {} starting: addr={}, url='{}', config='{}', keyfetch_interval={}s",
        env!("CARGO_PKG_VERSION"),
        args.addr,
        args.url,
        args.config.display(),
        args.keyfetch_interval
    );

    let conf = Config::load(&args.config)
        .with_context(|| format!("loading config from '{}'", args.config.display()))?;
    let directory = Arc::new(Directory::from_config(conf)?);
    let metrics = Arc::new(Metrics::new());

    let (cancel_tx, cancel_rx) = watch::channel(());
    let refresher = Refresher::new(
        directory.clone(),
        metrics.clone(),
        Duration::from_secs(args.fetch_timeout),
        cancel_rx,
    )?;

    // First pass runs before serving so a cold start never answers from an
    // empty cache.
    refresher.refresh_once().await;
    let refresh_task = tokio::spawn(refresher.run(Duration::from_secs(args.keyfetch_interval)));

    let state = AppState {
        directory,
        metrics,
        base_url: args.url,
    };
    server::serve(args.addr, state).await?;

    // Serving has stopped; dropping the sender winds the refresher down.
    drop(cancel_tx);
    let _ = refresh_task.await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse() {
        let args = Args::try_parse_from(["keyward"]).unwrap();
        assert_eq!(args.keyfetch_interval, 300);
        assert_eq!(args.fetch_timeout, 10);
        assert_eq!(args.url, "http://localhost:8080");
    }

    #[test]
    fn zero_keyfetch_interval_is_rejected() {
        let err = Args::try_parse_from(["keyward", "--keyfetch-interval", "0"]).unwrap_err();
        assert!(err.to_string().contains("keyfetch-interval"));
    }
}
