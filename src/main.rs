mod bridge;
mod bus;
mod config;
mod error;
mod event;
mod scrobbler;

use anyhow::{Context, Result};
use bridge::Bridge;
use bus::BusContext;
use clap::Parser;
use config::Config;
use scrobbler::Services;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Scrobble tracks announced on cmus' D-Bus NowPlaying signal
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log debug output from this program
    #[arg(short, long)]
    verbose: bool,

    /// Obtain a Last.fm session key interactively and store it in the config
    #[arg(long)]
    auth_lastfm: bool,
}

fn init_logging(verbose: bool) {
    let env = env_logger::Env::default().default_filter_or(if verbose {
        "info,cmus_scrobbler=debug"
    } else {
        "info"
    });

    let write_style = if atty::is(atty::Stream::Stderr) {
        env_logger::WriteStyle::Auto
    } else {
        env_logger::WriteStyle::Never
    };

    env_logger::Builder::from_env(env)
        .write_style(write_style)
        .init();
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                log::warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    cancel.cancel();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config_path = match args.config {
        Some(path) => path,
        None => Config::config_path()?,
    };
    let mut config = Config::load_from(&config_path)?;

    if args.auth_lastfm {
        return scrobbler::lastfm_auth::authenticate_and_save(&mut config, &config_path);
    }

    let (services, config) = tokio::task::spawn_blocking(move || {
        Services::from_config(&config).map(|services| (services, config))
    })
    .await
    .context("Service setup panicked")??;
    let bridge = Arc::new(Bridge::new(Arc::new(services)));

    let context = BusContext::connect(&config.bus).await?;

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    context.run(bridge, cancel).await
}
