//! Dropbox notes CLI
//!
//! Single-binary client for a Dropbox-hosted notes vault:
//! 1. Connects a Dropbox account with OAuth2 PKCE (paste-back redirect)
//! 2. Keeps the refresh token under the state directory
//! 3. Reads and writes notes inside one vault folder, with revision checks

mod app;
mod cli;
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::App;
use crate::cli::Cli;
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs on stderr; stdout carries command output
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();

    let (config_path, must_exist) = Config::resolve_path(cli.config.as_deref());
    let config = Config::load(&config_path, must_exist)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    info!(
        state_dir = %config.storage.state_dir.display(),
        api_url = %config.dropbox.api_url,
        "configuration loaded"
    );

    App::new(&config)?.run(cli.command).await
}
