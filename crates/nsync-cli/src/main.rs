//! `nsync` - mirror a remote circle/role graph into chat platform structures
//!
//! Configuration is layered: TOML file (`--config`), then environment
//! (`NESTR_API_URL`, `NESTR_TOKEN`, `NESTR_USERID`), then flags.

mod cli;
mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use cli::Cli;
use nsync_core::{SyncConfig, SyncError};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.json);

    if let Err(err) = run(cli).await {
        eprintln!("error: {err:#}");
        if err
            .downcast_ref::<SyncError>()
            .is_some_and(SyncError::is_reauth_required)
        {
            eprintln!("hint: the remote credential was rejected; run `nsync login` again");
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let env = |key: &str| std::env::var(key).ok();
    let mut stdout = std::io::stdout().lock();
    commands::execute(cli.command, &config, &env, &mut stdout).await
}

fn load_config(cli: &Cli) -> Result<SyncConfig> {
    let mut config = match &cli.config {
        Some(path) => SyncConfig::from_toml_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => SyncConfig::default(),
    }
    .apply_env();

    if let Some(url) = &cli.api_url {
        config.api_base_url.clone_from(url);
    }
    if let Some(store) = &cli.store {
        config.store_path.clone_from(store);
    }
    if let Some(credentials) = &cli.credentials {
        config.credentials_path.clone_from(credentials);
    }
    config.validate().context("invalid configuration")?;
    tracing::debug!(api = %config.api_base_url, store = %config.store_path.display(), "configuration loaded");
    Ok(config)
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
