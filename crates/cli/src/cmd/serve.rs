//! Implementation of the `convoy serve` command.

use std::path::Path;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, warn};

use convoy_lib::config::ServerConfig;
use convoy_lib::platform::paths::default_config_path;
use convoy_lib::server::{AppContext, serve};

use super::runtime;

/// Loads configuration and serves until interrupted.
///
/// An explicit `config` must exist; otherwise the default config path is
/// used when present and built-in defaults when not.
pub fn cmd_serve(config: Option<&Path>, listen: Option<String>, memory: bool) -> Result<()> {
  let mut config = load_config(config)?;
  if let Some(listen) = listen {
    config.listen = listen;
  }
  config.memory |= memory;
  config.validate().context("Invalid configuration")?;
  let addr = config.listen_addr()?;

  let rt = runtime()?;
  rt.block_on(async move {
    if config.memory {
      warn!("GDM is held in memory and will not survive a restart");
    } else {
      info!(path = %config.state_path().display(), "using GDM file");
    }
    let listener = TcpListener::bind(addr)
      .await
      .with_context(|| format!("Failed to bind {addr}"))?;
    let ctx = AppContext::from_config(config);
    serve(ctx, listener, shutdown_signal()).await.context("Server failed")
  })
}

fn load_config(path: Option<&Path>) -> Result<ServerConfig> {
  match path {
    Some(path) => ServerConfig::from_file(path).with_context(|| format!("Failed to load {}", path.display())),
    None => {
      let default = default_config_path();
      if default.exists() {
        ServerConfig::from_file(&default).with_context(|| format!("Failed to load {}", default.display()))
      } else {
        Ok(ServerConfig::default())
      }
    }
  }
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    warn!(error = %e, "failed to listen for ctrl-c");
    std::future::pending::<()>().await;
  }
  info!("shutting down");
}
