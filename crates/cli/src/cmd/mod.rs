mod deployment;
mod gdm;
mod queue;
mod rectify;
mod serve;

pub use deployment::{cmd_deployment, cmd_set_version};
pub use gdm::cmd_gdm;
pub use queue::{cmd_item, cmd_queue, cmd_queues};
pub use rectify::cmd_rectify_all;
pub use serve::cmd_serve;

use anyhow::{Context, Result};
use tokio::runtime::Runtime;

use convoy_lib::client::Client;
use convoy_lib::gdm::User;

/// How to reach the server, and how to print what it says.
pub struct Remote {
  pub server: String,
  pub user: Option<String>,
  pub json: bool,
}

impl Remote {
  pub fn client(&self) -> Result<Client> {
    let client = Client::new(&self.server).with_context(|| format!("Invalid server URL: {}", self.server))?;
    Ok(match &self.user {
      Some(name) => client.with_user(User::new(name.as_str(), "")),
      None => client,
    })
  }
}

pub(crate) fn runtime() -> Result<Runtime> {
  Runtime::new().context("Failed to create async runtime")
}
