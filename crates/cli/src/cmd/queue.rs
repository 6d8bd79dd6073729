//! Implementations of the `convoy queues`, `convoy queue` and `convoy item` commands.

use std::time::Duration;

use anyhow::Result;

use convoy_lib::gdm::DeploymentTargetId;
use convoy_lib::queue::RectificationId;

use crate::output::{print_info, print_item, print_json, print_stat, print_success, symbols};

use super::{Remote, runtime};

pub fn cmd_queues(remote: &Remote) -> Result<()> {
  let client = remote.client()?;
  let response = runtime()?.block_on(client.queues())?;

  if remote.json {
    return print_json(&response);
  }
  if response.queues.is_empty() {
    print_info("No rectifications have been queued.");
    return Ok(());
  }
  for summary in &response.queues {
    println!("  {} {} ({} pending)", symbols::INFO, summary.target, summary.length);
  }
  Ok(())
}

pub fn cmd_queue(remote: &Remote, target: &DeploymentTargetId, verbose: bool) -> Result<()> {
  let client = remote.client()?;
  let response = runtime()?.block_on(client.queue(target))?;

  if remote.json {
    return print_json(&response);
  }
  if response.queue.is_empty() {
    print_info(&format!("Nothing pending for {target}"));
    return Ok(());
  }
  print_success(&format!("{} pending for {target}", response.queue.len()));
  for item in &response.queue {
    print_item(item);
    if verbose && let Some(post) = &item.rectification.post {
      print_stat("version", &post.deployment.spec.version);
    }
  }
  Ok(())
}

pub fn cmd_item(remote: &Remote, target: &DeploymentTargetId, id: &str, wait: Option<Duration>) -> Result<()> {
  let client = remote.client()?;
  let item = runtime()?.block_on(client.item(target, &RectificationId::from(id), wait))?;

  if remote.json {
    return print_json(&item);
  }
  print_item(&item);
  if let Some(resolution) = &item.resolution
    && let Some(state) = &resolution.deploy_state
  {
    print_stat("deployed", &state.deployment.spec.version);
  }
  Ok(())
}
