//! Implementations of the `convoy deployment` and `convoy set-version` commands.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::info;

use convoy_lib::client::{Client, ClientError, Updated};
use convoy_lib::gdm::{DeploySpec, DeploymentTargetId};
use convoy_lib::server::wire::TargetQuery;

use crate::output::{print_info, print_item, print_json, print_stat, print_success, print_warning, truncate_hash};

use super::{Remote, runtime};

pub fn cmd_deployment(remote: &Remote, target: &DeploymentTargetId) -> Result<()> {
  let client = remote.client()?;
  let (spec, updater) = runtime()?.block_on(client.deployment(target))?;

  if remote.json {
    return print_json(&spec);
  }

  print_success(&format!("{target}"));
  print_stat("ETag", truncate_hash(&updater.snapshot().fingerprint.0));
  print_stat("Version", &spec.version);
  print_stat("Instances", &spec.num_instances.to_string());
  for (key, value) in &spec.env {
    print_stat(&format!("env {key}"), value);
  }
  for (key, value) in &spec.resources {
    print_stat(&format!("resource {key}"), value);
  }
  Ok(())
}

/// Sets `version` on the target, creating the deployment when it does not
/// exist, and optionally waits for the resulting rectification.
pub fn cmd_set_version(
  remote: &Remote,
  target: &DeploymentTargetId,
  version: &str,
  attempts: usize,
  wait: Option<Duration>,
) -> Result<()> {
  let client = remote.client()?;
  let rt = runtime()?;

  let updated = rt.block_on(set_version(&client, target, version, attempts))?;
  let Some(id) = updated.rectification_id() else {
    print_warning("Desired state recorded, but no rectification was queued");
    return Ok(());
  };
  info!(target_id = %target, id = %id, "rectification queued");

  let item = match wait {
    Some(wait) => rt.block_on(client.item(target, &id, Some(wait)))?,
    None => {
      if remote.json {
        return print_json(&serde_json::json!({ "spec": updated.value, "rectification": id }));
      }
      print_success(&format!("{target} set to {version}"));
      print_stat("Rectification", &id.0);
      return Ok(());
    }
  };

  if remote.json {
    return print_json(&item);
  }
  print_item(&item);
  match &item.resolution {
    None => print_info("Still pending; check again with `convoy item`"),
    Some(resolution) if resolution.is_success() => print_success(&format!("{target} now runs {version}")),
    Some(resolution) => {
      let message = resolution.error.as_ref().map(|e| e.message.as_str()).unwrap_or("unknown error");
      bail!("Rectification of {target} failed: {message}");
    }
  }
  Ok(())
}

async fn set_version(
  client: &Client,
  target: &DeploymentTargetId,
  version: &str,
  attempts: usize,
) -> Result<Updated<DeploySpec>> {
  let query = TargetQuery::from(target);
  let pairs = query.pairs();
  match client
    .modify::<DeploySpec, _>("/single-deployment", &pairs, attempts, |spec| {
      spec.version = version.to_string()
    })
    .await
  {
    Ok(updated) => Ok(updated),
    Err(ClientError::NotFound(_)) => {
      info!(target_id = %target, "deployment does not exist, creating it");
      client
        .create("/single-deployment", &pairs, &DeploySpec::new(version))
        .await
        .with_context(|| format!("Failed to create {target}"))
    }
    Err(e) => Err(e).with_context(|| format!("Failed to update {target}")),
  }
}
