use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::server::AppContext;
use crate::state::StoreError;

use super::gather::{gather_deployments, pair_deployments};

/// Outcome of one convergence pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoResolveReport {
  /// Rectifications newly queued.
  pub queued: usize,
  /// Targets skipped because a rectification was already outstanding.
  pub outstanding: usize,
  /// Clusters that could not be read; their targets were left alone.
  pub unreachable: Vec<String>,
}

/// Compares the GDM with every cluster and queues a rectification for each
/// target that differs, skipping targets with one already outstanding.
///
/// Clusters come from configuration, or from the GDM when none are configured.
pub async fn auto_resolve(ctx: &AppContext) -> Result<AutoResolveReport, StoreError> {
  let state = ctx.read_state().await?;
  let clusters: BTreeSet<String> = if ctx.config.clusters.is_empty() {
    state.gdm.deployments.clusters()
  } else {
    ctx.config.clusters.iter().cloned().collect()
  };

  let mut report = AutoResolveReport::default();
  let mut reachable = BTreeSet::new();
  let mut actual = Vec::new();
  for gathered in gather_deployments(Arc::clone(&ctx.inventory), &clusters, ctx.config.parallelism).await {
    match gathered.result {
      Ok(deployed) => {
        reachable.insert(gathered.cluster);
        actual.extend(deployed);
      }
      Err(e) => warn!(cluster = %gathered.cluster, error = %e, "cluster unreachable, skipping"),
    }
  }
  report.unreachable = clusters.difference(&reachable).cloned().collect();

  for rectification in pair_deployments(&state.gdm.deployments, &actual) {
    if !reachable.contains(&rectification.target.cluster) {
      continue;
    }
    match ctx.queues.push_if_empty(rectification) {
      Some(_) => report.queued += 1,
      None => report.outstanding += 1,
    }
  }

  info!(
    queued = report.queued,
    outstanding = report.outstanding,
    unreachable = report.unreachable.len(),
    "convergence pass complete"
  );
  Ok(report)
}

/// Runs [`auto_resolve`] every `interval` until the task is aborted.
pub fn spawn_auto_resolver(ctx: AppContext, interval: Duration) -> JoinHandle<()> {
  tokio::spawn(async move {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
      ticker.tick().await;
      if ctx.queues.is_shut_down() {
        break;
      }
      if let Err(e) = auto_resolve(&ctx).await {
        error!(error = %e, "convergence pass failed");
      }
    }
  })
}
