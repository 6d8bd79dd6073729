//! Implementation of the `convoy rectify-all` command.

use anyhow::Result;

use crate::output::{print_json, print_stat, print_success, print_warning};

use super::{Remote, runtime};

pub fn cmd_rectify_all(remote: &Remote) -> Result<()> {
  let client = remote.client()?;
  let report = runtime()?.block_on(client.rectify_all())?;

  if remote.json {
    return print_json(&report);
  }

  print_success("Convergence pass complete");
  print_stat("Queued", &report.queued.to_string());
  print_stat("Already outstanding", &report.outstanding.to_string());
  for cluster in &report.unreachable {
    print_warning(&format!("cluster {cluster} was unreachable"));
  }
  Ok(())
}
