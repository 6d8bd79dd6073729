//! Implementation of the `convoy gdm` command.

use anyhow::Result;

use crate::output::{print_info, print_json, print_stat, print_success, symbols, truncate_hash};

use super::{Remote, runtime};

pub fn cmd_gdm(remote: &Remote, verbose: bool) -> Result<()> {
  let client = remote.client()?;
  let (gdm, updater) = runtime()?.block_on(client.gdm())?;

  if remote.json {
    return print_json(&gdm);
  }

  if gdm.deployments.is_empty() {
    print_info("The GDM has no deployments.");
    return Ok(());
  }

  print_success(&format!("{} deployment(s)", gdm.deployments.len()));
  print_stat("ETag", truncate_hash(&updater.snapshot().fingerprint.0));
  println!();
  for (id, spec) in gdm.deployments.iter() {
    println!("  {} {} @ {}", symbols::INFO, id, spec.version);
    if verbose {
      print_stat("instances", &spec.num_instances.to_string());
      for (key, value) in &spec.env {
        print_stat(key, value);
      }
    }
  }
  Ok(())
}
