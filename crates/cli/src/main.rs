mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use convoy_lib::consts::DEFAULT_LISTEN;
use convoy_lib::gdm::DeploymentTargetId;

/// convoy - shared desired state for deployments, converged per target
#[derive(Parser)]
#[command(name = "convoy")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Print machine-readable JSON instead of text
  #[arg(long, global = true)]
  json: bool,

  /// Base URL of the convoy server
  #[arg(long, global = true, env = "CONVOY_SERVER", default_value_t = format!("http://{DEFAULT_LISTEN}"))]
  server: String,

  /// Name recorded against writes
  #[arg(long, global = true, env = "CONVOY_USER")]
  user: Option<String>,

  #[command(subcommand)]
  command: Commands,
}

/// Addresses one deployment target.
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
  /// Source repository
  #[arg(long)]
  repo: String,

  /// Directory within the repository
  #[arg(long, default_value = "")]
  dir: String,

  /// Deployment flavor
  #[arg(long, default_value = "")]
  flavor: String,

  /// Cluster the deployment runs in
  #[arg(long)]
  cluster: String,
}

impl From<TargetArgs> for DeploymentTargetId {
  fn from(args: TargetArgs) -> Self {
    DeploymentTargetId::new(args.repo, args.cluster)
      .with_dir(args.dir)
      .with_flavor(args.flavor)
  }
}

#[derive(Subcommand)]
enum Commands {
  /// Run the convoy server
  Serve {
    /// Path to a TOML config file
    #[arg(short, long, env = "CONVOY_CONFIG")]
    config: Option<PathBuf>,

    /// Override the listen address
    #[arg(long)]
    listen: Option<String>,

    /// Keep the GDM in memory only
    #[arg(long)]
    memory: bool,
  },

  /// Show the Global Deployment Manifest
  Gdm,

  /// Show one deployment's desired spec
  Deployment {
    #[command(flatten)]
    target: TargetArgs,
  },

  /// Set the version of a deployment, creating it if needed
  SetVersion {
    #[command(flatten)]
    target: TargetArgs,

    /// Version to deploy
    version: String,

    /// Times to redo the update when another writer got there first
    #[arg(long, default_value_t = 3)]
    attempts: usize,

    /// Wait this long for the rectification to finish (e.g. "30s")
    #[arg(long)]
    wait: Option<humantime::Duration>,
  },

  /// List every target with a queue
  Queues,

  /// Show the pending rectifications of one target
  Queue {
    #[command(flatten)]
    target: TargetArgs,
  },

  /// Show one rectification
  Item {
    #[command(flatten)]
    target: TargetArgs,

    /// Rectification id
    id: String,

    /// Wait this long for its resolution (e.g. "30s")
    #[arg(long)]
    wait: Option<humantime::Duration>,
  },

  /// Compare the GDM with every cluster and queue what differs
  RectifyAll,
}

fn main() -> ExitCode {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "info" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  match run(cli) {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      output::print_error(&format!("{e:#}"));
      ExitCode::FAILURE
    }
  }
}

fn run(cli: Cli) -> Result<()> {
  let remote = cmd::Remote {
    server: cli.server,
    user: cli.user,
    json: cli.json,
  };

  match cli.command {
    Commands::Serve { config, listen, memory } => cmd::cmd_serve(config.as_deref(), listen, memory),
    Commands::Gdm => cmd::cmd_gdm(&remote, cli.verbose),
    Commands::Deployment { target } => cmd::cmd_deployment(&remote, &target.into()),
    Commands::SetVersion {
      target,
      version,
      attempts,
      wait,
    } => cmd::cmd_set_version(&remote, &target.into(), &version, attempts, wait.map(Into::into)),
    Commands::Queues => cmd::cmd_queues(&remote),
    Commands::Queue { target } => cmd::cmd_queue(&remote, &target.into(), cli.verbose),
    Commands::Item { target, id, wait } => cmd::cmd_item(&remote, &target.into(), &id, wait.map(Into::into)),
    Commands::RectifyAll => cmd::cmd_rectify_all(&remote),
  }
}
