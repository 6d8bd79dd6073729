//! CLI output formatting utilities.
//!
//! Colored status lines, resolution symbols, and JSON output.

use anyhow::Context;
use owo_colors::{OwoColorize, Stream};

use convoy_lib::queue::{QueuedRectification, ResolutionKind};

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const WARNING: &str = "⚠";
  pub const INFO: &str = "•";
  pub const PENDING: &str = "…";
  pub const ADD: &str = "+";
  pub const MODIFY: &str = "~";
  pub const REMOVE: &str = "-";
  pub const NONE: &str = "=";
}

/// Shortens an entity tag or id for display.
pub fn truncate_hash(hash: &str) -> &str {
  let len = hash.len().min(12);
  &hash[..len]
}

pub fn kind_symbol(kind: ResolutionKind) -> &'static str {
  match kind {
    ResolutionKind::Create => symbols::ADD,
    ResolutionKind::Modify => symbols::MODIFY,
    ResolutionKind::Delete => symbols::REMOVE,
    ResolutionKind::Unchanged => symbols::NONE,
  }
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    symbols::WARNING.if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

pub fn print_info(message: &str) {
  println!(
    "{} {}",
    symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
    message
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

/// One line per queued rectification: position, id, intended change, outcome.
pub fn print_item(item: &QueuedRectification) {
  let kind = ResolutionKind::intended(&item.rectification);
  let outcome = match &item.resolution {
    None => format!("{}", symbols::PENDING.if_supports_color(Stream::Stdout, |s| s.dimmed())),
    Some(resolution) => match &resolution.error {
      None => format!("{}", symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green())),
      Some(err) => format!(
        "{} {}",
        symbols::ERROR.if_supports_color(Stream::Stdout, |s| s.red()),
        err.message
      ),
    },
  };
  println!(
    "  {:>3} {} {} {}",
    item.pos,
    kind_symbol(kind),
    truncate_hash(&item.id.0),
    outcome
  );
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}
