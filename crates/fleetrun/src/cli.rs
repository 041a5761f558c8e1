//! Command-line surface (SPEC_FULL §6).

use crate::error::{FleetError, FleetResult};
use crate::model::GroupConfig;
use clap::Parser;
use std::path::PathBuf;

use crate::pool::MAX_CONCURRENCY;

/// Run an ordered list of shell commands over SSH across a fleet of hosts.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
  /// Worker count.
  #[arg(short = 'c', long, default_value_t = 1)]
  pub concurrency: usize,

  /// Group size; the operator is asked to confirm before each group starts.
  #[arg(short = 'g', long)]
  pub group: Option<usize>,

  /// Hosts file, one host per line.
  #[arg(short = 'o', long)]
  pub hosts: PathBuf,

  /// Commands file, one command per line.
  #[arg(short = 'm', long)]
  pub commands: PathBuf,

  /// SSH user.
  #[arg(short = 'u', long)]
  pub user: String,

  /// SSH private key file.
  #[arg(short = 'k', long)]
  pub keyfile: Option<PathBuf>,

  /// SSH password.
  #[arg(short = 'p', long)]
  pub password: Option<String>,

  /// SSH port.
  #[arg(long, default_value_t = 22)]
  pub port: u16,

  /// Don't abort a host on command failure.
  #[arg(short = 'i', long)]
  pub ignore_fail: bool,

  /// Result store path.
  #[arg(short = 'd', long, default_value = "./fleetrun.db")]
  pub db: PathBuf,

  /// Raise the log level to debug.
  #[arg(short = 'v', long)]
  pub verbose: bool,
}

impl Cli {
  /// Cross-field validation clap's declarative attributes can't express
  /// (SPEC_FULL §6): concurrency bounds, group/concurrency ordering, and
  /// the key-file-or-password requirement.
  pub fn validate(&self) -> FleetResult<()> {
    if self.concurrency == 0 || self.concurrency > MAX_CONCURRENCY {
      return Err(FleetError::Config(format!(
        "--concurrency must be between 1 and {MAX_CONCURRENCY}, got {}",
        self.concurrency
      )));
    }
    if let Some(group) = self.group {
      if group < self.concurrency {
        return Err(FleetError::Config(format!(
          "--group ({group}) must be >= --concurrency ({})",
          self.concurrency
        )));
      }
    }
    if self.keyfile.is_none() && self.password.is_none() {
      return Err(FleetError::Config(
        "at least one of --keyfile / --password is required".into(),
      ));
    }
    Ok(())
  }

  pub fn group_config(&self) -> Option<GroupConfig> {
    self.group.map(|size| GroupConfig { size })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn base() -> Cli {
    Cli {
      concurrency: 2,
      group: None,
      hosts: "hosts.txt".into(),
      commands: "commands.txt".into(),
      user: "ops".into(),
      keyfile: Some("id_rsa".into()),
      password: None,
      port: 22,
      ignore_fail: false,
      db: "./fleetrun.db".into(),
      verbose: false,
    }
  }

  #[test]
  fn valid_args_pass() {
    assert!(base().validate().is_ok());
  }

  #[test]
  fn rejects_zero_concurrency() {
    let mut cli = base();
    cli.concurrency = 0;
    assert!(cli.validate().is_err());
  }

  #[test]
  fn rejects_concurrency_over_the_cap() {
    let mut cli = base();
    cli.concurrency = MAX_CONCURRENCY + 1;
    assert!(cli.validate().is_err());
  }

  #[test]
  fn rejects_group_smaller_than_concurrency() {
    let mut cli = base();
    cli.concurrency = 4;
    cli.group = Some(2);
    assert!(cli.validate().is_err());
  }

  #[test]
  fn rejects_missing_credentials() {
    let mut cli = base();
    cli.keyfile = None;
    cli.password = None;
    assert!(cli.validate().is_err());
  }

  #[test]
  fn password_alone_satisfies_credentials() {
    let mut cli = base();
    cli.keyfile = None;
    cli.password = Some("hunter2".into());
    assert!(cli.validate().is_ok());
  }
}
