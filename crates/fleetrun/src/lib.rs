//! Fleet-wide SSH command dispatch (see SPEC_FULL.md for the full design).
//!
//! The core is a publisher/subscriber dispatch engine: a [`coordinator::Coordinator`]
//! owning the host queue, command list, and per-worker status matrix, driven
//! by a [`pool::Pool`] of worker threads over a small framed message protocol
//! ([`codec`], [`protocol`]).

pub mod channel;
pub mod cli;
pub mod codec;
pub mod coordinator;
pub mod error;
pub mod input;
pub mod model;
pub mod protocol;
pub mod ssh;
pub mod store;
pub mod worker;

pub mod pool;

use anyhow::{Context, Result};
use clap::Parser;
use cli::Cli;
use coordinator::{Coordinator, InteractiveConfirmer};
use log::info;
use ssh::{Credentials, Ssh2Connector};
use std::sync::Arc;
use store::SqliteStore;

pub fn run() -> Result<()> {
  let cli = Cli::parse();
  init_logging(cli.verbose);
  cli.validate().context("invalid arguments")?;

  let hosts = input::read_hosts(&cli.hosts).context("reading hosts file")?;
  let commands = input::read_commands(&cli.commands).context("reading commands file")?;

  info!(
    "starting run: {} hosts, {} commands, concurrency {}",
    hosts.len(),
    commands.len(),
    cli.concurrency
  );

  let connector = Arc::new(Ssh2Connector::new(Credentials {
    user: cli.user.clone(),
    key_file: cli.keyfile.clone(),
    password: cli.password.clone(),
    port: cli.port,
  }));
  let store = Box::new(SqliteStore::open(&cli.db).context("opening result store")?);

  let (pool, to_workers) = pool::Pool::spawn(cli.concurrency, connector).context("spawning worker pool")?;
  let coordinator = Coordinator::new(
    hosts,
    commands,
    to_workers,
    cli.ignore_fail,
    coordinator_max_retries(),
    cli.group_config(),
    store,
    Box::new(InteractiveConfirmer),
  )
  .context("building coordinator")?;

  pool.run(coordinator).context("running dispatch loop")?;
  info!("run complete");
  Ok(())
}

/// `MAX_RETRIES` (SPEC_FULL §3): one retry after the first failure.
fn coordinator_max_retries() -> usize {
  1
}

fn init_logging(verbose: bool) {
  let default_filter = if verbose { "debug" } else { "info" };
  let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
    .format_timestamp_secs()
    .try_init();
}
