//! Coordinator (publisher): assigns hosts, dispatches commands, enforces the
//! retry/ignore policy, and records results (SPEC_FULL §4.C).

use crate::channel::FrameSender;
use crate::error::{FleetError, FleetResult};
use crate::model::{CellStatus, GroupConfig, GroupTracker, Outcome, ReceptionPool, RetryCounter, StatusMatrix};
use crate::protocol::Frame;
use crate::store::ResultStore;
use log::{info, warn};
use std::collections::VecDeque;
use std::io::{self, IsTerminal, Write};

/// Blocking operator confirmation, prompted before starting a new group of
/// hosts. A real TTY uses `inquire`; anything else falls back to a bare
/// stdin read, degrading gracefully outside a terminal.
pub trait Confirmer: Send {
  fn confirm(&self, prompt: &str) -> FleetResult<bool>;
}

pub struct InteractiveConfirmer;

impl Confirmer for InteractiveConfirmer {
  fn confirm(&self, prompt: &str) -> FleetResult<bool> {
    if io::stdin().is_terminal() {
      inquire::Confirm::new(prompt)
        .with_default(true)
        .prompt()
        .map_err(|e| FleetError::Config(format!("confirmation prompt failed: {e}")))
    } else {
      print!("{prompt} [Y/n] ");
      io::stdout().flush().ok();
      let mut input = String::new();
      io::stdin()
        .read_line(&mut input)
        .map_err(|e| FleetError::Config(format!("reading confirmation failed: {e}")))?;
      let trimmed = input.trim().to_lowercase();
      Ok(trimmed.is_empty() || trimmed == "y" || trimmed == "yes")
    }
  }
}

/// Coordinator state (SPEC_FULL §3): the host queue, command list, status
/// matrix, reception pool, and retry counter, plus its output collaborators.
pub struct Coordinator {
  host_queue: VecDeque<String>,
  commands: Vec<String>,
  matrix: StatusMatrix,
  pool: ReceptionPool,
  retry_counter: RetryCounter,
  max_retries: usize,
  ignore_fail: bool,
  group: GroupTracker,
  store: Box<dyn ResultStore>,
  confirmer: Box<dyn Confirmer>,
  to_workers: Vec<FrameSender>,
}

impl Coordinator {
  #[allow(clippy::too_many_arguments)]
  pub fn new(
    hosts: Vec<String>,
    commands: Vec<String>,
    to_workers: Vec<FrameSender>,
    ignore_fail: bool,
    max_retries: usize,
    group: Option<GroupConfig>,
    mut store: Box<dyn ResultStore>,
    confirmer: Box<dyn Confirmer>,
  ) -> FleetResult<Self> {
    let n_workers = to_workers.len();
    for host in &hosts {
      store.put_host(host, "pending")?;
    }
    for command in &commands {
      store.put_command(command)?;
    }
    Ok(Self {
      host_queue: hosts.into(),
      matrix: StatusMatrix::new(commands.len(), n_workers),
      commands,
      pool: ReceptionPool::new(n_workers),
      retry_counter: RetryCounter::default(),
      max_retries,
      ignore_fail,
      group: GroupTracker::new(group),
      store,
      confirmer,
      to_workers,
    })
  }

  /// SPEC_FULL §4.C.5: true once every host has been consumed and no
  /// worker is still mid-host.
  pub fn is_finished(&self) -> bool {
    self.host_queue.is_empty() && self.pool.all_idle()
  }

  pub fn n_workers(&self) -> usize {
    self.pool.len()
  }

  /// Dispatches one inbound frame from `worker` to the matching handler.
  pub fn handle(&mut self, worker: usize, frame: Frame) -> FleetResult<()> {
    match frame {
      Frame::Wait => self.assign_host(worker),
      Frame::WaitHost(host) => self.dispatch_next(worker, host),
      Frame::Okay { host, output } => self.on_success(worker, host, output),
      Frame::Fail { host, output } => self.on_failure(worker, host, output),
      other => Err(FleetError::Format(format!(
        "coordinator received an outbound-only frame from a worker: {other:?}"
      ))),
    }
  }

  /// Called by the pool when a worker's channel breaks unexpectedly
  /// (SPEC_FULL §4.D, §5 crash recovery). The lost host is not re-queued
  /// (Open Question 2); any cell left `Handling` is settled to `Fail` so
  /// the status matrix invariant and `is_finished` both stay sound.
  pub fn on_worker_lost(&mut self, worker: usize) {
    if let Some(host) = self.pool.host_of(worker) {
      warn!("worker {worker}: lost host {host} to a crash, not re-queueing");
    }
    for idx in 0..self.matrix.n_commands() {
      if self.matrix.get(idx, worker) == CellStatus::Handling {
        self.matrix.set(idx, worker, CellStatus::Fail);
      }
    }
    self.pool.clear(worker);
  }

  pub fn finish(mut self) -> FleetResult<()> {
    self.store.commit()
  }

  /// Installed by the pool after it respawns a crashed worker with a fresh
  /// channel pair; coordinator-side state for `worker` is otherwise untouched.
  pub fn replace_to_worker(&mut self, worker: usize, sender: FrameSender) {
    self.to_workers[worker] = sender;
  }

  fn current_index(&self, worker: usize) -> FleetResult<usize> {
    self.matrix
      .handling_in_column(worker)
      .ok_or_else(|| FleetError::Format(format!("worker {worker} has no command in flight")))
  }

  /// 4.C.1
  fn assign_host(&mut self, worker: usize) -> FleetResult<()> {
    if self.commands.is_empty() {
      return Ok(());
    }

    if self.group.prompt_due() {
      let size = self.group.size().unwrap_or(0);
      let ok = self
        .confirmer
        .confirm(&format!("Start the next group of {size} hosts?"))?;
      if !ok {
        return Err(FleetError::Aborted);
      }
    }

    let Some(host) = self.host_queue.pop_front() else {
      return Ok(());
    };

    info!("assigning host {host} to worker {worker}");
    self.pool.assign(worker, host.clone());
    self.matrix.reset_column(worker);
    self.retry_counter.reset();
    self.group.record_assignment();
    self.to_workers[worker].send(&Frame::Ack(host))
  }

  /// 4.C.2
  fn dispatch_next(&mut self, worker: usize, _host: String) -> FleetResult<()> {
    if self.matrix.handling_in_column(worker).is_some() {
      return Ok(());
    }
    if let Some(idx) = self.matrix.next_wait_in_column(worker) {
      self.matrix.set(idx, worker, CellStatus::Handling);
      self.to_workers[worker].send(&Frame::Cmd)?;
      self.to_workers[worker].send_raw(&self.commands[idx])
    } else {
      self.to_workers[worker].send(&Frame::End)?;
      self.pool.clear(worker);
      Ok(())
    }
  }

  /// 4.C.3
  fn on_success(&mut self, worker: usize, host: String, output: String) -> FleetResult<()> {
    let idx = self.current_index(worker)?;
    self.matrix.set(idx, worker, CellStatus::Okay);
    self.store.put_result(&host, &self.commands[idx], Outcome::Okay, &output)?;
    self.to_workers[worker].send(&Frame::OkayAck)
  }

  /// 4.C.4
  fn on_failure(&mut self, worker: usize, host: String, output: String) -> FleetResult<()> {
    let idx = self.current_index(worker)?;

    if self.ignore_fail {
      self.matrix.set(idx, worker, CellStatus::Fail);
      self.store.put_result(&host, &self.commands[idx], Outcome::Fail, &output)?;
      self.retry_counter.reset();
      return self.to_workers[worker].send(&Frame::Ignore);
    }

    if !self.retry_counter.exhausted(self.max_retries) {
      self.retry_counter.increment();
      return self.to_workers[worker].send(&Frame::Retry);
    }

    self.matrix.set(idx, worker, CellStatus::Fail);
    self.store.put_result(&host, &self.commands[idx], Outcome::Fail, &output)?;
    self.to_workers[worker].send(&Frame::End)?;
    self.pool.clear(worker);
    Ok(())
  }
}

/// A [`Confirmer`] that always answers the same way, for tests (unit tests in
/// this crate and the integration tests under `tests/` alike).
pub struct AutoConfirmer(pub bool);

impl Confirmer for AutoConfirmer {
  fn confirm(&self, _prompt: &str) -> FleetResult<bool> {
    Ok(self.0)
  }
}
