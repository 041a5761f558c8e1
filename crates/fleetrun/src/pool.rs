//! Worker pool & multiplexer (SPEC_FULL §4.D): owns every worker's channel
//! endpoints and thread handle, fans in readiness over all live workers with
//! `crossbeam_channel::Select` (the idiomatic replacement for the original's
//! `epoll` loop over pipe file descriptors), drives the coordinator, and
//! respawns any worker whose channel breaks.

use crate::channel::{self, FrameReceiver, FrameSender};
use crate::coordinator::Coordinator;
use crate::error::{FleetError, FleetResult};
use crate::ssh::SshConnector;
use crate::worker;
use log::{error, info, warn};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

pub const MAX_CONCURRENCY: usize = 32;

struct WorkerSlot {
  handle: Option<JoinHandle<FleetResult<()>>>,
  inbound: FrameReceiver,
}

fn spawn_one(id: usize, connector: Arc<dyn SshConnector>) -> (WorkerSlot, FrameSender) {
  let (worker_tx, coord_rx) = channel::pair();
  let (coord_tx, worker_rx) = channel::pair();
  let handle = std::thread::Builder::new()
    .name(format!("fleetrun-worker-{id}"))
    .spawn(move || worker::run(id, worker_tx, worker_rx, connector))
    .expect("failed to spawn worker thread");
  (
    WorkerSlot {
      handle: Some(handle),
      inbound: coord_rx,
    },
    coord_tx,
  )
}

pub struct Pool {
  connector: Arc<dyn SshConnector>,
  slots: Vec<WorkerSlot>,
}

impl Pool {
  /// Spawns `n_workers` (1..=[`MAX_CONCURRENCY`]) workers and returns the
  /// pool together with the coordinator-facing senders `Coordinator::new`
  /// expects as `to_workers`.
  pub fn spawn(n_workers: usize, connector: Arc<dyn SshConnector>) -> FleetResult<(Pool, Vec<FrameSender>)> {
    if n_workers == 0 || n_workers > MAX_CONCURRENCY {
      return Err(FleetError::Config(format!(
        "concurrency must be between 1 and {MAX_CONCURRENCY}, got {n_workers}"
      )));
    }
    let mut slots = Vec::with_capacity(n_workers);
    let mut to_workers = Vec::with_capacity(n_workers);
    for id in 0..n_workers {
      let (slot, to_worker) = spawn_one(id, connector.clone());
      slots.push(slot);
      to_workers.push(to_worker);
    }
    Ok((Pool { connector, slots }, to_workers))
  }

  /// Main loop (SPEC_FULL §4.D). Runs until the coordinator reports
  /// completion or a fatal error occurs; consumes the coordinator.
  pub fn run(mut self, mut coordinator: Coordinator) -> FleetResult<()> {
    loop {
      if coordinator.is_finished() {
        info!("all hosts dispatched, shutting down the pool");
        let result = coordinator.finish();
        self.join_all();
        return result;
      }

      let Some(worker) = self.select_ready() else {
        std::thread::sleep(Duration::from_millis(10));
        continue;
      };

      match self.slots[worker].inbound.recv() {
        Ok(frame) => {
          if let Err(e) = coordinator.handle(worker, frame) {
            if matches!(e, FleetError::Aborted) {
              warn!("operator declined a group confirmation, aborting the run");
            } else {
              error!("coordinator failed handling worker {worker}: {e}");
            }
            drop(coordinator);
            self.join_all();
            return Err(e);
          }
        }
        Err(FleetError::ChannelBroken(reason)) => {
          warn!("worker {worker} channel broke ({reason}), respawning");
          coordinator.on_worker_lost(worker);
          self.respawn(worker, &mut coordinator);
        }
        Err(other) => {
          error!("worker {worker} produced a fatal error: {other}");
          drop(coordinator);
          self.join_all();
          return Err(other);
        }
      }
    }
  }

  fn select_ready(&self) -> Option<usize> {
    if self.slots.is_empty() {
      return None;
    }
    let mut sel = crossbeam_channel::Select::new();
    for slot in &self.slots {
      sel.recv(slot.inbound.inner());
    }
    sel.try_ready().ok()
  }

  fn respawn(&mut self, worker: usize, coordinator: &mut Coordinator) {
    if let Some(handle) = self.slots[worker].handle.take() {
      let _ = handle.join();
    }
    let (slot, to_worker) = spawn_one(worker, self.connector.clone());
    self.slots[worker] = slot;
    coordinator.replace_to_worker(worker, to_worker);
  }

  fn join_all(&mut self) {
    for slot in &mut self.slots {
      if let Some(handle) = slot.handle.take() {
        let _ = handle.join();
      }
    }
  }
}
