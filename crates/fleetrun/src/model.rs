//! State the coordinator owns exclusively: status matrix, reception pool,
//! retry counter, result records, and the group-confirmation tracker (SPEC_FULL §3).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellStatus {
  Wait,
  Handling,
  Okay,
  Fail,
}

impl CellStatus {
  pub fn is_settled(self) -> bool {
    matches!(self, CellStatus::Okay | CellStatus::Fail)
  }
}

/// `cell(command_index, worker)`, `Wait -> Handling -> {Okay, Fail}`, with
/// `reset_column` the only edge back to `Wait` (on host (re)assignment).
#[derive(Debug)]
pub struct StatusMatrix {
  n_commands: usize,
  cells: Vec<Vec<CellStatus>>,
}

impl StatusMatrix {
  pub fn new(n_commands: usize, n_workers: usize) -> Self {
    Self {
      n_commands,
      cells: vec![vec![CellStatus::Wait; n_workers]; n_commands],
    }
  }

  pub fn n_commands(&self) -> usize {
    self.n_commands
  }

  pub fn get(&self, command_index: usize, worker: usize) -> CellStatus {
    self.cells[command_index][worker]
  }

  pub fn set(&mut self, command_index: usize, worker: usize, status: CellStatus) {
    self.cells[command_index][worker] = status;
  }

  pub fn reset_column(&mut self, worker: usize) {
    for row in &mut self.cells {
      row[worker] = CellStatus::Wait;
    }
  }

  pub fn handling_in_column(&self, worker: usize) -> Option<usize> {
    (0..self.n_commands).find(|&i| self.cells[i][worker] == CellStatus::Handling)
  }

  pub fn next_wait_in_column(&self, worker: usize) -> Option<usize> {
    (0..self.n_commands).find(|&i| self.cells[i][worker] == CellStatus::Wait)
  }

  pub fn column_done(&self, worker: usize) -> bool {
    (0..self.n_commands).all(|i| self.cells[i][worker].is_settled())
  }
}

/// One reception-pool slot: a worker's currently assigned host, if any.
#[derive(Debug, Clone)]
struct Slot {
  assigned_host: Option<String>,
}

/// Fixed-size table of `worker_id -> assigned_host`.
#[derive(Debug)]
pub struct ReceptionPool {
  slots: Vec<Slot>,
}

impl ReceptionPool {
  pub fn new(n_workers: usize) -> Self {
    Self {
      slots: vec![Slot { assigned_host: None }; n_workers],
    }
  }

  pub fn len(&self) -> usize {
    self.slots.len()
  }

  pub fn is_empty(&self) -> bool {
    self.slots.is_empty()
  }

  pub fn assign(&mut self, worker: usize, host: String) {
    self.slots[worker].assigned_host = Some(host);
  }

  pub fn clear(&mut self, worker: usize) {
    self.slots[worker].assigned_host = None;
  }

  pub fn host_of(&self, worker: usize) -> Option<&str> {
    self.slots[worker].assigned_host.as_deref()
  }

  pub fn worker_for_host(&self, host: &str) -> Option<usize> {
    self.slots
      .iter()
      .position(|s| s.assigned_host.as_deref() == Some(host))
  }

  pub fn first_free(&self) -> Option<usize> {
    self.slots.iter().position(|s| s.assigned_host.is_none())
  }

  pub fn all_idle(&self) -> bool {
    self.slots.iter().all(|s| s.assigned_host.is_none())
  }
}

/// Retries spent on the command currently `Handling`. Reset whenever a host
/// is (re)assigned to the worker.
#[derive(Debug, Default, Clone, Copy)]
pub struct RetryCounter(usize);

impl RetryCounter {
  pub fn reset(&mut self) {
    self.0 = 0;
  }

  pub fn count(&self) -> usize {
    self.0
  }

  pub fn increment(&mut self) {
    self.0 += 1;
  }

  pub fn exhausted(&self, max_retries: usize) -> bool {
    self.0 >= max_retries
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
  Okay,
  Fail,
}

#[derive(Debug, Clone)]
pub struct ResultRecord {
  pub host: String,
  pub command: String,
  pub status: Outcome,
  pub output: String,
}

#[derive(Debug, Clone, Copy)]
pub struct GroupConfig {
  pub size: usize,
}

/// Tracks when the operator should be asked to confirm the next batch of
/// hosts. `prompt_due` must be checked before `record_assignment`: a group
/// prompts on the *first* host assigned to it, not after the count wraps.
#[derive(Debug, Default)]
pub struct GroupTracker {
  config: Option<GroupConfig>,
  received_since_prompt: usize,
}

impl GroupTracker {
  pub fn new(config: Option<GroupConfig>) -> Self {
    Self {
      config,
      received_since_prompt: 0,
    }
  }

  pub fn prompt_due(&self) -> bool {
    matches!(self.config, Some(_)) && self.received_since_prompt == 0
  }

  pub fn size(&self) -> Option<usize> {
    self.config.map(|c| c.size)
  }

  pub fn record_assignment(&mut self) {
    if let Some(cfg) = self.config {
      self.received_since_prompt += 1;
      if self.received_since_prompt >= cfg.size {
        self.received_since_prompt = 0;
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn status_matrix_starts_all_wait() {
    let m = StatusMatrix::new(3, 2);
    for c in 0..2 {
      assert_eq!(m.next_wait_in_column(c), Some(0));
      assert!(!m.column_done(c));
    }
  }

  #[test]
  fn reset_column_only_touches_that_worker() {
    let mut m = StatusMatrix::new(2, 2);
    m.set(0, 0, CellStatus::Okay);
    m.set(1, 0, CellStatus::Fail);
    m.set(0, 1, CellStatus::Okay);
    m.reset_column(0);
    assert_eq!(m.get(0, 0), CellStatus::Wait);
    assert_eq!(m.get(1, 0), CellStatus::Wait);
    assert_eq!(m.get(0, 1), CellStatus::Okay);
  }

  #[test]
  fn column_done_requires_every_cell_settled() {
    let mut m = StatusMatrix::new(2, 1);
    m.set(0, 0, CellStatus::Okay);
    assert!(!m.column_done(0));
    m.set(1, 0, CellStatus::Fail);
    assert!(m.column_done(0));
  }

  #[test]
  fn reception_pool_assign_and_lookup() {
    let mut pool = ReceptionPool::new(2);
    assert_eq!(pool.first_free(), Some(0));
    pool.assign(0, "h1".into());
    assert_eq!(pool.first_free(), Some(1));
    assert_eq!(pool.worker_for_host("h1"), Some(0));
    assert!(!pool.all_idle());
    pool.clear(0);
    assert!(pool.all_idle());
  }

  #[test]
  fn retry_counter_exhaustion() {
    let mut rc = RetryCounter::default();
    assert!(!rc.exhausted(1));
    rc.increment();
    assert!(rc.exhausted(1));
    rc.reset();
    assert_eq!(rc.count(), 0);
  }

  #[test]
  fn group_tracker_prompts_on_first_host_of_each_group() {
    let mut g = GroupTracker::new(Some(GroupConfig { size: 2 }));
    assert!(g.prompt_due());
    g.record_assignment();
    assert!(!g.prompt_due());
    g.record_assignment();
    assert!(g.prompt_due());
  }

  #[test]
  fn group_tracker_never_prompts_when_unset() {
    let mut g = GroupTracker::new(None);
    assert!(!g.prompt_due());
    g.record_assignment();
    assert!(!g.prompt_due());
  }
}
