//! Result store adapter (SPEC_FULL §4.E, §6). The engine only depends on
//! [`ResultStore`]; [`SqliteStore`] is the reference implementation.

use crate::error::{FleetError, FleetResult};
use crate::model::Outcome;
use std::path::Path;

fn outcome_label(status: Outcome) -> &'static str {
  match status {
    Outcome::Okay => "okay",
    Outcome::Fail => "fail",
  }
}

/// Durable sink for the run's hosts, commands, and per-command results.
/// `commit` is called once, at coordinator teardown; implementations may
/// buffer writes until then.
pub trait ResultStore: Send {
  fn put_host(&mut self, host: &str, status: &str) -> FleetResult<()>;
  fn put_command(&mut self, command: &str) -> FleetResult<()>;
  fn put_result(&mut self, host: &str, command: &str, status: Outcome, output: &str) -> FleetResult<()>;
  fn commit(&mut self) -> FleetResult<()>;
}

/// SQLite-backed store matching the `hosts`/`commands`/`results`/`statistics`
/// layout in SPEC_FULL §6. Writes are buffered in memory and flushed inside a
/// single transaction on `commit`, mirroring the reference implementation's
/// single end-of-run commit.
pub struct SqliteStore {
  conn: rusqlite::Connection,
  hosts: Vec<(String, String)>,
  commands: Vec<String>,
  results: Vec<(String, String, Outcome, String)>,
}

impl SqliteStore {
  pub fn open(path: &Path) -> FleetResult<Self> {
    let conn = rusqlite::Connection::open(path).map_err(|e| FleetError::Store(e.into()))?;
    conn.execute_batch(
      "CREATE TABLE IF NOT EXISTS hosts (
        id INTEGER PRIMARY KEY,
        hostname TEXT UNIQUE NOT NULL,
        status TEXT NOT NULL
      );
      CREATE TABLE IF NOT EXISTS commands (
        id INTEGER PRIMARY KEY,
        command TEXT NOT NULL
      );
      CREATE TABLE IF NOT EXISTS results (
        id INTEGER PRIMARY KEY,
        host_id INTEGER NOT NULL REFERENCES hosts(id),
        cmd_id INTEGER NOT NULL REFERENCES commands(id),
        status TEXT NOT NULL,
        result_text TEXT NOT NULL
      );
      CREATE TABLE IF NOT EXISTS statistics (
        id INTEGER PRIMARY KEY CHECK (id = 0),
        nhosts INTEGER NOT NULL,
        ncommands INTEGER NOT NULL,
        nresults INTEGER NOT NULL
      );",
    )
    .map_err(|e| FleetError::Store(e.into()))?;
    Ok(Self {
      conn,
      hosts: Vec::new(),
      commands: Vec::new(),
      results: Vec::new(),
    })
  }
}

impl ResultStore for SqliteStore {
  fn put_host(&mut self, host: &str, status: &str) -> FleetResult<()> {
    self.hosts.push((host.to_string(), status.to_string()));
    Ok(())
  }

  fn put_command(&mut self, command: &str) -> FleetResult<()> {
    self.commands.push(command.to_string());
    Ok(())
  }

  fn put_result(&mut self, host: &str, command: &str, status: Outcome, output: &str) -> FleetResult<()> {
    self.results
      .push((host.to_string(), command.to_string(), status, output.to_string()));
    Ok(())
  }

  fn commit(&mut self) -> FleetResult<()> {
    let tx = self.conn.transaction().map_err(|e| FleetError::Store(e.into()))?;
    for (host, status) in &self.hosts {
      tx.execute(
        "INSERT INTO hosts (hostname, status) VALUES (?1, ?2)
        ON CONFLICT(hostname) DO UPDATE SET status = excluded.status",
        rusqlite::params![host, status],
      )
      .map_err(|e| FleetError::Store(e.into()))?;
    }
    for command in &self.commands {
      let already = tx
        .query_row(
          "SELECT COUNT(*) FROM commands WHERE command = ?1",
          rusqlite::params![command],
          |row| row.get::<_, i64>(0),
        )
        .map_err(|e| FleetError::Store(e.into()))?;
      if already == 0 {
        tx.execute("INSERT INTO commands (command) VALUES (?1)", rusqlite::params![command])
          .map_err(|e| FleetError::Store(e.into()))?;
      }
    }
    for (host, command, status, output) in &self.results {
      let host_id: i64 = tx
        .query_row(
          "SELECT id FROM hosts WHERE hostname = ?1",
          rusqlite::params![host],
          |row| row.get(0),
        )
        .map_err(|e| FleetError::Store(e.into()))?;
      let cmd_id: i64 = tx
        .query_row(
          "SELECT id FROM commands WHERE command = ?1",
          rusqlite::params![command],
          |row| row.get(0),
        )
        .map_err(|e| FleetError::Store(e.into()))?;
      tx.execute(
        "INSERT INTO results (host_id, cmd_id, status, result_text) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![host_id, cmd_id, outcome_label(*status), output],
      )
      .map_err(|e| FleetError::Store(e.into()))?;
    }
    tx.execute(
      "INSERT INTO statistics (id, nhosts, ncommands, nresults) VALUES (0, ?1, ?2, ?3)
      ON CONFLICT(id) DO UPDATE SET nhosts = excluded.nhosts, ncommands = excluded.ncommands, nresults = excluded.nresults",
      rusqlite::params![self.hosts.len() as i64, self.commands.len() as i64, self.results.len() as i64],
    )
    .map_err(|e| FleetError::Store(e.into()))?;
    tx.commit().map_err(|e| FleetError::Store(e.into()))
  }
}

/// In-memory store for tests: records every write so a test can assert on it
/// without touching the filesystem.
#[derive(Debug, Default)]
pub struct MemoryStore {
  pub hosts: Vec<(String, String)>,
  pub commands: Vec<String>,
  pub results: Vec<(String, String, Outcome, String)>,
  pub committed: bool,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl ResultStore for MemoryStore {
  fn put_host(&mut self, host: &str, status: &str) -> FleetResult<()> {
    self.hosts.push((host.to_string(), status.to_string()));
    Ok(())
  }

  fn put_command(&mut self, command: &str) -> FleetResult<()> {
    self.commands.push(command.to_string());
    Ok(())
  }

  fn put_result(&mut self, host: &str, command: &str, status: Outcome, output: &str) -> FleetResult<()> {
    self.results
      .push((host.to_string(), command.to_string(), status, output.to_string()));
    Ok(())
  }

  fn commit(&mut self) -> FleetResult<()> {
    self.committed = true;
    Ok(())
  }
}
