//! SSH transport adapter (SPEC_FULL §4.E). The dispatch engine only ever
//! depends on [`SshConnector`]/[`SshSession`]; [`Ssh2Connector`] is the real
//! implementation, backed by the `ssh2` crate.

use crate::error::{FleetError, FleetResult};
use std::io::Read;
use std::net::TcpStream;
use std::path::PathBuf;

/// Credentials shared by every connection this run makes. At least one of
/// `key_file` / `password` must be set; enforced by `cli::Args::validate`.
#[derive(Debug, Clone)]
pub struct Credentials {
  pub user: String,
  pub key_file: Option<PathBuf>,
  pub password: Option<String>,
  pub port: u16,
}

#[derive(Debug, Clone)]
pub struct ExecOutput {
  pub stdout: String,
  pub stderr: String,
  pub exit_status: Option<i32>,
}

impl ExecOutput {
  /// Failure classification (Open Question 3): gated on exit status where
  /// available, falling back to non-empty stderr only when it is not.
  pub fn failed(&self) -> bool {
    match self.exit_status {
      Some(code) => code != 0,
      None => !self.stderr.is_empty(),
    }
  }
}

/// One open session to a single host, able to run commands in sequence.
pub trait SshSession: Send {
  fn exec(&mut self, command: &str) -> FleetResult<ExecOutput>;
}

/// Opens sessions against hosts. Implemented once against `ssh2` for
/// production and once in-memory for tests (see `FakeConnector` below).
pub trait SshConnector: Send + Sync {
  fn connect(&self, host: &str) -> FleetResult<Box<dyn SshSession>>;
}

pub struct Ssh2Connector {
  creds: Credentials,
}

impl Ssh2Connector {
  pub fn new(creds: Credentials) -> Self {
    Self { creds }
  }
}

impl SshConnector for Ssh2Connector {
  fn connect(&self, host: &str) -> FleetResult<Box<dyn SshSession>> {
    let addr = format!("{host}:{port}", port = self.creds.port);
    let tcp = TcpStream::connect(&addr).map_err(|e| FleetError::Ssh {
      host: host.to_string(),
      source: anyhow::anyhow!("tcp connect to {addr} failed: {e}"),
    })?;

    let mut session = ssh2::Session::new().map_err(|e| FleetError::Ssh {
      host: host.to_string(),
      source: e.into(),
    })?;
    session.set_tcp_stream(tcp);
    session.handshake().map_err(|e| FleetError::Ssh {
      host: host.to_string(),
      source: anyhow::anyhow!("handshake failed: {e}"),
    })?;

    if let Some(key_file) = &self.creds.key_file {
      session
        .userauth_pubkey_file(&self.creds.user, None, key_file, None)
        .map_err(|e| FleetError::Ssh {
          host: host.to_string(),
          source: anyhow::anyhow!("key auth failed: {e}"),
        })?;
    } else if let Some(password) = &self.creds.password {
      session
        .userauth_password(&self.creds.user, password)
        .map_err(|e| FleetError::Ssh {
          host: host.to_string(),
          source: anyhow::anyhow!("password auth failed: {e}"),
        })?;
    } else {
      return Err(FleetError::Config(
        "no key file or password configured for ssh auth".into(),
      ));
    }

    if !session.authenticated() {
      return Err(FleetError::Ssh {
        host: host.to_string(),
        source: anyhow::anyhow!("authentication was not accepted"),
      });
    }

    Ok(Box::new(Ssh2SessionHandle {
      session,
      host: host.to_string(),
    }))
  }
}

struct Ssh2SessionHandle {
  session: ssh2::Session,
  host: String,
}

impl SshSession for Ssh2SessionHandle {
  fn exec(&mut self, command: &str) -> FleetResult<ExecOutput> {
    let host_err = |e: ssh2::Error| FleetError::Ssh {
      host: self.host.clone(),
      source: e.into(),
    };

    let mut channel = self.session.channel_session().map_err(host_err)?;
    channel.exec(command).map_err(host_err)?;

    let mut stdout = String::new();
    channel.read_to_string(&mut stdout).map_err(|e| FleetError::Ssh {
      host: self.host.clone(),
      source: e.into(),
    })?;

    let mut stderr = String::new();
    channel
      .stderr()
      .read_to_string(&mut stderr)
      .map_err(|e| FleetError::Ssh {
        host: self.host.clone(),
        source: e.into(),
      })?;

    channel.wait_close().map_err(host_err)?;
    let exit_status = channel.exit_status().map_err(host_err)?;

    Ok(ExecOutput {
      stdout,
      stderr,
      exit_status: Some(exit_status),
    })
  }
}

/// A scripted [`SshConnector`] for exercising the engine without a network.
/// Not behind `#[cfg(test)]`: integration tests in `tests/` link against this
/// crate as an ordinary dependency and need it too.
pub mod fake {
  use super::*;
  use std::collections::HashMap;
  use std::sync::Mutex;

  /// Scripted per-`(host, command)` exec outcome, for exercising the worker
  /// and coordinator without a real network.
  pub struct FakeConnector {
    scripts: Mutex<HashMap<(String, String), ExecOutput>>,
    unreachable_hosts: Mutex<Vec<String>>,
  }

  impl FakeConnector {
    pub fn new() -> Self {
      Self {
        scripts: Mutex::new(HashMap::new()),
        unreachable_hosts: Mutex::new(Vec::new()),
      }
    }

    pub fn script(&self, host: &str, command: &str, output: ExecOutput) {
      self.scripts
        .lock()
        .unwrap()
        .insert((host.to_string(), command.to_string()), output);
    }

    pub fn make_unreachable(&self, host: &str) {
      self.unreachable_hosts.lock().unwrap().push(host.to_string());
    }
  }

  impl Default for FakeConnector {
    fn default() -> Self {
      Self::new()
    }
  }

  impl SshConnector for FakeConnector {
    fn connect(&self, host: &str) -> FleetResult<Box<dyn SshSession>> {
      if self.unreachable_hosts.lock().unwrap().iter().any(|h| h == host) {
        return Err(FleetError::Ssh {
          host: host.to_string(),
          source: anyhow::anyhow!("fake host is unreachable"),
        });
      }
      Ok(Box::new(FakeSession {
        host: host.to_string(),
        scripts: self.scripts.lock().unwrap().clone(),
      }))
    }
  }

  struct FakeSession {
    host: String,
    scripts: HashMap<(String, String), ExecOutput>,
  }

  impl SshSession for FakeSession {
    fn exec(&mut self, command: &str) -> FleetResult<ExecOutput> {
      self.scripts
        .get(&(self.host.clone(), command.to_string()))
        .cloned()
        .ok_or_else(|| FleetError::Ssh {
          host: self.host.clone(),
          source: anyhow::anyhow!("no script for command {command:?}"),
        })
    }
  }
}
