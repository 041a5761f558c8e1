//! Worker (subscriber) sub-state machine (SPEC_FULL §4.B): drives exactly one
//! host at a time through `Wait -> Connecting -> Connected -> Disconnecting`.

use crate::channel::{FrameReceiver, FrameSender};
use crate::error::FleetResult;
use crate::protocol::Frame;
use crate::ssh::SshConnector;
use log::{debug, info, warn};
use std::sync::Arc;

/// Runs forever, one host lifecycle after another, until the channel pair is
/// torn down by the pool (shutdown) or an adapter error unwinds the thread
/// (crash, respawned by the pool).
pub fn run(
  worker_id: usize,
  to_coord: FrameSender,
  from_coord: FrameReceiver,
  connector: Arc<dyn SshConnector>,
) -> FleetResult<()> {
  loop {
    let host = wait_for_host(worker_id, &to_coord, &from_coord)?;

    debug!("worker {worker_id}: connecting to {host}");
    let mut session = connector.connect(&host)?;
    info!("worker {worker_id}: connected to {host}");

    run_connected(worker_id, &host, &mut session, &to_coord, &from_coord)?;

    debug!("worker {worker_id}: disconnecting from {host}");
    drop(session);
  }
}

fn wait_for_host(
  worker_id: usize,
  to_coord: &FrameSender,
  from_coord: &FrameReceiver,
) -> FleetResult<String> {
  loop {
    to_coord.send(&Frame::Wait)?;
    match from_coord.recv()? {
      Frame::Ack(host) => return Ok(host),
      other => {
        debug!("worker {worker_id}: ignoring {other:?} while idle");
      }
    }
  }
}

fn run_connected(
  worker_id: usize,
  host: &str,
  session: &mut Box<dyn crate::ssh::SshSession>,
  to_coord: &FrameSender,
  from_coord: &FrameReceiver,
) -> FleetResult<()> {
  let mut last_command: Option<String> = None;
  to_coord.send(&Frame::WaitHost(host.to_string()))?;

  loop {
    match from_coord.recv()? {
      Frame::Cmd => {
        let command = from_coord.recv_raw()?;
        report_exec(worker_id, host, session, &command, to_coord)?;
        last_command = Some(command);
      }
      Frame::OkayAck | Frame::Ignore => {
        to_coord.send(&Frame::WaitHost(host.to_string()))?;
      }
      Frame::Retry => {
        let command = last_command.clone().ok_or_else(|| {
          crate::error::FleetError::Format("retry with no prior command".into())
        })?;
        report_exec(worker_id, host, session, &command, to_coord)?;
      }
      Frame::End => return Ok(()),
      other => {
        return Err(crate::error::FleetError::Format(format!(
          "unexpected frame {other:?} while connected"
        )));
      }
    }
  }
}

fn report_exec(
  worker_id: usize,
  host: &str,
  session: &mut Box<dyn crate::ssh::SshSession>,
  command: &str,
  to_coord: &FrameSender,
) -> FleetResult<()> {
  let output = session.exec(command)?;
  if output.failed() {
    warn!("worker {worker_id}: {host}: {command:?} failed");
    to_coord.send(&Frame::Fail {
      host: host.to_string(),
      output: output.stderr,
    })
  } else {
    debug!("worker {worker_id}: {host}: {command:?} ok");
    to_coord.send(&Frame::Okay {
      host: host.to_string(),
      output: output.stdout,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::channel;
  use crate::ssh::fake::FakeConnector;
  use crate::ssh::ExecOutput;

  #[test]
  fn worker_runs_commands_then_stops_cleanly_on_end() {
    let (worker_tx, coord_rx) = channel::pair();
    let (coord_tx, worker_rx) = channel::pair();

    let connector = Arc::new(FakeConnector::new());
    connector.script(
      "h1",
      "date",
      ExecOutput {
        stdout: "Mon".into(),
        stderr: String::new(),
        exit_status: Some(0),
      },
    );

    let handle = std::thread::spawn(move || run(0, worker_tx, worker_rx, connector));

    assert_eq!(coord_rx.recv().unwrap(), Frame::Wait);
    coord_tx.send(&Frame::Ack("h1".into())).unwrap();

    assert_eq!(coord_rx.recv().unwrap(), Frame::WaitHost("h1".into()));
    coord_tx.send(&Frame::Cmd).unwrap();
    coord_tx.send_raw("date").unwrap();

    assert_eq!(
      coord_rx.recv().unwrap(),
      Frame::Okay {
        host: "h1".into(),
        output: "Mon".into(),
      }
    );
    coord_tx.send(&Frame::OkayAck).unwrap();

    assert_eq!(coord_rx.recv().unwrap(), Frame::WaitHost("h1".into()));
    coord_tx.send(&Frame::End).unwrap();

    assert_eq!(coord_rx.recv().unwrap(), Frame::Wait);
    drop(coord_tx);

    let result = handle.join().unwrap();
    assert!(result.is_err());
  }

  #[test]
  fn worker_retries_the_last_command_on_retry() {
    let (worker_tx, coord_rx) = channel::pair();
    let (coord_tx, worker_rx) = channel::pair();

    let connector = Arc::new(FakeConnector::new());
    connector.script(
      "h1",
      "bad",
      ExecOutput {
        stdout: String::new(),
        stderr: "nope".into(),
        exit_status: Some(1),
      },
    );

    let handle = std::thread::spawn(move || run(0, worker_tx, worker_rx, connector));

    coord_rx.recv().unwrap();
    coord_tx.send(&Frame::Ack("h1".into())).unwrap();
    coord_rx.recv().unwrap();
    coord_tx.send(&Frame::Cmd).unwrap();
    coord_tx.send_raw("bad").unwrap();

    assert_eq!(
      coord_rx.recv().unwrap(),
      Frame::Fail {
        host: "h1".into(),
        output: "nope".into(),
      }
    );
    coord_tx.send(&Frame::Retry).unwrap();
    assert_eq!(
      coord_rx.recv().unwrap(),
      Frame::Fail {
        host: "h1".into(),
        output: "nope".into(),
      }
    );

    coord_tx.send(&Frame::End).unwrap();
    coord_rx.recv().unwrap();
    drop(coord_tx);
    let _ = handle.join().unwrap();
  }

  #[test]
  fn worker_terminates_when_connect_fails() {
    let (worker_tx, coord_rx) = channel::pair();
    let (coord_tx, worker_rx) = channel::pair();

    let connector = Arc::new(FakeConnector::new());
    connector.make_unreachable("h1");

    let handle = std::thread::spawn(move || run(0, worker_tx, worker_rx, connector));

    coord_rx.recv().unwrap();
    coord_tx.send(&Frame::Ack("h1".into())).unwrap();

    let result = handle.join().unwrap();
    assert!(result.is_err());
  }
}
