//! Typed messages carried over the worker <-> coordinator channel pair (SPEC_FULL §4.B-C).
//!
//! Each [`Frame`] maps to exactly one wire frame's payload, a `\r`-joined ASCII
//! string, except [`Frame::Cmd`]: the coordinator always follows it with a second,
//! *unstructured* wire frame holding the literal command text. That second frame
//! is read/written as raw bytes by the caller (`channel::FrameSender::send_raw` /
//! `FrameReceiver::recv_raw`), not through [`Frame::encode`]/[`Frame::decode`].

use crate::error::{FleetError, FleetResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
  /// Worker -> coordinator: idle, no host assigned yet.
  Wait,
  /// Worker -> coordinator: connected to `host`, ready for the next command.
  WaitHost(String),
  /// Coordinator -> worker: connect to `host`.
  Ack(String),
  /// Coordinator -> worker: a command follows as a raw wire frame.
  Cmd,
  /// Worker -> coordinator: the last command succeeded.
  Okay { host: String, output: String },
  /// Coordinator -> worker: success acknowledged, proceed.
  OkayAck,
  /// Worker -> coordinator: the last command failed.
  Fail { host: String, output: String },
  /// Coordinator -> worker: re-run the last command.
  Retry,
  /// Coordinator -> worker: failure recorded, proceed anyway.
  Ignore,
  /// Coordinator -> worker: no more commands, disconnect.
  End,
}

impl Frame {
  pub fn encode(&self) -> Vec<u8> {
    let s = match self {
      Frame::Wait => "wait".to_string(),
      Frame::WaitHost(host) => format!("wait\r{host}"),
      Frame::Ack(host) => format!("ack\r{host}"),
      Frame::Cmd => "cmd".to_string(),
      Frame::Okay { host, output } => format!("okay\r{host}\r{output}"),
      Frame::OkayAck => "okay".to_string(),
      Frame::Fail { host, output } => format!("fail\r{host}\r{output}"),
      Frame::Retry => "retry".to_string(),
      Frame::Ignore => "ignore".to_string(),
      Frame::End => "end".to_string(),
    };
    s.into_bytes()
  }

  pub fn decode(payload: &[u8]) -> FleetResult<Frame> {
    let s = std::str::from_utf8(payload)
      .map_err(|e| FleetError::Format(format!("frame payload is not utf8: {e}")))?;
    let mut fields = s.splitn(3, '\r');
    let head = fields.next().unwrap_or_default();
    match head {
      "wait" => match fields.next() {
        None => Ok(Frame::Wait),
        Some(host) => Ok(Frame::WaitHost(host.to_string())),
      },
      "ack" => {
        let host = fields
          .next()
          .ok_or_else(|| FleetError::Format("ack frame missing host".into()))?;
        Ok(Frame::Ack(host.to_string()))
      }
      "cmd" => Ok(Frame::Cmd),
      "okay" => match fields.next() {
        None => Ok(Frame::OkayAck),
        Some(host) => {
          let output = fields.next().unwrap_or_default();
          Ok(Frame::Okay {
            host: host.to_string(),
            output: output.to_string(),
          })
        }
      },
      "fail" => {
        let host = fields
          .next()
          .ok_or_else(|| FleetError::Format("fail frame missing host".into()))?;
        let output = fields.next().unwrap_or_default();
        Ok(Frame::Fail {
          host: host.to_string(),
          output: output.to_string(),
        })
      }
      "retry" => Ok(Frame::Retry),
      "ignore" => Ok(Frame::Ignore),
      "end" => Ok(Frame::End),
      other => Err(FleetError::Format(format!("unknown frame head {other:?}"))),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn round_trip(frame: Frame) {
    let bytes = frame.encode();
    assert_eq!(Frame::decode(&bytes).unwrap(), frame);
  }

  #[test]
  fn every_variant_round_trips() {
    round_trip(Frame::Wait);
    round_trip(Frame::WaitHost("h1".into()));
    round_trip(Frame::Ack("h1".into()));
    round_trip(Frame::Cmd);
    round_trip(Frame::Okay {
      host: "h1".into(),
      output: "line one\nline two".into(),
    });
    round_trip(Frame::OkayAck);
    round_trip(Frame::Fail {
      host: "h1".into(),
      output: "boom".into(),
    });
    round_trip(Frame::Retry);
    round_trip(Frame::Ignore);
    round_trip(Frame::End);
  }

  #[test]
  fn output_may_contain_carriage_returns_without_desync() {
    let frame = Frame::Okay {
      host: "h1".into(),
      output: "a\rb\rc".into(),
    };
    round_trip(frame);
  }

  #[test]
  fn unknown_head_is_a_format_error() {
    let err = Frame::decode(b"bogus").unwrap_err();
    assert!(matches!(err, FleetError::Format(_)));
  }
}
