//! Worker<->coordinator channel pair.
//!
//! SPEC_FULL §9 replaces the original's forked processes and raw pipes with
//! one OS thread per worker joined to the coordinator by a `crossbeam_channel`
//! pair. The frame codec (§4.A) is not vestigial here: every [`Frame`] is run
//! through `codec::write` before it crosses the channel and through
//! `codec::read` on the other side, so the codec remains the genuine
//! serialization layer for this boundary even though `crossbeam_channel`
//! itself preserves message boundaries and needs no resync of its own.

use crate::codec::{self, Decoded};
use crate::error::{FleetError, FleetResult};
use crate::protocol::Frame;
use crossbeam_channel::{Receiver, Sender};

pub struct FrameSender(Sender<Vec<u8>>);

pub struct FrameReceiver(Receiver<Vec<u8>>);

impl FrameSender {
  pub fn send(&self, frame: &Frame) -> FleetResult<()> {
    let bytes = codec::write(&frame.encode())?;
    self.0
      .send(bytes)
      .map_err(|e| FleetError::ChannelBroken(e.to_string()))
  }

  /// Sends the literal command text that always immediately follows a
  /// `Frame::Cmd` (SPEC_FULL §4.B); this text is not itself a `Frame`.
  pub fn send_raw(&self, text: &str) -> FleetResult<()> {
    let bytes = codec::write(text.as_bytes())?;
    self.0
      .send(bytes)
      .map_err(|e| FleetError::ChannelBroken(e.to_string()))
  }
}

impl FrameReceiver {
  pub fn recv(&self) -> FleetResult<Frame> {
    let bytes = self
      .0
      .recv()
      .map_err(|e| FleetError::ChannelBroken(e.to_string()))?;
    Frame::decode(extract_payload(&bytes)?)
  }

  pub fn recv_raw(&self) -> FleetResult<String> {
    let bytes = self
      .0
      .recv()
      .map_err(|e| FleetError::ChannelBroken(e.to_string()))?;
    let payload = extract_payload(&bytes)?;
    String::from_utf8(payload.to_vec()).map_err(|e| FleetError::Format(e.to_string()))
  }

  /// Exposes the underlying byte receiver for `crossbeam_channel::Select`
  /// fan-in over every worker's inbound half (used by the pool).
  pub fn inner(&self) -> &Receiver<Vec<u8>> {
    &self.0
  }
}

fn extract_payload(bytes: &[u8]) -> FleetResult<&[u8]> {
  match codec::read(bytes)? {
    Decoded::Frame { payload, .. } => Ok(payload),
    Decoded::Incomplete => Err(FleetError::Format(
      "a single channel send did not contain one complete frame".into(),
    )),
  }
}

/// One direction of the worker<->coordinator channel pair.
pub fn pair() -> (FrameSender, FrameReceiver) {
  let (tx, rx) = crossbeam_channel::unbounded();
  (FrameSender(tx), FrameReceiver(rx))
}
