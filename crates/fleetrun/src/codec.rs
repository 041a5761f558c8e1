//! Length-prefixed frame codec.
//!
//! Wire format of a single frame:
//!
//! ```text
//! <BITS_OF_LEN zero bytes> '*' <size: BITS_OF_LEN hex digits, upper> <payload bytes>
//! ```
//!
//! `read`/`write` live here as pure functions over byte buffers so the round-trip
//! and resync laws can be tested without a real stream. [`FrameIo`] wraps a
//! `UnixStream` with the buffering and timeout policy the production transport
//! (worker <-> coordinator channel pair, see `pool`) actually runs on.

use crate::error::{FleetError, FleetResult};
use std::io::{ErrorKind, Read, Write};
use std::os::unix::net::UnixStream;
use std::time::{Duration, Instant};

pub const BITS_OF_LEN: usize = 4;
pub const MAX_PAYLOAD: usize = {
  // 16^BITS_OF_LEN - 1, computed without relying on a non-const pow().
  let mut cap = 1usize;
  let mut i = 0;
  while i < BITS_OF_LEN {
    cap *= 16;
    i += 1;
  }
  cap - 1
};

/// Encode `payload` as one complete frame.
pub fn write(payload: &[u8]) -> FleetResult<Vec<u8>> {
  if payload.len() > MAX_PAYLOAD {
    return Err(FleetError::PayloadTooLarge {
      len: payload.len(),
      cap: MAX_PAYLOAD,
    });
  }
  let mut out = Vec::with_capacity(BITS_OF_LEN + 1 + BITS_OF_LEN + payload.len());
  out.extend(vec![0u8; BITS_OF_LEN]);
  out.push(b'*');
  out.extend(format!("{:0width$X}", payload.len(), width = BITS_OF_LEN).into_bytes());
  out.extend_from_slice(payload);
  Ok(out)
}

/// Outcome of scanning a buffer for one frame starting at its front.
pub enum Decoded<'a> {
  /// A full frame was found. `consumed` bytes (including any skipped garbage)
  /// should be dropped from the front of the buffer the caller owns.
  Frame { payload: &'a [u8], consumed: usize },
  /// No complete frame yet; caller should append more bytes and retry.
  Incomplete,
}

/// Scan `buf` for one frame, applying the protocol's resync behavior: a zero
/// run shorter than the header is not an error, it just restarts the scan.
/// A full-length zero run followed by a byte that is neither zero nor `*` is
/// `FormatError` (matches the original's behavior on that byte).
pub fn read(buf: &[u8]) -> FleetResult<Decoded<'_>> {
  let mut zero_run = 0usize;
  let mut i = 0usize;
  while i < buf.len() {
    let b = buf[i];
    if b == 0 {
      zero_run += 1;
      i += 1;
      continue;
    }
    if zero_run < BITS_OF_LEN {
      zero_run = 0;
      i += 1;
      continue;
    }
    if b != b'*' {
      return Err(FleetError::Format(format!(
        "expected '*' after a {BITS_OF_LEN}-byte zero run, found byte {b:#04x}"
      )));
    }

    let header_start = i + 1;
    if buf.len() < header_start + BITS_OF_LEN {
      return Ok(Decoded::Incomplete);
    }
    let len_field = std::str::from_utf8(&buf[header_start..header_start + BITS_OF_LEN])
      .map_err(|e| FleetError::Format(format!("length field is not utf8: {e}")))?;
    let len = usize::from_str_radix(len_field, 16)
      .map_err(|e| FleetError::Format(format!("length field {len_field:?} is not hex: {e}")))?;

    let payload_start = header_start + BITS_OF_LEN;
    let payload_end = payload_start + len;
    if buf.len() < payload_end {
      return Ok(Decoded::Incomplete);
    }
    return Ok(Decoded::Frame {
      payload: &buf[payload_start..payload_end],
      consumed: payload_end,
    });
  }
  Ok(Decoded::Incomplete)
}

/// Non-blocking, blocking, or timed reads/writes of frames over a `UnixStream`,
/// per the `timeout` convention in SPEC_FULL §4.A:
/// `< 0` blocks indefinitely, `0` does one non-blocking scan pass, `> 0` polls
/// non-blockingly for up to that many seconds.
pub struct FrameIo {
  buf: Vec<u8>,
}

impl FrameIo {
  pub fn new() -> Self {
    Self { buf: Vec::new() }
  }

  fn try_extract(&mut self) -> FleetResult<Option<Vec<u8>>> {
    match read(&self.buf)? {
      Decoded::Frame { payload, consumed } => {
        let out = payload.to_vec();
        self.buf.drain(..consumed);
        Ok(Some(out))
      }
      Decoded::Incomplete => Ok(None),
    }
  }

  /// Returns `Ok(true)` if bytes were appended, `Ok(false)` on a non-blocking
  /// stream with nothing available yet.
  fn fill_once(&mut self, stream: &mut UnixStream) -> FleetResult<bool> {
    let mut tmp = [0u8; 4096];
    match stream.read(&mut tmp) {
      Ok(0) => Err(FleetError::ChannelBroken("stream closed mid-frame".into())),
      Ok(n) => {
        self.buf.extend_from_slice(&tmp[..n]);
        Ok(true)
      }
      Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(false),
      Err(e) => Err(FleetError::ChannelBroken(e.to_string())),
    }
  }

  pub fn read_frame(&mut self, stream: &mut UnixStream, timeout_secs: i64) -> FleetResult<Option<Vec<u8>>> {
    if timeout_secs < 0 {
      stream
        .set_nonblocking(false)
        .map_err(|e| FleetError::ChannelBroken(e.to_string()))?;
      loop {
        if let Some(frame) = self.try_extract()? {
          return Ok(Some(frame));
        }
        self.fill_once(stream)?;
      }
    }

    stream
      .set_nonblocking(true)
      .map_err(|e| FleetError::ChannelBroken(e.to_string()))?;
    let deadline = Instant::now() + Duration::from_secs(timeout_secs as u64);
    loop {
      if let Some(frame) = self.try_extract()? {
        return Ok(Some(frame));
      }
      let got_bytes = self.fill_once(stream)?;
      if timeout_secs == 0 {
        return Ok(None);
      }
      if !got_bytes {
        if Instant::now() >= deadline {
          return Ok(None);
        }
        std::thread::sleep(Duration::from_millis(5));
      }
    }
  }

  pub fn write_frame(stream: &mut UnixStream, payload: &[u8]) -> FleetResult<()> {
    let bytes = write(payload)?;
    stream
      .write_all(&bytes)
      .map_err(|e| FleetError::ChannelBroken(e.to_string()))
  }
}

impl Default for FrameIo {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn round_trip_for_all_sizes_up_to_cap_sample() {
    for len in [0usize, 1, 2, 13, 255, 256, 4095, MAX_PAYLOAD] {
      let payload = vec![b'x'; len];
      let framed = write(&payload).unwrap();
      match read(&framed).unwrap() {
        Decoded::Frame { payload: got, consumed } => {
          assert_eq!(got, payload.as_slice());
          assert_eq!(consumed, framed.len());
        }
        Decoded::Incomplete => panic!("expected a full frame"),
      }
    }
  }

  #[test]
  fn write_rejects_oversized_payload() {
    let payload = vec![0u8; MAX_PAYLOAD + 1];
    let err = write(&payload).unwrap_err();
    assert!(matches!(err, FleetError::PayloadTooLarge { .. }));
  }

  #[test]
  fn resync_skips_garbage_before_a_valid_frame() {
    let mut framed = write(b"hello, world!").unwrap();
    for k in 0..8 {
      let mut buf = vec![b'g'; k];
      buf.append(&mut framed.clone());
      match read(&buf).unwrap() {
        Decoded::Frame { payload, consumed } => {
          assert_eq!(payload, b"hello, world!");
          assert_eq!(consumed, buf.len());
        }
        Decoded::Incomplete => panic!("k={k}: expected a full frame after garbage"),
      }
    }
  }

  #[test]
  fn resync_tolerates_a_short_zero_run() {
    let mut buf = vec![0u8, 0u8, b'x']; // shorter than BITS_OF_LEN=4, then non-zero, non-'*'
    buf.extend(write(b"payload").unwrap());
    match read(&buf).unwrap() {
      Decoded::Frame { payload, .. } => assert_eq!(payload, b"payload"),
      Decoded::Incomplete => panic!("expected a full frame after a short zero run"),
    }
  }

  #[test]
  fn incomplete_frame_reports_incomplete() {
    let framed = write(b"hello").unwrap();
    for cut in 1..framed.len() {
      match read(&framed[..cut]).unwrap() {
        Decoded::Incomplete => {}
        Decoded::Frame { .. } => panic!("cut={cut}: should not parse a partial frame"),
      }
    }
  }

  #[test]
  fn full_zero_run_then_non_star_byte_is_a_format_error() {
    let mut buf = vec![0u8; BITS_OF_LEN];
    buf.push(b'y');
    let err = read(&buf).unwrap_err();
    assert!(matches!(err, FleetError::Format(_)));
  }

  #[test]
  fn round_trip_over_a_real_socket_pair() {
    let (mut a, mut b) = UnixStream::pair().unwrap();
    FrameIo::write_frame(&mut a, b"ping").unwrap();
    let mut io = FrameIo::new();
    let got = io.read_frame(&mut b, -1).unwrap().unwrap();
    assert_eq!(got, b"ping");
  }

  #[test]
  fn non_blocking_read_returns_none_when_nothing_is_available() {
    let (a, mut b) = UnixStream::pair().unwrap();
    let mut io = FrameIo::new();
    assert!(io.read_frame(&mut b, 0).unwrap().is_none());
    drop(a);
  }
}
