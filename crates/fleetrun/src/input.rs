//! Host and command file readers (SPEC_FULL §4.E, §6).

use crate::error::{FleetError, FleetResult};
use std::fs;
use std::path::Path;

/// Read a newline-delimited UTF-8 file into an ordered list of entries,
/// stripping trailing newlines and skipping blank lines.
pub fn read_lines(path: &Path) -> FleetResult<Vec<String>> {
  let contents = fs::read_to_string(path)
    .map_err(|e| FleetError::Config(format!("cannot read {}: {e}", path.display())))?;
  Ok(contents
    .lines()
    .map(str::trim_end)
    .filter(|line| !line.is_empty())
    .map(str::to_string)
    .collect())
}

/// An empty hosts file yields an empty host queue, which the coordinator
/// tolerates (SPEC_FULL §3): the run simply dispatches nothing.
pub fn read_hosts(path: &Path) -> FleetResult<Vec<String>> {
  read_lines(path)
}

/// An empty commands file yields an empty command list; `Coordinator`
/// treats that as a no-op run rather than an error (SPEC_FULL §4.C.1).
pub fn read_commands(path: &Path) -> FleetResult<Vec<String>> {
  read_lines(path)
}
