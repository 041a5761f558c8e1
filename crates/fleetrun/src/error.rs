use thiserror::Error;

/// Errors surfaced by the dispatch engine and its adapters.
#[derive(Debug, Error)]
pub enum FleetError {
  #[error("configuration error: {0}")]
  Config(String),

  #[error("channel broke: {0}")]
  ChannelBroken(String),

  #[error("malformed frame on the wire: {0}")]
  Format(String),

  #[error("payload of {len} bytes exceeds the codec cap of {cap} bytes")]
  PayloadTooLarge { len: usize, cap: usize },

  #[error("ssh error for host {host}: {source}")]
  Ssh {
    host: String,
    #[source]
    source: anyhow::Error,
  },

  #[error("result store error: {0}")]
  Store(#[source] anyhow::Error),

  #[error("operator declined the group confirmation")]
  Aborted,
}

pub type FleetResult<T> = Result<T, FleetError>;
