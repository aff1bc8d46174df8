use std::net::IpAddr;

use thiserror::Error;

use crate::framer::CloseReason;

/// Errors produced by the core engine. Every variant carries the close
/// reason (if any) the caller should emit to the client, per the
/// disposition table in the spec's error handling section.
#[derive(Debug, Error)]
pub enum WispError {
  #[error("malformed wisp frame")]
  ProtocolDecode,

  #[error("unsupported stream type {0}")]
  UnsupportedStreamType(u8),

  #[error("blocked destination {host}:{port}")]
  BlockedAddress { host: String, port: u16 },

  #[error("failed to dial {host}:{port}: {source}")]
  DialFailed {
    host: String,
    port: u16,
    #[source]
    source: std::io::Error,
  },

  #[error("rate limit exceeded for {0}")]
  RateExceeded(IpAddr),

  #[error("remote read error: {0}")]
  RemoteReadError(#[source] std::io::Error),

  #[error("remote closed")]
  RemoteEof,

  #[error("remote write error: {0}")]
  RemoteWriteError(#[source] std::io::Error),

  #[error("websocket closed")]
  WebsocketClosed,
}

impl WispError {
  /// The CLOSE reason code a session should emit to the client for this
  /// error, if any (`RemoteWriteError`/`WebsocketClosed` emit nothing: the
  /// connection teardown itself communicates failure).
  pub fn close_reason(&self) -> Option<CloseReason> {
    match self {
      WispError::UnsupportedStreamType(_) => Some(CloseReason::StreamTypeUnsupported),
      WispError::BlockedAddress { .. } | WispError::DialFailed { .. } => {
        Some(CloseReason::ConnectionFailed)
      }
      WispError::RateExceeded(_) => Some(CloseReason::RateLimited),
      WispError::RemoteReadError(_) => Some(CloseReason::RemoteReadError),
      WispError::RemoteEof => Some(CloseReason::NormalClosure),
      WispError::ProtocolDecode | WispError::RemoteWriteError(_) | WispError::WebsocketClosed => {
        None
      }
    }
  }
}
