//! Single-stream WSProxy relay: the destination is embedded in the
//! websocket URL path (`.../host:port`) instead of negotiated via CONNECT
//! packets, and the whole connection behaves as one unmultiplexed stream —
//! raw bytes in either direction, no wisp framing at all.

use std::net::IpAddr;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::addr_guard::AddressPolicy;
use crate::dialer;
use crate::error::WispError;
use crate::framer::StreamType;
use crate::ratelimit::{Direction, RateLimiter};

/// Split the last `/`-separated path segment into `(host, port)`. Tightened
/// slightly from "any path whose last segment is host:port": the port must
/// parse as `u16` and the host must be non-empty (see SPEC_FULL.md §9.6).
pub fn parse_destination(path: &str) -> Option<(String, u16)> {
  let segment = path.rsplit('/').next()?;
  let (host, port) = segment.rsplit_once(':')?;
  if host.is_empty() {
    return None;
  }
  let port: u16 = port.parse().ok()?;
  Some((host.to_string(), port))
}

/// Dial the destination and relay until either direction ends. Unlike the
/// Wisp session, there's a single always-TCP stream and no framing:
/// `inbound_rx` carries raw bytes to forward to the remote, `ws_tx` raw
/// bytes to forward back to the client.
///
/// The dialed remote is split into independent reader/writer halves (see
/// `crate::dialer`) before either task starts, exactly like the teacher's
/// `handle_tcp_stream` splits its `TcpStream` via `into_split`: one task
/// would otherwise have to hold a lock across the other's blocking read,
/// deadlocking the relay for any request/response remote.
pub async fn run(
  host: String,
  port: u16,
  policy: AddressPolicy,
  client_ip: IpAddr,
  limiter: Arc<RateLimiter>,
  mut inbound_rx: mpsc::Receiver<Vec<u8>>,
  ws_tx: mpsc::Sender<Vec<u8>>,
) -> Result<(), WispError> {
  let (mut reader, mut writer) = dialer::connect_stream(StreamType::Tcp, &host, port, &policy).await?;

  let to_remote = tokio::spawn(async move {
    while let Some(data) = inbound_rx.recv().await {
      if writer.send(data).await.is_err() {
        return;
      }
    }
  });

  let to_ws = tokio::spawn(async move {
    loop {
      let recv_result = reader.recv().await;
      match recv_result {
        Ok(data) if data.is_empty() => return,
        Ok(data) => {
          limiter.account_bytes(client_ip, data.len(), Direction::Tcp).await;
          if ws_tx.send(data).await.is_err() {
            return;
          }
        }
        Err(_) => return,
      }
    }
  });

  // Whichever direction ends first (remote EOF/error, or the client closing
  // the websocket) tears the other down — the same "first pump to finish
  // wins" shape the teacher's `handle_tcp_stream` uses.
  let mut to_remote = to_remote;
  let mut to_ws = to_ws;
  tokio::select! {
    _ = &mut to_remote => { to_ws.abort(); }
    _ = &mut to_ws => { to_remote.abort(); }
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_host_port_from_last_segment() {
    assert_eq!(
      parse_destination("/example.com:443"),
      Some(("example.com".to_string(), 443))
    );
    assert_eq!(
      parse_destination("/wisp/example.com:443"),
      Some(("example.com".to_string(), 443))
    );
  }

  #[test]
  fn rejects_missing_port() {
    assert_eq!(parse_destination("/example.com"), None);
  }

  #[test]
  fn rejects_non_numeric_port() {
    assert_eq!(parse_destination("/example.com:https"), None);
  }

  #[test]
  fn rejects_empty_host() {
    assert_eq!(parse_destination("/:443"), None);
  }
}
