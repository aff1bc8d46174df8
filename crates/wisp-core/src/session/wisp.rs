//! Full Wisp multiplexing session: one of these exists per accepted
//! websocket connection at the `/` (or configured) Wisp endpoint, and owns
//! every stream multiplexed over it.

use std::net::IpAddr;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::addr_guard::AddressPolicy;
use crate::dialer;
use crate::error::WispError;
use crate::framer::{
  decode, encode_close, encode_continue, parse_connect, CloseReason, StreamType, WispPacketType,
  QUEUE_CAPACITY,
};
use crate::ratelimit::{Direction, RateLimiter};
use crate::stream::{self, StreamMap};

pub struct WispSession {
  streams: StreamMap,
  client_ip: IpAddr,
  policy: AddressPolicy,
  limiter: Arc<RateLimiter>,
  ws_tx: mpsc::Sender<Vec<u8>>,
}

impl WispSession {
  pub fn new(
    client_ip: IpAddr,
    policy: AddressPolicy,
    limiter: Arc<RateLimiter>,
    ws_tx: mpsc::Sender<Vec<u8>>,
  ) -> Self {
    Self {
      streams: stream::new_stream_map(),
      client_ip,
      policy,
      limiter,
      ws_tx,
    }
  }

  /// The server-initiated CONTINUE (stream id 0, full credit) that opens
  /// every Wisp connection, advertising the inbound queue capacity to the
  /// client before any stream exists.
  pub fn initial_continue(&self) -> Vec<u8> {
    encode_continue(0, QUEUE_CAPACITY)
  }

  /// Handle one inbound binary websocket frame. Unknown packet types are
  /// silently ignored, matching the framer's `Unknown` variant; a frame too
  /// short to carry the common header is also ignored rather than tearing
  /// down the whole session over one bad packet.
  pub async fn handle_binary_message(&self, frame: &[u8]) {
    self
      .limiter
      .account_bytes(self.client_ip, frame.len(), Direction::Ws)
      .await;

    let Some((ptype, stream_id, payload)) = decode(frame) else {
      tracing::warn!("dropping undersized wisp frame");
      return;
    };

    match ptype {
      WispPacketType::Connect => self.handle_connect(stream_id, payload).await,
      WispPacketType::Data => {
        stream::enqueue_data(&self.streams, stream_id, payload.to_vec()).await;
      }
      WispPacketType::Close => {
        let reason = payload.first().copied().map(CloseReason::from_code);
        tracing::info!(stream_id, ?reason, "client closed stream");
        stream::close_stream(&self.streams, stream_id).await;
      }
      WispPacketType::Continue => {
        // The server never expects a client-sent CONTINUE; ignored per spec.
      }
      WispPacketType::Unknown(byte) => {
        tracing::debug!(byte, "ignoring unknown wisp packet type");
      }
    }
  }

  async fn handle_connect(&self, stream_id: u32, payload: &[u8]) {
    let Some(connect) = parse_connect(payload) else {
      tracing::warn!(stream_id, "malformed connect payload");
      return;
    };

    // Checked against whatever count the accept-time increment (and any
    // prior successful CONNECTs on this session) already produced — a
    // stream is only counted once it's actually open, not on every
    // attempt (see `record_stream_opened` below).
    if self.limiter.streams_over_limit(self.client_ip).await {
      let _ = self
        .ws_tx
        .send(encode_close(stream_id, CloseReason::RateLimited))
        .await;
      return;
    }

    let Some(stream_type) = StreamType::from_byte(connect.stream_type_raw) else {
      let err = WispError::UnsupportedStreamType(connect.stream_type_raw);
      tracing::info!(stream_id, %err, "rejecting connect");
      if let Some(reason) = err.close_reason() {
        let _ = self.ws_tx.send(encode_close(stream_id, reason)).await;
      }
      return;
    };

    // Registered before the dial starts: DATA packets racing the dial
    // queue up instead of being dropped (see `stream` module docs).
    let inbound_rx = stream::reserve(&self.streams, stream_id).await;

    let streams = self.streams.clone();
    let ws_tx = self.ws_tx.clone();
    let client_ip = self.client_ip;
    let limiter = self.limiter.clone();
    let policy = self.policy;
    let host = connect.hostname.clone();
    let port = connect.dest_port;

    let dial_task = tokio::spawn(async move {
      match dialer::connect_stream(stream_type, &host, port, &policy).await {
        Ok((reader, writer)) => {
          limiter.record_stream_opened(client_ip).await;
          stream::spawn_pumps(
            &streams, stream_id, reader, writer, inbound_rx, client_ip, limiter, ws_tx,
          )
          .await;
        }
        Err(err) => {
          tracing::info!(stream_id, %err, "dial failed");
          if let Some(reason) = err.close_reason() {
            let _ = ws_tx.send(encode_close(stream_id, reason)).await;
          }
          stream::close_stream(&streams, stream_id).await;
        }
      }
    });

    stream::attach_dial_task(&self.streams, stream_id, dial_task).await;
  }

  pub async fn close(&self) {
    stream::close_all(&self.streams).await;
  }
}
