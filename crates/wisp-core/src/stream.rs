//! Per-stream state and the two relay pumps that move bytes between a
//! stream's inbound queue / remote socket and the shared websocket writer.
//!
//! A stream has two phases, both tracked in the same map entry so a CLOSE
//! or DATA packet can address it uniformly regardless of phase:
//!
//! - **Connecting**: `reserve` has registered the stream (so DATA packets
//!   arriving before the dial finishes can already queue up) but the dial
//!   task owns the remote-socket attempt. `close_stream` during this phase
//!   cancels the dial task.
//! - **Open**: `spawn_pumps` has taken over the inbound receiver and a
//!   dialed remote's split reader/writer halves, and runs the ws→remote and
//!   remote→ws pumps. Either pump calls `close_stream` directly once it
//!   observes termination (EOF,
//!   a write error, ...) — there's no separate supervisor task, since
//!   `streams` is a plain mutex-guarded map rather than something only one
//!   task may touch.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

use crate::dialer::{RemoteReader, RemoteWriter};
use crate::framer::{encode_close, encode_continue, encode_data, CloseReason, QUEUE_CAPACITY};
use crate::ratelimit::{Direction, RateLimiter};

/// Every `QUEUE_CAPACITY / 4` successful ws→remote writes, one CONTINUE is
/// emitted for the stream. spec.md resolves the source's async/threaded
/// discrepancy in favor of "every 32 writes" — see SPEC_FULL.md §9.6.
const CONTINUE_EVERY: u64 = (QUEUE_CAPACITY / 4) as u64;

struct Pumps {
  ws_to_remote: JoinHandle<()>,
  remote_to_ws: JoinHandle<()>,
}

pub struct StreamHandle {
  inbound_tx: mpsc::Sender<Vec<u8>>,
  dial_task: Option<JoinHandle<()>>,
  pumps: Option<Pumps>,
}

pub type StreamMap = Arc<AsyncMutex<HashMap<u32, StreamHandle>>>;

pub fn new_stream_map() -> StreamMap {
  Arc::new(AsyncMutex::new(HashMap::new()))
}

/// Register `stream_id` before dialing starts, so DATA packets that race
/// the dial are queued rather than dropped. Returns the receiver the dial
/// task should hand to `spawn_pumps` on success.
pub async fn reserve(streams: &StreamMap, stream_id: u32) -> mpsc::Receiver<Vec<u8>> {
  let (tx, rx) = mpsc::channel(QUEUE_CAPACITY as usize);
  let handle = StreamHandle {
    inbound_tx: tx,
    dial_task: None,
    pumps: None,
  };
  streams.lock().await.insert(stream_id, handle);
  rx
}

/// Record the dial task's handle so a CLOSE arriving mid-dial can cancel it.
pub async fn attach_dial_task(streams: &StreamMap, stream_id: u32, task: JoinHandle<()>) {
  if let Some(handle) = streams.lock().await.get_mut(&stream_id) {
    handle.dial_task = Some(task);
  }
}

/// Enqueue a DATA payload for `stream_id`. Blocks (awaits) if the stream's
/// inbound queue is full — this is the intentional backpressure point that
/// pauses the session's receive loop until the ws→remote pump drains a
/// slot. Returns `false` if no such stream exists (caller silently drops).
pub async fn enqueue_data(streams: &StreamMap, stream_id: u32, payload: Vec<u8>) -> bool {
  let tx = {
    let map = streams.lock().await;
    match map.get(&stream_id) {
      Some(handle) => handle.inbound_tx.clone(),
      None => return false,
    }
  };
  tx.send(payload).await.is_ok()
}

/// Idempotent: removes the stream from `streams` and cancels whatever is
/// running (dial task or both pumps). Aborting a pump task drops its owned
/// reader/writer half, which closes that half of the remote socket. A
/// second call for the same `stream_id` is a no-op.
pub async fn close_stream(streams: &StreamMap, stream_id: u32) {
  let handle = {
    let mut map = streams.lock().await;
    map.remove(&stream_id)
  };
  let Some(handle) = handle else {
    return;
  };
  if let Some(dial_task) = handle.dial_task {
    dial_task.abort();
  }
  if let Some(pumps) = handle.pumps {
    pumps.ws_to_remote.abort();
    pumps.remote_to_ws.abort();
  }
}

pub async fn close_all(streams: &StreamMap) {
  let ids: Vec<u32> = streams.lock().await.keys().copied().collect();
  for id in ids {
    close_stream(streams, id).await;
  }
}

/// Take over `inbound_rx` and a freshly-dialed remote's split reader/writer,
/// spawn the two pumps, and attach them to the existing (already-reserved)
/// map entry. A no-op if the stream was closed (e.g. by a racing client
/// CLOSE) while the dial was in flight.
///
/// The reader and writer are independent owned halves, one per pump — not a
/// single `Remote` shared behind a lock. Sharing one lock across `recv()`
/// and `send()` would force whichever pump is blocked in a long read (the
/// common case for any request/response protocol) to hold it the whole
/// time, starving the other pump and deadlocking the relay.
#[allow(clippy::too_many_arguments)]
pub async fn spawn_pumps(
  streams: &StreamMap,
  stream_id: u32,
  reader: Box<dyn RemoteReader>,
  writer: Box<dyn RemoteWriter>,
  inbound_rx: mpsc::Receiver<Vec<u8>>,
  client_ip: IpAddr,
  limiter: Arc<RateLimiter>,
  ws_tx: mpsc::Sender<Vec<u8>>,
) {
  let ws_to_remote = tokio::spawn(ws_to_remote_pump(
    stream_id,
    writer,
    inbound_rx,
    ws_tx.clone(),
    streams.clone(),
  ));
  let remote_to_ws = tokio::spawn(remote_to_ws_pump(
    stream_id,
    reader,
    ws_tx,
    client_ip,
    limiter,
    streams.clone(),
  ));

  let mut map = streams.lock().await;
  match map.get_mut(&stream_id) {
    Some(handle) => {
      handle.dial_task = None;
      handle.pumps = Some(Pumps {
        ws_to_remote,
        remote_to_ws,
      });
    }
    None => {
      // Stream was closed while we were dialing; tear the new pumps back
      // down instead of leaking them.
      ws_to_remote.abort();
      remote_to_ws.abort();
    }
  }
}

async fn ws_to_remote_pump(
  stream_id: u32,
  mut writer: Box<dyn RemoteWriter>,
  mut inbound_rx: mpsc::Receiver<Vec<u8>>,
  ws_tx: mpsc::Sender<Vec<u8>>,
  streams: StreamMap,
) {
  let mut packets_sent: u64 = 0;

  while let Some(data) = inbound_rx.recv().await {
    let send_result = writer.send(data).await;
    if send_result.is_err() {
      tracing::info!(stream_id, "remote write failed, closing stream");
      close_stream(&streams, stream_id).await;
      return;
    }

    packets_sent += 1;
    if packets_sent % CONTINUE_EVERY == 0 {
      let buffer_remaining = QUEUE_CAPACITY.saturating_sub(inbound_rx.len() as u32);
      let packet = encode_continue(stream_id, buffer_remaining);
      let _ = ws_tx.send(packet).await;
    }
  }
}

async fn remote_to_ws_pump(
  stream_id: u32,
  mut reader: Box<dyn RemoteReader>,
  ws_tx: mpsc::Sender<Vec<u8>>,
  client_ip: IpAddr,
  limiter: Arc<RateLimiter>,
  streams: StreamMap,
) {
  loop {
    let recv_result = reader.recv().await;
    match recv_result {
      Ok(data) if data.is_empty() => {
        tracing::info!(stream_id, "remote eof");
        let _ = ws_tx.send(encode_close(stream_id, CloseReason::NormalClosure)).await;
        close_stream(&streams, stream_id).await;
        return;
      }
      Ok(data) => {
        let packet = encode_data(stream_id, &data);
        limiter
          .account_bytes(client_ip, packet.len(), Direction::Tcp)
          .await;
        if ws_tx.send(packet).await.is_err() {
          return;
        }
      }
      Err(err) => {
        tracing::warn!(stream_id, error = %err, "remote read failed");
        let _ = ws_tx.send(encode_close(stream_id, CloseReason::RemoteReadError)).await;
        close_stream(&streams, stream_id).await;
        return;
      }
    }
  }
}
