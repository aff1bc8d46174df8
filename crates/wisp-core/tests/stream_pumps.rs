//! Scenario tests that drive the stream pumps directly against a
//! `MockRemote`, covering the parts of spec.md §8 that require an actually
//! connected remote (happy path, flow control, teardown) without touching
//! the network.

mod support;

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use wisp_core::framer::{decode, encode_data, WispPacketType, QUEUE_CAPACITY};
use wisp_core::ratelimit::{RateLimitConfig, RateLimiter};
use wisp_core::stream;

use support::MockRemote;

fn client_ip() -> IpAddr {
  IpAddr::V4(Ipv4Addr::new(198, 51, 100, 2))
}

fn disabled_limiter() -> Arc<RateLimiter> {
  Arc::new(RateLimiter::new(RateLimitConfig {
    enabled: false,
    ..Default::default()
  }))
}

#[tokio::test]
async fn happy_path_relays_both_directions() {
  let streams = stream::new_stream_map();
  let stream_id = 1;
  let inbound_rx = stream::reserve(&streams, stream_id).await;

  let (reader, writer, mock_inbound_tx, mut mock_sent_rx) = MockRemote::new();
  let (ws_tx, mut ws_rx) = mpsc::channel(64);

  stream::spawn_pumps(
    &streams,
    stream_id,
    Box::new(reader),
    Box::new(writer),
    inbound_rx,
    client_ip(),
    disabled_limiter(),
    ws_tx,
  )
  .await;

  // Client -> remote.
  stream::enqueue_data(&streams, stream_id, b"hello remote".to_vec()).await;
  let forwarded = mock_sent_rx.recv().await.unwrap();
  assert_eq!(forwarded, b"hello remote");

  // Remote -> client: arrives as a framed DATA packet on ws_tx.
  mock_inbound_tx.send(b"hello client".to_vec()).await.unwrap();
  let packet = ws_rx.recv().await.unwrap();
  let (ptype, id, payload) = decode(&packet).unwrap();
  assert_eq!(ptype, WispPacketType::Data);
  assert_eq!(id, stream_id);
  assert_eq!(payload, b"hello client");

  stream::close_stream(&streams, stream_id).await;
}

#[tokio::test]
async fn continue_is_sent_every_32_writes() {
  let streams = stream::new_stream_map();
  let stream_id = 2;
  let inbound_rx = stream::reserve(&streams, stream_id).await;

  let (reader, writer, _mock_inbound_tx, _sent_rx) = MockRemote::new();
  let (ws_tx, mut ws_rx) = mpsc::channel(256);

  stream::spawn_pumps(
    &streams,
    stream_id,
    Box::new(reader),
    Box::new(writer),
    inbound_rx,
    client_ip(),
    disabled_limiter(),
    ws_tx,
  )
  .await;

  for i in 0..33u32 {
    stream::enqueue_data(&streams, stream_id, vec![i as u8]).await;
  }

  // Give the pump a moment to drain the queue and emit CONTINUE.
  tokio::time::sleep(Duration::from_millis(50)).await;

  let mut continues = 0;
  while let Ok(packet) = ws_rx.try_recv() {
    let (ptype, id, _payload) = decode(&packet).unwrap();
    if ptype == WispPacketType::Continue {
      assert_eq!(id, stream_id);
      continues += 1;
    }
  }
  assert_eq!(continues, 1, "expected exactly one CONTINUE after the 32nd write");

  stream::close_stream(&streams, stream_id).await;
}

#[tokio::test]
async fn remote_eof_sends_close_and_tears_down_stream() {
  let streams = stream::new_stream_map();
  let stream_id = 3;
  let inbound_rx = stream::reserve(&streams, stream_id).await;

  let (reader, writer, mock_inbound_tx, _sent_rx) = MockRemote::new();
  let (ws_tx, mut ws_rx) = mpsc::channel(64);

  stream::spawn_pumps(
    &streams,
    stream_id,
    Box::new(reader),
    Box::new(writer),
    inbound_rx,
    client_ip(),
    disabled_limiter(),
    ws_tx,
  )
  .await;

  // Dropping the sender starves `recv()`, which the mock reports as EOF.
  drop(mock_inbound_tx);

  let packet = ws_rx.recv().await.unwrap();
  let (ptype, id, _payload) = decode(&packet).unwrap();
  assert_eq!(ptype, WispPacketType::Close);
  assert_eq!(id, stream_id);

  tokio::time::sleep(Duration::from_millis(20)).await;
  assert!(streams.lock().await.get(&stream_id).is_none());
}

#[tokio::test]
async fn enqueue_to_unknown_stream_is_a_harmless_no_op() {
  let streams = stream::new_stream_map();
  let delivered = stream::enqueue_data(&streams, 99, encode_data(99, b"x")).await;
  assert!(!delivered);
}

#[tokio::test]
async fn close_stream_is_idempotent() {
  let streams = stream::new_stream_map();
  let stream_id = 4;
  let inbound_rx = stream::reserve(&streams, stream_id).await;
  let (reader, writer, _tx, _rx) = MockRemote::new();
  let (ws_tx, _ws_rx) = mpsc::channel(8);

  stream::spawn_pumps(
    &streams, stream_id, Box::new(reader), Box::new(writer), inbound_rx, client_ip(), disabled_limiter(), ws_tx,
  )
  .await;

  stream::close_stream(&streams, stream_id).await;
  stream::close_stream(&streams, stream_id).await;
  assert!(streams.lock().await.get(&stream_id).is_none());
}
