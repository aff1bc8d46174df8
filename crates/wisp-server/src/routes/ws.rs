use std::net::SocketAddr;

use axum::extract::connect_info::ConnectInfo;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{OriginalUri, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use wisp_core::dispatch::{self, Route};
use wisp_core::session::{wisp::WispSession, wsproxy};

use crate::state::AppState;
use crate::static_files;

const REAL_IP_HEADER: &str = "x-real-ip";

/// Single entry point for everything that isn't reachable some other way:
/// classifies the request path, and either upgrades to a websocket (Wisp or
/// WSProxy) or falls through to static file serving.
pub async fn handler(
  State(state): State<AppState>,
  ConnectInfo(peer_addr): ConnectInfo<SocketAddr>,
  headers: HeaderMap,
  OriginalUri(uri): OriginalUri,
  ws: Option<WebSocketUpgrade>,
) -> Response {
  let path = uri.path().to_string();

  // Static serving applies only to requests that aren't websocket upgrades
  // at all; path has no bearing on that decision.
  let Some(ws) = ws else {
    return static_files::serve(state.config.static_dir.as_deref(), &path).await;
  };

  // `X-Real-IP` is only honored when the immediate transport peer is
  // loopback (a fronting reverse proxy on the same host) — an untrusted
  // peer can't spoof its own rate-limit/address-guard identity otherwise.
  let real_ip_header = if peer_addr.ip().is_loopback() {
    headers.get(REAL_IP_HEADER).and_then(|v| v.to_str().ok())
  } else {
    None
  };
  let client_ip = dispatch::effective_client_ip(peer_addr.ip(), real_ip_header);

  // Every accepted upgrade counts against the per-IP stream cap, whether or
  // not it ends up being a Wisp or WSProxy session (§4.8) — a Wisp session
  // gates each individual CONNECT against this same count later, while a
  // WSProxy session (exactly one stream) is gated right here.
  state.limiter.record_stream_opened(client_ip).await;
  let over_limit = state.limiter.streams_over_limit(client_ip).await;

  match dispatch::classify(&path) {
    Route::Wisp => ws.on_upgrade(move |socket| run_wisp_session(socket, state, client_ip)),
    Route::WsProxy { host, port } => {
      if over_limit {
        return StatusCode::TOO_MANY_REQUESTS.into_response();
      }
      ws.on_upgrade(move |socket| run_wsproxy_session(socket, state, client_ip, host, port))
    }
    Route::Invalid => StatusCode::BAD_REQUEST.into_response(),
  }
}

async fn run_wisp_session(socket: WebSocket, state: AppState, client_ip: std::net::IpAddr) {
  let tag = dispatch::random_session_tag();
  let span = tracing::info_span!("session", id = %tag, client_ip = %client_ip);
  let _enter = span.enter();
  tracing::info!("wisp session opened");

  let (mut ws_tx, mut ws_rx) = socket.split();
  let (send_tx, mut send_rx) = mpsc::channel::<Vec<u8>>(256);

  let sender = tokio::spawn(async move {
    while let Some(data) = send_rx.recv().await {
      if ws_tx.send(Message::Binary(data.into())).await.is_err() {
        break;
      }
    }
  });

  let session = WispSession::new(
    client_ip,
    state.config.address_policy,
    state.limiter.clone(),
    send_tx.clone(),
  );

  if send_tx.send(session.initial_continue()).await.is_err() {
    sender.abort();
    return;
  }

  while let Some(msg) = ws_rx.next().await {
    match msg {
      Ok(Message::Binary(data)) => session.handle_binary_message(&data).await,
      Ok(Message::Close(_)) | Err(_) => break,
      _ => continue,
    }
  }

  session.close().await;
  sender.abort();
  tracing::info!("wisp session closed");
}

async fn run_wsproxy_session(
  socket: WebSocket,
  state: AppState,
  client_ip: std::net::IpAddr,
  host: String,
  port: u16,
) {
  let tag = dispatch::random_session_tag();
  let span = tracing::info_span!("session", id = %tag, client_ip = %client_ip, host, port);
  let _enter = span.enter();
  tracing::info!("wsproxy session opened");

  let (mut ws_tx, mut ws_rx) = socket.split();
  let (send_tx, mut send_rx) = mpsc::channel::<Vec<u8>>(256);
  let (inbound_tx, inbound_rx) = mpsc::channel::<Vec<u8>>(256);

  let sender = tokio::spawn(async move {
    while let Some(data) = send_rx.recv().await {
      if ws_tx.send(Message::Binary(data.into())).await.is_err() {
        break;
      }
    }
  });

  let relay = tokio::spawn(wsproxy::run(
    host,
    port,
    state.config.address_policy,
    client_ip,
    state.limiter.clone(),
    inbound_rx,
    send_tx,
  ));

  while let Some(msg) = ws_rx.next().await {
    match msg {
      Ok(Message::Binary(data)) => {
        if inbound_tx.send(data.to_vec()).await.is_err() {
          break;
        }
      }
      Ok(Message::Close(_)) | Err(_) => break,
      _ => continue,
    }
  }

  drop(inbound_tx);
  let _ = relay.await;
  sender.abort();
  tracing::info!("wsproxy session closed");
}
