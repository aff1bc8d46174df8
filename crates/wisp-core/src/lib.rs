//! Core Wisp protocol engine: framing, address policy, remote dialing, rate
//! limiting, per-stream relay, and the two session types (full Wisp
//! multiplexing and single-stream WSProxy). No networking surface of its
//! own beyond `tokio::net` — the websocket handshake and HTTP surface live
//! in the `wisp-server` binary crate.

pub mod addr_guard;
pub mod config;
pub mod dialer;
pub mod dispatch;
pub mod error;
pub mod framer;
pub mod ratelimit;
pub mod session;
pub mod stream;
