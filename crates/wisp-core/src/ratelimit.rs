//! Per-client-IP fixed-window bandwidth and new-stream limiter. Ported from
//! `original_source/src/wisp/server/ratelimit.py`: a process-wide (here,
//! per-worker, see SPEC_FULL.md §9.5) map keyed by IP, cleared atomically on
//! every window tick.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::time::sleep;

#[derive(Debug, Clone, Copy)]
pub enum Direction {
  Tcp,
  Ws,
}

#[derive(Debug, Clone)]
struct ClientRecord {
  streams_opened: u64,
  tcp_bytes: u64,
  ws_bytes: u64,
  window_start: Instant,
}

impl ClientRecord {
  fn new() -> Self {
    Self {
      streams_opened: 0,
      tcp_bytes: 0,
      ws_bytes: 0,
      window_start: Instant::now(),
    }
  }

  fn bytes(&self, dir: Direction) -> u64 {
    match dir {
      Direction::Tcp => self.tcp_bytes,
      Direction::Ws => self.ws_bytes,
    }
  }

  fn add_bytes(&mut self, dir: Direction, n: u64) {
    match dir {
      Direction::Tcp => self.tcp_bytes += n,
      Direction::Ws => self.ws_bytes += n,
    }
  }

  /// Bytes/sec observed so far this window. Immediately after a reset this
  /// recomputes from a fresh `window_start`, so the first byte of a window
  /// never triggers limiting.
  fn rate(&self, dir: Direction) -> f64 {
    let elapsed = self.window_start.elapsed().as_secs_f64();
    if elapsed <= 0.0 {
      return 0.0;
    }
    self.bytes(dir) as f64 / elapsed
  }
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
  pub enabled: bool,
  pub streams_limit: u64,
  /// Kilobytes per second, per direction.
  pub bandwidth_limit_kb: f64,
  pub window: Duration,
}

impl Default for RateLimitConfig {
  fn default() -> Self {
    Self {
      enabled: false,
      streams_limit: 30,
      bandwidth_limit_kb: 1000.0,
      window: Duration::from_secs(60),
    }
  }
}

/// Owned by one worker (see SPEC_FULL.md §9.5): never shared across OS
/// threads, so the background resetter and the per-request accounting both
/// only ever race within the same tokio runtime.
pub struct RateLimiter {
  config: RateLimitConfig,
  clients: Arc<Mutex<HashMap<IpAddr, ClientRecord>>>,
}

impl RateLimiter {
  pub fn new(config: RateLimitConfig) -> Self {
    Self {
      config,
      clients: Arc::new(Mutex::new(HashMap::new())),
    }
  }

  pub fn is_enabled(&self) -> bool {
    self.config.enabled
  }

  /// Report whether `ip`'s current stream count already exceeds
  /// `streams_limit`, without mutating it. Always `false` when disabled.
  pub async fn streams_over_limit(&self, ip: IpAddr) -> bool {
    if !self.config.enabled {
      return false;
    }
    let clients = self.clients.lock().await;
    match clients.get(&ip) {
      Some(record) => record.streams_opened > self.config.streams_limit,
      None => false,
    }
  }

  /// Record one more stream opened for `ip`. No-op when disabled. Callers
  /// account a stream only once it's actually usable — a successful Wisp
  /// CONNECT dial, or an accepted connection — not on every attempt.
  pub async fn record_stream_opened(&self, ip: IpAddr) {
    if !self.config.enabled {
      return;
    }
    let mut clients = self.clients.lock().await;
    let record = clients.entry(ip).or_insert_with(ClientRecord::new);
    record.streams_opened += 1;
  }

  /// Account `n` bytes against `ip` in `direction`, then pace (sleep ~10ms
  /// at a time) while the observed rate exceeds the configured limit. A
  /// crude throttle rather than a drop, matching the original.
  pub async fn account_bytes(&self, ip: IpAddr, n: usize, direction: Direction) {
    if !self.config.enabled {
      return;
    }
    {
      let mut clients = self.clients.lock().await;
      let record = clients.entry(ip).or_insert_with(ClientRecord::new);
      record.add_bytes(direction, n as u64);
    }

    loop {
      let over_limit = {
        let clients = self.clients.lock().await;
        match clients.get(&ip) {
          Some(record) => record.rate(direction) > self.config.bandwidth_limit_kb * 1000.0,
          None => false,
        }
      };
      if !over_limit {
        break;
      }
      sleep(Duration::from_millis(10)).await;
    }
  }

  /// Replace the whole map with an empty one. Intended to be driven by
  /// `spawn_resetter` on a `window`-second cadence.
  pub async fn reset(&self) {
    let mut clients = self.clients.lock().await;
    *clients = HashMap::new();
  }

  pub fn window(&self) -> Duration {
    self.config.window
  }
}

/// Spawn the background task that clears the limiter's state every
/// `window`. Returns the task handle so callers can cancel it on shutdown.
pub fn spawn_resetter(limiter: Arc<RateLimiter>) -> tokio::task::JoinHandle<()> {
  tokio::spawn(async move {
    loop {
      sleep(limiter.window()).await;
      limiter.reset().await;
    }
  })
}
