//! CLI/env/JSON-file configuration glue. `wisp_core` itself knows nothing
//! about `clap` or `serde`; this module's only job is producing a
//! `wisp_core::config::ServerConfig` from whatever mix of sources the
//! operator used.

use std::time::Duration;

use clap::Parser;
use serde::Deserialize;
use wisp_core::addr_guard::AddressPolicy;
use wisp_core::config::ServerConfig;
use wisp_core::ratelimit::RateLimitConfig;

/// A Wisp protocol multiplexing server.
#[derive(Debug, Parser)]
#[command(name = "wisp-server", version, about)]
pub struct Cli {
  /// Load defaults from a JSON config file before applying flags/env.
  #[arg(long, value_name = "PATH")]
  pub config: Option<String>,

  #[arg(long, env = "WISP_HOST")]
  pub host: Option<String>,

  #[arg(long, env = "WISP_PORT")]
  pub port: Option<u16>,

  /// Directory to serve non-websocket requests from. Omit to disable static
  /// serving (handler replies 204).
  #[arg(long, value_name = "DIR", env = "WISP_STATIC")]
  pub r#static: Option<String>,

  /// Enable the per-client rate limiter.
  #[arg(long, env = "WISP_LIMITS")]
  pub limits: bool,

  /// New streams allowed per client per window.
  #[arg(long, env = "WISP_CONNECTIONS")]
  pub connections: Option<u64>,

  /// Bandwidth allowed per client per window, in kilobytes/second.
  #[arg(long, env = "WISP_BANDWIDTH")]
  pub bandwidth: Option<f64>,

  /// Rate limit window, in seconds.
  #[arg(long, env = "WISP_WINDOW")]
  pub window: Option<u64>,

  #[arg(long, env = "WISP_ALLOW_LOOPBACK")]
  pub allow_loopback: bool,

  #[arg(long, env = "WISP_ALLOW_PRIVATE")]
  pub allow_private: bool,

  #[arg(long, default_value = "info", env = "WISP_LOG_LEVEL")]
  pub log_level: String,

  /// Worker threads, each binding its own `SO_REUSEPORT` listener with its
  /// own independent rate limiter. 0 resolves to the CPU count.
  #[arg(long, default_value_t = 1, env = "WISP_THREADS")]
  pub threads: usize,
}

/// Mirrors `original_source/main.py`'s `--config` JSON file: any key left
/// `None` here falls through to the flag/env default instead of
/// overwriting it.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
  host: Option<String>,
  port: Option<u16>,
  r#static: Option<String>,
  limits: Option<bool>,
  connections: Option<u64>,
  bandwidth: Option<f64>,
  window: Option<u64>,
  allow_loopback: Option<bool>,
  allow_private: Option<bool>,
}

impl Cli {
  /// Resolve this CLI invocation (optionally layered over a JSON config
  /// file) into the engine's `ServerConfig`, plus the log level string the
  /// binary's `tracing_subscriber` setup should use.
  pub fn resolve(self) -> std::io::Result<(ServerConfig, String)> {
    let file = match &self.config {
      Some(path) => {
        let data = std::fs::read_to_string(path)?;
        serde_json::from_str(&data).unwrap_or_else(|err| {
          tracing::warn!(path, %err, "ignoring malformed config file");
          FileConfig::default()
        })
      }
      None => FileConfig::default(),
    };

    let mut defaults = ServerConfig::default();

    defaults.host = self.host.or(file.host).unwrap_or(defaults.host);
    defaults.port = self.port.or(file.port).unwrap_or(defaults.port);
    defaults.static_dir = self.r#static.or(file.r#static);

    let limits_enabled = self.limits || file.limits.unwrap_or(false);
    let mut rate_limit = RateLimitConfig {
      enabled: limits_enabled,
      ..defaults.rate_limit
    };
    if let Some(streams_limit) = self.connections.or(file.connections) {
      rate_limit.streams_limit = streams_limit;
    }
    if let Some(bandwidth) = self.bandwidth.or(file.bandwidth) {
      rate_limit.bandwidth_limit_kb = bandwidth;
    }
    if let Some(window_secs) = self.window.or(file.window) {
      rate_limit.window = Duration::from_secs(window_secs);
    }
    defaults.rate_limit = rate_limit;

    defaults.address_policy = AddressPolicy::new(
      !(self.allow_loopback || file.allow_loopback.unwrap_or(false)),
      !(self.allow_private || file.allow_private.unwrap_or(false)),
    );

    defaults.threads = if self.threads == 0 {
      std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
    } else {
      self.threads
    };

    Ok((defaults, self.log_level))
  }
}
