use std::sync::Arc;

use wisp_core::config::ServerConfig;
use wisp_core::ratelimit::RateLimiter;

/// Shared per-worker state. Each `SO_REUSEPORT` worker thread builds its own
/// `AppState` (and therefore its own `RateLimiter`) — see SPEC_FULL.md §9.5:
/// rate-limit accounting is intentionally per-worker, not shared.
#[derive(Clone)]
pub struct AppState {
  pub config: Arc<ServerConfig>,
  pub limiter: Arc<RateLimiter>,
}

impl AppState {
  pub fn new(config: ServerConfig) -> Self {
    let limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
    Self {
      config: Arc::new(config),
      limiter,
    }
  }
}
