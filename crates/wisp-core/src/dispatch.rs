//! Classify an incoming request path into a route, and the small pieces of
//! per-connection bookkeeping (client IP resolution, session tagging) that
//! don't belong to either session type specifically.

use std::net::IpAddr;

use rand::Rng;

/// Where an incoming websocket upgrade should be routed. Only meaningful
/// for requests that are actually websocket upgrades — a non-upgrade
/// request always goes to the static file handler regardless of path, so
/// there is no `Static` variant here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
  /// Path ends in `/`: the full multiplexing endpoint.
  Wisp,
  /// Path's last segment parses as `host:port`.
  WsProxy { host: String, port: u16 },
  /// Neither of the above — the upgrade request is rejected outright.
  Invalid,
}

/// Classify `path` (already stripped of query string) per spec: a path
/// ending in `/` is always Wisp; anything else must parse as a WSProxy
/// destination.
pub fn classify(path: &str) -> Route {
  if path.ends_with('/') {
    return Route::Wisp;
  }
  match crate::session::wsproxy::parse_destination(path) {
    Some((host, port)) => Route::WsProxy { host, port },
    None => Route::Invalid,
  }
}

/// The client IP a rate limiter and address guard should key off of: the
/// `real_ip_header` value when present and parseable (set by a trusted
/// reverse proxy), otherwise the socket's peer address.
pub fn effective_client_ip(peer_ip: IpAddr, real_ip_header: Option<&str>) -> IpAddr {
  real_ip_header
    .and_then(|header| header.split(',').next())
    .map(str::trim)
    .and_then(|candidate| candidate.parse().ok())
    .unwrap_or(peer_ip)
}

/// A short random hex tag for log correlation across a session's lifetime,
/// mirroring `original_source/src/wisp/server/connection.py`'s `conn_id`.
pub fn random_session_tag() -> String {
  let mut rng = rand::thread_rng();
  let bytes: [u8; 4] = rng.gen();
  bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::net::Ipv4Addr;

  #[test]
  fn classifies_trailing_slash_as_wisp() {
    assert_eq!(classify("/"), Route::Wisp);
    assert_eq!(classify("/wisp/"), Route::Wisp);
  }

  #[test]
  fn classifies_wsproxy_destination() {
    assert_eq!(
      classify("/example.com:443"),
      Route::WsProxy {
        host: "example.com".to_string(),
        port: 443
      }
    );
  }

  #[test]
  fn rejects_paths_that_are_neither() {
    assert_eq!(classify("/index.html"), Route::Invalid);
  }

  #[test]
  fn prefers_real_ip_header_when_present() {
    let peer = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
    let resolved = effective_client_ip(peer, Some("203.0.113.9, 10.0.0.1"));
    assert_eq!(resolved, IpAddr::V4(Ipv4Addr::new(203, 0, 113, 9)));
  }

  #[test]
  fn falls_back_to_peer_ip_when_header_absent_or_invalid() {
    let peer = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
    assert_eq!(effective_client_ip(peer, None), peer);
    assert_eq!(effective_client_ip(peer, Some("not-an-ip")), peer);
  }

  #[test]
  fn session_tag_is_eight_hex_chars() {
    let tag = random_session_tag();
    assert_eq!(tag.len(), 8);
    assert!(tag.chars().all(|c| c.is_ascii_hexdigit()));
  }
}
