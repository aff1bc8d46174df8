//! Resolve a hostname and reject it per loopback/private address policy
//! before anything dials it. Callers MUST dial the returned literal address
//! rather than re-resolving the hostname (defeats TOCTOU DNS-rebind).

use std::net::{IpAddr, Ipv6Addr, SocketAddr};

use tokio::net::lookup_host;

use crate::error::WispError;
use crate::framer::StreamType;

#[derive(Debug, Clone, Copy, Default)]
pub struct AddressPolicy {
  pub block_loopback: bool,
  pub block_private: bool,
}

impl AddressPolicy {
  pub fn new(block_loopback: bool, block_private: bool) -> Self {
    Self {
      block_loopback,
      block_private,
    }
  }

  fn is_blocked(&self, ip: IpAddr) -> bool {
    if self.block_loopback && ip.is_loopback() {
      return true;
    }
    if self.block_private && is_private(ip) && !ip.is_loopback() {
      return true;
    }
    false
  }
}

fn is_private(ip: IpAddr) -> bool {
  match ip {
    IpAddr::V4(v4) => v4.is_private() || v4.is_link_local(),
    IpAddr::V6(v6) => is_unique_local(v6),
  }
}

/// `fc00::/7`, the IPv6 analogue of RFC 1918 private space. Not yet stable
/// as `Ipv6Addr::is_unique_local`, so checked by hand.
fn is_unique_local(v6: Ipv6Addr) -> bool {
  (v6.segments()[0] & 0xfe00) == 0xfc00
}

/// Resolve `host:port` for the given stream type (TCP vs UDP resolution can
/// in principle return different records) and reject it per `policy`.
/// Returns the resolved literal `SocketAddr` on success.
pub async fn resolve_and_guard(
  host: &str,
  port: u16,
  stream_type: StreamType,
  policy: &AddressPolicy,
) -> Result<SocketAddr, WispError> {
  let _ = stream_type; // TCP/UDP resolve identically via getaddrinfo here.
  let mut addrs = lookup_host((host, port)).await.map_err(|source| WispError::DialFailed {
    host: host.to_string(),
    port,
    source,
  })?;

  let resolved = addrs.next().ok_or_else(|| WispError::DialFailed {
    host: host.to_string(),
    port,
    source: std::io::Error::new(std::io::ErrorKind::NotFound, "no address records"),
  })?;

  if policy.is_blocked(resolved.ip()) {
    return Err(WispError::BlockedAddress {
      host: host.to_string(),
      port,
    });
  }

  Ok(resolved)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::net::Ipv4Addr;

  fn policy(loopback: bool, private: bool) -> AddressPolicy {
    AddressPolicy::new(loopback, private)
  }

  #[test]
  fn blocks_loopback_when_configured() {
    let p = policy(true, false);
    assert!(p.is_blocked(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))));
  }

  #[test]
  fn allows_loopback_when_not_configured() {
    let p = policy(false, false);
    assert!(!p.is_blocked(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))));
  }

  #[test]
  fn blocks_private_ranges_when_configured() {
    let p = policy(false, true);
    assert!(p.is_blocked(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))));
    assert!(p.is_blocked(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1))));
    assert!(p.is_blocked(IpAddr::V4(Ipv4Addr::new(169, 254, 1, 1))));
  }

  #[test]
  fn public_addresses_are_never_blocked() {
    let p = policy(true, true);
    assert!(!p.is_blocked(IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34))));
  }

  #[test]
  fn private_block_does_not_double_block_loopback() {
    // Loopback is not "private" for the purposes of the block_private
    // flag alone; it's only rejected if block_loopback is also set.
    let p = policy(false, true);
    assert!(!p.is_blocked(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))));
  }
}
