//! Reduce an overlay multiaddr to the UDP endpoint the interface sends to.

use std::net::{IpAddr, SocketAddr};

use libp2p::{multiaddr::Protocol, Multiaddr};

use crate::{Result, TunnelError};

/// Extract `ip:port` from a multiaddr.
///
/// Takes the first IP component and the first TCP or UDP port after it;
/// trailing components such as `/quic-v1` or `/p2p/<id>` are ignored.
pub fn endpoint_from_multiaddr(addr: &Multiaddr) -> Result<SocketAddr> {
    let mut ip: Option<IpAddr> = None;

    for proto in addr.iter() {
        match proto {
            Protocol::Ip4(v4) if ip.is_none() => ip = Some(IpAddr::V4(v4)),
            Protocol::Ip6(v6) if ip.is_none() => ip = Some(IpAddr::V6(v6)),
            Protocol::Udp(port) | Protocol::Tcp(port) => {
                return match ip {
                    Some(ip) => Ok(SocketAddr::new(ip, port)),
                    None => Err(TunnelError::InvalidEndpoint(addr.to_string())),
                };
            }
            _ => {}
        }
    }

    Err(TunnelError::InvalidEndpoint(addr.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Result<SocketAddr> {
        endpoint_from_multiaddr(&s.parse().unwrap())
    }

    #[test]
    fn test_quic_suffix_stripped() {
        let endpoint = parse("/ip4/203.0.113.7/udp/4001/quic-v1").unwrap();
        assert_eq!(endpoint, "203.0.113.7:4001".parse().unwrap());
    }

    #[test]
    fn test_peer_suffix_stripped() {
        let addr = format!("/ip4/10.1.2.3/tcp/9000/p2p/{}", libp2p::PeerId::random());
        assert_eq!(parse(&addr).unwrap(), "10.1.2.3:9000".parse().unwrap());
    }

    #[test]
    fn test_ipv6() {
        let endpoint = parse("/ip6/::1/udp/51820/quic-v1").unwrap();
        assert_eq!(endpoint, "[::1]:51820".parse().unwrap());
    }

    #[test]
    fn test_dns_and_portless_rejected() {
        assert!(matches!(
            parse("/dns4/example.com/udp/4001"),
            Err(TunnelError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            parse("/ip4/10.0.0.1"),
            Err(TunnelError::InvalidEndpoint(_))
        ));
    }
}
