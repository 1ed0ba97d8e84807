//! SOCKS5 address framing
//!
//! A target address travels in front of every relayed UDP payload as
//! `ATYP | ADDR | PORT`, the same layout SOCKS5 uses in its requests.

use super::consts::*;
use anyhow::{Context, Result};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

/// Target address carried in an address prefix
///
/// Can be an IP address (v4 or v6) or a domain name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TargetAddr {
    /// IP address with port
    Ip(SocketAddr),
    /// Domain name with port; the name is at most 255 bytes
    Domain(String, u16),
}

impl TargetAddr {
    /// Create a new TargetAddr from an IPv4 address and port
    pub fn ipv4(ip: Ipv4Addr, port: u16) -> Self {
        TargetAddr::Ip(SocketAddr::new(IpAddr::V4(ip), port))
    }

    /// Create a new TargetAddr from an IPv6 address and port
    pub fn ipv6(ip: Ipv6Addr, port: u16) -> Self {
        TargetAddr::Ip(SocketAddr::new(IpAddr::V6(ip), port))
    }

    /// Create a new TargetAddr from a domain name and port.
    ///
    /// `None` when the name does not fit the one-byte length field.
    pub fn domain(domain: String, port: u16) -> Option<Self> {
        if domain.len() > MAX_DOMAIN_LEN {
            return None;
        }
        Some(TargetAddr::Domain(domain, port))
    }

    /// Parse a textual `host:port` address.
    ///
    /// IP literals (`1.2.3.4:53`, `[::1]:53`) become [`TargetAddr::Ip`],
    /// anything else with a valid port and a host of at most 255 bytes
    /// becomes [`TargetAddr::Domain`].
    pub fn parse(text: &str) -> Option<Self> {
        if let Ok(addr) = text.parse::<SocketAddr>() {
            return Some(TargetAddr::Ip(addr));
        }

        let (host, port) = text.rsplit_once(':')?;
        let port = port.parse::<u16>().ok()?;
        if host.is_empty() || host.contains(':') {
            return None;
        }

        TargetAddr::domain(host.to_string(), port)
    }

    /// Decode the address prefix at the start of `data`.
    ///
    /// Returns the address and the number of bytes the prefix occupies,
    /// or `None` when the leading bytes are not a complete prefix.
    pub fn split(data: &[u8]) -> Option<(Self, usize)> {
        let atyp = *data.first()?;

        match atyp {
            SOCKS5_ADDR_TYPE_IPV4 => {
                let len = 1 + 4 + 2;
                let bytes = data.get(1..len)?;
                let ip = Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]);
                let port = u16::from_be_bytes([bytes[4], bytes[5]]);
                Some((TargetAddr::ipv4(ip, port), len))
            }

            SOCKS5_ADDR_TYPE_DOMAIN => {
                let domain_len = *data.get(1)? as usize;
                let len = 1 + 1 + domain_len + 2;
                let bytes = data.get(2..len)?;
                let domain = std::str::from_utf8(&bytes[..domain_len]).ok()?;
                let port = u16::from_be_bytes([bytes[domain_len], bytes[domain_len + 1]]);
                Some((TargetAddr::domain(domain.to_string(), port)?, len))
            }

            SOCKS5_ADDR_TYPE_IPV6 => {
                let len = 1 + 16 + 2;
                let bytes = data.get(1..len)?;
                let mut ip_bytes = [0u8; 16];
                ip_bytes.copy_from_slice(&bytes[..16]);
                let port = u16::from_be_bytes([bytes[16], bytes[17]]);
                Some((TargetAddr::ipv6(Ipv6Addr::from(ip_bytes), port), len))
            }

            _ => None,
        }
    }

    /// Get the port number
    pub fn port(&self) -> u16 {
        match self {
            TargetAddr::Ip(addr) => addr.port(),
            TargetAddr::Domain(_, port) => *port,
        }
    }

    /// Get the address type byte
    pub fn addr_type(&self) -> u8 {
        match self {
            TargetAddr::Ip(SocketAddr::V4(_)) => SOCKS5_ADDR_TYPE_IPV4,
            TargetAddr::Ip(SocketAddr::V6(_)) => SOCKS5_ADDR_TYPE_IPV6,
            TargetAddr::Domain(_, _) => SOCKS5_ADDR_TYPE_DOMAIN,
        }
    }

    /// Number of bytes [`TargetAddr::write_to`] produces
    pub fn serialized_len(&self) -> usize {
        match self {
            TargetAddr::Ip(SocketAddr::V4(_)) => 1 + 4 + 2,
            TargetAddr::Ip(SocketAddr::V6(_)) => 1 + 16 + 2,
            TargetAddr::Domain(domain, _) => 1 + 1 + domain.len() + 2,
        }
    }

    /// Resolve the address to a SocketAddr
    ///
    /// For IP addresses, this returns immediately.
    /// For domain names, this performs DNS resolution.
    pub async fn resolve(&self) -> Result<SocketAddr> {
        match self {
            TargetAddr::Ip(addr) => Ok(*addr),
            TargetAddr::Domain(domain, port) => {
                let resolved = tokio::net::lookup_host((domain.as_str(), *port))
                    .await
                    .with_context(|| format!("Failed to resolve domain: {}", domain))?
                    .next()
                    .with_context(|| format!("No addresses found for domain: {}", domain))?;
                Ok(resolved)
            }
        }
    }

    /// Write the prefix into the front of `buf` and return its length.
    ///
    /// `buf` must hold at least [`TargetAddr::serialized_len`] bytes.
    pub fn write_to(&self, buf: &mut [u8]) -> usize {
        let len = self.serialized_len();
        let out = &mut buf[..len];
        out[0] = self.addr_type();

        match self {
            TargetAddr::Ip(SocketAddr::V4(addr)) => {
                out[1..5].copy_from_slice(&addr.ip().octets());
            }
            TargetAddr::Ip(SocketAddr::V6(addr)) => {
                out[1..17].copy_from_slice(&addr.ip().octets());
            }
            TargetAddr::Domain(domain, _) => {
                out[1] = domain.len() as u8;
                out[2..2 + domain.len()].copy_from_slice(domain.as_bytes());
            }
        }
        out[len - 2..].copy_from_slice(&self.port().to_be_bytes());

        len
    }

    /// Serialize the address prefix to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; self.serialized_len()];
        self.write_to(&mut bytes);
        bytes
    }
}

impl fmt::Display for TargetAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetAddr::Ip(addr) => write!(f, "{}", addr),
            TargetAddr::Domain(domain, port) => write!(f, "{}:{}", domain, port),
        }
    }
}

impl From<SocketAddr> for TargetAddr {
    fn from(addr: SocketAddr) -> Self {
        TargetAddr::Ip(addr)
    }
}
