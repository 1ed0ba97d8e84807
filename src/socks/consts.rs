//! SOCKS5 protocol constants
//!
//! Only the parts of SOCKS5 that appear in UDP datagrams are needed here.

// Address types
/// IPv4 address
pub const SOCKS5_ADDR_TYPE_IPV4: u8 = 0x01;
/// Domain name
pub const SOCKS5_ADDR_TYPE_DOMAIN: u8 = 0x03;
/// IPv6 address
pub const SOCKS5_ADDR_TYPE_IPV6: u8 = 0x04;

// Reserved byte
/// Reserved byte value (always 0x00)
pub const SOCKS5_RESERVED: u8 = 0x00;

/// Length of the `RSV(2) | FRAG(1)` header in front of a SOCKS5 UDP datagram
pub const SOCKS5_UDP_HEADER_LEN: usize = 3;

/// The header synthesized for every datagram returned to a SOCKS5 client
pub const SOCKS5_UDP_HEADER: [u8; SOCKS5_UDP_HEADER_LEN] =
    [SOCKS5_RESERVED, SOCKS5_RESERVED, 0x00];

/// Maximum domain name length
pub const MAX_DOMAIN_LEN: usize = 255;

/// Longest possible address prefix: ATYP + LEN + domain + port
pub const MAX_ADDR_LEN: usize = 1 + 1 + MAX_DOMAIN_LEN + 2;
