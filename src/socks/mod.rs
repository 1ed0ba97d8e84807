//! SOCKS5 address framing
//!
//! The relays carry SOCKS5 style address prefixes
//! (`ATYP | DST.ADDR | DST.PORT`) in front of every payload.

mod consts;
mod types;

pub use consts::*;
pub use types::TargetAddr;
