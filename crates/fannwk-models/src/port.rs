//! Logical transport ports.
//!
//! The network layer multiplexes a small, closed set of UDP-like ports.
//! Each port is carried as a 4-bit field; source and destination ports of a
//! frame must be equal.

use serde::{Deserialize, Serialize};
use strum::EnumCount;

/// A logical transport port.
#[derive(
    Serialize,
    Deserialize,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::EnumCount,
    strum::EnumIter,
)]
#[strum(serialize_all = "kebab-case")]
pub enum Port {
    /// Unsecured application traffic.
    Plain = 0,
    /// Application-secured traffic.
    Secured = 1,
    /// Link-security (DTLS) traffic.
    LinkSecured = 2,
    /// Tunnelled unsecured traffic.
    TunnelPlain = 3,
    /// Tunnelled secured traffic.
    TunnelSecured = 4,
}

impl Port {
    /// Number of supported ports.
    pub const COUNT: usize = <Self as EnumCount>::COUNT;

    /// Width of one port field on the wire.
    pub const WIRE_BITS: usize = 4;

    /// Parse a 4-bit wire value. Returns `None` for unsupported ports.
    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Plain),
            1 => Some(Self::Secured),
            2 => Some(Self::LinkSecured),
            3 => Some(Self::TunnelPlain),
            4 => Some(Self::TunnelSecured),
            _ => None,
        }
    }

    /// The 4-bit wire value.
    pub fn wire(self) -> u8 {
        self as u8
    }

    /// Index of this port in per-port tables.
    pub fn index(self) -> usize {
        self as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn wire_values_match_indices() {
        for port in Port::iter() {
            assert_eq!(Port::from_wire(port.wire()), Some(port));
            assert_eq!(port.index(), usize::from(port.wire()));
        }
        assert_eq!(Port::COUNT, 5);
    }

    #[test]
    fn unsupported_wire_values() {
        for value in 5..16u8 {
            assert_eq!(Port::from_wire(value), None);
        }
    }

    #[test]
    fn port_display_and_parse() {
        assert_eq!(Port::LinkSecured.to_string(), "link-secured");
        assert_eq!("tunnel-plain".parse::<Port>().unwrap(), Port::TunnelPlain);
    }
}
