//! Error types for the `fannwk-models` crate.
//!
//! Decoding never panics: every malformed-input path yields a
//! [`DecodeError`], and [`DecodeError::counter`] names the statistics
//! counter the drop is attributed to.

use crate::address::AddressMode;
use crate::counter::StatCounter;

/// Errors produced while decoding an inbound frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The buffer ended before a declared field.
    #[error("truncated frame: needed {needed} bits, {available} available")]
    Truncated {
        /// Bits required by the next field.
        needed: usize,
        /// Bits left in the buffer.
        available: usize,
    },

    /// The version nibble is not the supported protocol version.
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),

    /// The QoS field is not one of the enumerated codes.
    #[error("invalid QoS code {0:#04x}")]
    InvalidQos(u8),

    /// An address type tag has no defined representation.
    #[error("unsupported address mode {0}")]
    UnsupportedAddressMode(u8),

    /// The extension header subtype is not the next-hop list.
    #[error("unsupported next-header subtype {0}")]
    UnsupportedNextHeader(u8),

    /// The next-hop header declares a further extension header.
    #[error("chained next headers are not supported")]
    ChainedNextHeader,

    /// Two hop entries within one next-hop header are identical.
    #[error("duplicate hop address at index {index}")]
    DuplicateHop {
        /// Position of the second occurrence.
        index: usize,
    },

    /// Source and destination ports differ.
    #[error("port mismatch: source {src_port}, destination {dst_port}")]
    PortMismatch {
        /// Wire value of the source port.
        src_port: u8,
        /// Wire value of the destination port.
        dst_port: u8,
    },

    /// The destination port is not a supported transport port.
    #[error("unsupported port {0}")]
    UnsupportedPort(u8),
}

impl DecodeError {
    /// The statistics counter a frame dropped with this error increments.
    pub fn counter(&self) -> StatCounter {
        match self {
            Self::Truncated { .. } | Self::UnsupportedVersion(_) | Self::InvalidQos(_) => {
                StatCounter::InHeaderErrors
            }
            Self::UnsupportedAddressMode(_) => StatCounter::InAddrErrors,
            Self::UnsupportedNextHeader(_)
            | Self::ChainedNextHeader
            | Self::DuplicateHop { .. } => StatCounter::InNextHopErrors,
            Self::PortMismatch { .. } | Self::UnsupportedPort(_) => StatCounter::InUnknownProtos,
        }
    }
}

/// Errors produced while building an outbound frame or header.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    /// Payload plus header overhead exceeds the maximum frame size.
    #[error("frame of {len} bytes exceeds maximum {max}")]
    PayloadTooLarge {
        /// Total encoded length that was required.
        len: usize,
        /// Maximum allowed frame length.
        max: usize,
    },

    /// The destination representation cannot be originated by this layer.
    #[error("destination mode {0:?} cannot be encoded")]
    UnencodableDestination(AddressMode),

    /// The source representation does not fit the 2-bit source tag.
    #[error("source mode {0:?} cannot be encoded")]
    UnencodableSource(AddressMode),

    /// A next-hop list must hold between one and four hops.
    #[error("invalid hop count {0}")]
    InvalidHopCount(usize),

    /// A hop address is not of the header's declared address type.
    #[error("hop address mode {0:?} does not match the header address type")]
    HopAddressMismatch(AddressMode),

    /// A hop address appears twice in one route.
    #[error("duplicate hop address at index {index}")]
    DuplicateHop {
        /// Position of the second occurrence.
        index: usize,
    },
}

/// A 6-bit QoS code outside the enumerated table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid QoS code {0:#04x}")]
pub struct InvalidQos(pub u8);

impl From<InvalidQos> for DecodeError {
    fn from(e: InvalidQos) -> Self {
        DecodeError::InvalidQos(e.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_truncated() {
        let err = DecodeError::Truncated {
            needed: 16,
            available: 8,
        };
        assert_eq!(err.to_string(), "truncated frame: needed 16 bits, 8 available");
    }

    #[test]
    fn error_display_port_mismatch() {
        let err = DecodeError::PortMismatch {
            src_port: 0,
            dst_port: 1,
        };
        assert_eq!(err.to_string(), "port mismatch: source 0, destination 1");
    }

    #[test]
    fn error_display_invalid_qos() {
        assert_eq!(InvalidQos(0x3E).to_string(), "invalid QoS code 0x3e");
    }

    #[test]
    fn decode_errors_map_to_counters() {
        assert_eq!(
            DecodeError::InvalidQos(1).counter(),
            StatCounter::InHeaderErrors
        );
        assert_eq!(
            DecodeError::UnsupportedAddressMode(7).counter(),
            StatCounter::InAddrErrors
        );
        assert_eq!(
            DecodeError::DuplicateHop { index: 1 }.counter(),
            StatCounter::InNextHopErrors
        );
        assert_eq!(
            DecodeError::UnsupportedPort(9).counter(),
            StatCounter::InUnknownProtos
        );
    }
}
