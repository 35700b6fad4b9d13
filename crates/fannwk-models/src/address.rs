//! Network-layer addressing.
//!
//! A frame carries its source and destination in one of five compressed
//! representations. The representation tag sits in the fixed header (2 bits
//! for the source, 3 bits for the destination); the address payload follows
//! the header.
//!
//! | Mode | Tag | Payload bits |
//! |------|-----|--------------|
//! | [`Elided`](AddressMode::Elided) | 0 | 0 |
//! | [`Context`](AddressMode::Context) | 1 | 8 |
//! | [`ExtensionId`](AddressMode::ExtensionId) | 2 | 40 |
//! | [`FullIpv6`](AddressMode::FullIpv6) | 3 | 128 |
//! | [`Multicast`](AddressMode::Multicast) | 4 | 48 |
//!
//! An elided address is resolved from the MAC link: to the local identity
//! for an elided destination, to the link peer for an elided source.

use std::fmt;
use std::net::Ipv6Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::bits::{pack_bytes, BitCursor};
use crate::error::DecodeError;

/// Width of the source address tag.
pub const SRC_MODE_BITS: usize = 2;
/// Width of the destination address tag.
pub const DST_MODE_BITS: usize = 3;

const EXTENSION_ID_LEN: usize = 5;
const MULTICAST_LEN: usize = 6;

// ---------------------------------------------------------------------------
// AddressMode
// ---------------------------------------------------------------------------

/// The representation tag of an [`Address`].
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressMode {
    /// No payload; inferred from the MAC link.
    Elided = 0,
    /// One-byte head-end context.
    Context = 1,
    /// Five-byte extension identifier.
    ExtensionId = 2,
    /// Sixteen-byte IPv6 address.
    FullIpv6 = 3,
    /// Six-byte multicast group.
    Multicast = 4,
}

impl AddressMode {
    /// Parse a wire tag.
    pub fn from_tag(tag: u8) -> Result<Self, DecodeError> {
        match tag {
            0 => Ok(Self::Elided),
            1 => Ok(Self::Context),
            2 => Ok(Self::ExtensionId),
            3 => Ok(Self::FullIpv6),
            4 => Ok(Self::Multicast),
            other => Err(DecodeError::UnsupportedAddressMode(other)),
        }
    }

    /// The wire tag.
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Address payload width in bits.
    pub fn payload_bits(self) -> usize {
        self.payload_len() * 8
    }

    /// Address payload width in bytes.
    pub fn payload_len(self) -> usize {
        match self {
            Self::Elided => 0,
            Self::Context => 1,
            Self::ExtensionId => ExtensionId::LEN,
            Self::FullIpv6 => 16,
            Self::Multicast => MulticastGroup::LEN,
        }
    }
}

// ---------------------------------------------------------------------------
// ExtensionId
// ---------------------------------------------------------------------------

/// Short five-byte node address.
///
/// # Examples
///
/// ```
/// use fannwk_models::ExtensionId;
///
/// let id: ExtensionId = "11:22:33:44:55".parse().unwrap();
/// assert_eq!(id.as_bytes(), &[0x11, 0x22, 0x33, 0x44, 0x55]);
/// assert_eq!(id.to_string(), "11:22:33:44:55");
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExtensionId([u8; EXTENSION_ID_LEN]);

impl ExtensionId {
    /// Length in bytes.
    pub const LEN: usize = EXTENSION_ID_LEN;

    /// Create from raw bytes.
    pub const fn new(bytes: [u8; Self::LEN]) -> Self {
        Self(bytes)
    }

    /// Return the raw bytes.
    pub fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0
    }
}

impl fmt::Display for ExtensionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}")
    }
}

impl From<[u8; EXTENSION_ID_LEN]> for ExtensionId {
    fn from(bytes: [u8; EXTENSION_ID_LEN]) -> Self {
        Self(bytes)
    }
}

/// Error returned when parsing an [`ExtensionId`] from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid extension id \"{0}\": expected five colon-separated hex bytes")]
pub struct ParseExtensionIdError(pub String);

impl FromStr for ExtensionId {
    type Err = ParseExtensionIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseExtensionIdError(s.to_string());
        let mut bytes = [0u8; Self::LEN];
        let mut parts = s.split(':');
        for byte in &mut bytes {
            let part = parts.next().ok_or_else(err)?;
            if part.len() != 2 {
                return Err(err());
            }
            *byte = u8::from_str_radix(part, 16).map_err(|_| err())?;
        }
        if parts.next().is_some() {
            return Err(err());
        }
        Ok(Self(bytes))
    }
}

// ---------------------------------------------------------------------------
// MulticastGroup / DeviceClass
// ---------------------------------------------------------------------------

/// Six-byte multicast group address.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MulticastGroup(pub [u8; MULTICAST_LEN]);

impl MulticastGroup {
    /// Length in bytes.
    pub const LEN: usize = MULTICAST_LEN;

    /// Every generic endpoint.
    pub const ALL_ENDPOINTS: Self = Self([0xFF, 0x02, 0x00, 0x00, 0x00, 0x01]);
    /// Every data concentrator.
    pub const ALL_CONCENTRATORS: Self = Self([0xFF, 0x02, 0x00, 0x00, 0x00, 0x02]);
    /// Every load-control device.
    pub const ALL_LOAD_CONTROL: Self = Self([0xFF, 0x02, 0x00, 0x00, 0x00, 0x03]);
}

/// The device class of a node, which selects the broadcast groups it joins.
#[derive(
    Serialize,
    Deserialize,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "kebab-case")]
pub enum DeviceClass {
    /// A metering endpoint.
    #[default]
    Endpoint,
    /// A data concentrator / collector.
    Concentrator,
    /// A load-control endpoint.
    LoadControl,
}

impl DeviceClass {
    /// Multicast groups a node of this class accepts.
    pub fn groups(self) -> &'static [MulticastGroup] {
        match self {
            Self::Endpoint => &[MulticastGroup::ALL_ENDPOINTS],
            Self::Concentrator => &[MulticastGroup::ALL_CONCENTRATORS],
            Self::LoadControl => &[
                MulticastGroup::ALL_ENDPOINTS,
                MulticastGroup::ALL_LOAD_CONTROL,
            ],
        }
    }

    /// Whether a node of this class accepts `group`.
    pub fn accepts(self, group: &MulticastGroup) -> bool {
        self.groups().contains(group)
    }
}

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// A network-layer address in one of its wire representations.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Address {
    /// Full 128-bit address.
    FullIpv6(Ipv6Addr),
    /// Short extension identifier.
    ExtensionId(ExtensionId),
    /// Head-end context byte.
    Context(u8),
    /// Omitted; inferred from the MAC link.
    Elided,
    /// Multicast group.
    Multicast(MulticastGroup),
}

impl Address {
    /// The representation tag.
    pub fn mode(&self) -> AddressMode {
        match self {
            Self::FullIpv6(_) => AddressMode::FullIpv6,
            Self::ExtensionId(_) => AddressMode::ExtensionId,
            Self::Context(_) => AddressMode::Context,
            Self::Elided => AddressMode::Elided,
            Self::Multicast(_) => AddressMode::Multicast,
        }
    }

    /// Payload length on the wire, in bytes.
    pub fn payload_len(&self) -> usize {
        self.mode().payload_len()
    }

    /// The extension identifier, if this is one.
    pub fn extension_id(&self) -> Option<ExtensionId> {
        match self {
            Self::ExtensionId(id) => Some(*id),
            _ => None,
        }
    }

    /// Resolve an elided address to `link_address`; other addresses are kept.
    pub fn resolve(self, link_address: ExtensionId) -> Self {
        match self {
            Self::Elided => Self::ExtensionId(link_address),
            other => other,
        }
    }
}

impl From<ExtensionId> for Address {
    fn from(id: ExtensionId) -> Self {
        Self::ExtensionId(id)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FullIpv6(ip) => write!(f, "{ip}"),
            Self::ExtensionId(id) => write!(f, "{id}"),
            Self::Context(c) => write!(f, "ctx:{c}"),
            Self::Elided => f.write_str("elided"),
            Self::Multicast(g) => {
                let [a, b, c, d, e, g6] = g.0;
                write!(f, "mc:{a:02x}{b:02x}:{c:02x}{d:02x}:{e:02x}{g6:02x}")
            }
        }
    }
}

/// Write the address payload (not the tag) at `bit_offset`.
///
/// Returns the bit offset past the payload. The caller guarantees capacity.
pub fn encode_address(addr: &Address, dst: &mut [u8], bit_offset: usize) -> usize {
    match addr {
        Address::FullIpv6(ip) => pack_bytes(&ip.octets(), dst, bit_offset),
        Address::ExtensionId(id) => pack_bytes(id.as_bytes(), dst, bit_offset),
        Address::Context(c) => pack_bytes(&[*c], dst, bit_offset),
        Address::Elided => bit_offset,
        Address::Multicast(g) => pack_bytes(&g.0, dst, bit_offset),
    }
}

/// Read the payload for an address of wire tag `tag`.
pub fn decode_address(tag: u8, cursor: &mut BitCursor<'_>) -> Result<Address, DecodeError> {
    let addr = match AddressMode::from_tag(tag)? {
        AddressMode::Elided => Address::Elided,
        AddressMode::Context => Address::Context(cursor.read_u8(8)?),
        AddressMode::ExtensionId => Address::ExtensionId(ExtensionId(cursor.read_array()?)),
        AddressMode::FullIpv6 => {
            Address::FullIpv6(Ipv6Addr::from(cursor.read_array::<16>()?))
        }
        AddressMode::Multicast => Address::Multicast(MulticastGroup(cursor.read_array()?)),
    };
    Ok(addr)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip_at(addr: Address, offset: usize) -> Address {
        let mut buf = vec![0u8; 20];
        let end = encode_address(&addr, &mut buf, offset);
        assert_eq!(end - offset, addr.mode().payload_bits());
        let mut cursor = BitCursor::new(&buf);
        cursor.read(offset).unwrap();
        decode_address(addr.mode().tag(), &mut cursor).unwrap()
    }

    #[test]
    fn payload_widths() {
        assert_eq!(AddressMode::Elided.payload_bits(), 0);
        assert_eq!(AddressMode::FullIpv6.payload_bits(), 128);
        assert_eq!(AddressMode::ExtensionId.payload_bits(), 40);
        assert_eq!(AddressMode::Context.payload_bits(), 8);
        assert_eq!(AddressMode::Multicast.payload_bits(), 48);
    }

    #[test]
    fn every_mode_survives_unaligned_offset() {
        let addrs = [
            Address::Elided,
            Address::Context(0x7E),
            Address::ExtensionId(ExtensionId::new([1, 2, 3, 4, 5])),
            Address::FullIpv6("fe80::1".parse().unwrap()),
            Address::Multicast(MulticastGroup::ALL_CONCENTRATORS),
        ];
        for addr in addrs {
            assert_eq!(roundtrip_at(addr, 5), addr);
        }
    }

    #[test]
    fn unsupported_tags_are_rejected() {
        let buf = [0u8; 16];
        for tag in 5..8 {
            let mut cursor = BitCursor::new(&buf);
            assert_eq!(
                decode_address(tag, &mut cursor),
                Err(DecodeError::UnsupportedAddressMode(tag))
            );
        }
    }

    #[test]
    fn truncated_payload_is_an_error() {
        let buf = [0u8; 3];
        let mut cursor = BitCursor::new(&buf);
        assert!(matches!(
            decode_address(AddressMode::ExtensionId.tag(), &mut cursor),
            Err(DecodeError::Truncated { needed: 40, .. })
        ));
    }

    #[test]
    fn extension_id_parse_rejects_garbage() {
        assert!("11:22:33:44".parse::<ExtensionId>().is_err());
        assert!("11:22:33:44:55:66".parse::<ExtensionId>().is_err());
        assert!("11:22:33:44:zz".parse::<ExtensionId>().is_err());
        assert!("1:22:33:44:55".parse::<ExtensionId>().is_err());
    }

    #[test]
    fn elided_resolves_to_link_address() {
        let peer = ExtensionId::new([9, 9, 9, 9, 9]);
        assert_eq!(Address::Elided.resolve(peer), Address::ExtensionId(peer));
        assert_eq!(Address::Context(3).resolve(peer), Address::Context(3));
    }

    #[test]
    fn load_control_joins_endpoint_group() {
        assert!(DeviceClass::LoadControl.accepts(&MulticastGroup::ALL_ENDPOINTS));
        assert!(DeviceClass::LoadControl.accepts(&MulticastGroup::ALL_LOAD_CONTROL));
        assert!(!DeviceClass::Endpoint.accepts(&MulticastGroup::ALL_CONCENTRATORS));
    }

    #[test]
    fn address_serde_roundtrip() {
        let addr = Address::ExtensionId(ExtensionId::new([0x11, 0x22, 0x33, 0x44, 0x55]));
        let json = serde_json::to_string(&addr).unwrap();
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(addr, back);
    }
}
