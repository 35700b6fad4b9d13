//! Next-hop (source routing) extension header.
//!
//! # Wire layout
//!
//! ```text
//! subtype(8) | next-header(1) | reserved(3) | persist(1) | hop-count - 1 (2) | addr-type(1)
//! hop address × hop-count
//! ```
//!
//! Only the next-hop list subtype is defined, and it must be the last
//! extension header. A **persistent** route keeps its full hop list as it
//! travels; each node finds itself in the list and forwards to the entry
//! after it. A **non-persistent** route is consumed: the first hop strips
//! its own entry before forwarding, and the header disappears once empty.

use serde::{Deserialize, Serialize};

use crate::address::{decode_address, encode_address, Address, AddressMode};
use crate::bits::{pack, BitCursor};
use crate::error::{DecodeError, EncodeError};

/// The only supported extension header subtype.
pub const NEXT_HOP_SUBTYPE: u8 = 0;
/// Maximum number of hops in one header.
pub const MAX_HOPS: usize = 4;
/// Length of the fixed part of the header in bytes.
pub const NEXT_HOP_FIXED_LEN: usize = 2;

// Bit position of the hop-count field within the header.
const HOP_COUNT_BIT: usize = 13;

/// How hop addresses are represented.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HopAddressType {
    /// Five-byte extension identifiers.
    ExtensionId = 0,
    /// Sixteen-byte full addresses.
    FullIpv6 = 1,
}

impl HopAddressType {
    /// The address mode of every hop entry.
    pub fn mode(self) -> AddressMode {
        match self {
            Self::ExtensionId => AddressMode::ExtensionId,
            Self::FullIpv6 => AddressMode::FullIpv6,
        }
    }

    fn from_mode(mode: AddressMode) -> Option<Self> {
        match mode {
            AddressMode::ExtensionId => Some(Self::ExtensionId),
            AddressMode::FullIpv6 => Some(Self::FullIpv6),
            _ => None,
        }
    }
}

/// Outcome of [`NextHopHeader::consume_one_hop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HopConsumption {
    /// Bytes removed from the frame buffer.
    pub removed_bytes: usize,
    /// The header held its last hop and was removed entirely.
    pub header_removed: bool,
}

/// A decoded or locally built next-hop header.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct NextHopHeader {
    persist: bool,
    address_type: HopAddressType,
    hops: Vec<Address>,
}

impl NextHopHeader {
    /// Build a header from an ordered hop list.
    ///
    /// All hops must share one representation (extension id or full
    /// address), be pairwise distinct, and number between one and four.
    pub fn new(persist: bool, hops: Vec<Address>) -> Result<Self, EncodeError> {
        if hops.is_empty() || hops.len() > MAX_HOPS {
            return Err(EncodeError::InvalidHopCount(hops.len()));
        }
        let first_mode = hops[0].mode();
        let address_type = HopAddressType::from_mode(first_mode)
            .ok_or(EncodeError::HopAddressMismatch(first_mode))?;
        for (index, hop) in hops.iter().enumerate() {
            if hop.mode() != first_mode {
                return Err(EncodeError::HopAddressMismatch(hop.mode()));
            }
            if hops[..index].contains(hop) {
                return Err(EncodeError::DuplicateHop { index });
            }
        }
        Ok(Self {
            persist,
            address_type,
            hops,
        })
    }

    /// Whether the route survives intermediate hops unchanged.
    pub fn persist(&self) -> bool {
        self.persist
    }

    /// Representation of the hop entries.
    pub fn address_type(&self) -> HopAddressType {
        self.address_type
    }

    /// The ordered hop list.
    pub fn hops(&self) -> &[Address] {
        &self.hops
    }

    /// Encoded length in bytes.
    pub fn encoded_len(&self) -> usize {
        NEXT_HOP_FIXED_LEN + self.hops.len() * self.address_type.mode().payload_len()
    }

    /// Write the header at `bit_offset`. The caller guarantees capacity.
    pub fn encode(&self, dst: &mut [u8], bit_offset: usize) -> usize {
        let mut pos = pack(u64::from(NEXT_HOP_SUBTYPE), 8, dst, bit_offset);
        pos = pack(0, 1, dst, pos); // no further next header
        pos = pack(0, 3, dst, pos); // reserved
        pos = pack(u64::from(self.persist), 1, dst, pos);
        pos = pack((self.hops.len() - 1) as u64, 2, dst, pos);
        pos = pack(self.address_type as u64, 1, dst, pos);
        self.hops
            .iter()
            .fold(pos, |pos, hop| encode_address(hop, dst, pos))
    }

    /// Read a header, rejecting unknown subtypes, chained headers and
    /// repeated hop entries.
    pub fn decode(cursor: &mut BitCursor<'_>) -> Result<Self, DecodeError> {
        let subtype = cursor.read_u8(8)?;
        if subtype != NEXT_HOP_SUBTYPE {
            return Err(DecodeError::UnsupportedNextHeader(subtype));
        }
        if cursor.read_flag()? {
            return Err(DecodeError::ChainedNextHeader);
        }
        cursor.read(3)?;
        let persist = cursor.read_flag()?;
        let hop_count = usize::from(cursor.read_u8(2)?) + 1;
        let address_type = if cursor.read_flag()? {
            HopAddressType::FullIpv6
        } else {
            HopAddressType::ExtensionId
        };

        let mut hops = Vec::with_capacity(hop_count);
        for index in 0..hop_count {
            let hop = decode_address(address_type.mode().tag(), cursor)?;
            if hops.contains(&hop) {
                return Err(DecodeError::DuplicateHop { index });
            }
            hops.push(hop);
        }

        Ok(Self {
            persist,
            address_type,
            hops,
        })
    }

    /// The link destination after `local` for a frame bound to
    /// `final_destination`.
    ///
    /// Persistent routes locate `local` anywhere in the list. Non-persistent
    /// routes only match when `local` is the first hop. Returns `None` when
    /// this node is not on the route.
    pub fn next_destination(&self, local: &Address, final_destination: &Address) -> Option<Address> {
        let position = if self.persist {
            self.hops.iter().position(|hop| hop == local)?
        } else if self.hops.first() == Some(local) {
            0
        } else {
            return None;
        };
        Some(
            self.hops
                .get(position + 1)
                .copied()
                .unwrap_or(*final_destination),
        )
    }

    /// Strip the first hop from this header and from its encoding in `frame`.
    ///
    /// `header_offset` is the byte offset of this header inside `frame`.
    /// With hops remaining, the hop-count field is rewritten and the first
    /// address removed; otherwise the whole header is removed and the caller
    /// clears the frame's next-header flag. Bytes after the removed region are
    /// shifted left intact.
    ///
    /// Returns `None`, leaving both untouched, if `frame` is too short to
    /// hold this header at `header_offset`.
    pub fn consume_one_hop(
        &mut self,
        frame: &mut Vec<u8>,
        header_offset: usize,
    ) -> Option<HopConsumption> {
        if header_offset + self.encoded_len() > frame.len() {
            return None;
        }
        let width = self.address_type.mode().payload_len();
        let hops_start = header_offset + NEXT_HOP_FIXED_LEN;

        self.hops.remove(0);
        if self.hops.is_empty() {
            let end = hops_start + width;
            frame.drain(header_offset..end);
            return Some(HopConsumption {
                removed_bytes: end - header_offset,
                header_removed: true,
            });
        }

        pack(
            (self.hops.len() - 1) as u64,
            2,
            frame,
            header_offset * 8 + HOP_COUNT_BIT,
        );
        frame.drain(hops_start..hops_start + width);
        Some(HopConsumption {
            removed_bytes: width,
            header_removed: false,
        })
    }
}
