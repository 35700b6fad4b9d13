//! Frame encode / decode.
//!
//! # Frame Format
//!
//! ```text
//! +--------------------------------------------------------------+
//! | version(4) | src-type(2) | dst-type(3) | qos(6) | nh(1)       |  2 bytes
//! +--------------------------------------------------------------+
//! | source address payload       (0, 8, 40 or 128 bits)          |
//! +--------------------------------------------------------------+
//! | destination address payload  (0, 8, 40, 48 or 128 bits)      |
//! +--------------------------------------------------------------+
//! | next-hop header              (if nh = 1)                     |
//! +--------------------------------------------------------------+
//! | src-port(4) | dst-port(4)                                    |  1 byte
//! +--------------------------------------------------------------+
//! | payload                                                      |
//! +--------------------------------------------------------------+
//! ```
//!
//! A decoded [`Frame`] owns its wire bytes. Forwarding rewrites those bytes
//! in place (destination elision, source expansion, hop consumption) so the
//! buffer can be handed straight back to the MAC.

use crate::address::{
    decode_address, encode_address, Address, AddressMode, ExtensionId, DST_MODE_BITS,
    SRC_MODE_BITS,
};
use crate::bits::{pack, BitCursor};
use crate::error::{DecodeError, EncodeError};
use crate::next_hop::{HopConsumption, NextHopHeader};
use crate::port::Port;
use crate::qos::{Qos, QOS_BITS};

/// The single supported protocol version.
pub const PROTOCOL_VERSION: u8 = 0;
/// Maximum encoded frame length in bytes.
pub const MAX_FRAME_LEN: usize = 1271;
/// Length of the fixed header in bytes.
pub const FIXED_HEADER_LEN: usize = 2;
/// Shortest decodable frame: fixed header plus the port byte.
pub const MIN_FRAME_LEN: usize = FIXED_HEADER_LEN + 1;

const VERSION_BITS: usize = 4;
const SRC_MODE_BIT: usize = 4;
const DST_MODE_BIT: usize = 6;
const NEXT_HEADER_BIT: usize = 15;

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

/// Everything needed to encode one outbound frame.
#[derive(Debug, Clone)]
pub struct OutboundFrame<'a> {
    /// Source address; usually elided (carried by the MAC source).
    pub source: Address,
    /// Destination address.
    pub destination: Address,
    /// QoS code.
    pub qos: Qos,
    /// Optional source route.
    pub next_hop: Option<&'a NextHopHeader>,
    /// Source port.
    pub src_port: Port,
    /// Destination port.
    pub dst_port: Port,
    /// Application payload.
    pub payload: &'a [u8],
}

impl OutboundFrame<'_> {
    /// Header overhead in bytes, excluding the payload.
    pub fn header_len(&self) -> usize {
        FIXED_HEADER_LEN
            + self.source.payload_len()
            + self.destination.payload_len()
            + self.next_hop.map_or(0, NextHopHeader::encoded_len)
            + 1
    }

    /// Encode into a freshly sized buffer.
    ///
    /// # Errors
    /// - [`EncodeError::UnencodableSource`] for a multicast source
    /// - [`EncodeError::UnencodableDestination`] for a full-address destination
    /// - [`EncodeError::PayloadTooLarge`] above [`MAX_FRAME_LEN`]
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        if self.source.mode() == AddressMode::Multicast {
            return Err(EncodeError::UnencodableSource(AddressMode::Multicast));
        }
        if self.destination.mode() == AddressMode::FullIpv6 {
            return Err(EncodeError::UnencodableDestination(AddressMode::FullIpv6));
        }

        let len = self.header_len() + self.payload.len();
        if len > MAX_FRAME_LEN {
            return Err(EncodeError::PayloadTooLarge {
                len,
                max: MAX_FRAME_LEN,
            });
        }

        // Every field below fits: `len` was computed from the same fields.
        let mut buf = vec![0u8; len];
        let mut pos = pack(u64::from(PROTOCOL_VERSION), VERSION_BITS, &mut buf, 0);
        pos = pack(u64::from(self.source.mode().tag()), SRC_MODE_BITS, &mut buf, pos);
        pos = pack(u64::from(self.destination.mode().tag()), DST_MODE_BITS, &mut buf, pos);
        pos = pack(u64::from(self.qos.code()), QOS_BITS, &mut buf, pos);
        pos = pack(u64::from(self.next_hop.is_some()), 1, &mut buf, pos);

        pos = encode_address(&self.source, &mut buf, pos);
        pos = encode_address(&self.destination, &mut buf, pos);
        if let Some(next_hop) = self.next_hop {
            pos = next_hop.encode(&mut buf, pos);
        }

        pos = pack(u64::from(self.src_port.wire()), Port::WIRE_BITS, &mut buf, pos);
        pos = pack(u64::from(self.dst_port.wire()), Port::WIRE_BITS, &mut buf, pos);

        buf[pos / 8..].copy_from_slice(self.payload);
        Ok(buf)
    }
}

/// Encode a locally originated data frame with an elided source.
///
/// Supported destinations are context, extension id, multicast and elided.
pub fn build_data_frame(
    payload: &[u8],
    destination: &Address,
    qos: Qos,
    next_hop: Option<&NextHopHeader>,
    src_port: Port,
    dst_port: Port,
) -> Result<Vec<u8>, EncodeError> {
    OutboundFrame {
        source: Address::Elided,
        destination: *destination,
        qos,
        next_hop,
        src_port,
        dst_port,
        payload,
    }
    .encode()
}

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// Byte offsets of the variable regions inside [`Frame::as_bytes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Layout {
    dst_offset: usize,
    next_hop_offset: Option<usize>,
    payload_offset: usize,
}

/// A decoded inbound frame together with its wire bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    qos: Qos,
    source: Address,
    destination: Address,
    next_hop: Option<NextHopHeader>,
    port: Port,
    bytes: Vec<u8>,
    layout: Layout,
}

impl Frame {
    /// Decode and validate a received frame.
    ///
    /// Checks, in order: minimum length, version, QoS code, address modes
    /// and their lengths, the next-hop header, port symmetry and the
    /// supported port set. Every read is bounds-checked.
    pub fn decode(bytes: Vec<u8>) -> Result<Self, DecodeError> {
        if bytes.len() < MIN_FRAME_LEN {
            return Err(DecodeError::Truncated {
                needed: MIN_FRAME_LEN * 8,
                available: bytes.len() * 8,
            });
        }

        let mut cursor = BitCursor::new(&bytes);
        let version = cursor.read_u8(VERSION_BITS)?;
        if version != PROTOCOL_VERSION {
            return Err(DecodeError::UnsupportedVersion(version));
        }
        let src_tag = cursor.read_u8(SRC_MODE_BITS)?;
        let dst_tag = cursor.read_u8(DST_MODE_BITS)?;
        let qos = Qos::new(cursor.read_u8(QOS_BITS)?)?;
        let has_next_hop = cursor.read_flag()?;

        let src_mode = AddressMode::from_tag(src_tag)?;
        let dst_mode = AddressMode::from_tag(dst_tag)?;
        cursor.require(src_mode.payload_bits() + dst_mode.payload_bits())?;

        let source = decode_address(src_tag, &mut cursor)?;
        let dst_offset = cursor.position() / 8;
        let destination = decode_address(dst_tag, &mut cursor)?;

        let next_hop_offset = has_next_hop.then(|| cursor.position() / 8);
        let next_hop = if has_next_hop {
            Some(NextHopHeader::decode(&mut cursor)?)
        } else {
            None
        };

        let src_port = cursor.read_u8(Port::WIRE_BITS)?;
        let dst_port = cursor.read_u8(Port::WIRE_BITS)?;
        if src_port != dst_port {
            return Err(DecodeError::PortMismatch { src_port, dst_port });
        }
        let port = Port::from_wire(dst_port).ok_or(DecodeError::UnsupportedPort(dst_port))?;
        let payload_offset = cursor.position() / 8;

        Ok(Self {
            qos,
            source,
            destination,
            next_hop,
            port,
            layout: Layout {
                dst_offset,
                next_hop_offset,
                payload_offset,
            },
            bytes,
        })
    }

    /// QoS code.
    pub fn qos(&self) -> Qos {
        self.qos
    }

    /// Source address as carried on the wire.
    pub fn source(&self) -> &Address {
        &self.source
    }

    /// Destination address as carried on the wire.
    pub fn destination(&self) -> &Address {
        &self.destination
    }

    /// The source route, if present.
    pub fn next_hop(&self) -> Option<&NextHopHeader> {
        self.next_hop.as_ref()
    }

    /// The transport port (source and destination are equal).
    pub fn port(&self) -> Port {
        self.port
    }

    /// Application payload.
    pub fn payload(&self) -> &[u8] {
        &self.bytes[self.layout.payload_offset..]
    }

    /// Current wire encoding, including any in-place rewrites.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume the frame, returning its wire encoding.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Encoded length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Frames always carry at least a header.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Rewrite the destination as elided and drop its payload bytes.
    ///
    /// Used when forwarding to a link neighbour that is itself the final
    /// destination. The 3-bit tag straddles the first two header bytes; only
    /// those bits are touched.
    pub fn elide_destination(&mut self) {
        let width = self.destination.payload_len();
        if width == 0 {
            return;
        }
        pack(
            u64::from(AddressMode::Elided.tag()),
            DST_MODE_BITS,
            &mut self.bytes,
            DST_MODE_BIT,
        );
        let start = self.layout.dst_offset;
        self.bytes.drain(start..start + width);

        self.layout.next_hop_offset = self.layout.next_hop_offset.map(|o| o - width);
        self.layout.payload_offset -= width;
        self.destination = Address::Elided;
    }

    /// Replace an elided source with the link peer's extension id.
    ///
    /// A forwarded frame leaves with this node's MAC source, so an elided
    /// source must be written out explicitly. No-op when the source is
    /// already explicit.
    ///
    /// # Errors
    /// [`EncodeError::PayloadTooLarge`] if the expansion would exceed
    /// [`MAX_FRAME_LEN`]; the frame is left unchanged.
    pub fn expand_source(&mut self, peer: ExtensionId) -> Result<(), EncodeError> {
        if self.source != Address::Elided {
            return Ok(());
        }
        let width = ExtensionId::LEN;
        let len = self.bytes.len() + width;
        if len > MAX_FRAME_LEN {
            return Err(EncodeError::PayloadTooLarge {
                len,
                max: MAX_FRAME_LEN,
            });
        }

        pack(
            u64::from(AddressMode::ExtensionId.tag()),
            SRC_MODE_BITS,
            &mut self.bytes,
            SRC_MODE_BIT,
        );
        self.bytes.splice(
            FIXED_HEADER_LEN..FIXED_HEADER_LEN,
            peer.as_bytes().iter().copied(),
        );

        self.layout.dst_offset += width;
        self.layout.next_hop_offset = self.layout.next_hop_offset.map(|o| o + width);
        self.layout.payload_offset += width;
        self.source = Address::ExtensionId(peer);
        Ok(())
    }

    /// Strip the first hop of a non-persistent route from the frame.
    ///
    /// Clears the next-header flag when the last hop is consumed. Returns
    /// `None` if the frame has no next-hop header.
    pub fn consume_one_hop(&mut self) -> Option<HopConsumption> {
        let offset = self.layout.next_hop_offset?;
        let header = self.next_hop.as_mut()?;
        let result = header.consume_one_hop(&mut self.bytes, offset)?;

        if result.header_removed {
            pack(0, 1, &mut self.bytes, NEXT_HEADER_BIT);
            self.next_hop = None;
            self.layout.next_hop_offset = None;
        }
        self.layout.payload_offset -= result.removed_bytes;
        Some(result)
    }
}

/// Decode a frame from a borrowed buffer.
pub fn decode_frame(bytes: &[u8]) -> Result<Frame, DecodeError> {
    Frame::decode(bytes.to_vec())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::MulticastGroup;
    use crate::qos::QOS_TABLE;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn ext(n: u8) -> ExtensionId {
        ExtensionId::new([n; 5])
    }

    fn frame_to(destination: Address, next_hop: Option<&NextHopHeader>, payload: &[u8]) -> Vec<u8> {
        build_data_frame(payload, &destination, Qos::CRITICAL, next_hop, Port::Plain, Port::Plain)
            .unwrap()
    }

    #[test]
    fn minimal_frame_layout() {
        let bytes = frame_to(Address::Elided, None, b"hi");
        // version 0, src elided, dst elided, qos 0x3F, no next header
        assert_eq!(bytes, vec![0b0000_0000, 0b0011_1111 << 1, 0x00, b'h', b'i']);
    }

    #[test]
    fn roundtrip_randomized() {
        let mut rng = StdRng::seed_from_u64(7);
        let destinations = [
            Address::Context(0x10),
            Address::ExtensionId(ExtensionId::new([0x11, 0x22, 0x33, 0x44, 0x55])),
            Address::Multicast(MulticastGroup::ALL_ENDPOINTS),
            Address::Elided,
        ];

        for _ in 0..200 {
            let destination = destinations[rng.gen_range(0..destinations.len())];
            let qos = Qos::new(QOS_TABLE[rng.gen_range(0..QOS_TABLE.len())].0).unwrap();
            let len = rng.gen_range(0..300);
            let payload: Vec<u8> = (0..len).map(|_| rng.gen()).collect();

            let bytes =
                build_data_frame(&payload, &destination, qos, None, Port::Secured, Port::Secured)
                    .unwrap();
            let frame = Frame::decode(bytes).unwrap();

            assert_eq!(frame.payload(), payload.as_slice());
            assert_eq!(frame.qos(), qos);
            assert_eq!(*frame.destination(), destination);
            assert_eq!(*frame.source(), Address::Elided);
            assert_eq!(frame.port(), Port::Secured);
        }
    }

    #[test]
    fn roundtrip_with_next_hop() {
        let route = NextHopHeader::new(true, vec![ext(1).into(), ext(2).into()]).unwrap();
        let frame = Frame::decode(frame_to(ext(9).into(), Some(&route), b"data")).unwrap();
        assert_eq!(frame.next_hop(), Some(&route));
        assert_eq!(frame.payload(), b"data");
    }

    #[test]
    fn short_buffers_report_truncation() {
        for len in 0..MIN_FRAME_LEN {
            let bytes = vec![0u8; len];
            assert!(matches!(
                decode_frame(&bytes),
                Err(DecodeError::Truncated { .. })
            ));
        }
    }

    #[test]
    fn every_prefix_of_header_fails_cleanly() {
        let route = NextHopHeader::new(false, vec![ext(1).into(), ext(2).into()]).unwrap();
        let bytes = frame_to(ext(9).into(), Some(&route), b"payload");
        let header_len = bytes.len() - b"payload".len();
        for len in 0..header_len {
            assert!(decode_frame(&bytes[..len]).is_err(), "prefix {len} decoded");
        }
        assert!(decode_frame(&bytes[..header_len]).is_ok());
    }

    #[test]
    fn rejects_unsupported_version() {
        let mut bytes = frame_to(Address::Elided, None, b"");
        bytes[0] |= 0x10;
        assert_eq!(decode_frame(&bytes), Err(DecodeError::UnsupportedVersion(1)));
    }

    #[test]
    fn rejects_invalid_qos() {
        let mut bytes = frame_to(Address::Elided, None, b"");
        // qos 0x3F -> 0x3E
        bytes[1] &= !0b0000_0010;
        assert_eq!(decode_frame(&bytes), Err(DecodeError::InvalidQos(0x3E)));
    }

    #[test]
    fn rejects_unsupported_destination_mode() {
        let mut bytes = frame_to(Address::Elided, None, b"x");
        pack(7, DST_MODE_BITS, &mut bytes, DST_MODE_BIT);
        assert_eq!(
            decode_frame(&bytes),
            Err(DecodeError::UnsupportedAddressMode(7))
        );
    }

    #[test]
    fn rejects_asymmetric_ports() {
        let bytes = build_data_frame(
            b"x",
            &Address::Elided,
            Qos::BEST_EFFORT,
            None,
            Port::Plain,
            Port::Secured,
        )
        .unwrap();
        let err = decode_frame(&bytes).unwrap_err();
        assert_eq!(
            err,
            DecodeError::PortMismatch {
                src_port: 0,
                dst_port: 1
            }
        );
        assert_eq!(err.counter(), crate::counter::StatCounter::InUnknownProtos);
    }

    #[test]
    fn rejects_unsupported_port() {
        let mut bytes = frame_to(Address::Elided, None, b"x");
        bytes[2] = 0x99;
        assert_eq!(decode_frame(&bytes), Err(DecodeError::UnsupportedPort(9)));
    }

    #[test]
    fn encode_rejects_full_destination_and_oversize() {
        let ip = Address::FullIpv6("2001:db8::1".parse().unwrap());
        assert_eq!(
            build_data_frame(b"", &ip, Qos::CRITICAL, None, Port::Plain, Port::Plain),
            Err(EncodeError::UnencodableDestination(AddressMode::FullIpv6))
        );

        let fits = vec![0u8; MAX_FRAME_LEN - MIN_FRAME_LEN];
        assert!(frame_to(Address::Elided, None, &fits).len() == MAX_FRAME_LEN);
        let too_big = vec![0u8; MAX_FRAME_LEN - MIN_FRAME_LEN + 1];
        assert_eq!(
            build_data_frame(&too_big, &Address::Elided, Qos::CRITICAL, None, Port::Plain, Port::Plain),
            Err(EncodeError::PayloadTooLarge {
                len: MAX_FRAME_LEN + 1,
                max: MAX_FRAME_LEN
            })
        );
    }

    #[test]
    fn elide_destination_rewrites_straddling_tag() {
        let bytes = frame_to(ext(9).into(), None, b"abc");
        let mut frame = Frame::decode(bytes.clone()).unwrap();
        frame.elide_destination();

        assert_eq!(frame.len(), bytes.len() - ExtensionId::LEN);
        // Version, source tag, QoS and next-header bits are untouched.
        assert_eq!(frame.as_bytes()[0] & 0b1111_1100, bytes[0] & 0b1111_1100);
        assert_eq!(frame.as_bytes()[1] & 0b0111_1111, bytes[1] & 0b0111_1111);

        let reparsed = decode_frame(frame.as_bytes()).unwrap();
        assert_eq!(*reparsed.destination(), Address::Elided);
        assert_eq!(reparsed.payload(), b"abc");
        assert_eq!(reparsed.qos(), Qos::CRITICAL);
    }

    #[test]
    fn expand_source_inserts_peer() {
        let route = NextHopHeader::new(true, vec![ext(1).into(), ext(2).into()]).unwrap();
        let mut frame = Frame::decode(frame_to(ext(9).into(), Some(&route), b"abc")).unwrap();
        frame.expand_source(ext(7)).unwrap();

        let reparsed = decode_frame(frame.as_bytes()).unwrap();
        assert_eq!(*reparsed.source(), Address::ExtensionId(ext(7)));
        assert_eq!(*reparsed.destination(), Address::ExtensionId(ext(9)));
        assert_eq!(reparsed.next_hop(), Some(&route));
        assert_eq!(reparsed.payload(), b"abc");
        assert_eq!(reparsed, frame);
    }

    #[test]
    fn consume_hops_until_header_disappears() {
        let route =
            NextHopHeader::new(false, vec![ext(1).into(), ext(2).into(), ext(3).into()]).unwrap();
        let mut frame = Frame::decode(frame_to(ext(9).into(), Some(&route), b"abc")).unwrap();
        let original_len = frame.len();

        let first = frame.consume_one_hop().unwrap();
        assert!(!first.header_removed);
        assert_eq!(frame.len(), original_len - ExtensionId::LEN);
        assert_eq!(frame.next_hop().unwrap().hops().len(), 2);
        assert_eq!(decode_frame(frame.as_bytes()).unwrap(), frame);

        frame.consume_one_hop().unwrap();
        let last = frame.consume_one_hop().unwrap();
        assert!(last.header_removed);
        assert!(frame.next_hop().is_none());
        assert!(frame.consume_one_hop().is_none());

        let reparsed = decode_frame(frame.as_bytes()).unwrap();
        assert!(reparsed.next_hop().is_none());
        assert_eq!(reparsed.payload(), b"abc");
        assert_eq!(reparsed, frame);
    }
}
