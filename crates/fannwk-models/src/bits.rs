//! Bit-level pack/unpack primitives.
//!
//! Fields are written and read MSB-first at arbitrary bit offsets into a
//! byte buffer. [`pack`] and [`unpack`] do not bounds-check: the caller
//! sizes the destination (encode path) or checks the remaining length first
//! (decode path, via [`BitCursor`]).
//!
//! # Example
//! ```
//! use fannwk_models::bits::{pack, unpack};
//!
//! let mut buf = [0u8; 2];
//! let offset = pack(0b101, 3, &mut buf, 6);
//! assert_eq!(offset, 9);
//! assert_eq!(buf, [0b0000_0010, 0b1000_0000]);
//!
//! let mut pos = 6;
//! assert_eq!(unpack(&buf, &mut pos, 3), 0b101);
//! ```

use crate::error::DecodeError;

/// Write the low `num_bits` of `value` into `dst` starting at `bit_offset`.
///
/// Bits outside the target field are preserved, so this also rewrites a
/// field in place. Returns the bit offset just past the field.
///
/// Precondition: `num_bits <= 64` and `bit_offset + num_bits <= dst.len() * 8`.
pub fn pack(value: u64, num_bits: usize, dst: &mut [u8], bit_offset: usize) -> usize {
    debug_assert!(num_bits <= 64);
    debug_assert!(bit_offset + num_bits <= dst.len() * 8);

    let mut pos = bit_offset;
    let mut remaining = num_bits;

    while remaining > 0 {
        let byte_idx = pos / 8;
        let used = pos % 8;

        // How many bits fit in the current byte?
        let take = remaining.min(8 - used);
        let shift = remaining - take;
        let bits = ((value >> shift) & ((1u64 << take) - 1)) as u8;

        let lshift = 8 - used - take;
        let mask = (((1u16 << take) - 1) as u8) << lshift;
        dst[byte_idx] = (dst[byte_idx] & !mask) | (bits << lshift);

        pos += take;
        remaining -= take;
    }

    pos
}

/// Read `num_bits` from `src` starting at `*bit_offset`, advancing the offset.
///
/// Precondition: `num_bits <= 64` and `*bit_offset + num_bits <= src.len() * 8`.
pub fn unpack(src: &[u8], bit_offset: &mut usize, num_bits: usize) -> u64 {
    debug_assert!(num_bits <= 64);
    debug_assert!(*bit_offset + num_bits <= src.len() * 8);

    let mut result = 0u64;
    let mut remaining = num_bits;

    while remaining > 0 {
        let byte_idx = *bit_offset / 8;
        let available = 8 - *bit_offset % 8;
        let take = remaining.min(available);

        let mask = ((1u16 << take) - 1) as u8;
        let bits = (src[byte_idx] >> (available - take)) & mask;
        result = (result << take) | u64::from(bits);

        *bit_offset += take;
        remaining -= take;
    }

    result
}

/// Pack a byte array (an address) at an arbitrary bit offset.
pub fn pack_bytes(bytes: &[u8], dst: &mut [u8], bit_offset: usize) -> usize {
    bytes
        .iter()
        .fold(bit_offset, |pos, &b| pack(u64::from(b), 8, dst, pos))
}

/// Unpack `out.len()` bytes starting at an arbitrary bit offset.
pub fn unpack_bytes(src: &[u8], bit_offset: &mut usize, out: &mut [u8]) {
    for byte in out.iter_mut() {
        *byte = unpack(src, bit_offset, 8) as u8;
    }
}

// ---------------------------------------------------------------------------
// BitCursor
// ---------------------------------------------------------------------------

/// Bounds-checked reader over a received frame.
///
/// # Invariants
/// - `position` never exceeds `data.len() * 8`
#[derive(Debug, Clone)]
pub struct BitCursor<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> BitCursor<'a> {
    /// Create a cursor at bit 0 of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Fail with [`DecodeError::Truncated`] unless `bits` remain.
    pub fn require(&self, bits: usize) -> Result<(), DecodeError> {
        let available = self.bits_remaining();
        if bits > available {
            return Err(DecodeError::Truncated {
                needed: bits,
                available,
            });
        }
        Ok(())
    }

    /// Read an unsigned field of up to 64 bits.
    pub fn read(&mut self, bits: usize) -> Result<u64, DecodeError> {
        self.require(bits)?;
        Ok(unpack(self.data, &mut self.position, bits))
    }

    /// Read a field of at most 8 bits.
    pub fn read_u8(&mut self, bits: usize) -> Result<u8, DecodeError> {
        debug_assert!(bits <= 8);
        Ok(self.read(bits)? as u8)
    }

    /// Read a single flag bit.
    pub fn read_flag(&mut self) -> Result<bool, DecodeError> {
        Ok(self.read(1)? == 1)
    }

    /// Read a fixed-length byte array.
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        self.require(N * 8)?;
        let mut out = [0u8; N];
        unpack_bytes(self.data, &mut self.position, &mut out);
        Ok(out)
    }

    /// Number of unread bits.
    pub fn bits_remaining(&self) -> usize {
        self.data.len() * 8 - self.position
    }

    /// Current bit position.
    pub fn position(&self) -> usize {
        self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack_aligned_byte() {
        let mut buf = [0u8; 1];
        assert_eq!(pack(0b1011_0011, 8, &mut buf, 0), 8);
        assert_eq!(buf, [0b1011_0011]);

        let mut pos = 0;
        assert_eq!(unpack(&buf, &mut pos, 8), 0b1011_0011);
        assert_eq!(pos, 8);
    }

    #[test]
    fn pack_straddles_byte_boundary() {
        let mut buf = [0u8; 2];
        pack(0b111, 3, &mut buf, 6);
        assert_eq!(buf, [0b0000_0011, 0b1000_0000]);
    }

    #[test]
    fn pack_preserves_neighbouring_bits() {
        let mut buf = [0xFF, 0xFF];
        pack(0, 3, &mut buf, 6);
        assert_eq!(buf, [0b1111_1100, 0b0111_1111]);
    }

    #[test]
    fn pack_only_uses_low_bits_of_value() {
        let mut buf = [0u8; 1];
        pack(0xFF, 2, &mut buf, 0);
        assert_eq!(buf, [0b1100_0000]);
    }

    #[test]
    fn sixty_four_bit_at_odd_offset() {
        let mut buf = [0u8; 9];
        let val = 0x1234_5678_9ABC_DEF0u64;
        assert_eq!(pack(val, 64, &mut buf, 3), 67);
        let mut pos = 3;
        assert_eq!(unpack(&buf, &mut pos, 64), val);
    }

    #[test]
    fn bytes_at_unaligned_offset() {
        let mut buf = [0u8; 6];
        let addr = [0x11, 0x22, 0x33, 0x44, 0x55];
        assert_eq!(pack_bytes(&addr, &mut buf, 4), 44);

        let mut pos = 4;
        let mut out = [0u8; 5];
        unpack_bytes(&buf, &mut pos, &mut out);
        assert_eq!(out, addr);
    }

    #[test]
    fn cursor_reports_truncation() {
        let data = [0xAB];
        let mut cursor = BitCursor::new(&data);
        assert_eq!(cursor.read(4).unwrap(), 0xA);
        assert_eq!(
            cursor.read(5),
            Err(DecodeError::Truncated {
                needed: 5,
                available: 4
            })
        );
        // A failed read leaves the position unchanged.
        assert_eq!(cursor.position(), 4);
        assert_eq!(cursor.read(4).unwrap(), 0xB);
        assert_eq!(cursor.bits_remaining(), 0);
    }

    #[test]
    fn cursor_reads_arrays() {
        let data = [0x01, 0x02, 0x03];
        let mut cursor = BitCursor::new(&data);
        assert_eq!(cursor.read_array::<2>().unwrap(), [0x01, 0x02]);
        assert!(cursor.read_array::<2>().is_err());
        assert!(!cursor.read_flag().unwrap());
    }
}
