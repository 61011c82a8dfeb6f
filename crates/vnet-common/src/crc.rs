// crc.rs — packet checksum
// Delegates to the `crc` crate (CRC-32/ISO-HDLC, the common "CRC-32").

use crc::{Crc, CRC_32_ISO_HDLC};

const CRC_CALC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Compute the CRC-32 of a block of data.
pub fn crc32_block(data: &[u8]) -> u32 {
    CRC_CALC.checksum(data)
}

/// Fold a 32-bit CRC into the 16-bit value a sequenced packet carries in
/// its header: `(crc & 0xFFFF) ^ (crc >> 16)`.
#[inline]
pub fn compress_checksum_to_u16(checksum: u32) -> u16 {
    ((checksum & 0xFFFF) ^ (checksum >> 16)) as u16
}
