//! OSIP table and descriptor wire format.
//!
//! The on-disk layout is serialized field by field at explicit byte offsets;
//! the in-memory representation is never written as-is, so the format stays
//! identical across targets regardless of struct padding.

use crate::error::{OsipError, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

/// Table signature, ASCII "$OS$".
pub const OSIP_SIGNATURE: u32 = 0x2453_4F24;

/// Serialized size of one descriptor.
pub const OSII_SIZE: usize = 24;

/// Byte offset of the descriptor array within a table.
pub const OSIP_PREAMBLE_SIZE: usize = 0x20;

/// Number of descriptor slots in a table.
pub const MAX_DESCRIPTORS: usize = 7;

/// Serialized size of a full table: 32-byte preamble plus 7 descriptors.
pub const OSIP_TABLE_SIZE: usize = OSIP_PREAMBLE_SIZE + MAX_DESCRIPTORS * OSII_SIZE;

/// Descriptor slot conventionally holding the payload OS.
pub const PAYLOAD_SLOT: usize = 0;

/// Descriptor slot conventionally holding the provisioning OS.
pub const PROVISIONING_SLOT: usize = 1;

/// Byte offset of the checksum field within the table preamble.
const CHECKSUM_OFFSET: usize = 0x07;

/// One OS image identifier (OSII): where an image lives on the device and
/// how the bootloader should launch it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Osii {
    pub os_rev_minor: u16,
    pub os_rev_major: u16,
    /// Start of the image, in device-block units.
    pub logical_start_block: u32,
    pub ddr_load_address: u32,
    pub entry_point: u32,
    /// Image size, in device-page units (512-byte units inside a stitched
    /// image, converted on update).
    pub size_of_os_image: u32,
    /// Image kind tag, used for lookup and invalidation.
    pub attribute: u8,
    pub reserved: [u8; 3],
}

impl Osii {
    fn parse(r: &mut Cursor<&[u8]>) -> std::io::Result<Self> {
        let os_rev_minor = r.read_u16::<LittleEndian>()?;
        let os_rev_major = r.read_u16::<LittleEndian>()?;
        let logical_start_block = r.read_u32::<LittleEndian>()?;
        let ddr_load_address = r.read_u32::<LittleEndian>()?;
        let entry_point = r.read_u32::<LittleEndian>()?;
        let size_of_os_image = r.read_u32::<LittleEndian>()?;
        let attribute = r.read_u8()?;
        let mut reserved = [0u8; 3];
        for b in &mut reserved {
            *b = r.read_u8()?;
        }
        Ok(Self {
            os_rev_minor,
            os_rev_major,
            logical_start_block,
            ddr_load_address,
            entry_point,
            size_of_os_image,
            attribute,
            reserved,
        })
    }

    fn serialize(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.os_rev_minor.to_le_bytes());
        out.extend_from_slice(&self.os_rev_major.to_le_bytes());
        out.extend_from_slice(&self.logical_start_block.to_le_bytes());
        out.extend_from_slice(&self.ddr_load_address.to_le_bytes());
        out.extend_from_slice(&self.entry_point.to_le_bytes());
        out.extend_from_slice(&self.size_of_os_image.to_le_bytes());
        out.push(self.attribute);
        out.extend_from_slice(&self.reserved);
    }
}

/// The OS image profile (OSIP): the descriptor table at the head of the
/// device, plus a backup copy at a fixed offset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OsipHeader {
    pub sig: u32,
    /// Reserved byte at offset 4, carried verbatim.
    pub intel_reserved: u8,
    pub header_rev_minor: u8,
    pub header_rev_major: u8,
    /// XOR of all bytes in `[0, header_size)` with this byte taken as zero.
    /// Advisory: readers report it but never reject a table over it.
    pub header_checksum: u8,
    pub num_pointers: u8,
    pub num_images: u8,
    /// Number of bytes covered by the checksum.
    pub header_size: u16,
    pub reserved: [u32; 5],
    pub desc: [Osii; MAX_DESCRIPTORS],
}

impl OsipHeader {
    /// Whether the signature marks this as a live table. An all-zero region
    /// reads as an invalid (absent) table, which is a normal state for the
    /// backup area.
    pub fn is_valid(&self) -> bool {
        self.sig == OSIP_SIGNATURE
    }
}

/// Parse a table from its serialized form.
///
/// Purely structural: a wrong signature still decodes (callers consult
/// [`OsipHeader::is_valid`]); only a buffer shorter than
/// [`OSIP_TABLE_SIZE`] is an error.
pub fn decode(bytes: &[u8]) -> Result<OsipHeader> {
    if bytes.len() < OSIP_TABLE_SIZE {
        return Err(OsipError::InvalidFormat(format!(
            "table buffer too short: {} < {OSIP_TABLE_SIZE}",
            bytes.len()
        )));
    }

    let mut r = Cursor::new(bytes);
    let sig = r.read_u32::<LittleEndian>()?;
    let intel_reserved = r.read_u8()?;
    let header_rev_minor = r.read_u8()?;
    let header_rev_major = r.read_u8()?;
    let header_checksum = r.read_u8()?;
    let num_pointers = r.read_u8()?;
    let num_images = r.read_u8()?;
    let header_size = r.read_u16::<LittleEndian>()?;

    let mut reserved = [0u32; 5];
    for w in &mut reserved {
        *w = r.read_u32::<LittleEndian>()?;
    }

    let mut desc = [Osii::default(); MAX_DESCRIPTORS];
    for d in &mut desc {
        *d = Osii::parse(&mut r)?;
    }

    Ok(OsipHeader {
        sig,
        intel_reserved,
        header_rev_minor,
        header_rev_major,
        header_checksum,
        num_pointers,
        num_images,
        header_size,
        reserved,
        desc,
    })
}

/// Serialize a table, recomputing the header checksum.
///
/// Fails when `header_size` claims more bytes than the serialized table
/// holds; the checksum pass would otherwise run off the end of the buffer.
pub fn encode(table: &OsipHeader) -> Result<Vec<u8>> {
    if usize::from(table.header_size) > OSIP_TABLE_SIZE {
        return Err(OsipError::InvalidFormat(format!(
            "header_size {} exceeds table size {OSIP_TABLE_SIZE}",
            table.header_size
        )));
    }

    let mut out = Vec::with_capacity(OSIP_TABLE_SIZE);
    out.extend_from_slice(&table.sig.to_le_bytes());
    out.push(table.intel_reserved);
    out.push(table.header_rev_minor);
    out.push(table.header_rev_major);
    // Checksum byte is zero during the XOR pass; patched in below.
    out.push(0);
    out.push(table.num_pointers);
    out.push(table.num_images);
    out.extend_from_slice(&table.header_size.to_le_bytes());
    for w in &table.reserved {
        out.extend_from_slice(&w.to_le_bytes());
    }
    for d in &table.desc {
        d.serialize(&mut out);
    }
    debug_assert_eq!(out.len(), OSIP_TABLE_SIZE);

    let sum = xor_checksum(&out[..usize::from(table.header_size)]);
    out[CHECKSUM_OFFSET] = sum;

    Ok(out)
}

/// XOR-fold a byte range.
fn xor_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_table() -> OsipHeader {
        let mut t = OsipHeader {
            sig: OSIP_SIGNATURE,
            header_rev_major: 1,
            num_pointers: 2,
            num_images: 2,
            header_size: OSIP_TABLE_SIZE as u16,
            ..OsipHeader::default()
        };
        t.desc[PAYLOAD_SLOT] = Osii {
            os_rev_minor: 3,
            os_rev_major: 1,
            logical_start_block: 0x200,
            ddr_load_address: 0x0110_0000,
            entry_point: 0x0110_0000,
            size_of_os_image: 0x4000,
            attribute: 0,
            reserved: [0; 3],
        };
        t.desc[PROVISIONING_SLOT] = Osii {
            logical_start_block: 0x1,
            size_of_os_image: 0x800,
            attribute: 1,
            ..Osii::default()
        };
        t
    }

    #[test]
    fn round_trip() {
        let bytes = encode(&sample_table()).unwrap();
        assert_eq!(bytes.len(), OSIP_TABLE_SIZE);

        let decoded = decode(&bytes).unwrap();
        assert!(decoded.is_valid());
        // The first decode carries the freshly computed checksum; from then
        // on encode/decode is a fixed point.
        assert_eq!(decode(&encode(&decoded).unwrap()).unwrap(), decoded);
    }

    #[test]
    fn checksum_is_xor_with_checksum_byte_zeroed() {
        let bytes = encode(&sample_table()).unwrap();
        let decoded = decode(&bytes).unwrap();

        let mut scratch = bytes.clone();
        scratch[CHECKSUM_OFFSET] = 0;
        let expected = scratch[..usize::from(decoded.header_size)]
            .iter()
            .fold(0u8, |acc, b| acc ^ b);
        assert_eq!(decoded.header_checksum, expected);
    }

    #[test]
    fn decode_accepts_wrong_signature() {
        let mut t = sample_table();
        t.sig = 0xDEAD_BEEF;
        let decoded = decode(&encode(&t).unwrap()).unwrap();
        assert!(!decoded.is_valid());
        assert_eq!(decoded.sig, 0xDEAD_BEEF);
    }

    #[test]
    fn decode_rejects_short_buffer() {
        let err = decode(&[0u8; OSIP_TABLE_SIZE - 1]).unwrap_err();
        assert!(matches!(err, OsipError::InvalidFormat(_)));
    }

    #[test]
    fn encode_rejects_oversized_header_size() {
        let mut t = sample_table();
        t.header_size = OSIP_TABLE_SIZE as u16 + 1;
        assert!(matches!(
            encode(&t).unwrap_err(),
            OsipError::InvalidFormat(_)
        ));
    }

    #[test]
    fn minimal_table_decodes_with_zero_descriptors() {
        // Signature + num_images/num_pointers set, everything else zero.
        let mut bytes = vec![0u8; OSIP_TABLE_SIZE];
        bytes[..4].copy_from_slice(&OSIP_SIGNATURE.to_le_bytes());
        bytes[8] = 1; // num_pointers
        bytes[9] = 1; // num_images

        let t = decode(&bytes).unwrap();
        assert!(t.is_valid());
        assert_eq!(t.num_images, 1);
        assert_eq!(t.num_pointers, 1);
        assert_eq!(t.header_size, 0);
        assert_eq!(t.desc[0], Osii::default());
    }

    #[test]
    fn descriptor_offsets_match_preamble() {
        let mut t = sample_table();
        t.desc[6].attribute = 0xAA;
        let bytes = encode(&t).unwrap();

        // Last descriptor's attribute byte sits at preamble + 6 entries + 20.
        let off = OSIP_PREAMBLE_SIZE + 6 * OSII_SIZE + 20;
        assert_eq!(bytes[off], 0xAA);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn descriptor() -> impl Strategy<Value = Osii> {
            (
                any::<u16>(),
                any::<u16>(),
                any::<u32>(),
                any::<u32>(),
                any::<u32>(),
                any::<u32>(),
                any::<u8>(),
            )
                .prop_map(
                    |(minor, major, lsb, addr, entry, size, attribute)| Osii {
                        os_rev_minor: minor,
                        os_rev_major: major,
                        logical_start_block: lsb,
                        ddr_load_address: addr,
                        entry_point: entry,
                        size_of_os_image: size,
                        attribute,
                        reserved: [0; 3],
                    },
                )
        }

        proptest! {
            #[test]
            fn encode_decode_round_trip(
                d in descriptor(),
                num_images in 0u8..8,
                header_size in 0u16..=OSIP_TABLE_SIZE as u16,
            ) {
                let mut t = OsipHeader {
                    sig: OSIP_SIGNATURE,
                    num_pointers: num_images,
                    num_images,
                    header_size,
                    ..OsipHeader::default()
                };
                t.desc[0] = d;

                let normalized = decode(&encode(&t).unwrap()).unwrap();
                let round = decode(&encode(&normalized).unwrap()).unwrap();
                prop_assert_eq!(normalized, round);
                prop_assert_eq!(round.desc[0], d);
            }
        }
    }
}
