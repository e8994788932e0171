//! Cracking stitched firmware images.
//!
//! A stitched image prefixes the OS payload with one 512-byte block holding
//! an OSIP-shaped table of its own. Only single-image packages are accepted;
//! the descriptor of interest is always slot 0 of the embedded table.

use crate::error::{OsipError, Result};
use crate::header::{self, Osii, PAYLOAD_SLOT};
use tracing::debug;

/// Page unit used by the packaging tool for `size_of_os_image`.
pub const STITCHED_PAGE_SIZE: u32 = 512;

/// Size of the leading block holding the embedded table.
pub const STITCHED_BLOCK_SIZE: usize = 512;

/// A cracked stitched image: the embedded descriptor plus the payload bytes
/// that follow the leading block.
#[derive(Debug)]
pub struct StitchedImage<'a> {
    pub descriptor: Osii,
    pub payload: &'a [u8],
}

/// Split a stitched image into its descriptor and payload.
///
/// The embedded table must declare exactly one image; anything else is a
/// package this code does not know how to lay out, and is rejected outright.
pub fn crack(image: &[u8]) -> Result<StitchedImage<'_>> {
    if image.len() < STITCHED_BLOCK_SIZE {
        return Err(OsipError::InvalidFormat(format!(
            "stitched image shorter than its leading block: {} < {STITCHED_BLOCK_SIZE}",
            image.len()
        )));
    }

    let embedded = header::decode(&image[..STITCHED_BLOCK_SIZE])?;
    if embedded.num_images != 1 {
        return Err(OsipError::InvalidFormat(format!(
            "stitched image declares {} embedded images, expected exactly 1",
            embedded.num_images
        )));
    }

    let descriptor = embedded.desc[PAYLOAD_SLOT];
    debug!(
        "cracked stitched image: rev {}.{}, {} pages of payload",
        descriptor.os_rev_major, descriptor.os_rev_minor, descriptor.size_of_os_image
    );

    Ok(StitchedImage {
        descriptor,
        payload: &image[STITCHED_BLOCK_SIZE..],
    })
}

/// Check that the payload length the descriptor declares matches the bytes
/// actually present after the leading block. Strict equality; a stitched
/// image is rejected for being short *or* long.
pub fn validate_size(image_len: usize, descriptor: &Osii) -> Result<()> {
    let declared = u64::from(descriptor.size_of_os_image) * u64::from(STITCHED_PAGE_SIZE);
    let present = (image_len as u64)
        .checked_sub(STITCHED_BLOCK_SIZE as u64)
        .ok_or_else(|| {
            OsipError::InvalidFormat(format!(
                "stitched image shorter than its leading block: {image_len} < {STITCHED_BLOCK_SIZE}"
            ))
        })?;

    if declared != present {
        return Err(OsipError::InvalidFormat(format!(
            "stitched payload size mismatch: descriptor declares {declared:#x} bytes, image carries {present:#x}"
        )));
    }
    Ok(())
}
