//! Byte-addressable access to the raw block device.

use crate::error::Result;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Device page size in bytes. Pages and blocks coincide on eMMC targets;
/// both equal the 512-byte sector.
pub const DEVICE_PAGE_SIZE: u32 = 512;

/// Device block size in bytes, the unit of `logical_start_block`.
pub const DEVICE_BLOCK_SIZE: u32 = 512;

/// Synchronous positioned I/O over the block device.
///
/// The adapter does no validation of its own; callers own offsets and
/// lengths. `flush` is the durability barrier and must complete before any
/// mutating operation reports success.
pub trait BlockDevice {
    fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>>;

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()>;

    fn flush(&mut self) -> Result<()>;
}

/// [`BlockDevice`] over an opened device node (or a plain file in tests).
pub struct FileDevice {
    file: File,
    path: PathBuf,
}

impl FileDevice {
    /// Open a device node for read/write access.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("opening block device {:?}", path);

        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BlockDevice for FileDevice {
    fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len];
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        debug!(
            "wrote {} bytes to {:?} at offset {:#x}",
            data.len(),
            self.path,
            offset
        );
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn read_back_what_was_written() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&[0u8; 4096]).unwrap();
        tmp.flush().unwrap();

        let mut dev = FileDevice::open(tmp.path()).unwrap();
        dev.write_at(512, b"osip").unwrap();
        dev.flush().unwrap();

        assert_eq!(dev.read_at(512, 4).unwrap(), b"osip");
        assert_eq!(dev.read_at(0, 4).unwrap(), [0; 4]);
    }

    #[test]
    fn open_missing_device_fails() {
        assert!(FileDevice::open("/nonexistent/osip-dev").is_err());
    }
}
