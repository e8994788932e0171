//! Primary and backup descriptor-table lifecycle on the device.

use crate::device::BlockDevice;
use crate::error::{OsipError, Result};
use crate::header::{self, OSIP_SIGNATURE, OSIP_TABLE_SIZE, OsipHeader};
use crate::reboot::{REASON_SIGNED_MOS, RebootNotifier};
use tracing::{debug, info, warn};

/// Byte offset of the backup table region.
pub const BACKUP_TABLE_OFFSET: u64 = 0xE0;

/// Which on-device copy of the table an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableLocation {
    /// Live table at device byte 0.
    Primary,
    /// Backup copy at [`BACKUP_TABLE_OFFSET`].
    Backup,
}

impl TableLocation {
    pub fn offset(self) -> u64 {
        match self {
            Self::Primary => 0,
            Self::Backup => BACKUP_TABLE_OFFSET,
        }
    }
}

/// Reads and writes the descriptor table, always as a whole structure.
///
/// Tables are never cached: every call goes to the device, and every write
/// ends with a flush before success is reported.
pub struct TableManager<D: BlockDevice> {
    device: D,
}

impl<D: BlockDevice> TableManager<D> {
    pub fn new(device: D) -> Self {
        Self { device }
    }

    /// Read the table at `location`.
    ///
    /// The checksum is advisory and not verified here. An invalid backup is
    /// an expected state on first use and only logged; an invalid primary is
    /// worth a warning but still returned for the caller to judge.
    pub fn read(&mut self, location: TableLocation) -> Result<OsipHeader> {
        let bytes = self.device.read_at(location.offset(), OSIP_TABLE_SIZE)?;
        let table = header::decode(&bytes)?;

        if !table.is_valid() {
            match location {
                TableLocation::Backup => info!("no backup table present"),
                TableLocation::Primary => {
                    warn!("primary table signature is {:#010x}, not live", table.sig);
                }
            }
        }
        Ok(table)
    }

    /// Serialize `table` (recomputing its checksum) and write the whole
    /// structure at `location`, flushing before returning.
    pub fn write(&mut self, table: &OsipHeader, location: TableLocation) -> Result<()> {
        let bytes = header::encode(table)?;
        self.device.write_at(location.offset(), &bytes)?;
        self.device.flush()?;
        debug!("table committed to {:?}", location);
        Ok(())
    }

    /// Store `table` in the backup region.
    pub fn backup(&mut self, table: &OsipHeader) -> Result<()> {
        self.write(table, TableLocation::Backup)
    }

    /// Copy the backup table over the primary, then retire the backup.
    ///
    /// The backup region is zeroed once its content reaches the primary so a
    /// stale copy can never be replayed, and the firmware controller is told
    /// a restore happened. A notify failure does not undo the restore.
    pub fn restore<N: RebootNotifier>(&mut self, notifier: &mut N) -> Result<OsipHeader> {
        let backup = self.read(TableLocation::Backup)?;
        if !backup.is_valid() {
            return Err(OsipError::SignatureMismatch {
                expected: OSIP_SIGNATURE,
                actual: backup.sig,
            });
        }

        self.write(&backup, TableLocation::Primary)?;

        self.device
            .write_at(BACKUP_TABLE_OFFSET, &[0u8; OSIP_TABLE_SIZE])?;
        self.device.flush()?;
        info!("backup table restored to primary, backup region cleared");

        if let Err(e) = notifier.notify(REASON_SIGNED_MOS) {
            warn!("reboot reason not recorded: {e}");
        }
        Ok(backup)
    }

    /// Direct access to the underlying device, for payload I/O.
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::FileDevice;
    use crate::header::{MAX_DESCRIPTORS, Osii};
    use pretty_assertions::assert_eq;
    use std::io::Write as _;

    fn blank_device(len: usize) -> (tempfile::NamedTempFile, FileDevice) {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&vec![0u8; len]).unwrap();
        tmp.flush().unwrap();
        let dev = FileDevice::open(tmp.path()).unwrap();
        (tmp, dev)
    }

    fn live_table() -> OsipHeader {
        let mut t = OsipHeader {
            sig: OSIP_SIGNATURE,
            num_pointers: 2,
            num_images: 2,
            header_size: OSIP_TABLE_SIZE as u16,
            ..OsipHeader::default()
        };
        t.desc[0] = Osii {
            logical_start_block: 8,
            size_of_os_image: 64,
            ..Osii::default()
        };
        t
    }

    #[test]
    fn write_then_read_round_trips_both_locations() {
        let (_tmp, dev) = blank_device(64 * 1024);
        let mut mgr = TableManager::new(dev);
        let t = live_table();

        mgr.write(&t, TableLocation::Primary).unwrap();
        mgr.backup(&t).unwrap();

        let p = mgr.read(TableLocation::Primary).unwrap();
        let b = mgr.read(TableLocation::Backup).unwrap();
        assert!(p.is_valid());
        assert_eq!(p, b);
        assert_eq!(p.desc[0].logical_start_block, 8);
    }

    #[test]
    fn blank_backup_reads_as_invalid_without_error() {
        let (_tmp, dev) = blank_device(64 * 1024);
        let mut mgr = TableManager::new(dev);
        let b = mgr.read(TableLocation::Backup).unwrap();
        assert!(!b.is_valid());
        assert_eq!(b.desc, [Osii::default(); MAX_DESCRIPTORS]);
    }

    #[test]
    fn restore_without_backup_is_a_signature_error() {
        let (_tmp, dev) = blank_device(64 * 1024);
        let mut mgr = TableManager::new(dev);
        let mut notifier = crate::reboot::NoopNotifier;
        assert!(matches!(
            mgr.restore(&mut notifier).unwrap_err(),
            OsipError::SignatureMismatch { .. }
        ));
    }

    #[test]
    fn restore_copies_backup_and_zeroes_it() {
        let (_tmp, dev) = blank_device(64 * 1024);
        let mut mgr = TableManager::new(dev);
        let t = live_table();
        mgr.backup(&t).unwrap();

        let mut notifier = crate::reboot::NoopNotifier;
        let restored = mgr.restore(&mut notifier).unwrap();
        assert!(restored.is_valid());

        let primary = mgr.read(TableLocation::Primary).unwrap();
        assert_eq!(primary.desc[0].logical_start_block, 8);

        let raw = mgr
            .device_mut()
            .read_at(BACKUP_TABLE_OFFSET, OSIP_TABLE_SIZE)
            .unwrap();
        assert!(raw.iter().all(|b| *b == 0));
    }
}
