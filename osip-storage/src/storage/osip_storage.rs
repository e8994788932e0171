//! The update orchestrator: validates images, writes payloads, commits
//! tables, and polices the backup/invalidate lifecycle.

use crate::config::OsipConfig;
use crate::device::{BlockDevice, DEVICE_BLOCK_SIZE, DEVICE_PAGE_SIZE, FileDevice};
use crate::error::{OsipError, Result};
use crate::header::{MAX_DESCRIPTORS, Osii, OsipHeader, PAYLOAD_SLOT, PROVISIONING_SLOT};
use crate::reboot::{IpcNotifier, NoopNotifier, RebootNotifier};
use crate::stitch::{self, STITCHED_PAGE_SIZE};
use crate::table::{TableLocation, TableManager};
use tracing::{debug, info, warn};

/// Where an update request currently stands.
///
/// Progression is `Idle → Validating → WritingPayload → Verifying →
/// CommittingTable → Committed`; any failure parks the machine in `Failed`.
/// The table is committed only after the payload readback verifies, so an
/// interrupted update leaves the old table pointing at the old image rather
/// than a committed table pointing at unverified bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePhase {
    Idle,
    Validating,
    WritingPayload,
    Verifying,
    CommittingTable,
    Committed,
    Failed,
}

/// Explicit-field update for one descriptor slot. Unset fields keep the
/// live value.
#[derive(Debug, Clone, Copy, Default)]
pub struct DescriptorPatch {
    pub os_rev_minor: Option<u16>,
    pub os_rev_major: Option<u16>,
    pub logical_start_block: Option<u32>,
    pub ddr_load_address: Option<u32>,
    pub entry_point: Option<u32>,
    pub size_of_os_image: Option<u32>,
    pub attribute: Option<u8>,
}

impl DescriptorPatch {
    pub fn is_empty(&self) -> bool {
        self.os_rev_minor.is_none()
            && self.os_rev_major.is_none()
            && self.logical_start_block.is_none()
            && self.ddr_load_address.is_none()
            && self.entry_point.is_none()
            && self.size_of_os_image.is_none()
            && self.attribute.is_none()
    }

    fn apply(&self, d: &mut Osii) {
        if let Some(v) = self.os_rev_minor {
            d.os_rev_minor = v;
        }
        if let Some(v) = self.os_rev_major {
            d.os_rev_major = v;
        }
        if let Some(v) = self.logical_start_block {
            d.logical_start_block = v;
        }
        if let Some(v) = self.ddr_load_address {
            d.ddr_load_address = v;
        }
        if let Some(v) = self.entry_point {
            d.entry_point = v;
        }
        if let Some(v) = self.size_of_os_image {
            d.size_of_os_image = v;
        }
        if let Some(v) = self.attribute {
            d.attribute = v;
        }
    }
}

/// Snapshot of both on-device tables, as read in one diagnostic pass.
#[derive(Debug, Clone, Copy)]
pub struct TableReport {
    pub primary: OsipHeader,
    pub backup: OsipHeader,
}

impl TableReport {
    pub fn primary_valid(&self) -> bool {
        self.primary.is_valid()
    }

    pub fn backup_valid(&self) -> bool {
        self.backup.is_valid()
    }
}

/// Coordinates every mutation of the descriptor table and the image
/// payloads it references.
///
/// The live table is re-read from the device immediately before each
/// mutation; nothing is cached between operations.
pub struct OsipStorage<D: BlockDevice, N: RebootNotifier> {
    tables: TableManager<D>,
    notifier: N,
    phase: UpdatePhase,
    backed_up: bool,
}

impl OsipStorage<FileDevice, IpcNotifier> {
    /// Open the configured device node, with the firmware-controller
    /// notifier when the target has one.
    pub fn open(config: &OsipConfig) -> Result<OsipStorage<FileDevice, IpcNotifier>> {
        let device = FileDevice::open(&config.device_path)?;
        let ipc = config
            .ipc_path
            .clone()
            .unwrap_or_else(|| crate::config::DEFAULT_IPC_PATH.into());
        Ok(OsipStorage::new(device, IpcNotifier::new(ipc)))
    }
}

impl<D: BlockDevice> OsipStorage<D, NoopNotifier> {
    /// Storage over an arbitrary device with reboot notification disabled.
    pub fn without_notifier(device: D) -> Self {
        Self::new(device, NoopNotifier)
    }
}

impl<D: BlockDevice, N: RebootNotifier> OsipStorage<D, N> {
    pub fn new(device: D, notifier: N) -> Self {
        Self {
            tables: TableManager::new(device),
            notifier,
            phase: UpdatePhase::Idle,
            backed_up: false,
        }
    }

    /// Phase the last `update_slot` call reached.
    pub fn last_phase(&self) -> UpdatePhase {
        self.phase
    }

    /// Read both tables without touching anything.
    pub fn check(&mut self) -> Result<TableReport> {
        let primary = self.tables.read(TableLocation::Primary)?;
        let backup = self.tables.read(TableLocation::Backup)?;
        Ok(TableReport { primary, backup })
    }

    /// Copy the live primary table into the backup region.
    ///
    /// An invalid primary is backed up as-is with a warning; a later
    /// invalidate will refuse to proceed over such a backup anyway.
    pub fn backup(&mut self) -> Result<OsipHeader> {
        let primary = self.tables.read(TableLocation::Primary)?;
        if !primary.is_valid() {
            warn!("backing up a primary table with no live signature");
        }
        self.tables.backup(&primary)?;
        self.backed_up = true;
        info!("primary table backed up");
        Ok(primary)
    }

    /// Restore the primary table from the backup region.
    pub fn restore(&mut self) -> Result<OsipHeader> {
        self.tables.restore(&mut self.notifier)
    }

    /// Invalidate every descriptor matching one of `attributes`.
    ///
    /// Requires a backup taken through this instance *and* a valid backup on
    /// the device; without both, nothing is touched. A matched descriptor
    /// keeps its placement (`logical_start_block`, `size_of_os_image`) and
    /// its attribute tag, and loses everything else. Any attribute missing
    /// from all slots aborts the whole call before the table write, so the
    /// primary stays as it was.
    pub fn invalidate(&mut self, attributes: &[u8]) -> Result<()> {
        if !self.backed_up {
            return Err(OsipError::MissingBackup);
        }
        let backup = self.tables.read(TableLocation::Backup)?;
        if !backup.is_valid() {
            return Err(OsipError::MissingBackup);
        }

        let mut table = self.tables.read(TableLocation::Primary)?;

        for &attr in attributes {
            let slot = table
                .desc
                .iter()
                .position(|d| d.attribute == attr)
                .ok_or(OsipError::AttributeNotFound(attr))?;

            let d = &mut table.desc[slot];
            *d = Osii {
                logical_start_block: d.logical_start_block,
                size_of_os_image: d.size_of_os_image,
                attribute: attr,
                ..Osii::default()
            };
            info!("descriptor slot {slot} invalidated (attribute {attr:#04x})");
        }

        self.tables.write(&table, TableLocation::Primary)
    }

    /// Flash a stitched image into `slot`: validate, write the payload,
    /// verify the readback, then commit the updated table.
    pub fn update_slot(&mut self, slot: usize, image: &[u8]) -> Result<()> {
        self.phase = UpdatePhase::Idle;
        let result = self.run_update(slot, image);
        if result.is_err() {
            self.phase = UpdatePhase::Failed;
        }
        result
    }

    fn run_update(&mut self, slot: usize, image: &[u8]) -> Result<()> {
        check_slot(slot)?;

        self.set_phase(UpdatePhase::Validating);
        let cracked = stitch::crack(image)?;
        stitch::validate_size(image.len(), &cracked.descriptor)?;

        let mut incoming = cracked.descriptor;
        // The stitched descriptor counts packaging pages; the table counts
        // device pages.
        incoming.size_of_os_image = convert_size_units(incoming.size_of_os_image);

        let mut table = self.tables.read(TableLocation::Primary)?;
        table.num_images = 1;

        if slot == PAYLOAD_SLOT {
            // The provisioning image always keeps the lower LBA; the payload
            // image goes above it, whichever slot held which before.
            let payload_lba = table.desc[PAYLOAD_SLOT].logical_start_block;
            let provisioning_lba = table.desc[PROVISIONING_SLOT].logical_start_block;
            incoming.logical_start_block = payload_lba.max(provisioning_lba);
            table.desc[PROVISIONING_SLOT].logical_start_block =
                payload_lba.min(provisioning_lba);
        } else {
            incoming.logical_start_block = table.desc[slot].logical_start_block;
        }
        table.desc[slot] = incoming;

        let payload_offset =
            u64::from(incoming.logical_start_block) * u64::from(DEVICE_BLOCK_SIZE);

        self.set_phase(UpdatePhase::WritingPayload);
        self.tables
            .device_mut()
            .write_at(payload_offset, cracked.payload)?;
        self.tables.device_mut().flush()?;

        self.set_phase(UpdatePhase::Verifying);
        self.verify_payload(payload_offset, cracked.payload)?;

        self.set_phase(UpdatePhase::CommittingTable);
        self.tables.write(&table, TableLocation::Primary)?;

        self.set_phase(UpdatePhase::Committed);
        info!(
            "slot {slot} updated: {} device pages at LBA {:#x}",
            incoming.size_of_os_image, incoming.logical_start_block
        );
        Ok(())
    }

    /// Patch individual descriptor fields of `slot` without touching the
    /// payload region.
    pub fn update_fields(&mut self, slot: usize, patch: &DescriptorPatch) -> Result<()> {
        check_slot(slot)?;

        let mut table = self.tables.read(TableLocation::Primary)?;
        patch.apply(&mut table.desc[slot]);
        self.tables.write(&table, TableLocation::Primary)?;
        info!("slot {slot} descriptor fields patched");
        Ok(())
    }

    /// Read raw bytes from the head of `slot`'s payload region, for
    /// diagnostics.
    pub fn read_payload(&mut self, slot: usize, len: usize) -> Result<Vec<u8>> {
        check_slot(slot)?;

        let table = self.tables.read(TableLocation::Primary)?;
        let offset =
            u64::from(table.desc[slot].logical_start_block) * u64::from(DEVICE_BLOCK_SIZE);
        self.tables.device_mut().read_at(offset, len)
    }

    /// Compare the just-written payload region against the source buffer,
    /// one full device block at a time and then the remainder.
    fn verify_payload(&mut self, offset: u64, expected: &[u8]) -> Result<()> {
        let block = DEVICE_BLOCK_SIZE as usize;
        let mut pos = 0usize;

        while pos < expected.len() {
            let n = block.min(expected.len() - pos);
            let actual = self.tables.device_mut().read_at(offset + pos as u64, n)?;
            if actual[..] != expected[pos..pos + n] {
                return Err(OsipError::VerifyMismatch {
                    offset: offset + pos as u64,
                });
            }
            pos += n;
        }
        debug!("payload verified: {} bytes at {:#x}", expected.len(), offset);
        Ok(())
    }

    fn set_phase(&mut self, phase: UpdatePhase) {
        debug!("update phase {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }
}

fn check_slot(slot: usize) -> Result<()> {
    if slot >= MAX_DESCRIPTORS {
        return Err(OsipError::SlotOutOfRange {
            slot,
            max: MAX_DESCRIPTORS,
        });
    }
    Ok(())
}

/// Convert an image size from stitched-page units to device-page units.
fn convert_size_units(stitched_pages: u32) -> u32 {
    let bytes = u64::from(stitched_pages) * u64::from(STITCHED_PAGE_SIZE);
    (bytes / u64::from(DEVICE_PAGE_SIZE)) as u32
}
