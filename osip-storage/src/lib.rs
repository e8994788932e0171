//! OSIP (OS Image Profile) management for raw block devices.
//!
//! The OSIP table is a fixed-layout descriptor table at the head of a block
//! device describing where OS and firmware images live. This crate owns that
//! table's whole lifecycle: reading and checksumming it, keeping a backup
//! copy, restoring from it, invalidating entries, and atomically updating a
//! descriptor together with the image payload it points at.

pub mod config;
pub mod device;
pub mod error;
pub mod header;
pub mod reboot;
pub mod stitch;
pub mod storage;
pub mod table;

pub use config::OsipConfig;
pub use error::{OsipError, Result};
pub use header::{MAX_DESCRIPTORS, OSIP_SIGNATURE, Osii, OsipHeader};
pub use storage::{DescriptorPatch, OsipStorage, TableReport, UpdatePhase};
pub use table::{TableLocation, TableManager};

// Re-export commonly used types
pub use device::{BlockDevice, FileDevice};
pub use reboot::{IpcNotifier, NoopNotifier, RebootNotifier};
pub use stitch::StitchedImage;
