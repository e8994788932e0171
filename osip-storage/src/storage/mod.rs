//! Orchestration of table and payload updates.

mod osip_storage;

pub use osip_storage::{DescriptorPatch, OsipStorage, TableReport, UpdatePhase};
