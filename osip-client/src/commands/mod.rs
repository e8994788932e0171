//! Command handlers for the `osip` CLI.

pub mod inspect;
pub mod table;
pub mod update;

use crate::CommandContext;
use osip_storage::{FileDevice, IpcNotifier, OsipConfig, OsipStorage};

/// Open storage on the device from the context, or the platform default.
fn open_storage(ctx: &CommandContext) -> anyhow::Result<OsipStorage<FileDevice, IpcNotifier>> {
    let config = match &ctx.device {
        Some(path) => OsipConfig::with_device(path.clone()),
        None => OsipConfig::default(),
    };
    Ok(OsipStorage::open(&config)?)
}
