//! Reboot-reason hand-off to the firmware controller.
//!
//! After a table restore the platform firmware wants to know why the next
//! boot happens. That side lives outside this crate; all we do here is hand
//! a single reason byte across the boundary.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Reboot reason recorded after a table restore: boot the signed main OS.
pub const REASON_SIGNED_MOS: u8 = 0x0;

/// Collaborator that records a reboot reason with the firmware controller.
pub trait RebootNotifier {
    fn notify(&mut self, reason: u8) -> io::Result<()>;
}

/// Notifier writing the reason byte to the firmware controller device node.
pub struct IpcNotifier {
    path: PathBuf,
}

impl IpcNotifier {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl RebootNotifier for IpcNotifier {
    fn notify(&mut self, reason: u8) -> io::Result<()> {
        let mut dev = OpenOptions::new().write(true).open(&self.path)?;
        dev.write_all(&[reason])?;
        debug!("reboot reason {:#04x} handed to {:?}", reason, self.path);
        Ok(())
    }
}

/// Notifier that drops the reason, for targets without the IPC node.
pub struct NoopNotifier;

impl RebootNotifier for NoopNotifier {
    fn notify(&mut self, _reason: u8) -> io::Result<()> {
        Ok(())
    }
}
