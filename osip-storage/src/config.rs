//! Deployment configuration: where the managed device and the firmware
//! controller live on this target.

use std::path::PathBuf;

/// Default block device node holding the OSIP table and images.
#[cfg(target_os = "android")]
pub const DEFAULT_DEVICE_PATH: &str = "/dev/block/mmcblk0";
#[cfg(not(target_os = "android"))]
pub const DEFAULT_DEVICE_PATH: &str = "/dev/mmcblk0";

/// Default firmware-controller node for the reboot-reason hand-off.
pub const DEFAULT_IPC_PATH: &str = "/dev/mid_ipc";

/// Paths for one managed device.
///
/// The process assumes exclusive ownership of `device_path` for its entire
/// run; nothing else may touch the device concurrently. That is a deployment
/// contract, not something enforced here.
#[derive(Debug, Clone)]
pub struct OsipConfig {
    /// Block device carrying the tables and image payloads.
    pub device_path: PathBuf,

    /// Firmware-controller node for reboot-reason notification, if the
    /// target has one.
    pub ipc_path: Option<PathBuf>,
}

impl Default for OsipConfig {
    fn default() -> Self {
        Self {
            device_path: PathBuf::from(DEFAULT_DEVICE_PATH),
            ipc_path: Some(PathBuf::from(DEFAULT_IPC_PATH)),
        }
    }
}

impl OsipConfig {
    /// Configuration for a non-default device node.
    pub fn with_device<P: Into<PathBuf>>(device_path: P) -> Self {
        Self {
            device_path: device_path.into(),
            ..Self::default()
        }
    }
}
