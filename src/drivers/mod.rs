//! Device drivers (evdev, hidraw, stub)
//!
//! A driver turns one physical console into a stream of [`RawEvent`]s in the
//! unified control-id space of [`crate::hercules::controls`] and accepts LED
//! writes back. The variant is picked once, when a session is built.

use crate::config::{DeviceConfig, DriverKind};
use crate::hercules::{Led, RawEvent};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::OpenOptions;
use tracing::warn;

pub mod evdev;
pub mod hid;
pub mod stub;

pub use evdev::EvdevDriver;
pub use hid::HidDriver;
pub use stub::StubDriver;

/// Driver trait - every console transport implements this
///
/// A driver is owned by exactly one session task, so methods take `&mut self`.
#[async_trait]
pub trait DeviceDriver: Send {
    /// Get the driver name (e.g., "evdev", "hid", "stub")
    fn name(&self) -> &str;

    /// Stable id of the device, used as the registry key
    fn device_id(&self) -> &str;

    /// Open the device node
    async fn open(&mut self) -> Result<()>;

    /// Wait up to `timeout` for the next event
    ///
    /// `Ok(None)` means the timeout elapsed. An error means the device is
    /// gone and the session should end.
    async fn next_event(&mut self, timeout: Duration) -> Result<Option<RawEvent>>;

    /// Switch one LED on the device
    async fn write_led(&mut self, led: Led, on: bool) -> Result<()>;

    /// Release the device
    async fn close(&mut self) -> Result<()>;
}

/// A console found during discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Registry key, e.g. `evdev:event7`
    pub id: String,
    /// Name reported by the kernel
    pub name: String,
    pub kind: DriverKind,
    /// Device node to open
    pub path: PathBuf,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} \"{}\" at {}", self.id, self.name, self.path.display())
    }
}

/// List the consoles reachable with the configured driver kind
pub async fn discover(config: &DeviceConfig) -> Result<Vec<DeviceInfo>> {
    match config.driver {
        DriverKind::Stub => Ok(vec![stub::device_info()]),
        DriverKind::Evdev => evdev::discover(&config.evdev).await,
        DriverKind::Hid => hid::discover(&config.hid).await,
    }
}

/// Build the driver matching a discovered device
pub fn build_driver(info: &DeviceInfo, config: &DeviceConfig) -> Box<dyn DeviceDriver> {
    match info.kind {
        DriverKind::Stub => Box::new(StubDriver::from_config(&config.stub)),
        DriverKind::Evdev => Box::new(EvdevDriver::new(info.clone())),
        DriverKind::Hid => Box::new(HidDriver::new(info.clone())),
    }
}

/// Hint logged when a device node exists but cannot be opened
pub(crate) fn permission_hint(path: &Path) -> String {
    format!(
        "Permission denied on {}. Add a udev rule for the console, \
         run 'sudo chmod o+rw {}', or run as root.",
        path.display(),
        path.display()
    )
}

/// Open a device node read-write in non-blocking mode
pub(crate) async fn open_node(path: &Path) -> Result<std::fs::File> {
    let opened = OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)
        .await;

    match opened {
        Ok(file) => Ok(file.into_std().await),
        Err(e) => {
            if e.kind() == ErrorKind::PermissionDenied {
                warn!("{}", permission_hint(path));
            }
            Err(e).with_context(|| format!("Failed to open {}", path.display()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_discover_stub() {
        let config = DeviceConfig {
            driver: DriverKind::Stub,
            ..DeviceConfig::default()
        };
        let devices = discover(&config).await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].kind, DriverKind::Stub);

        let driver = build_driver(&devices[0], &config);
        assert_eq!(driver.name(), "stub");
        assert_eq!(driver.device_id(), devices[0].id);
    }

    #[test]
    fn test_permission_hint_names_path() {
        let hint = permission_hint(Path::new("/dev/input/event3"));
        assert!(hint.contains("/dev/input/event3"));
        assert!(hint.contains("chmod"));
    }
}
