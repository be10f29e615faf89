//! Registry of devices currently owned by a session
//!
//! Discovery sees every console on the system, including ones that are
//! already open. A device id is claimed before its session starts and
//! released when the session ends, so each device has at most one session.

use std::collections::BTreeSet;

/// Error type for registry misuse
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Device {0} is already claimed by a session")]
    AlreadyClaimed(String),

    #[error("Device {0} is not claimed")]
    NotClaimed(String),
}

#[derive(Debug, Default)]
pub struct DeviceRegistry {
    claimed: BTreeSet<String>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a device for a new session
    pub fn claim(&mut self, device_id: &str) -> Result<(), RegistryError> {
        if !self.claimed.insert(device_id.to_string()) {
            return Err(RegistryError::AlreadyClaimed(device_id.to_string()));
        }
        Ok(())
    }

    /// Release a device whose session ended
    pub fn release(&mut self, device_id: &str) -> Result<(), RegistryError> {
        if !self.claimed.remove(device_id) {
            return Err(RegistryError::NotClaimed(device_id.to_string()));
        }
        Ok(())
    }

    pub fn is_claimed(&self, device_id: &str) -> bool {
        self.claimed.contains(device_id)
    }

    pub fn len(&self) -> usize {
        self.claimed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claimed.is_empty()
    }

    /// Claimed ids in sorted order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.claimed.iter().map(String::as_str)
    }
}
