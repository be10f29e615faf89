//! Stub driver - no hardware, replays a scripted event list
//!
//! Used for `--driver stub` dry runs and by the session tests.

use super::{DeviceDriver, DeviceInfo};
use crate::config::{DriverKind, StubConfig};
use crate::hercules::{Led, RawEvent};
use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Registry id of the stub device
pub const STUB_DEVICE_ID: &str = "stub:0";

pub fn device_info() -> DeviceInfo {
    DeviceInfo {
        id: STUB_DEVICE_ID.to_string(),
        name: "Hercules DJ Console (stub)".to_string(),
        kind: DriverKind::Stub,
        path: PathBuf::new(),
    }
}

/// LED writes seen by a stub, shared with whoever created it
pub type LedLog = Arc<Mutex<Vec<(Led, bool)>>>;

pub struct StubDriver {
    script: VecDeque<RawEvent>,
    /// Fail reads once the script is exhausted, as an unplug would
    disconnect_when_done: bool,
    leds: LedLog,
    is_open: bool,
}

impl StubDriver {
    pub fn new(events: impl IntoIterator<Item = RawEvent>) -> Self {
        Self {
            script: events.into_iter().collect(),
            disconnect_when_done: false,
            leds: Arc::new(Mutex::new(Vec::new())),
            is_open: false,
        }
    }

    pub fn from_config(config: &StubConfig) -> Self {
        let driver = Self::new(config.events.iter().map(|e| RawEvent::new(e.control, e.value)));
        if config.disconnect {
            driver.disconnect_when_done()
        } else {
            driver
        }
    }

    /// Report a disconnect after the last scripted event
    pub fn disconnect_when_done(mut self) -> Self {
        self.disconnect_when_done = true;
        self
    }

    /// Handle on the LED log, readable after the driver moved into a session
    pub fn led_log(&self) -> LedLog {
        self.leds.clone()
    }
}

#[async_trait]
impl DeviceDriver for StubDriver {
    fn name(&self) -> &str {
        "stub"
    }

    fn device_id(&self) -> &str {
        STUB_DEVICE_ID
    }

    async fn open(&mut self) -> Result<()> {
        info!("✅ Stub console opened ({} scripted events)", self.script.len());
        self.is_open = true;
        Ok(())
    }

    async fn next_event(&mut self, timeout: Duration) -> Result<Option<RawEvent>> {
        if !self.is_open {
            bail!("Stub console is not open");
        }

        if let Some(event) = self.script.pop_front() {
            return Ok(Some(event));
        }

        if self.disconnect_when_done {
            bail!("Stub console disconnected");
        }

        tokio::time::sleep(timeout).await;
        Ok(None)
    }

    async fn write_led(&mut self, led: Led, on: bool) -> Result<()> {
        debug!("Stub LED {} -> {}", led, on);
        self.leds.lock().push((led, on));
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.is_open = false;
        Ok(())
    }
}
