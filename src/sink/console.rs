//! Console sink - logs every control write for testing and debugging

use super::ControlSink;
use crate::hercules::{ControlKey, Led};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

/// ConsoleSink logs all control writes
///
/// This is useful for:
/// - Checking a console's decoding without a running application
/// - Watching jog/pitch output while calibrating
pub struct ConsoleSink {
    name: String,
    /// Write counter for debugging
    write_count: AtomicU64,
}

impl ConsoleSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            write_count: AtomicU64::new(0),
        }
    }

    pub fn write_count(&self) -> u64 {
        self.write_count.load(Ordering::Relaxed)
    }

    fn next_write(&self) -> u64 {
        self.write_count.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl ControlSink for ConsoleSink {
    fn write_continuous(&self, key: &ControlKey, value: f64) {
        let write_num = self.next_write();
        info!(
            "🎚️  [{}] {} {} = {:.3} [write #{}]",
            chrono::Local::now().format("%H:%M:%S%.3f"),
            self.name,
            key,
            value,
            write_num
        );
    }

    fn write_button_edge(&self, key: &ControlKey, pressed: bool) {
        let write_num = self.next_write();
        info!(
            "🔘 [{}] {} {} {} [write #{}]",
            chrono::Local::now().format("%H:%M:%S%.3f"),
            self.name,
            key,
            if pressed { "pressed" } else { "released" },
            write_num
        );
    }

    fn request_led(&self, led: Led, on: bool) {
        debug!(sink = %self.name, led = %led, on, "LED request");
    }
}
