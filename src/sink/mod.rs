//! Control sinks
//!
//! A sink receives what the decoding core produces: continuous control
//! values, button edges and LED requests. Writes never block the caller.

pub mod console;

use crate::hercules::{ControlKey, Led};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

pub use console::ConsoleSink;

/// Outbound interface of the decoding core
pub trait ControlSink {
    /// Store/broadcast a continuous control value
    fn write_continuous(&self, key: &ControlKey, value: f64);

    /// Signal a button transition
    fn write_button_edge(&self, key: &ControlKey, pressed: bool);

    /// Ask for an LED change on the device
    ///
    /// Default implementation: drop it (application-side sinks have no LEDs).
    fn request_led(&self, led: Led, on: bool) {
        trace!("LED request {} -> {} ignored by sink", led, on);
    }
}

/// Sink shared between the session manager and its sessions
pub type SharedSink = Arc<dyn ControlSink + Send + Sync>;

/// A single sink write in message form
#[derive(Debug, Clone, PartialEq)]
pub enum ControlWrite {
    Continuous { key: ControlKey, value: f64 },
    ButtonEdge { key: ControlKey, pressed: bool },
}

impl ControlWrite {
    pub fn key(&self) -> &ControlKey {
        match self {
            ControlWrite::Continuous { key, .. } | ControlWrite::ButtonEdge { key, .. } => key,
        }
    }
}

/// Forwards writes over an unbounded channel to the application layer
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ControlWrite>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ControlWrite>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, write: ControlWrite) {
        // Receiver gone means the application is shutting down
        if self.tx.send(write).is_err() {
            trace!("Control write dropped, receiver closed");
        }
    }
}

impl ControlSink for ChannelSink {
    fn write_continuous(&self, key: &ControlKey, value: f64) {
        self.send(ControlWrite::Continuous { key: *key, value });
    }

    fn write_button_edge(&self, key: &ControlKey, pressed: bool) {
        self.send(ControlWrite::ButtonEdge { key: *key, pressed });
    }
}
