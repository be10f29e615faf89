//! Hercules DJ Console decoding core
//!
//! Turns raw `(control id, value)` events from a console into application
//! control writes. Jog wheels go through [`delta`] and [`rotary`], the pitch
//! knobs through [`pitch`], the headphone selector through [`headphone`], and
//! everything is routed by [`dispatcher::EventDispatcher`].

pub mod controls;
pub mod delta;
pub mod dispatcher;
pub mod headphone;
pub mod jog;
pub mod pitch;
pub mod rotary;

use std::fmt;

pub use controls::{ControlKey, ControlKind, Led, LedKind};
pub use dispatcher::EventDispatcher;
pub use headphone::{HeadphoneDeckSelector, HeadphoneSelection};
pub use pitch::PitchState;
pub use rotary::RotaryFilter;

/// Deck side of a control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const ALL: [Side; 2] = [Side::Left, Side::Right];

    /// Index into per-side state arrays
    pub const fn index(self) -> usize {
        match self {
            Side::Left => 0,
            Side::Right => 1,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => write!(f, "left"),
            Side::Right => write!(f, "right"),
        }
    }
}

/// One hardware-reported sample
///
/// `value` is 0-255 for analog controls and jog counters, 0/1 for buttons and
/// a selector bitmask for the headphone selector codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEvent {
    pub control_id: u16,
    pub value: i32,
}

impl RawEvent {
    pub const fn new(control_id: u16, value: i32) -> Self {
        Self { control_id, value }
    }
}

impl fmt::Display for RawEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>3} = {:>3}", self.control_id, self.value)
    }
}
