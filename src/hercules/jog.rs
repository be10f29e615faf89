//! Jog wheel channel
//!
//! Accumulates unwrapped counter deltas between output ticks and drains them
//! through the rotary filter once per tick.

use super::delta;
use super::rotary::RotaryFilter;

/// Per-side jog state
#[derive(Debug, Clone)]
pub struct JogChannel {
    /// Last raw counter value, `None` until the first sample
    last_raw: Option<i32>,
    /// Motion accumulated since the last tick
    pending_delta: f64,
    rotary: RotaryFilter,
    /// Set while motion is decaying; keeps writes going until a zero is sent
    processing: bool,
}

impl JogChannel {
    pub fn new(filter_length: usize, calibration: f64) -> Self {
        Self {
            last_raw: None,
            pending_delta: 0.0,
            rotary: RotaryFilter::new(filter_length, calibration),
            processing: false,
        }
    }

    /// Feed one raw counter sample; returns the unwrapped delta.
    pub fn accumulate(&mut self, raw: i32) -> i32 {
        let (delta, last_raw) = delta::unwrap(self.last_raw, raw);
        self.last_raw = Some(last_raw);
        self.pending_delta += delta as f64;
        delta
    }

    pub fn pending_delta(&self) -> f64 {
        self.pending_delta
    }

    /// Run one output tick.
    ///
    /// Returns the value to write, or `None` when the wheel is at rest and the
    /// final zero has already been sent.
    pub fn tick(&mut self) -> Option<f64> {
        let output = if self.pending_delta != 0.0 {
            let output = self.rotary.fill_buffer(self.pending_delta);
            self.pending_delta = 0.0;
            self.processing = true;
            output
        } else {
            self.rotary.filter(0.0)
        };

        if output != 0.0 || self.processing {
            if output == 0.0 {
                self.processing = false;
            }
            Some(output)
        } else {
            None
        }
    }

    pub fn set_calibration(&mut self, calibration: f64) {
        self.rotary.set_calibration(calibration);
    }

    pub fn calibration(&self) -> f64 {
        self.rotary.calibration()
    }

    pub fn set_filter_length(&mut self, filter_length: usize) {
        self.rotary.set_filter_length(filter_length);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sample_only_primes() {
        let mut jog = JogChannel::new(4, 64.0);
        assert_eq!(jog.accumulate(100), 0);
        assert_eq!(jog.pending_delta(), 0.0);
        assert_eq!(jog.tick(), None);
    }

    #[test]
    fn test_motion_then_decay_to_rest() {
        let mut jog = JogChannel::new(4, 1.0);
        jog.accumulate(10);
        jog.accumulate(12);
        jog.accumulate(14);
        assert_eq!(jog.pending_delta(), 4.0);

        // Seeded with the whole delta, then drains over the filter length
        assert_eq!(jog.tick(), Some(4.0));
        assert_eq!(jog.tick(), Some(3.0));
        assert_eq!(jog.tick(), Some(2.0));
        assert_eq!(jog.tick(), Some(1.0));
        // One final zero, then silence
        assert_eq!(jog.tick(), Some(0.0));
        assert_eq!(jog.tick(), None);
        assert_eq!(jog.tick(), None);
    }

    #[test]
    fn test_rollover_accumulates_signed() {
        let mut jog = JogChannel::new(1, 1.0);
        jog.accumulate(250);
        assert_eq!(jog.accumulate(3), 9);
        assert_eq!(jog.accumulate(254), -5);
        assert_eq!(jog.pending_delta(), 4.0);
    }

    #[test]
    fn test_calibration_change_applies_to_next_tick() {
        let mut jog = JogChannel::new(4, 64.0);
        jog.set_calibration(512.0);
        jog.accumulate(0);
        jog.accumulate(128);
        assert_eq!(jog.tick(), Some(0.25));
    }
}
