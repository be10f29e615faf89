//! Jog counter unwrapping
//!
//! The jog wheels report an absolute 8-bit counter that wraps at 256. This
//! module turns consecutive counter samples into signed per-event deltas.

/// Size of the hardware counter range.
pub const COUNTER_RANGE: i32 = 256;

/// A jump larger than this is treated as a counter wrap, not as motion.
///
/// Measured on Mk1/Mk2 consoles: a single USB report never moves the jog
/// counter by more than a few dozen ticks, so anything past 200 can only be
/// the counter rolling over. Extremely fast spins can alias past this and
/// get corrected in the wrong direction.
pub const ROLLOVER_THRESHOLD: i32 = 200;

/// Compute the signed delta between two jog counter samples.
///
/// Returns `(delta, new_previous)`. The first sample (`previous == None`)
/// produces a zero delta; `new_previous` is always `current`.
pub fn unwrap(previous: Option<i32>, current: i32) -> (i32, i32) {
    let delta = match previous {
        None => 0,
        Some(previous) => {
            let raw = current - previous;
            if raw < -ROLLOVER_THRESHOLD {
                raw + COUNTER_RANGE
            } else if raw > ROLLOVER_THRESHOLD {
                raw - COUNTER_RANGE
            } else {
                raw
            }
        }
    };

    (delta, current)
}
