//! Pitch knob offset tracking
//!
//! The pitch knobs are endless encoders that report an absolute 0-255
//! position. The tracker anchors the first observed position to the middle of
//! the pitch range and follows rollovers at both ends so the resulting pitch
//! stays continuous.
//!
//! Known limitations, kept on purpose:
//! - The output spans -0.25..=127.25 instead of 0.25..=127.
//! - A knob spun fast enough to skip a boundary position can leave the offset
//!   out of sync until the knob revisits the boundary.

/// Highest raw position reported by the knob.
pub const RAW_MAX: i32 = 255;

/// Position the first event is anchored to (pitch ~63.25, i.e. no change).
pub const ANCHOR: i32 = 127;

/// Per-knob calibration state
///
/// `None` in either field means "uninitialized": the next event re-anchors
/// the knob.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PitchState {
    pub previous: Option<i32>,
    pub offset: Option<i32>,
}

impl PitchState {
    /// Uninitialized state, as after a (re)connect
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self) -> bool {
        self.offset.is_some()
    }

    /// Current pitch, if the knob has reported at least once
    pub fn pitch(&self) -> Option<f64> {
        match (self.previous, self.offset) {
            (Some(previous), Some(offset)) => Some(pitch_for(previous, offset)),
            _ => None,
        }
    }
}

fn pitch_for(previous: i32, offset: i32) -> f64 {
    ((previous + offset) as f64 - 0.5) / 2.0
}

/// Feed one raw knob position through the tracker.
///
/// Returns the pitch value and the next state. The rollover rules are
/// evaluated in order and at most one applies per event.
pub fn update(raw: i32, state: PitchState) -> (f64, PitchState) {
    let mut offset = state.offset.unwrap_or(ANCHOR - raw);

    if let Some(previous) = state.previous {
        if previous + offset == RAW_MAX && previous < raw {
            // Wrapped past the top while turning up
            offset = RAW_MAX - raw;
        } else if previous == RAW_MAX && raw == 0 {
            // Clean wrap at the top
            offset += RAW_MAX;
        } else if raw == RAW_MAX && previous == 0 && offset >= 0 {
            // Clean wrap at the bottom
            offset -= RAW_MAX;
        } else if raw < previous && previous + offset == 0 {
            // Wrapped past the bottom while turning down
            offset = -raw;
        }
    }

    let next = PitchState {
        previous: Some(raw),
        offset: Some(offset),
    };

    (pitch_for(raw, offset), next)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(state: &mut PitchState, raw: i32) -> f64 {
        let (pitch, next) = update(raw, *state);
        *state = next;
        pitch
    }

    #[test]
    fn test_first_event_anchors_to_middle() {
        let (pitch, state) = update(64, PitchState::new());
        assert_eq!(state.offset, Some(63));
        assert_eq!(state.previous, Some(64));
        assert_eq!(pitch, 63.25);
    }

    #[test]
    fn test_anchor_is_independent_of_position() {
        for raw in [0, 1, 100, 200, 255] {
            let (pitch, _) = update(raw, PitchState::new());
            assert_eq!(pitch, 63.25);
        }
    }

    #[test]
    fn test_relative_motion() {
        let mut state = PitchState::new();
        feed(&mut state, 10);
        assert_eq!(feed(&mut state, 12), 64.25);
        assert_eq!(feed(&mut state, 8), 62.25);
    }

    #[test]
    fn test_top_of_range_holds_while_turning_up() {
        // Anchor at raw 0: offset 127, so raw 128 reaches 255
        let mut state = PitchState::new();
        feed(&mut state, 0);
        assert_eq!(feed(&mut state, 128), 127.25);

        // Turning further up keeps the sum at 255
        assert_eq!(feed(&mut state, 130), 127.25);
        assert_eq!(state.offset, Some(125));

        // Turning back down moves away from the top immediately
        assert_eq!(feed(&mut state, 129), 126.75);
    }

    #[test]
    fn test_clean_wrap_at_raw_max() {
        let state = PitchState {
            previous: Some(255),
            offset: Some(-200),
        };
        let (pitch, next) = update(0, state);
        assert_eq!(next.offset, Some(55));
        assert_eq!(pitch, pitch_for(0, 55));
    }

    #[test]
    fn test_clean_wrap_at_raw_zero() {
        let state = PitchState {
            previous: Some(0),
            offset: Some(60),
        };
        let (_, next) = update(255, state);
        assert_eq!(next.offset, Some(60 - 255));
        assert_eq!(next.pitch(), Some(pitch_for(255, -195)));

        // Negative offsets do not trigger the bottom wrap
        let state = PitchState {
            previous: Some(0),
            offset: Some(-5),
        };
        let (_, next) = update(255, state);
        assert_eq!(next.offset, Some(-5));
    }

    #[test]
    fn test_bottom_of_range_holds_while_turning_down() {
        // Anchor at raw 200: offset -73, raw 73 reaches 0
        let mut state = PitchState::new();
        feed(&mut state, 200);
        assert_eq!(feed(&mut state, 73), -0.25);

        assert_eq!(feed(&mut state, 70), -0.25);
        assert_eq!(state.offset, Some(-70));
    }

    #[test]
    fn test_uninitialized_previous_skips_rollover_rules() {
        let state = PitchState {
            previous: None,
            offset: Some(255),
        };
        let (_, next) = update(3, state);
        assert_eq!(next.offset, Some(255));
    }
}
