//! Hercules DJ Console control table
//!
//! Every driver translates its native codes into this single control-id
//! space so the dispatcher sees the same ids whatever the transport is.
//! Ids 100..=103 are the headphone selector codes reported by the console.

use super::Side;
use std::fmt;

// Left deck buttons
pub const LEFT_PLAY: u16 = 1;
pub const LEFT_CUE: u16 = 2;
pub const LEFT_MASTER_TEMPO: u16 = 3;
pub const LEFT_AUTO_BEAT: u16 = 4;
pub const LEFT_MONITOR: u16 = 5;
pub const LEFT_PITCH_DOWN: u16 = 6;
pub const LEFT_PITCH_UP: u16 = 7;
pub const LEFT_SKIP_BACK: u16 = 8;
pub const LEFT_SKIP_FORWARD: u16 = 9;
pub const LEFT_1: u16 = 10;
pub const LEFT_2: u16 = 11;
pub const LEFT_3: u16 = 12;

// Right deck buttons
pub const RIGHT_PLAY: u16 = 21;
pub const RIGHT_CUE: u16 = 22;
pub const RIGHT_MASTER_TEMPO: u16 = 23;
pub const RIGHT_AUTO_BEAT: u16 = 24;
pub const RIGHT_MONITOR: u16 = 25;
pub const RIGHT_PITCH_DOWN: u16 = 26;
pub const RIGHT_PITCH_UP: u16 = 27;
pub const RIGHT_SKIP_BACK: u16 = 28;
pub const RIGHT_SKIP_FORWARD: u16 = 29;
pub const RIGHT_1: u16 = 30;
pub const RIGHT_2: u16 = 31;
pub const RIGHT_3: u16 = 32;

// Left deck analog controls
pub const LEFT_VOL: u16 = 40;
pub const LEFT_HIGH: u16 = 41;
pub const LEFT_MID: u16 = 42;
pub const LEFT_BASS: u16 = 43;
pub const LEFT_PITCH: u16 = 44;
pub const LEFT_JOG: u16 = 45;

// Right deck analog controls
pub const RIGHT_VOL: u16 = 50;
pub const RIGHT_HIGH: u16 = 51;
pub const RIGHT_MID: u16 = 52;
pub const RIGHT_BASS: u16 = 53;
pub const RIGHT_PITCH: u16 = 54;
pub const RIGHT_JOG: u16 = 55;

pub const XFADER: u16 = 60;

/// Application group for the left deck
pub const GROUP_LEFT: &str = "[Channel1]";
/// Application group for the right deck
pub const GROUP_RIGHT: &str = "[Channel2]";
/// Application group for master section controls
pub const GROUP_MASTER: &str = "[Master]";

/// Logical application control, e.g. `[Channel1],volume`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ControlKey {
    pub group: &'static str,
    pub item: &'static str,
}

impl ControlKey {
    pub const fn new(group: &'static str, item: &'static str) -> Self {
        Self { group, item }
    }

    /// Control `item` on the deck belonging to `side`
    pub const fn deck(side: Side, item: &'static str) -> Self {
        Self::new(deck_group(side), item)
    }

    /// Deck side this key belongs to, if it is a deck control
    pub fn side(&self) -> Option<Side> {
        match self.group {
            GROUP_LEFT => Some(Side::Left),
            GROUP_RIGHT => Some(Side::Right),
            _ => None,
        }
    }
}

impl fmt::Display for ControlKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.group, self.item)
    }
}

pub const fn deck_group(side: Side) -> &'static str {
    match side {
        Side::Left => GROUP_LEFT,
        Side::Right => GROUP_RIGHT,
    }
}

/// Item names used on the deck groups
pub mod items {
    pub const VOLUME: &str = "volume";
    pub const FILTER_HIGH: &str = "filterHigh";
    pub const FILTER_MID: &str = "filterMid";
    pub const FILTER_LOW: &str = "filterLow";
    pub const RATE: &str = "rate";
    pub const JOG: &str = "jog";
    pub const PLAY: &str = "play";
    pub const CUE_DEFAULT: &str = "cue_default";
    pub const CUE_GOTO_AND_STOP: &str = "cue_gotoandstop";
    pub const KEYLOCK: &str = "keylock";
    pub const BEATSYNC: &str = "beatsync";
    pub const PFL: &str = "pfl";
    pub const LOOP: &str = "loop";
    pub const RATE_TEMP_DOWN: &str = "rate_temp_down";
    pub const RATE_TEMP_UP: &str = "rate_temp_up";
    pub const TRACK_PREV: &str = "track_prev";
    pub const TRACK_NEXT: &str = "track_next";
    pub const CROSSFADER: &str = "crossfader";
}

/// Crossfader key
pub const CROSSFADER: ControlKey = ControlKey::new(GROUP_MASTER, items::CROSSFADER);

/// Scaling applied to an absolute analog control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scale {
    /// `value / 2.0`
    Half,
    /// `floor(value / 2)`, the EQ knobs only move in whole steps
    HalfFloor,
    /// `(value + 1) / 2.0`
    Crossfade,
}

impl Scale {
    pub fn apply(self, value: i32) -> f64 {
        match self {
            Scale::Half => value as f64 / 2.0,
            Scale::HalfFloor => value.div_euclid(2) as f64,
            Scale::Crossfade => (value + 1) as f64 / 2.0,
        }
    }
}

/// Which button transitions reach the application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgePolicy {
    PressOnly,
    PressAndRelease,
}

/// Deck button with special handling in the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonAction {
    /// Plain edge to the given item
    Edge(&'static str, EdgePolicy),
    /// Cue: goto-and-stop while playing, default cue otherwise
    Cue,
    /// Master tempo (keylock) toggle
    MasterTempo,
    /// Headphone (pfl) toggle
    Monitor,
    /// Jog sensitivity select (index into the configured sensitivities)
    JogMode(usize),
}

/// Classification of one control id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    Continuous(ControlKey, Scale),
    Button {
        side: Side,
        action: ButtonAction,
        led: Option<LedKind>,
    },
    Jog(Side),
    Pitch(Side),
    HeadphoneSelector,
}

/// Resolve a control id to its kind. `None` for ids the console never sends.
pub fn classify(control_id: u16) -> Option<ControlKind> {
    use ButtonAction::*;
    use EdgePolicy::*;

    let button = |side, action, led| Some(ControlKind::Button { side, action, led });
    let continuous = |side, item, scale| {
        Some(ControlKind::Continuous(ControlKey::deck(side, item), scale))
    };

    match control_id {
        LEFT_VOL => continuous(Side::Left, items::VOLUME, Scale::Half),
        RIGHT_VOL => continuous(Side::Right, items::VOLUME, Scale::Half),
        LEFT_HIGH => continuous(Side::Left, items::FILTER_HIGH, Scale::HalfFloor),
        LEFT_MID => continuous(Side::Left, items::FILTER_MID, Scale::HalfFloor),
        LEFT_BASS => continuous(Side::Left, items::FILTER_LOW, Scale::HalfFloor),
        RIGHT_HIGH => continuous(Side::Right, items::FILTER_HIGH, Scale::HalfFloor),
        RIGHT_MID => continuous(Side::Right, items::FILTER_MID, Scale::HalfFloor),
        RIGHT_BASS => continuous(Side::Right, items::FILTER_LOW, Scale::HalfFloor),
        XFADER => Some(ControlKind::Continuous(CROSSFADER, Scale::Crossfade)),

        LEFT_JOG => Some(ControlKind::Jog(Side::Left)),
        RIGHT_JOG => Some(ControlKind::Jog(Side::Right)),
        LEFT_PITCH => Some(ControlKind::Pitch(Side::Left)),
        RIGHT_PITCH => Some(ControlKind::Pitch(Side::Right)),

        100..=103 => Some(ControlKind::HeadphoneSelector),

        id => {
            let (side, base) = if (LEFT_PLAY..=LEFT_3).contains(&id) {
                (Side::Left, id - LEFT_PLAY)
            } else if (RIGHT_PLAY..=RIGHT_3).contains(&id) {
                (Side::Right, id - RIGHT_PLAY)
            } else {
                return None;
            };

            // Offsets are shared by both decks (LEFT_x - LEFT_PLAY == RIGHT_x - RIGHT_PLAY)
            match base + LEFT_PLAY {
                LEFT_PLAY => button(side, Edge(items::PLAY, PressOnly), Some(LedKind::Play)),
                LEFT_CUE => button(side, Cue, Some(LedKind::Cue)),
                LEFT_MASTER_TEMPO => button(side, MasterTempo, Some(LedKind::MasterTempo)),
                // Sync is a one-shot trigger: only the press reaches the
                // application, the release just turns the LED off
                LEFT_AUTO_BEAT => {
                    button(side, Edge(items::BEATSYNC, PressOnly), Some(LedKind::AutoBeat))
                }
                LEFT_MONITOR => button(side, Monitor, Some(LedKind::Monitor)),
                LEFT_PITCH_DOWN => button(side, Edge(items::RATE_TEMP_DOWN, PressAndRelease), None),
                LEFT_PITCH_UP => button(side, Edge(items::RATE_TEMP_UP, PressAndRelease), None),
                LEFT_SKIP_BACK => button(side, Edge(items::TRACK_PREV, PressOnly), None),
                LEFT_SKIP_FORWARD => button(side, Edge(items::TRACK_NEXT, PressOnly), None),
                LEFT_1 => button(side, JogMode(0), None),
                LEFT_2 => button(side, JogMode(1), None),
                LEFT_3 => button(side, JogMode(2), None),
                _ => None,
            }
        }
    }
}

/// Indicator LEDs on each deck
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedKind {
    Play,
    Cue,
    MasterTempo,
    AutoBeat,
    Monitor,
    Fx,
    FxCue,
    Loop,
}

impl LedKind {
    /// LEDs lighting up the three jog sensitivity modes, in mode order
    pub const JOG_MODES: [LedKind; 3] = [LedKind::Fx, LedKind::FxCue, LedKind::Loop];
}

/// One physical LED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Led {
    pub side: Side,
    pub kind: LedKind,
}

impl Led {
    pub const fn new(side: Side, kind: LedKind) -> Self {
        Self { side, kind }
    }
}

impl fmt::Display for Led {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}.{:?}", self.side, self.kind)
    }
}
