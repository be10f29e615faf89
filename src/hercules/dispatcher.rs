//! Event dispatcher
//!
//! Owns all per-device decoding state and routes every [`RawEvent`] to the
//! right decoder. One dispatcher exists per device session; nothing is shared
//! between devices.

use super::controls::{self, items, ButtonAction, ControlKey, ControlKind, EdgePolicy, Led, LedKind};
use super::headphone::HeadphoneDeckSelector;
use super::jog::JogChannel;
use super::pitch::{self, PitchState};
use super::{RawEvent, Side};
use crate::config::{JogConfig, Mapping};
use crate::sink::ControlSink;
use tracing::{debug, trace};

/// Two feedback values closer than this are considered equal
const FEEDBACK_EPSILON: f64 = 1e-9;

/// Per-session decoding state and routing
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    jog: [JogChannel; 2],
    /// Active jog sensitivity mode per side
    jog_mode: [usize; 2],
    pitch: [PitchState; 2],
    headphones: HeadphoneDeckSelector,
    keylock: [bool; 2],
    /// Deck play state as reported back by the application
    playing: [bool; 2],
    /// Deck loop state as reported back by the application
    looping: [bool; 2],
    mapping: Mapping,
    jog_config: JogConfig,
}

impl EventDispatcher {
    /// Fresh dispatcher with every control uninitialized
    pub fn new(jog_config: JogConfig) -> Self {
        let mode = jog_config.default_mode;
        let calibration = jog_config.calibration(mode);
        let channel = JogChannel::new(jog_config.filter_length, calibration);

        Self {
            jog: [channel.clone(), channel],
            jog_mode: [mode; 2],
            pitch: [PitchState::new(); 2],
            headphones: HeadphoneDeckSelector::new(),
            keylock: [false; 2],
            playing: [false; 2],
            looping: [false; 2],
            mapping: Mapping::default(),
            jog_config,
        }
    }

    /// Decode one device event and emit the resulting writes.
    pub fn dispatch(&mut self, event: RawEvent, sink: &dyn ControlSink) {
        let Some(kind) = controls::classify(event.control_id) else {
            debug!("Unhandled control {} = {}", event.control_id, event.value);
            return;
        };

        match kind {
            ControlKind::Continuous(key, scale) => {
                sink.write_continuous(&key, scale.apply(event.value));
            }
            ControlKind::Button { side, action, led } => {
                self.on_button(side, action, led, event.value != 0, sink);
            }
            ControlKind::Jog(side) => {
                let delta = self.jog[side.index()].accumulate(event.value);
                trace!("Jog {} raw {} delta {}", side, event.value, delta);
            }
            ControlKind::Pitch(side) => {
                let (pitch, next) = pitch::update(event.value, self.pitch[side.index()]);
                self.pitch[side.index()] = next;
                trace!("Pitch {} raw {} -> {:.2} ({:?})", side, event.value, pitch, next);
                sink.write_continuous(&ControlKey::deck(side, items::RATE), pitch);
            }
            ControlKind::HeadphoneSelector => {
                let before = self.headphones.selection();
                for side in self.headphones.handle(event.control_id, event.value) {
                    sink.write_button_edge(&ControlKey::deck(side, items::PFL), true);
                }
                let after = self.headphones.selection();
                if before != after {
                    debug!("Headphone selector: {:?} -> {:?}", before, after);
                }
            }
        }
    }

    fn on_button(
        &mut self,
        side: Side,
        action: ButtonAction,
        led: Option<LedKind>,
        pressed: bool,
        sink: &dyn ControlSink,
    ) {
        if let Some(kind) = led {
            sink.request_led(Led::new(side, kind), pressed);
        }

        if !pressed {
            if let ButtonAction::Edge(item, EdgePolicy::PressAndRelease) = action {
                sink.write_button_edge(&ControlKey::deck(side, item), false);
            }
            return;
        }

        match action {
            ButtonAction::Edge(item, _) => {
                sink.write_button_edge(&ControlKey::deck(side, item), true);
            }
            ButtonAction::Cue => {
                // While playing, cue jumps back and stops
                let item = if self.playing[side.index()] {
                    items::CUE_GOTO_AND_STOP
                } else {
                    items::CUE_DEFAULT
                };
                sink.write_button_edge(&ControlKey::deck(side, item), true);
            }
            ButtonAction::MasterTempo => {
                let keylock = &mut self.keylock[side.index()];
                *keylock = !*keylock;
                debug!("Master tempo {} {}", side, if *keylock { "on" } else { "off" });
                sink.write_button_edge(&ControlKey::deck(side, items::KEYLOCK), true);
            }
            ButtonAction::Monitor => {
                let enabled = self.headphones.toggle(side);
                debug!("Headphone {} {}", side, if enabled { "on" } else { "off" });
                sink.write_button_edge(&ControlKey::deck(side, items::PFL), true);
            }
            ButtonAction::JogMode(mode) => self.set_jog_mode(side, mode, sink),
        }
    }

    /// Switch a side's jog sensitivity and light the matching mode LED.
    pub fn set_jog_mode(&mut self, side: Side, mode: usize, sink: &dyn ControlSink) {
        let mode = mode.min(LedKind::JOG_MODES.len() - 1);
        let calibration = self.jog_config.calibration(mode);

        self.jog_mode[side.index()] = mode;
        self.jog[side.index()].set_calibration(calibration);
        debug!("Jog {} sensitivity mode {} (calibration {})", side, mode, calibration);

        for (index, kind) in LedKind::JOG_MODES.into_iter().enumerate() {
            sink.request_led(Led::new(side, kind), index == mode);
        }
    }

    /// Run one jog output tick for both sides.
    pub fn tick(&mut self, sink: &dyn ControlSink) {
        for side in Side::ALL {
            if let Some(output) = self.jog[side.index()].tick() {
                sink.write_continuous(&ControlKey::deck(side, items::JOG), output);
            }
        }
    }

    /// Apply new jog settings (hot reload). Sensitivity modes are kept.
    pub fn apply_jog_config(&mut self, jog_config: JogConfig) {
        for side in Side::ALL {
            let channel = &mut self.jog[side.index()];
            if jog_config.filter_length != self.jog_config.filter_length {
                channel.set_filter_length(jog_config.filter_length);
            }
            channel.set_calibration(jog_config.calibration(self.jog_mode[side.index()]));
        }
        self.jog_config = jog_config;
    }

    /// Handle a control value reported back by the application.
    ///
    /// Deck play state drives the cue behavior and the play LED, the loop
    /// state lights the cue LED. A rate value that differs from what the knob
    /// produced means the pitch was changed elsewhere, so the knob re-anchors
    /// on its next event.
    pub fn apply_feedback(&mut self, group: &str, item: &str, value: f64, sink: &dyn ControlSink) {
        let side = match group {
            controls::GROUP_LEFT => Side::Left,
            controls::GROUP_RIGHT => Side::Right,
            _ => return,
        };

        match item {
            items::PLAY => {
                let playing = value != 0.0;
                if self.playing[side.index()] != playing {
                    self.playing[side.index()] = playing;
                    sink.request_led(Led::new(side, LedKind::Play), playing);
                }
            }
            items::LOOP => {
                let looping = value != 0.0;
                if self.looping[side.index()] != looping {
                    self.looping[side.index()] = looping;
                    sink.request_led(Led::new(side, LedKind::Cue), looping);
                }
            }
            items::RATE => {
                let ours = self.pitch[side.index()].pitch();
                if ours.map_or(false, |ours| (ours - value).abs() > FEEDBACK_EPSILON) {
                    debug!("Pitch {} changed elsewhere ({:.2}), re-anchoring knob", side, value);
                    self.reset_pitch(side);
                }
            }
            _ => {}
        }
    }

    /// Forget a pitch knob's calibration; the next event re-anchors it.
    pub fn reset_pitch(&mut self, side: Side) {
        self.pitch[side.index()] = PitchState::new();
    }

    /// Switch the input mapping. The InBeat mapping lights both sync LEDs.
    pub fn select_mapping(&mut self, mapping: Mapping, sink: &dyn ControlSink) {
        if mapping != self.mapping {
            debug!("Input mapping {:?} -> {:?}", self.mapping, mapping);
        }
        self.mapping = mapping;
        for side in Side::ALL {
            sink.request_led(Led::new(side, LedKind::AutoBeat), mapping == Mapping::InBeat);
        }
    }

    /// LED state to push when a session opens
    pub fn initial_leds(&self, sink: &dyn ControlSink) {
        for side in Side::ALL {
            for kind in [LedKind::Play, LedKind::Cue, LedKind::MasterTempo, LedKind::Monitor] {
                sink.request_led(Led::new(side, kind), false);
            }
            sink.request_led(Led::new(side, LedKind::AutoBeat), self.mapping == Mapping::InBeat);
            let mode = self.jog_mode[side.index()];
            for (index, kind) in LedKind::JOG_MODES.into_iter().enumerate() {
                sink.request_led(Led::new(side, kind), index == mode);
            }
        }
    }

    pub fn pitch_state(&self, side: Side) -> PitchState {
        self.pitch[side.index()]
    }

    pub fn jog_mode(&self, side: Side) -> usize {
        self.jog_mode[side.index()]
    }

    pub fn jog_calibration(&self, side: Side) -> f64 {
        self.jog[side.index()].calibration()
    }

    pub fn headphones(&self) -> &HeadphoneDeckSelector {
        &self.headphones
    }

    pub fn keylock(&self, side: Side) -> bool {
        self.keylock[side.index()]
    }

    pub fn mapping(&self) -> Mapping {
        self.mapping
    }
}
