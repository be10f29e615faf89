//! Device sessions
//!
//! A session owns one opened console: its driver, its [`EventDispatcher`] and
//! nothing else. Sessions run as independent tokio tasks and never share
//! decoding state. When the device goes away the session ends and all of its
//! state is dropped; a reconnect starts from scratch.

pub mod manager;
pub mod registry;

use crate::config::{JogConfig, Mapping, SessionConfig};
use crate::drivers::DeviceDriver;
use crate::hercules::{ControlKey, EventDispatcher, Led, RawEvent, Side};
use crate::sink::{ControlSink, SharedSink};
use std::cell::RefCell;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

pub use manager::SessionManager;
pub use registry::{DeviceRegistry, RegistryError};

/// Control messages delivered to a running session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    /// New jog settings (config hot reload)
    UpdateJog(JogConfig),
    /// A control value reported back by the application
    Feedback { group: String, item: String, value: f64 },
    /// Re-anchor a pitch knob on its next event
    ResetPitch(Side),
    /// Input mapping changed in the application
    SelectMapping(Mapping),
    Shutdown,
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionExit {
    /// Stopped on request
    Shutdown,
    /// The device failed to open or stopped answering
    Disconnected,
}

/// Forwards sink writes and keeps LED requests for the driver
struct LedCollector<'a> {
    inner: &'a dyn ControlSink,
    leds: RefCell<Vec<(Led, bool)>>,
}

impl<'a> LedCollector<'a> {
    fn new(inner: &'a dyn ControlSink) -> Self {
        Self {
            inner,
            leds: RefCell::new(Vec::new()),
        }
    }

    fn into_leds(self) -> Vec<(Led, bool)> {
        self.leds.into_inner()
    }
}

impl ControlSink for LedCollector<'_> {
    fn write_continuous(&self, key: &ControlKey, value: f64) {
        self.inner.write_continuous(key, value);
    }

    fn write_button_edge(&self, key: &ControlKey, pressed: bool) {
        self.inner.write_button_edge(key, pressed);
    }

    fn request_led(&self, led: Led, on: bool) {
        self.leds.borrow_mut().push((led, on));
    }
}

/// One device processing loop
pub struct Session {
    driver: Box<dyn DeviceDriver>,
    dispatcher: EventDispatcher,
    sink: SharedSink,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    poll_timeout: Duration,
    tick_interval: Duration,
}

impl Session {
    pub fn new(
        driver: Box<dyn DeviceDriver>,
        jog: JogConfig,
        config: &SessionConfig,
        sink: SharedSink,
    ) -> (Self, mpsc::UnboundedSender<SessionCommand>) {
        let (tx, commands) = mpsc::unbounded_channel();
        let tick_interval = Duration::from_millis(jog.tick_ms);

        let session = Self {
            driver,
            dispatcher: EventDispatcher::new(jog),
            sink,
            commands,
            poll_timeout: Duration::from_millis(config.poll_timeout_ms),
            tick_interval,
        };
        (session, tx)
    }

    /// Start the session on its own task
    pub fn spawn(
        driver: Box<dyn DeviceDriver>,
        jog: JogConfig,
        config: &SessionConfig,
        sink: SharedSink,
    ) -> SessionHandle {
        let device_id = driver.device_id().to_string();
        let (session, tx) = Self::new(driver, jog, config, sink);
        let task = tokio::spawn(session.run());

        SessionHandle { device_id, tx, task }
    }

    /// Run until shutdown or until the device disappears
    pub async fn run(mut self) -> SessionExit {
        let device_id = self.driver.device_id().to_string();

        if let Err(e) = self.driver.open().await {
            warn!("⚠️  Could not open {}: {:#}", device_id, e);
            return SessionExit::Disconnected;
        }
        info!("🎮 Session started for {}", device_id);

        let leds = self.with_sink(|dispatcher, sink| dispatcher.initial_leds(sink));
        self.flush_leds(leds).await;

        let mut next_tick = Instant::now() + self.tick_interval;

        let exit = 'session: loop {
            loop {
                match self.commands.try_recv() {
                    Ok(SessionCommand::Shutdown) | Err(TryRecvError::Disconnected) => {
                        break 'session SessionExit::Shutdown;
                    }
                    Ok(command) => self.handle_command(command).await,
                    Err(TryRecvError::Empty) => break,
                }
            }

            let timeout = self
                .poll_timeout
                .min(next_tick.saturating_duration_since(Instant::now()));

            match self.driver.next_event(timeout).await {
                Ok(Some(event)) => self.handle_event(event).await,
                Ok(None) => {}
                Err(e) => {
                    warn!("⚠️  Device {} lost: {:#}", device_id, e);
                    break SessionExit::Disconnected;
                }
            }

            let now = Instant::now();
            if now >= next_tick {
                self.with_sink(|dispatcher, sink| dispatcher.tick(sink));
                next_tick += self.tick_interval;
                // Fell behind (slow sink, suspended host): don't burst
                if next_tick <= now {
                    next_tick = now + self.tick_interval;
                }
            }
        };

        if let Err(e) = self.driver.close().await {
            debug!("Closing {} failed: {:#}", device_id, e);
        }
        info!("Session for {} ended ({:?})", device_id, exit);
        exit
    }

    async fn handle_event(&mut self, event: RawEvent) {
        debug!("{} event {}", self.driver.device_id(), event);
        let leds = self.with_sink(|dispatcher, sink| dispatcher.dispatch(event, sink));
        self.flush_leds(leds).await;
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::UpdateJog(jog) => {
                self.tick_interval = Duration::from_millis(jog.tick_ms);
                self.dispatcher.apply_jog_config(jog);
                debug!("{} jog settings updated", self.driver.device_id());
            }
            SessionCommand::Feedback { group, item, value } => {
                let leds = self.with_sink(|dispatcher, sink| {
                    dispatcher.apply_feedback(&group, &item, value, sink)
                });
                self.flush_leds(leds).await;
            }
            SessionCommand::ResetPitch(side) => self.dispatcher.reset_pitch(side),
            SessionCommand::SelectMapping(mapping) => {
                let leds =
                    self.with_sink(|dispatcher, sink| dispatcher.select_mapping(mapping, sink));
                self.flush_leds(leds).await;
            }
            SessionCommand::Shutdown => {}
        }
    }

    /// Run `f` against the dispatcher, returning the LED requests it raised
    fn with_sink<F>(&mut self, f: F) -> Vec<(Led, bool)>
    where
        F: FnOnce(&mut EventDispatcher, &dyn ControlSink),
    {
        let collector = LedCollector::new(self.sink.as_ref());
        f(&mut self.dispatcher, &collector);
        collector.into_leds()
    }

    async fn flush_leds(&mut self, leds: Vec<(Led, bool)>) {
        for (led, on) in leds {
            if let Err(e) = self.driver.write_led(led, on).await {
                warn!("LED write {} -> {} failed: {:#}", led, on, e);
            }
        }
    }
}

/// Owner side of a running session
pub struct SessionHandle {
    device_id: String,
    tx: mpsc::UnboundedSender<SessionCommand>,
    task: JoinHandle<SessionExit>,
}

impl SessionHandle {
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Queue a command; false if the session already ended
    pub fn send(&self, command: SessionCommand) -> bool {
        self.tx.send(command).is_ok()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the session task to end
    pub async fn join(self) -> SessionExit {
        match self.task.await {
            Ok(exit) => exit,
            Err(e) => {
                error!("Session task for {} failed: {}", self.device_id, e);
                SessionExit::Disconnected
            }
        }
    }

    /// Ask the session to stop and wait for it
    pub async fn shutdown(self) -> SessionExit {
        self.send(SessionCommand::Shutdown);
        self.join().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::StubDriver;
    use crate::hercules::controls::{items, ControlKey, GROUP_LEFT, LEFT_1, LEFT_VOL, RIGHT_JOG};
    use crate::hercules::LedKind;
    use crate::sink::recording::RecordingSink;
    use crate::sink::ControlWrite;
    use std::sync::Arc;

    fn fast_jog() -> JogConfig {
        JogConfig {
            tick_ms: 5,
            ..JogConfig::default()
        }
    }

    fn fast_session() -> SessionConfig {
        SessionConfig {
            poll_timeout_ms: 1,
            ..SessionConfig::default()
        }
    }

    async fn wait_for(check: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !check() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_session_dispatches_until_disconnect() {
        let driver = StubDriver::new([RawEvent::new(LEFT_VOL, 128), RawEvent::new(LEFT_1, 1)])
            .disconnect_when_done();
        let led_log = driver.led_log();
        let sink = Arc::new(RecordingSink::new());

        let handle = Session::spawn(Box::new(driver), fast_jog(), &fast_session(), sink.clone());
        assert_eq!(handle.device_id(), "stub:0");
        assert_eq!(handle.join().await, SessionExit::Disconnected);

        assert_eq!(
            sink.writes(),
            vec![ControlWrite::Continuous {
                key: ControlKey::deck(Side::Left, items::VOLUME),
                value: 64.0,
            }]
        );

        let leds = led_log.lock().clone();
        // 16 initial LEDs, then the three sensitivity LEDs
        assert_eq!(leds.len(), 19);
        assert_eq!(leds[16], (Led::new(Side::Left, LedKind::Fx), true));
        // LED requests never reach the application sink
        assert!(sink.leds().is_empty());
    }

    #[tokio::test]
    async fn test_jog_ticks_run_while_idle() {
        let driver = StubDriver::new([RawEvent::new(RIGHT_JOG, 10), RawEvent::new(RIGHT_JOG, 14)]);
        let sink = Arc::new(RecordingSink::new());
        let handle = Session::spawn(Box::new(driver), fast_jog(), &fast_session(), sink.clone());

        let key = ControlKey::deck(Side::Right, items::JOG);
        let zero = ControlWrite::Continuous { key, value: 0.0 };
        wait_for(|| sink.writes().contains(&zero)).await;

        assert_eq!(handle.shutdown().await, SessionExit::Shutdown);

        let writes = sink.writes();
        assert_eq!(writes.first(), Some(&ControlWrite::Continuous { key, value: 4.0 / 64.0 }));
        assert_eq!(writes.last(), Some(&zero));
    }

    #[tokio::test]
    async fn test_feedback_command_drives_play_led() {
        let driver = StubDriver::new([]);
        let led_log = driver.led_log();
        let sink = Arc::new(RecordingSink::new());
        let handle = Session::spawn(Box::new(driver), fast_jog(), &fast_session(), sink);

        assert!(handle.send(SessionCommand::Feedback {
            group: GROUP_LEFT.to_string(),
            item: items::PLAY.to_string(),
            value: 1.0,
        }));

        let play_on = (Led::new(Side::Left, LedKind::Play), true);
        wait_for(|| led_log.lock().contains(&play_on)).await;
        assert_eq!(handle.shutdown().await, SessionExit::Shutdown);
        assert!(led_log.lock().contains(&play_on));
    }

    #[tokio::test]
    async fn test_select_mapping_drives_sync_leds() {
        let driver = StubDriver::new([]);
        let led_log = driver.led_log();
        let sink = Arc::new(RecordingSink::new());
        let handle = Session::spawn(Box::new(driver), fast_jog(), &fast_session(), sink);

        assert!(handle.send(SessionCommand::SelectMapping(Mapping::InBeat)));

        let sync_on = (Led::new(Side::Right, LedKind::AutoBeat), true);
        wait_for(|| led_log.lock().contains(&sync_on)).await;
        assert_eq!(handle.shutdown().await, SessionExit::Shutdown);
        assert!(led_log.lock().contains(&sync_on));
    }

    #[tokio::test]
    async fn test_open_failure_ends_session() {
        use crate::config::DriverKind;
        use crate::drivers::{DeviceInfo, EvdevDriver};

        let driver = EvdevDriver::new(DeviceInfo {
            id: "evdev:event99".to_string(),
            name: "missing".to_string(),
            kind: DriverKind::Evdev,
            path: "/nonexistent/event99".into(),
        });
        let sink = Arc::new(RecordingSink::new());
        let handle = Session::spawn(Box::new(driver), fast_jog(), &fast_session(), sink);
        assert_eq!(handle.join().await, SessionExit::Disconnected);
    }

    #[tokio::test]
    async fn test_dropped_handle_channel_stops_session() {
        let driver = StubDriver::new([]);
        let sink = Arc::new(RecordingSink::new());
        let (session, tx) = Session::new(Box::new(driver), fast_jog(), &fast_session(), sink);
        drop(tx);
        assert_eq!(session.run().await, SessionExit::Shutdown);
    }
}
