//! Session manager
//!
//! Discovers consoles, starts one session per device, reaps sessions whose
//! device went away and forwards configuration updates and application
//! feedback to the running sessions.

use super::{DeviceRegistry, Session, SessionCommand, SessionHandle};
use crate::config::AppConfig;
use crate::drivers::{self, DeviceInfo};
use crate::hercules::Side;
use crate::sink::SharedSink;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

pub struct SessionManager {
    config: AppConfig,
    sink: SharedSink,
    registry: DeviceRegistry,
    sessions: BTreeMap<String, SessionHandle>,
}

impl SessionManager {
    pub fn new(config: AppConfig, sink: SharedSink) -> Self {
        Self {
            config,
            sink,
            registry: DeviceRegistry::new(),
            sessions: BTreeMap::new(),
        }
    }

    /// Reap finished sessions, then start sessions for unclaimed consoles.
    ///
    /// Returns the number of sessions started.
    pub async fn scan(&mut self) -> Result<usize> {
        self.reap();

        let devices = drivers::discover(&self.config.device)
            .await
            .with_context(|| format!("{} device discovery failed", self.config.device.driver))?;

        let mut started = 0;
        for info in devices {
            if self.registry.is_claimed(&info.id) {
                continue;
            }
            self.start(info)?;
            started += 1;
        }

        if started > 0 {
            info!("🎮 {} console session(s) started, {} active", started, self.sessions.len());
        }
        Ok(started)
    }

    fn start(&mut self, info: DeviceInfo) -> Result<()> {
        self.registry.claim(&info.id)?;
        info!("🎮 Connecting to {}", info);

        let driver = drivers::build_driver(&info, &self.config.device);
        let handle = Session::spawn(
            driver,
            self.config.jog.clone(),
            &self.config.session,
            self.sink.clone(),
        );
        handle.send(SessionCommand::SelectMapping(self.config.mapping));
        self.sessions.insert(info.id, handle);
        Ok(())
    }

    /// Drop finished sessions and release their devices.
    ///
    /// Returns the ids that were released; they are picked up again by the
    /// next scan if the device is still present.
    pub fn reap(&mut self) -> Vec<String> {
        let finished: Vec<String> = self
            .sessions
            .iter()
            .filter(|(_, handle)| handle.is_finished())
            .map(|(id, _)| id.clone())
            .collect();

        for id in &finished {
            self.sessions.remove(id);
            if let Err(e) = self.registry.release(id) {
                warn!("{}", e);
            }
            info!("Console {} disconnected", id);
        }
        finished
    }

    /// Apply a reloaded configuration.
    ///
    /// Jog settings go to running sessions. Device or session settings only
    /// take effect on a fresh session, so all sessions are restarted.
    pub async fn update_config(&mut self, config: AppConfig) {
        let device_changed = config.device != self.config.device;
        let session_changed = config.session != self.config.session;
        let jog_changed = config.jog != self.config.jog;
        let mapping_changed = config.mapping != self.config.mapping;
        self.config = config;

        if device_changed || session_changed {
            info!("Device settings changed, reopening consoles");
            self.shutdown_all().await;
            return;
        }

        if jog_changed {
            debug!("Sending jog settings to {} session(s)", self.sessions.len());
            self.broadcast(SessionCommand::UpdateJog(self.config.jog.clone()));
        }
        if mapping_changed {
            info!("Input mapping changed to {:?}", self.config.mapping);
            self.broadcast(SessionCommand::SelectMapping(self.config.mapping));
        }
    }

    /// Forward an application control value to every session
    pub fn feedback(&self, group: &str, item: &str, value: f64) {
        self.broadcast(SessionCommand::Feedback {
            group: group.to_string(),
            item: item.to_string(),
            value,
        });
    }

    /// Re-anchor one pitch knob on every console
    pub fn reset_pitch(&self, side: Side) {
        self.broadcast(SessionCommand::ResetPitch(side));
    }

    fn broadcast(&self, command: SessionCommand) {
        for handle in self.sessions.values() {
            if !handle.send(command.clone()) {
                debug!("Session {} already ended, command dropped", handle.device_id());
            }
        }
    }

    /// Stop every session and release all devices
    pub async fn shutdown_all(&mut self) {
        let sessions = std::mem::take(&mut self.sessions);
        for (id, handle) in sessions {
            let exit = handle.shutdown().await;
            debug!("Session {} stopped ({:?})", id, exit);
            if let Err(e) = self.registry.release(&id) {
                warn!("{}", e);
            }
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DriverKind, Mapping, StubEvent};
    use crate::drivers::stub::STUB_DEVICE_ID;
    use crate::hercules::controls::{items, ControlKey, LEFT_VOL};
    use crate::sink::recording::RecordingSink;
    use crate::sink::ControlWrite;
    use std::sync::Arc;
    use std::time::Duration;

    fn stub_config(disconnect: bool) -> AppConfig {
        let mut config = AppConfig::default();
        config.device.driver = DriverKind::Stub;
        config.device.stub.events = vec![StubEvent { control: LEFT_VOL, value: 20 }];
        config.device.stub.disconnect = disconnect;
        config.session.poll_timeout_ms = 1;
        config
    }

    #[tokio::test]
    async fn test_scan_claims_each_device_once() -> Result<()> {
        let sink = Arc::new(RecordingSink::new());
        let mut manager = SessionManager::new(stub_config(false), sink.clone());

        assert_eq!(manager.scan().await?, 1);
        assert_eq!(manager.scan().await?, 0);
        assert_eq!(manager.session_count(), 1);
        assert!(manager.registry().is_claimed(STUB_DEVICE_ID));

        let volume = ControlWrite::Continuous {
            key: ControlKey::deck(Side::Left, items::VOLUME),
            value: 10.0,
        };
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while !sink.writes().contains(&volume) && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(sink.writes().contains(&volume));

        manager.shutdown_all().await;
        assert_eq!(manager.session_count(), 0);
        assert!(manager.registry().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_disconnected_device_is_reaped_and_reopened() -> Result<()> {
        let sink = Arc::new(RecordingSink::new());
        let mut manager = SessionManager::new(stub_config(true), sink);

        assert_eq!(manager.scan().await?, 1);

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        let mut reaped = Vec::new();
        while reaped.is_empty() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
            reaped = manager.reap();
        }
        assert_eq!(reaped, vec![STUB_DEVICE_ID.to_string()]);
        assert!(!manager.registry().is_claimed(STUB_DEVICE_ID));

        // Still present, so the next scan reconnects it
        assert_eq!(manager.scan().await?, 1);
        manager.shutdown_all().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_device_change_restarts_sessions() -> Result<()> {
        let sink = Arc::new(RecordingSink::new());
        let mut manager = SessionManager::new(stub_config(false), sink);
        manager.scan().await?;

        // Jog and mapping changes keep the session
        let mut config = stub_config(false);
        config.jog.tick_ms = 32;
        config.mapping = Mapping::InBeat;
        manager.update_config(config.clone()).await;
        assert_eq!(manager.session_count(), 1);

        config.device.stub.events.clear();
        manager.update_config(config).await;
        assert_eq!(manager.session_count(), 0);
        assert!(manager.registry().is_empty());

        assert_eq!(manager.scan().await?, 1);
        manager.shutdown_all().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_discovery_without_devices() -> Result<()> {
        let mut config = AppConfig::default();
        config.device.driver = DriverKind::Hid;
        // Ids no real device reports
        config.device.hid.vendor_id = 0xffff;
        config.device.hid.product_ids = vec![0xfffe];

        let mut manager = SessionManager::new(config, Arc::new(RecordingSink::new()));
        assert_eq!(manager.scan().await?, 0);
        assert_eq!(manager.session_count(), 0);
        Ok(())
    }
}
