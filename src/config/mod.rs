//! Configuration management for Hercules GW
//!
//! Handles loading, parsing, and hot-reloading of YAML configuration files.

pub mod watcher;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

pub use watcher::ConfigWatcher;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub jog: JogConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub mapping: Mapping,
}

/// Input mapping selected in the application
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mapping {
    #[default]
    Standard,
    /// Beat-matching mapping; both sync LEDs stay lit
    InBeat,
}

/// Device transport selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// No hardware; replays `device.stub.events`
    Stub,
    /// Linux input event device (`/dev/input/eventN`)
    #[default]
    Evdev,
    /// Linux hidraw node (`/dev/hidrawN`)
    Hid,
}

impl std::fmt::Display for DriverKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriverKind::Stub => write!(f, "stub"),
            DriverKind::Evdev => write!(f, "evdev"),
            DriverKind::Hid => write!(f, "hid"),
        }
    }
}

/// Device discovery and transport configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct DeviceConfig {
    #[serde(default)]
    pub driver: DriverKind,
    #[serde(default)]
    pub evdev: EvdevConfig,
    #[serde(default)]
    pub hid: HidConfig,
    #[serde(default)]
    pub stub: StubConfig,
}

/// Evdev driver configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EvdevConfig {
    /// Accepted device name prefixes (as reported by the kernel)
    #[serde(default = "default_name_prefixes")]
    pub name_prefixes: Vec<String>,
    #[serde(default = "default_input_dir")]
    pub input_dir: String,
    #[serde(default = "default_input_sysfs")]
    pub sysfs_dir: String,
}

/// HID (hidraw) driver configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HidConfig {
    #[serde(default = "default_vendor_id")]
    pub vendor_id: u16,
    #[serde(default = "default_product_ids")]
    pub product_ids: Vec<u16>,
}

/// Stub driver configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct StubConfig {
    /// Events replayed once after the session opens
    #[serde(default)]
    pub events: Vec<StubEvent>,
    /// Report a disconnect after the last event (exercises reconnects)
    #[serde(default)]
    pub disconnect: bool,
}

/// One scripted stub event
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct StubEvent {
    pub control: u16,
    pub value: i32,
}

/// Jog wheel filtering configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct JogConfig {
    /// Moving average length in ticks
    #[serde(default = "default_filter_length")]
    pub filter_length: usize,
    /// Calibration divisors selected by deck buttons 1, 2 and 3
    #[serde(default = "default_sensitivities")]
    pub sensitivities: [f64; 3],
    /// Sensitivity active when a session opens (0-2)
    #[serde(default = "default_jog_mode")]
    pub default_mode: usize,
    /// Output tick interval
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

impl JogConfig {
    /// Calibration divisor for a sensitivity mode, clamped to the last mode
    pub fn calibration(&self, mode: usize) -> f64 {
        self.sensitivities[mode.min(self.sensitivities.len() - 1)]
    }
}

/// Session loop configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Maximum wait for a device event before jog filters are re-evaluated
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_ms: u64,
    /// How often the manager looks for new or replugged devices
    #[serde(default = "default_rescan_interval")]
    pub rescan_interval_ms: u64,
}

impl Default for EvdevConfig {
    fn default() -> Self {
        Self {
            name_prefixes: default_name_prefixes(),
            input_dir: default_input_dir(),
            sysfs_dir: default_input_sysfs(),
        }
    }
}

impl Default for HidConfig {
    fn default() -> Self {
        Self {
            vendor_id: default_vendor_id(),
            product_ids: default_product_ids(),
        }
    }
}

impl Default for JogConfig {
    fn default() -> Self {
        Self {
            filter_length: default_filter_length(),
            sensitivities: default_sensitivities(),
            default_mode: default_jog_mode(),
            tick_ms: default_tick_ms(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_timeout_ms: default_poll_timeout(),
            rescan_interval_ms: default_rescan_interval(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        Self::from_yaml(&contents).with_context(|| format!("Invalid config file: {}", path))
    }

    /// Parse and validate a YAML document
    pub fn from_yaml(contents: &str) -> Result<Self> {
        // An empty document means "all defaults"
        let config: AppConfig = if contents.trim().is_empty() {
            AppConfig::default()
        } else {
            serde_yaml::from_str(contents).context("Failed to parse YAML config")?
        };

        config.validate()?;

        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, path: &str) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write config file: {}", path))?;

        Ok(())
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        let jog = &self.jog;
        if jog.filter_length == 0 {
            anyhow::bail!("jog.filter_length must be at least 1");
        }
        for (mode, calibration) in jog.sensitivities.iter().enumerate() {
            if !(calibration.is_finite() && *calibration > 0.0) {
                anyhow::bail!(
                    "jog.sensitivities[{}] must be a positive number (got {})",
                    mode,
                    calibration
                );
            }
        }
        if jog.default_mode >= jog.sensitivities.len() {
            anyhow::bail!(
                "jog.default_mode {} is out of range (must be 0-{})",
                jog.default_mode,
                jog.sensitivities.len() - 1
            );
        }
        if jog.tick_ms == 0 {
            anyhow::bail!("jog.tick_ms must be greater than 0");
        }

        if self.session.poll_timeout_ms == 0 {
            anyhow::bail!("session.poll_timeout_ms must be greater than 0");
        }
        if self.session.rescan_interval_ms == 0 {
            anyhow::bail!("session.rescan_interval_ms must be greater than 0");
        }

        match self.device.driver {
            DriverKind::Evdev => {
                if self.device.evdev.name_prefixes.iter().all(|p| p.trim().is_empty()) {
                    anyhow::bail!("device.evdev.name_prefixes needs at least one non-empty prefix");
                }
            }
            DriverKind::Hid => {
                if self.device.hid.product_ids.is_empty() {
                    anyhow::bail!("device.hid.product_ids cannot be empty");
                }
            }
            DriverKind::Stub => {}
        }

        Ok(())
    }
}

// Default value functions
fn default_name_prefixes() -> Vec<String> {
    vec!["Hercules DJ Console".to_string(), "Hercules Hercules DJ Console".to_string()]
}
fn default_input_dir() -> String { "/dev/input".to_string() }
fn default_input_sysfs() -> String { "/sys/class/input".to_string() }
fn default_vendor_id() -> u16 { 0x06f8 }
fn default_product_ids() -> Vec<u16> { vec![0xb000, 0xb100] }
fn default_filter_length() -> usize { 4 }
fn default_sensitivities() -> [f64; 3] { [512.0, 256.0, 64.0] }
fn default_jog_mode() -> usize { 2 }
fn default_tick_ms() -> u64 { 64 }
fn default_poll_timeout() -> u64 { 10 }
fn default_rescan_interval() -> u64 { 2000 }
