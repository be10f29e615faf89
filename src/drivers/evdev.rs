//! Linux input event driver (`/dev/input/eventN`)
//!
//! The kernel reports the console as an input device. Each read yields
//! 24-byte `input_event` records (16 bytes timestamp, u16 type, u16 code,
//! i32 value, native endian). `EV_ABS` and `EV_KEY` codes are translated into
//! the unified control-id space; everything else is ignored.
//!
//! The code tables below follow the kernel driver's numbering for the Mk2.

use super::{open_node, DeviceDriver, DeviceInfo};
use crate::config::{DriverKind, EvdevConfig};
use crate::hercules::controls::*;
use crate::hercules::headphone::{DECK_A_CODE, DECK_B_CODE, MIX_CODE, SPLIT_CODE};
use crate::hercules::{Led, LedKind, RawEvent, Side};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tokio::io::unix::AsyncFd;
use tracing::{debug, info, trace};

/// Size of `struct input_event` on 64-bit Linux
pub const INPUT_EVENT_SIZE: usize = 24;

pub const EV_SYN: u16 = 0x00;
pub const EV_KEY: u16 = 0x01;
pub const EV_ABS: u16 = 0x03;

/// LED writes use event type 0 with the LED number as code
const LED_EVENT_TYPE: u16 = 0x00;
/// Value that lights an LED; 0 switches it off
const LED_ON_VALUE: i32 = 3;

/// Absolute axis code -> control id
const ABS_MAP: &[(u16, u16)] = &[
    (0x00, LEFT_HIGH),
    (0x01, LEFT_MID),
    (0x02, LEFT_BASS),
    (0x03, LEFT_VOL),
    (0x04, LEFT_PITCH),
    (0x05, LEFT_JOG),
    (0x06, RIGHT_HIGH),
    (0x07, RIGHT_MID),
    (0x08, RIGHT_BASS),
    (0x09, RIGHT_VOL),
    (0x0a, RIGHT_PITCH),
    (0x0b, RIGHT_JOG),
    (0x0c, XFADER),
];

/// Key code -> control id
const KEY_MAP: &[(u16, u16)] = &[
    (0x100, LEFT_PLAY),
    (0x101, LEFT_CUE),
    (0x102, LEFT_MASTER_TEMPO),
    (0x103, LEFT_AUTO_BEAT),
    (0x104, LEFT_MONITOR),
    (0x105, LEFT_PITCH_DOWN),
    (0x106, LEFT_PITCH_UP),
    (0x107, LEFT_SKIP_BACK),
    (0x108, LEFT_SKIP_FORWARD),
    (0x109, LEFT_1),
    (0x10a, LEFT_2),
    (0x10b, LEFT_3),
    (0x110, RIGHT_PLAY),
    (0x111, RIGHT_CUE),
    (0x112, RIGHT_MASTER_TEMPO),
    (0x113, RIGHT_AUTO_BEAT),
    (0x114, RIGHT_MONITOR),
    (0x115, RIGHT_PITCH_DOWN),
    (0x116, RIGHT_PITCH_UP),
    (0x117, RIGHT_SKIP_BACK),
    (0x118, RIGHT_SKIP_FORWARD),
    (0x119, RIGHT_1),
    (0x11a, RIGHT_2),
    (0x11b, RIGHT_3),
];

/// Headphone selector positions, reported as keys; a press yields the
/// selector code/value pair
const SELECTOR_KEYS: &[(u16, (u16, i32))] = &[
    (0x120, DECK_A_CODE),
    (0x121, DECK_B_CODE),
    (0x122, MIX_CODE),
    (0x123, SPLIT_CODE),
];

fn lookup(map: &[(u16, u16)], code: u16) -> Option<u16> {
    map.iter().find(|(c, _)| *c == code).map(|(_, id)| *id)
}

/// LED number used in the write event
pub fn led_code(led: Led) -> u16 {
    let base = match led.kind {
        LedKind::Play => 0x00,
        LedKind::Cue => 0x01,
        LedKind::MasterTempo => 0x02,
        LedKind::AutoBeat => 0x03,
        LedKind::Monitor => 0x04,
        LedKind::Fx => 0x05,
        LedKind::FxCue => 0x06,
        LedKind::Loop => 0x07,
    };
    match led.side {
        Side::Left => base,
        Side::Right => base + 0x08,
    }
}

/// Decode one `input_event` record. `None` for anything that is not a
/// console control (sync reports, unknown codes, selector releases).
pub fn decode_record(record: &[u8]) -> Option<RawEvent> {
    if record.len() < INPUT_EVENT_SIZE {
        trace!("Short input_event ({} bytes) dropped", record.len());
        return None;
    }

    let event_type = u16::from_ne_bytes([record[16], record[17]]);
    let code = u16::from_ne_bytes([record[18], record[19]]);
    let value = i32::from_ne_bytes([record[20], record[21], record[22], record[23]]);

    match event_type {
        // Analog controls are 8 bit; anything outside is a bogus report
        EV_ABS => lookup(ABS_MAP, code).map(|id| RawEvent::new(id, value.clamp(0, 255))),
        EV_KEY => {
            if let Some(id) = lookup(KEY_MAP, code) {
                // Autorepeat (2) counts as held
                return Some(RawEvent::new(id, (value != 0) as i32));
            }
            SELECTOR_KEYS
                .iter()
                .find(|(c, _)| *c == code)
                .filter(|_| value == 1)
                .map(|(_, (id, bit))| RawEvent::new(*id, *bit))
        }
        EV_SYN => None,
        other => {
            trace!("Ignoring input_event type {:#x} code {:#x}", other, code);
            None
        }
    }
}

/// Build the `input_event` record that switches an LED
pub fn encode_led(led: Led, on: bool) -> [u8; INPUT_EVENT_SIZE] {
    let mut record = [0u8; INPUT_EVENT_SIZE];
    record[16..18].copy_from_slice(&LED_EVENT_TYPE.to_ne_bytes());
    record[18..20].copy_from_slice(&led_code(led).to_ne_bytes());
    let value = if on { LED_ON_VALUE } else { 0 };
    record[20..24].copy_from_slice(&value.to_ne_bytes());
    record
}

/// Find consoles by scanning `<sysfs_dir>/event*/device/name`
pub async fn discover(config: &EvdevConfig) -> Result<Vec<DeviceInfo>> {
    let mut entries = match fs::read_dir(&config.sysfs_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("No input class directory at {}", config.sysfs_dir);
            return Ok(Vec::new());
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to list {}", config.sysfs_dir));
        }
    };

    let mut found = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let node = entry.file_name().to_string_lossy().to_string();
        let Some(number) = node.strip_prefix("event").and_then(|n| n.parse::<u32>().ok()) else {
            continue;
        };

        let Ok(name) = fs::read_to_string(entry.path().join("device").join("name")).await else {
            continue;
        };
        let name = name.trim().to_string();

        if config.name_prefixes.iter().any(|p| !p.is_empty() && name.starts_with(p.as_str())) {
            debug!("Found console \"{}\" at {}", name, node);
            found.push((
                number,
                DeviceInfo {
                    id: format!("evdev:{}", node),
                    name,
                    kind: DriverKind::Evdev,
                    path: Path::new(&config.input_dir).join(&node),
                },
            ));
        }
    }

    found.sort_by_key(|(number, _)| *number);
    Ok(found.into_iter().map(|(_, info)| info).collect())
}

/// Evdev console driver
pub struct EvdevDriver {
    info: DeviceInfo,
    /// Non-blocking node; reads that time out leave nothing in flight
    device: Option<AsyncFd<std::fs::File>>,
    /// Bytes of an incomplete record carried to the next read
    partial: Vec<u8>,
    pending: VecDeque<RawEvent>,
}

impl EvdevDriver {
    pub fn new(info: DeviceInfo) -> Self {
        Self {
            info,
            device: None,
            partial: Vec::with_capacity(INPUT_EVENT_SIZE * 8),
            pending: VecDeque::new(),
        }
    }

    /// Take over an opened non-blocking node
    fn attach(&mut self, file: std::fs::File) -> Result<()> {
        let device = AsyncFd::new(file)
            .with_context(|| format!("Failed to register {}", self.info.path.display()))?;
        self.device = Some(device);
        self.partial.clear();
        self.pending.clear();
        Ok(())
    }

    /// Split buffered bytes into records and queue the decoded events
    fn drain_records(&mut self) {
        let complete = self.partial.len() / INPUT_EVENT_SIZE * INPUT_EVENT_SIZE;
        for record in self.partial[..complete].chunks_exact(INPUT_EVENT_SIZE) {
            if let Some(event) = decode_record(record) {
                self.pending.push_back(event);
            }
        }
        self.partial.drain(..complete);
    }
}

/// Read whatever the node has, waiting for readiness
async fn read_ready(device: &AsyncFd<std::fs::File>, buf: &mut [u8]) -> std::io::Result<usize> {
    loop {
        let mut guard = device.readable().await?;
        match guard.try_io(|inner| {
            let mut file: &std::fs::File = inner.get_ref();
            file.read(&mut *buf)
        }) {
            Ok(result) => return result,
            Err(_would_block) => continue,
        }
    }
}

#[async_trait]
impl DeviceDriver for EvdevDriver {
    fn name(&self) -> &str {
        "evdev"
    }

    fn device_id(&self) -> &str {
        &self.info.id
    }

    async fn open(&mut self) -> Result<()> {
        let file = open_node(&self.info.path).await?;
        self.attach(file)?;

        info!("✅ Console \"{}\" opened at {}", self.info.name, self.info.path.display());
        Ok(())
    }

    async fn next_event(&mut self, timeout: Duration) -> Result<Option<RawEvent>> {
        if let Some(event) = self.pending.pop_front() {
            return Ok(Some(event));
        }

        let deadline = tokio::time::Instant::now() + timeout;
        let mut chunk = [0u8; INPUT_EVENT_SIZE * 8];

        loop {
            let Some(device) = self.device.as_ref() else {
                bail!("{} is not open", self.info.id);
            };

            let n = match tokio::time::timeout_at(deadline, read_ready(device, &mut chunk)).await {
                Err(_) => return Ok(None),
                Ok(result) => result
                    .with_context(|| format!("Read from {} failed", self.info.path.display()))?,
            };
            if n == 0 {
                bail!("{} closed", self.info.path.display());
            }

            self.partial.extend_from_slice(&chunk[..n]);
            self.drain_records();

            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }
        }
    }

    async fn write_led(&mut self, led: Led, on: bool) -> Result<()> {
        let Some(device) = self.device.as_ref() else {
            bail!("{} is not open", self.info.id);
        };

        let record = encode_led(led, on);
        let written = loop {
            let mut guard = device.writable().await?;
            match guard.try_io(|inner| {
                let mut file: &std::fs::File = inner.get_ref();
                file.write(&record)
            }) {
                Ok(result) => break result,
                Err(_would_block) => continue,
            }
        }
        .with_context(|| format!("LED write to {} failed", self.info.path.display()))?;

        // The kernel takes input_event records whole
        if written != INPUT_EVENT_SIZE {
            bail!("Short LED write to {} ({} bytes)", self.info.path.display(), written);
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.device = None;
        self.partial.clear();
        self.pending.clear();
        debug!("Closed {}", self.info.id);
        Ok(())
    }
}
