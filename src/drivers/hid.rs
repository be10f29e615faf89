//! HID driver on top of hidapi (hidraw backend on Linux)
//!
//! Input report layout (Mk2, report id 1):
//!
//! | byte  | content                                         |
//! |-------|-------------------------------------------------|
//! | 0     | report id                                       |
//! | 1-3   | button bits, see [`BUTTON_BITS`]                |
//! | 4     | headphone selector, low nibble                  |
//! | 5-17  | analog bytes, see [`ANALOG_BYTES`]              |
//!
//! Reports are diffed against the previous one; only changes become events.
//! The first report after opening is the baseline and emits nothing.
//!
//! Output report: `[0x00, left LED bits, right LED bits]`.

use super::{permission_hint, DeviceDriver, DeviceInfo};
use crate::config::{DriverKind, HidConfig};
use crate::hercules::controls::*;
use crate::hercules::headphone::{DECK_A_CODE, DECK_B_CODE, MIX_CODE, SPLIT_CODE};
use crate::hercules::{Led, LedKind, RawEvent, Side};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use hidapi::{HidApi, HidDevice};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::ffi::CString;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

pub const INPUT_REPORT_LEN: usize = 18;
pub const OUTPUT_REPORT_LEN: usize = 3;

const BUTTON_OFFSET: usize = 1;
const SELECTOR_OFFSET: usize = 4;

/// Button bit index (LSB of byte 1 first) -> control id
pub const BUTTON_BITS: [u16; 24] = [
    LEFT_PLAY,
    LEFT_CUE,
    LEFT_MASTER_TEMPO,
    LEFT_AUTO_BEAT,
    LEFT_MONITOR,
    LEFT_PITCH_DOWN,
    LEFT_PITCH_UP,
    LEFT_SKIP_BACK,
    LEFT_SKIP_FORWARD,
    LEFT_1,
    LEFT_2,
    LEFT_3,
    RIGHT_PLAY,
    RIGHT_CUE,
    RIGHT_MASTER_TEMPO,
    RIGHT_AUTO_BEAT,
    RIGHT_MONITOR,
    RIGHT_PITCH_DOWN,
    RIGHT_PITCH_UP,
    RIGHT_SKIP_BACK,
    RIGHT_SKIP_FORWARD,
    RIGHT_1,
    RIGHT_2,
    RIGHT_3,
];

/// Report byte -> control id for the absolute controls
pub const ANALOG_BYTES: [(usize, u16); 13] = [
    (5, LEFT_VOL),
    (6, LEFT_HIGH),
    (7, LEFT_MID),
    (8, LEFT_BASS),
    (9, LEFT_PITCH),
    (10, LEFT_JOG),
    (11, RIGHT_VOL),
    (12, RIGHT_HIGH),
    (13, RIGHT_MID),
    (14, RIGHT_BASS),
    (15, RIGHT_PITCH),
    (16, RIGHT_JOG),
    (17, XFADER),
];

/// Selector nibble bit -> selector code/value
const SELECTOR_BITS: [(u8, (u16, i32)); 4] = [
    (0x01, DECK_A_CODE),
    (0x02, DECK_B_CODE),
    (0x04, SPLIT_CODE),
    (0x08, MIX_CODE),
];

/// Bit of an LED within its side's output byte
fn led_bit(kind: LedKind) -> u8 {
    match kind {
        LedKind::Play => 0x01,
        LedKind::Cue => 0x02,
        LedKind::MasterTempo => 0x04,
        LedKind::AutoBeat => 0x08,
        LedKind::Monitor => 0x10,
        LedKind::Fx => 0x20,
        LedKind::FxCue => 0x40,
        LedKind::Loop => 0x80,
    }
}

/// Turns successive input reports into change events
#[derive(Debug, Default)]
pub struct ReportDecoder {
    previous: Option<[u8; INPUT_REPORT_LEN]>,
}

impl ReportDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the baseline (after a reopen)
    pub fn reset(&mut self) {
        self.previous = None;
    }

    /// Decode one report into the events for every control that changed
    pub fn decode(&mut self, report: &[u8]) -> Vec<RawEvent> {
        if report.len() < INPUT_REPORT_LEN {
            trace!("Short HID report ({} bytes) dropped", report.len());
            return Vec::new();
        }

        let mut current = [0u8; INPUT_REPORT_LEN];
        current.copy_from_slice(&report[..INPUT_REPORT_LEN]);

        let Some(previous) = self.previous.replace(current) else {
            return Vec::new();
        };

        let mut events = Vec::new();

        for (bit, control) in BUTTON_BITS.iter().enumerate() {
            let byte = BUTTON_OFFSET + bit / 8;
            let mask = 1u8 << (bit % 8);
            let now = current[byte] & mask != 0;
            if now != (previous[byte] & mask != 0) {
                events.push(RawEvent::new(*control, now as i32));
            }
        }

        // While rotating, the selector reports several positions at once;
        // every newly set bit is forwarded
        let selector_now = current[SELECTOR_OFFSET] & 0x0f;
        let selector_before = previous[SELECTOR_OFFSET] & 0x0f;
        for (bit, (code, value)) in SELECTOR_BITS {
            if selector_now & bit != 0 && selector_before & bit == 0 {
                events.push(RawEvent::new(code, value));
            }
        }

        for (offset, control) in ANALOG_BYTES {
            if current[offset] != previous[offset] {
                events.push(RawEvent::new(control, current[offset] as i32));
            }
        }

        events
    }
}

/// One entry of the hidapi device list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HidCandidate {
    pub path: String,
    pub vendor_id: u16,
    pub product_id: u16,
    pub product: Option<String>,
}

/// Keep the configured consoles, one entry per device path, sorted by path
pub fn select_consoles(
    config: &HidConfig,
    candidates: impl IntoIterator<Item = HidCandidate>,
) -> Vec<DeviceInfo> {
    let mut found: Vec<DeviceInfo> = Vec::new();

    for candidate in candidates {
        if candidate.vendor_id != config.vendor_id
            || !config.product_ids.contains(&candidate.product_id)
        {
            continue;
        }

        // hidapi lists every interface usage; the path identifies the device
        let path = PathBuf::from(&candidate.path);
        if found.iter().any(|info| info.path == path) {
            continue;
        }

        let node = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| candidate.path.clone());
        let (vendor_id, product_id) = (candidate.vendor_id, candidate.product_id);
        let name = candidate
            .product
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| format!("HID {:04x}:{:04x}", vendor_id, product_id));

        debug!(
            "Found console \"{}\" ({:04x}:{:04x}) at {}",
            name, vendor_id, product_id, candidate.path
        );
        found.push(DeviceInfo {
            id: format!("hid:{}", node),
            name,
            kind: DriverKind::Hid,
            path,
        });
    }

    found.sort_by(|a, b| a.path.cmp(&b.path));
    found
}

/// Find consoles in the hidapi device list
pub async fn discover(config: &HidConfig) -> Result<Vec<DeviceInfo>> {
    let config = config.clone();
    tokio::task::spawn_blocking(move || {
        let api = match HidApi::new() {
            Ok(api) => api,
            Err(e) => {
                warn!("Failed to initialize hidapi: {}", e);
                return Vec::new();
            }
        };

        let candidates = api.device_list().map(|device| HidCandidate {
            path: device.path().to_string_lossy().into_owned(),
            vendor_id: device.vendor_id(),
            product_id: device.product_id(),
            product: device.product_string().map(str::to_string),
        });
        select_consoles(&config, candidates)
    })
    .await
    .context("HID discovery task failed")
}

/// Shared so blocking reads and writes can run on the blocking pool
type SharedDevice = Arc<Mutex<HidDevice>>;

/// hidapi console driver
pub struct HidDriver {
    info: DeviceInfo,
    device: Option<SharedDevice>,
    decoder: ReportDecoder,
    pending: VecDeque<RawEvent>,
    /// Last output report the device accepted
    output: [u8; OUTPUT_REPORT_LEN],
}

impl HidDriver {
    pub fn new(info: DeviceInfo) -> Self {
        Self {
            info,
            device: None,
            decoder: ReportDecoder::new(),
            pending: VecDeque::new(),
            output: [0u8; OUTPUT_REPORT_LEN],
        }
    }

    /// Output report with one LED changed
    fn report_with(&self, led: Led, on: bool) -> [u8; OUTPUT_REPORT_LEN] {
        let byte = match led.side {
            Side::Left => 1,
            Side::Right => 2,
        };
        let mut report = self.output;
        if on {
            report[byte] |= led_bit(led.kind);
        } else {
            report[byte] &= !led_bit(led.kind);
        }
        report
    }

    fn device(&self) -> Result<SharedDevice> {
        match &self.device {
            Some(device) => Ok(device.clone()),
            None => bail!("{} is not open", self.info.id),
        }
    }
}

#[async_trait]
impl DeviceDriver for HidDriver {
    fn name(&self) -> &str {
        "hid"
    }

    fn device_id(&self) -> &str {
        &self.info.id
    }

    async fn open(&mut self) -> Result<()> {
        let path = CString::new(self.info.path.to_string_lossy().into_owned())
            .with_context(|| format!("Invalid HID path {}", self.info.path.display()))?;

        let opened = tokio::task::spawn_blocking(move || {
            let api = HidApi::new().map_err(|e| anyhow!("Failed to initialize hidapi: {}", e))?;
            api.open_path(&path).map_err(|e| anyhow!("{}", e))
        })
        .await
        .context("HID open task failed")?;

        let device = match opened {
            Ok(device) => device,
            Err(e) => {
                if self.info.path.exists() {
                    warn!("{}", permission_hint(&self.info.path));
                }
                return Err(e)
                    .with_context(|| format!("Failed to open {}", self.info.path.display()));
            }
        };

        self.device = Some(Arc::new(Mutex::new(device)));
        self.decoder.reset();
        self.pending.clear();
        self.output = [0u8; OUTPUT_REPORT_LEN];

        info!("✅ Console \"{}\" opened at {}", self.info.name, self.info.path.display());
        Ok(())
    }

    async fn next_event(&mut self, timeout: Duration) -> Result<Option<RawEvent>> {
        if let Some(event) = self.pending.pop_front() {
            return Ok(Some(event));
        }

        let device = self.device()?;
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let timeout_ms = remaining.as_millis().min(i32::MAX as u128) as i32;

            // read_timeout returns after at most `timeout_ms`, so the
            // blocking task never outlives the poll
            let device = device.clone();
            let (n, report) = tokio::task::spawn_blocking(move || {
                let mut report = [0u8; 64];
                device
                    .lock()
                    .read_timeout(&mut report, timeout_ms)
                    .map(|n| (n, report))
                    .map_err(|e| anyhow!("{}", e))
            })
            .await
            .context("HID read task failed")?
            .with_context(|| format!("Read from {} failed", self.info.path.display()))?;

            // hidapi hands out exactly one report per read
            if n > 0 {
                self.pending.extend(self.decoder.decode(&report[..n]));
            }
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }
            if n == 0 || Instant::now() >= deadline {
                return Ok(None);
            }
        }
    }

    async fn write_led(&mut self, led: Led, on: bool) -> Result<()> {
        let report = self.report_with(led, on);
        if report == self.output {
            return Ok(());
        }

        let device = self.device()?;
        trace!("HID output report {:02x?}", report);
        tokio::task::spawn_blocking(move || {
            device.lock().write(&report).map_err(|e| anyhow!("{}", e))
        })
        .await
        .context("HID write task failed")?
        .with_context(|| format!("LED write to {} failed", self.info.path.display()))?;

        self.output = report;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.device = None;
        self.pending.clear();
        debug!("Closed {}", self.info.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> [u8; INPUT_REPORT_LEN] {
        let mut report = [0u8; INPUT_REPORT_LEN];
        report[0] = 0x01;
        report
    }

    #[test]
    fn test_first_report_is_baseline() {
        let mut decoder = ReportDecoder::new();
        let mut first = report();
        first[5] = 200;
        first[1] = 0xff;
        assert!(decoder.decode(&first).is_empty());
        assert!(decoder.decode(&first).is_empty());
    }

    #[test]
    fn test_button_bits() {
        let mut decoder = ReportDecoder::new();
        decoder.decode(&report());

        let mut pressed = report();
        pressed[1] = 0x01; // left play
        pressed[3] = 0x80; // right 3
        assert_eq!(
            decoder.decode(&pressed),
            vec![RawEvent::new(LEFT_PLAY, 1), RawEvent::new(RIGHT_3, 1)]
        );

        let mut released = pressed;
        released[1] = 0x00;
        assert_eq!(decoder.decode(&released), vec![RawEvent::new(LEFT_PLAY, 0)]);
    }

    #[test]
    fn test_analog_bytes() {
        let mut decoder = ReportDecoder::new();
        decoder.decode(&report());

        let mut moved = report();
        moved[10] = 3; // left jog
        moved[17] = 255; // crossfader
        assert_eq!(
            decoder.decode(&moved),
            vec![RawEvent::new(LEFT_JOG, 3), RawEvent::new(XFADER, 255)]
        );
    }

    #[test]
    fn test_selector_nibble() {
        let mut decoder = ReportDecoder::new();
        decoder.decode(&report());

        let mut mix = report();
        mix[4] = 0x08;
        assert_eq!(decoder.decode(&mix), vec![RawEvent::new(102, 8)]);

        // Rotating to split passes through several positions
        let mut split = report();
        split[4] = 0x07;
        assert_eq!(
            decoder.decode(&split),
            vec![RawEvent::new(100, 1), RawEvent::new(101, 2), RawEvent::new(103, 4)]
        );

        // High nibble is not part of the selector
        let mut noise = split;
        noise[4] = 0x17;
        assert!(decoder.decode(&noise).is_empty());
    }

    #[test]
    fn test_short_report_keeps_baseline() {
        let mut decoder = ReportDecoder::new();
        decoder.decode(&report());
        assert!(decoder.decode(&[0x01, 0xff]).is_empty());

        let mut moved = report();
        moved[5] = 9;
        assert_eq!(decoder.decode(&moved), vec![RawEvent::new(LEFT_VOL, 9)]);
    }

    fn driver() -> HidDriver {
        HidDriver::new(DeviceInfo {
            id: "hid:hidraw0".to_string(),
            name: "test".to_string(),
            kind: DriverKind::Hid,
            path: PathBuf::from("/dev/hidraw0"),
        })
    }

    #[test]
    fn test_led_bits() {
        let mut driver = driver();

        let report = driver.report_with(Led::new(Side::Right, LedKind::Loop), true);
        assert_eq!(report, [0x00, 0x00, 0x80]);
        driver.output = report;
        assert_eq!(driver.report_with(Led::new(Side::Right, LedKind::Loop), true), report);

        let report = driver.report_with(Led::new(Side::Left, LedKind::Cue), true);
        assert_eq!(report, [0x00, 0x02, 0x80]);
        driver.output = report;

        assert_eq!(
            driver.report_with(Led::new(Side::Right, LedKind::Loop), false),
            [0x00, 0x02, 0x00]
        );
    }

    #[tokio::test]
    async fn test_failed_led_write_is_retried() {
        let mut driver = driver();
        let play = Led::new(Side::Left, LedKind::Play);

        // Not open: the write fails and the cached report keeps the old state
        assert!(driver.write_led(play, true).await.is_err());
        assert_eq!(driver.output, [0u8; OUTPUT_REPORT_LEN]);

        // So the same request is attempted again instead of being skipped
        assert!(driver.write_led(play, true).await.is_err());
        assert_eq!(driver.output, [0u8; OUTPUT_REPORT_LEN]);

        // Already matching the device: nothing to write
        assert!(driver.write_led(play, false).await.is_ok());
    }

    #[tokio::test]
    async fn test_read_before_open_fails() {
        let mut driver = driver();
        assert!(driver.next_event(Duration::from_millis(1)).await.is_err());
    }

    fn candidate(
        path: &str,
        vendor_id: u16,
        product_id: u16,
        product: Option<&str>,
    ) -> HidCandidate {
        HidCandidate {
            path: path.to_string(),
            vendor_id,
            product_id,
            product: product.map(str::to_string),
        }
    }

    #[test]
    fn test_select_consoles_by_vendor_and_product() {
        let config = HidConfig::default();
        let devices = select_consoles(
            &config,
            [
                candidate("/dev/hidraw2", 0x06f8, 0xb100, Some("Hercules DJ Console Mk2")),
                candidate("/dev/hidraw0", 0x046d, 0xc52b, Some("Logitech Receiver")),
                candidate("/dev/hidraw1", 0x06f8, 0xb000, None),
                // Second usage of the same device
                candidate("/dev/hidraw2", 0x06f8, 0xb100, Some("Hercules DJ Console Mk2")),
                candidate("/dev/hidraw3", 0x06f8, 0x1234, Some("Other Hercules")),
            ],
        );

        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].id, "hid:hidraw1");
        assert_eq!(devices[0].name, "HID 06f8:b000");
        assert_eq!(devices[1].id, "hid:hidraw2");
        assert_eq!(devices[1].name, "Hercules DJ Console Mk2");
        assert_eq!(devices[1].path, PathBuf::from("/dev/hidraw2"));
        assert_eq!(devices[1].kind, DriverKind::Hid);
    }

    #[tokio::test]
    async fn test_discover_without_matching_devices() -> Result<()> {
        let config = HidConfig {
            vendor_id: 0xffff,
            product_ids: vec![0xfffe],
        };
        assert!(discover(&config).await?.is_empty());
        Ok(())
    }
}
