//! Console sniffer for debugging and development
//!
//! Prints every raw event a console produces, with the control it maps to,
//! without running the dispatcher. Useful to check a driver's code tables
//! against real hardware.

use anyhow::{bail, Context, Result};
use colored::*;
use std::time::{Duration, Instant};

use crate::config::DeviceConfig;
use crate::drivers::{self, DeviceInfo};
use crate::hercules::controls::{classify, ButtonAction};
use crate::hercules::{ControlKind, RawEvent};

const POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Human-readable meaning of a control id
pub fn describe(control_id: u16) -> String {
    match classify(control_id) {
        Some(ControlKind::Continuous(key, scale)) => format!("{} ({:?})", key, scale),
        Some(ControlKind::Button { side, action, .. }) => match action {
            ButtonAction::Edge(item, _) => format!("{} button {}", side, item),
            ButtonAction::Cue => format!("{} button cue", side),
            ButtonAction::MasterTempo => format!("{} button master tempo", side),
            ButtonAction::Monitor => format!("{} button monitor", side),
            ButtonAction::JogMode(mode) => format!("{} button jog mode {}", side, mode + 1),
        },
        Some(ControlKind::Jog(side)) => format!("{} jog wheel", side),
        Some(ControlKind::Pitch(side)) => format!("{} pitch knob", side),
        Some(ControlKind::HeadphoneSelector) => "headphone selector".to_string(),
        None => "unknown".to_string(),
    }
}

fn print_event(elapsed: Duration, event: &RawEvent) {
    let timestamp = format!("{:08}", elapsed.as_millis());
    let meaning = describe(event.control_id);

    let colored_event = match classify(event.control_id) {
        Some(ControlKind::Button { .. }) => event.to_string().bright_green(),
        Some(ControlKind::Jog(_)) | Some(ControlKind::Pitch(_)) => event.to_string().bright_cyan(),
        Some(ControlKind::HeadphoneSelector) => event.to_string().bright_magenta(),
        Some(ControlKind::Continuous(..)) => event.to_string().bright_yellow(),
        None => event.to_string().bright_black(),
    };

    println!(
        "[{}ms] {} => {}",
        timestamp.dimmed(),
        colored_event,
        meaning.bright_blue()
    );
}

/// Open the first console found and print its events until Ctrl+C
pub async fn run_sniffer(config: &DeviceConfig) -> Result<()> {
    println!("{}", "=== Hercules Console Sniffer ===".bold().cyan());
    println!("Press Ctrl+C to exit\n");

    let devices = drivers::discover(config)
        .await
        .with_context(|| format!("{} device discovery failed", config.driver))?;
    let Some(info) = devices.into_iter().next() else {
        bail!("No {} console found", config.driver);
    };

    let mut driver = drivers::build_driver(&info, config);
    driver.open().await?;

    println!("{} {}", "Monitoring".green(), info.to_string().white());
    println!("{}", "Format: [timestamp] ID = VALUE => CONTROL".dimmed());
    println!("{}\n", "─".repeat(80).dimmed());

    let start_time = Instant::now();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = driver.next_event(POLL_TIMEOUT) => {
                match result {
                    Ok(Some(event)) => print_event(start_time.elapsed(), &event),
                    Ok(None) => {}
                    Err(e) => {
                        println!("\n{} {:#}", "Console lost:".red(), e);
                        break;
                    }
                }
            }
            _ = &mut shutdown => break,
        }
    }

    driver.close().await?;
    println!("\n{}", "Sniffer stopped".yellow());
    Ok(())
}

fn print_device(info: &DeviceInfo) {
    println!(
        "  {} {} {}",
        format!("[{}]", info.kind).green(),
        info.name.bright_white(),
        format!("({}, {})", info.id, info.path.display()).dimmed()
    );
}

/// List the consoles visible to the configured driver
pub async fn list_devices(config: &DeviceConfig) -> Result<()> {
    println!("\n{}", "=== Hercules Consoles ===".bold().cyan());

    let devices = drivers::discover(config).await?;
    println!("\n{}", format!("Driver {}:", config.driver).bold());
    if devices.is_empty() {
        println!("  {}", "No consoles found".dimmed());
    }
    for info in &devices {
        print_device(info);
    }

    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DriverKind;
    use crate::hercules::controls::{LEFT_2, LEFT_CUE, LEFT_JOG, RIGHT_PLAY, RIGHT_VOL, XFADER};

    #[test]
    fn test_describe_known_controls() {
        assert_eq!(describe(RIGHT_PLAY), "right button play");
        assert_eq!(describe(LEFT_CUE), "left button cue");
        assert_eq!(describe(LEFT_2), "left button jog mode 2");
        assert_eq!(describe(LEFT_JOG), "left jog wheel");
        assert_eq!(describe(RIGHT_VOL), "[Channel2],volume (Half)");
        assert_eq!(describe(XFADER), "[Master],crossfader (Crossfade)");
        assert_eq!(describe(101), "headphone selector");
    }

    #[test]
    fn test_describe_unknown() {
        assert_eq!(describe(999), "unknown");
    }

    #[tokio::test]
    async fn test_list_devices_stub() {
        let config = DeviceConfig {
            driver: DriverKind::Stub,
            ..DeviceConfig::default()
        };
        assert!(list_devices(&config).await.is_ok());
    }
}
