// Device battery snapshots attached to every event

use std::fs;
use std::path::PathBuf;

use log::debug;
use serde::{Deserialize, Serialize};

const SYSFS_POWER_SUPPLY: &str = "/sys/class/power_supply";
/// `capacity` in sysfs is already a percentage
const SYSFS_CAPACITY_SCALE: i64 = 100;

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum BatteryState {
    #[default]
    Unknown,
    NotCharging,
    Charging,
    Full,
    #[serde(rename = "USBPower")]
    UsbPower,
}

/// Battery level and charge state at a point in time
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatteryReading {
    /// Charge level in percent, `None` when the readout is unavailable
    pub level_percent: Option<u8>,
    pub state: BatteryState,
}

impl BatteryReading {
    pub fn new(level_percent: Option<u8>, state: BatteryState) -> Self {
        Self {
            level_percent,
            state,
        }
    }

    pub fn unavailable() -> Self {
        Self::default()
    }
}

/// Convert a raw `level` out of `scale` into a rounded percentage.
///
/// Platforms report a negative level or a non-positive scale when the battery
/// cannot be read; those map to `None` instead of a garbage percentage.
pub fn battery_percent(level: i64, scale: i64) -> Option<u8> {
    if level < 0 || scale <= 0 {
        return None;
    }
    let percent = (level as f64 / scale as f64 * 100.).round();
    Some(percent.clamp(0., 100.) as u8)
}

pub trait BatterySource: Send + Sync {
    fn read(&self) -> BatteryReading;
}

impl<T: BatterySource + ?Sized> BatterySource for Box<T> {
    fn read(&self) -> BatteryReading {
        (**self).read()
    }
}

/// Always reports the same reading, for hosts without a battery and for tests
#[derive(Clone, Copy, Debug, Default)]
pub struct FixedBattery {
    reading: BatteryReading,
}

impl FixedBattery {
    pub fn new(reading: BatteryReading) -> Self {
        Self { reading }
    }

    pub fn unavailable() -> Self {
        Self::default()
    }
}

impl BatterySource for FixedBattery {
    fn read(&self) -> BatteryReading {
        self.reading
    }
}

/// Reads a Linux power supply from sysfs
pub struct SysfsBattery {
    root: PathBuf,
    device: String,
}

impl SysfsBattery {
    pub fn new(device: impl Into<String>) -> Self {
        Self::with_root(PathBuf::from(SYSFS_POWER_SUPPLY), device)
    }

    pub fn with_root(root: PathBuf, device: impl Into<String>) -> Self {
        Self {
            root,
            device: device.into(),
        }
    }

    fn read_attribute(&self, supply: &str, attribute: &str) -> Option<String> {
        fs::read_to_string(self.root.join(supply).join(attribute))
            .ok()
            .map(|value| value.trim().to_string())
    }

    /// True when any USB supply next to the battery is online
    fn usb_online(&self) -> bool {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return false;
        };
        entries.flatten().any(|entry| {
            let supply = entry.file_name().to_string_lossy().to_string();
            self.read_attribute(&supply, "type")
                .is_some_and(|t| t.starts_with("USB"))
                && self.read_attribute(&supply, "online").as_deref() == Some("1")
        })
    }
}

impl BatterySource for SysfsBattery {
    fn read(&self) -> BatteryReading {
        let level_percent = self
            .read_attribute(&self.device, "capacity")
            .and_then(|raw| raw.parse::<i64>().ok())
            .and_then(|level| battery_percent(level, SYSFS_CAPACITY_SCALE));

        let state = match self.read_attribute(&self.device, "status").as_deref() {
            Some("Charging") if self.usb_online() => BatteryState::UsbPower,
            Some("Charging") => BatteryState::Charging,
            Some("Discharging") | Some("Not charging") => BatteryState::NotCharging,
            Some("Full") => BatteryState::Full,
            _ => BatteryState::Unknown,
        };

        if level_percent.is_none() {
            debug!("Battery {} unavailable under {:?}", self.device, self.root);
        }
        BatteryReading::new(level_percent, state)
    }
}
