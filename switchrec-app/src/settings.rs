//! Appliance settings (JSON file, `/etc/switchrec/settings.json` by default).

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use switchrec_core::RecorderConfig;
use tracing::warn;

const SETTINGS_ENV: &str = "SWITCHREC_SETTINGS";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    pub recorder: RecorderConfig,
    /// Substring matched against input device names; empty means default device.
    pub input_device_hint: String,
    /// BCM GPIO numbers.
    pub record_switch_pin: u32,
    pub wifi_switch_pin: u32,
    pub record_led_pin: u32,
    pub wifi_led_pin: u32,
    pub gpio_root: PathBuf,
    pub wifi_interface: String,
    pub poll_interval_ms: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            recorder: RecorderConfig::default(),
            input_device_hint: "i2s".into(),
            record_switch_pin: 6,
            wifi_switch_pin: 12,
            record_led_pin: 17,
            wifi_led_pin: 27,
            gpio_root: PathBuf::from("/sys/class/gpio"),
            wifi_interface: "wlan0".into(),
            poll_interval_ms: 100,
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        self.input_device_hint = self.input_device_hint.trim().to_string();
        self.wifi_interface = match self.wifi_interface.trim() {
            "" => "wlan0".into(),
            name => name.into(),
        };
        self.recorder.file_prefix = match self.recorder.file_prefix.trim() {
            "" => "rec".into(),
            prefix => prefix.replace(['/', '\\', ':'], "-"),
        };
        self.poll_interval_ms = self.poll_interval_ms.clamp(10, 1_000);
    }

    pub fn device_hint(&self) -> Option<&str> {
        Some(self.input_device_hint.as_str()).filter(|h| !h.is_empty())
    }
}

pub fn default_settings_path() -> PathBuf {
    std::env::var_os(SETTINGS_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/etc/switchrec/settings.json"))
}

/// Missing or unreadable files fall back to defaults.
pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = match fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str::<AppSettings>(&raw).unwrap_or_else(|e| {
            warn!(path = ?path, "ignoring malformed settings: {e}");
            AppSettings::default()
        }),
        Err(_) => AppSettings::default(),
    };
    settings.normalize();
    settings
}
