use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::device::constants::{NOTIFICATION_TIMEOUT, SCAN_DURATION};
use crate::device::session::SessionOptions;
use crate::device::types::{ClassifierMode, EmgMode, ImuMode, SleepMode};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Bluetooth adapter: an index ("0") or part of the adapter's description ("hci1").
    pub interface: String,
    pub scan_duration_ms: u64,
    pub notification_timeout_ms: u64,
    pub emg_mode: EmgMode,
    pub imu_mode: ImuMode,
    pub classifier_mode: ClassifierMode,
    pub sleep_mode: SleepMode,
    pub debug_protocol: bool,
}

impl Config {
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            interface: self.interface.clone(),
            scan_duration: Duration::from_millis(self.scan_duration_ms),
            debug_protocol: self.debug_protocol,
        }
    }

    pub fn notification_timeout(&self) -> Duration {
        Duration::from_millis(self.notification_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            interface: String::from("0"),
            scan_duration_ms: SCAN_DURATION,
            notification_timeout_ms: NOTIFICATION_TIMEOUT,
            emg_mode: EmgMode::SendEmg,
            imu_mode: ImuMode::None,
            classifier_mode: ClassifierMode::Disabled,
            sleep_mode: SleepMode::Normal,
            debug_protocol: false,
        }
    }
}
