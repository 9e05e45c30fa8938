use std::path::PathBuf;
use clap::Parser;
use log::LevelFilter;

use crate::config::types::Config;
use crate::device::types::{ClassifierMode, EmgMode, ImuMode, SleepMode};
use crate::LogConfig;

/// Stream EMG and IMU samples from a Myo armband over bluetooth low energy.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "myoband", version)]
pub struct Cli {
    /// Bluetooth adapter: an index ("0") or part of the adapter's description ("hci1")
    #[arg(short, long)]
    pub iface: Option<String>,

    /// Config file to read; defaults to myoband.json next to the executable or in the user config dir
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[arg(long, value_enum)]
    pub emg_mode: Option<EmgMode>,

    #[arg(long, value_enum)]
    pub imu_mode: Option<ImuMode>,

    /// Enable the on-board pose classifier
    #[arg(long)]
    pub classifier: bool,

    /// Keep the band awake while it is not moving
    #[arg(long)]
    pub never_sleep: bool,

    /// How long to scan for bands, in milliseconds
    #[arg(long)]
    pub scan_ms: Option<u64>,

    /// Log protocol details
    #[arg(short, long)]
    pub verbose: bool,

    /// Also write the log to this file (the LOG_FILE environment variable works too)
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    /// Override the fields of `config` that were given on the command line.
    pub fn apply(&self, config: &mut Config) {
        if let Some(iface) = &self.iface {
            config.interface = iface.clone();
        }
        if let Some(emg_mode) = self.emg_mode {
            config.emg_mode = emg_mode;
        }
        if let Some(imu_mode) = self.imu_mode {
            config.imu_mode = imu_mode;
        }
        if self.classifier {
            config.classifier_mode = ClassifierMode::Enabled;
        }
        if self.never_sleep {
            config.sleep_mode = SleepMode::NeverSleep;
        }
        if let Some(scan_ms) = self.scan_ms {
            config.scan_duration_ms = scan_ms;
        }
        if self.verbose {
            config.debug_protocol = true;
        }
    }

    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            level: if self.verbose { LevelFilter::Debug } else { LevelFilter::Info },
            file: self.log_file.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let cli = Cli::parse_from([
            "myoband", "--iface", "1", "--imu-mode", "send-data", "--emg-mode", "none", "--never-sleep", "-v",
        ]);
        let mut config = Config::default();
        cli.apply(&mut config);

        assert_eq!(config.interface, "1");
        assert_eq!(config.imu_mode, ImuMode::SendData);
        assert_eq!(config.emg_mode, EmgMode::None);
        assert_eq!(config.sleep_mode, SleepMode::NeverSleep);
        assert_eq!(config.classifier_mode, ClassifierMode::Disabled);
        assert!(config.debug_protocol);
        assert_eq!(cli.log_config().level, LevelFilter::Debug);
    }

    #[test]
    fn no_flags_keep_config() {
        let cli = Cli::parse_from(["myoband"]);
        let mut config = Config::default();
        cli.apply(&mut config);

        assert_eq!(config, Config::default());
    }
}
