use std::env::current_exe;
use std::path::{Path, PathBuf};
use std::str;
use directories_next::ProjectDirs;
use log::{info, warn};
use serde_json;
use tokio::fs;

use crate::config::types::Config;
use crate::error::ConfigError;

// creates a path to myoband.json in the same directory as the executable
// this could be useful for usb sticks
fn get_portable_config_path() -> Option<PathBuf> {
    match current_exe() {
        Ok(mut path) => {
            // /opt/myoband/myoband => /opt/myoband/myoband.json
            if !path.set_extension("json") {
                warn!("current exe has no filename: {}", path.to_string_lossy());
                return None
            }

            Some(path)
        },
        Err(err) => {
            warn!("failed to get current exe path: {:?}", err);
            None
        },
    }
}

// creates a path to myoband.json in an os dependent standard directory, such as ~/.config on linux
fn get_local_config_path() -> Option<PathBuf> {
    ProjectDirs::from("org", "myoband", "myoband").map(|dirs| {
        dirs.config_dir().join("myoband.json")
    })
}

fn get_config_path() -> Result<PathBuf, ConfigError> {
    if let Some(path) = get_portable_config_path() {
        if path.is_file() {
            return Ok(path);
        }
    }

    match get_local_config_path() {
        None => Err(ConfigError::NoConfigPath),
        Some(path) => Ok(path),
    }
}

#[derive(Debug, Clone)]
pub struct ConfigIO {
    path: PathBuf,
}

impl ConfigIO {
    /// Use `path` if given, otherwise the portable or the per-user location.
    pub fn new(path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path,
            None => get_config_path()?,
        };
        info!("Using config file {}", path.to_string_lossy());

        Ok(ConfigIO { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing or empty file reads as the default config.
    pub async fn read(&self) -> Result<Config, ConfigError> {
        let content = match fs::read(&self.path).await {
            Ok(content) => content,
            Err(source) => {
                let err = ConfigError::from(source);
                if err.is_file_not_found_error() {
                    return Ok(Config::default());
                }
                return Err(err);
            },
        };

        if content.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(Config::default());
        }

        let content = str::from_utf8(&content)?;
        Ok(serde_json::from_str(content)?)
    }

    pub async fn save(&self, config: &Config) -> Result<(), ConfigError> {
        info!("Saving config");

        if let Some(directory) = self.path.parent() {
            fs::create_dir_all(directory).await?;
        }

        let content = serde_json::to_string_pretty(config)?;
        fs::write(&self.path, content.as_bytes()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::types::ImuMode;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("myoband-test-{}", std::process::id()))
            .join(name)
    }

    #[tokio::test]
    async fn missing_file_reads_default() {
        let io = ConfigIO::new(Some(scratch_path("missing.json"))).unwrap();
        assert_eq!(io.read().await.unwrap(), Config::default());
    }

    #[tokio::test]
    async fn save_then_read() {
        let io = ConfigIO::new(Some(scratch_path("saved.json"))).unwrap();
        let config = Config { interface: String::from("hci1"), imu_mode: ImuMode::SendData, ..Config::default() };

        io.save(&config).await.unwrap();
        assert_eq!(io.read().await.unwrap(), config);
    }

    #[tokio::test]
    async fn invalid_json_is_an_error() {
        let path = scratch_path("invalid.json");
        let io = ConfigIO::new(Some(path.clone())).unwrap();
        fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        fs::write(&path, b"{ not json").await.unwrap();

        assert!(matches!(io.read().await, Err(ConfigError::JsonError { .. })));
    }
}
