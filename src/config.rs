use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::RacewalkError;
use crate::progress::DEFAULT_MAX_ACCURACY_M;

const CONFIG_DIR_NAME: &str = "racewalk";
const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Endpoint receiving event batches
    pub server_url: String,
    pub upload_timeout_s: u64,
    /// Fixes less accurate than this are not used for progress
    pub max_fix_accuracy_m: f32,
    /// sysfs power supply name, `None` on hosts without a battery
    pub battery_device: Option<String>,
    /// Keep unacknowledged events here between runs
    pub spool_path: Option<PathBuf>,
    pub user: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8080/events".to_string(),
            upload_timeout_s: 30,
            max_fix_accuracy_m: DEFAULT_MAX_ACCURACY_M,
            battery_device: Some("BAT0".to_string()),
            spool_path: None,
            user: None,
        }
    }
}

impl AppConfig {
    pub fn default_path() -> Result<PathBuf, RacewalkError> {
        Ok(dirs::config_dir()
            .ok_or(RacewalkError::NoConfigDir)?
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME))
    }

    /// Load the config from the user's config directory, if one was saved
    pub fn from_local_file() -> Result<Option<Self>, RacewalkError> {
        Self::from_file(&Self::default_path()?)
    }

    pub fn from_file(path: &Path) -> Result<Option<Self>, RacewalkError> {
        if !path.exists() {
            return Ok(None);
        }
        let file =
            std::fs::File::open(path).map_err(|e| RacewalkError::ConfigIOError { source: e })?;
        serde_json::from_reader(file)
            .map(Some)
            .map_err(|e| RacewalkError::ConfigSerializeError { source: e })
    }

    pub fn save(&self) -> Result<(), RacewalkError> {
        self.save_to(&Self::default_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), RacewalkError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| RacewalkError::ConfigIOError { source: e })?;
        }

        let file =
            std::fs::File::create(path).map_err(|e| RacewalkError::ConfigIOError { source: e })?;
        serde_json::to_writer_pretty(file, self)
            .map_err(|e| RacewalkError::ConfigSerializeError { source: e })
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_s)
    }
}
