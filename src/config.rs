use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::TransporterError;
use crate::telemetry::{TICK_PERIOD_MS, TyreType};

const CONFIG_FILE_NAME: &str = "config.json";

/// User preferences captured into every new session. They are read once when a
/// recording starts and never again while it runs.
pub trait Preferences {
    fn current_tyre_type(&self) -> Option<TyreType>;
    fn current_driver_name(&self) -> Option<String>;
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub tyre_type: Option<TyreType>,
    pub driver_name: String,
    pub sessions_dir: Option<PathBuf>,
    pub tick_period_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            tyre_type: Some(TyreType::Summer),
            driver_name: String::new(),
            sessions_dir: None,
            tick_period_ms: TICK_PERIOD_MS,
        }
    }
}

impl Preferences for AppConfig {
    fn current_tyre_type(&self) -> Option<TyreType> {
        self.tyre_type
    }

    fn current_driver_name(&self) -> Option<String> {
        let name = self.driver_name.trim();
        if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        }
    }
}

impl AppConfig {
    pub fn default_path() -> Result<PathBuf, TransporterError> {
        Ok(dirs::config_dir()
            .ok_or(TransporterError::NoConfigDir)?
            .join("transporter")
            .join(CONFIG_FILE_NAME))
    }

    pub fn from_local_file() -> Result<Option<Self>, TransporterError> {
        Self::from_file(&Self::default_path()?)
    }

    pub fn from_file(config_path: &Path) -> Result<Option<Self>, TransporterError> {
        if !config_path.exists() {
            debug!("No config file at {:?}", config_path);
            return Ok(None);
        }
        let file = std::fs::File::open(config_path)
            .map_err(|e| TransporterError::ConfigIOError { source: e })?;
        serde_json::from_reader(file)
            .map(Some)
            .map_err(|e| TransporterError::ConfigSerializeError { source: e })
    }

    pub fn save(&self) -> Result<(), TransporterError> {
        self.save_to(&Self::default_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<(), TransporterError> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| TransporterError::ConfigIOError { source: e })?;
        }

        let file = std::fs::File::create(config_path)
            .map_err(|e| TransporterError::ConfigIOError { source: e })?;
        serde_json::to_writer_pretty(file, self)
            .map_err(|e| TransporterError::ConfigSerializeError { source: e })
    }
}
