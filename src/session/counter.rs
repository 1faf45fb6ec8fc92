use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::errors::TransporterError;

const COUNTER_FILE_NAME: &str = "counter.json";

/// Source of session ids. Every call to `next_session_id` hands out a new id,
/// strictly greater than any id issued before, and never the same id twice.
pub trait SessionCounter {
    fn next_session_id(&mut self) -> Result<u64, TransporterError>;

    /// The most recently issued id, 0 when none has been issued
    fn last_session_id(&self) -> Result<u64, TransporterError>;
}

#[derive(Serialize, Deserialize, Debug, Default)]
struct CounterFile {
    #[serde(rename = "lastSessionId")]
    last_session_id: u64,
}

/// Counter persisted as a small JSON file, replaced atomically on each increment.
pub struct FileSessionCounter {
    path: PathBuf,
}

impl FileSessionCounter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn new_default() -> Result<Self, TransporterError> {
        let app_data_dir = dirs::data_dir().ok_or(TransporterError::NoConfigDir)?;
        Ok(Self::new(
            app_data_dir.join("transporter").join(COUNTER_FILE_NAME),
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<CounterFile, TransporterError> {
        if !self.path.exists() {
            return Ok(CounterFile::default());
        }
        let content =
            fs::read_to_string(&self.path).map_err(|e| TransporterError::SessionCounterError {
                reason: format!("Failed to read {}: {}", self.path.display(), e),
            })?;
        serde_json::from_str(&content).map_err(|e| TransporterError::SessionCounterError {
            reason: format!("Failed to parse {}: {}", self.path.display(), e),
        })
    }

    fn write(&self, counter: &CounterFile) -> Result<(), TransporterError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| TransporterError::ConfigIOError { source: e })?;
        }
        let content = serde_json::to_string(counter)
            .map_err(|e| TransporterError::ConfigSerializeError { source: e })?;

        let temp_path = self.path.with_extension("json.tmp");
        let written = fs::File::create(&temp_path).and_then(|mut file| {
            file.write_all(content.as_bytes())?;
            file.sync_all()
        });
        written
            .and_then(|_| fs::rename(&temp_path, &self.path))
            .map_err(|e| {
                let _ = fs::remove_file(&temp_path);
                TransporterError::SessionCounterError {
                    reason: format!("Failed to write {}: {}", self.path.display(), e),
                }
            })
    }
}

impl SessionCounter for FileSessionCounter {
    fn next_session_id(&mut self) -> Result<u64, TransporterError> {
        let mut counter = self.read()?;
        counter.last_session_id += 1;
        self.write(&counter)?;
        debug!("Issued session id {}", counter.last_session_id);
        Ok(counter.last_session_id)
    }

    fn last_session_id(&self) -> Result<u64, TransporterError> {
        Ok(self.read()?.last_session_id)
    }
}

/// Counter that lives only as long as the process.
#[derive(Default)]
pub struct InMemorySessionCounter {
    last_session_id: u64,
}

impl InMemorySessionCounter {
    pub fn starting_at(last_session_id: u64) -> Self {
        Self { last_session_id }
    }
}

impl SessionCounter for InMemorySessionCounter {
    fn next_session_id(&mut self) -> Result<u64, TransporterError> {
        self.last_session_id += 1;
        Ok(self.last_session_id)
    }

    fn last_session_id(&self) -> Result<u64, TransporterError> {
        Ok(self.last_session_id)
    }
}
