// Storage for finalized driving sessions

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use log::{debug, error, info, warn};

use crate::errors::TransporterError;
use crate::telemetry::Session;

const SESSION_EXTENSION: &str = "json";
const FILE_DATE_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Name of a persisted session file inside a store.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionRef(String);

impl SessionRef {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self(file_name.into())
    }

    pub fn file_name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionRef {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Trait defining the archive of finalized sessions.
///
/// None of the operations have access to the session being recorded; a
/// session only reaches the store once it has been sealed.
pub trait SessionStore {
    /// Write a sealed session to durable storage, returning where it landed.
    /// Either the whole record is written or the call fails.
    fn persist(&mut self, session: Session) -> Result<PathBuf, TransporterError>;

    /// List previously persisted sessions, oldest first
    fn list_sessions(&self) -> Result<Vec<SessionRef>, TransporterError>;

    /// Remove one persisted session
    fn delete(&mut self, session: &SessionRef) -> Result<(), TransporterError>;

    /// Resolve sessions to the files a sharing collaborator should hand out
    fn export_refs(&self, sessions: &[SessionRef]) -> Result<Vec<PathBuf>, TransporterError>;

    /// Read a persisted session back
    fn load(&self, session: &SessionRef) -> Result<Session, TransporterError>;
}

/// Build the file name for a session finalized at `finalized_at`.
pub fn session_file_name(finalized_at: DateTime<Local>, session_id: u64) -> String {
    format!(
        "{}_session_{}.{}",
        finalized_at.format(FILE_DATE_FORMAT),
        session_id,
        SESSION_EXTENSION
    )
}

/// File-based implementation of the session store, one pretty-printed JSON
/// file per session.
pub struct FileSessionStore {
    storage_path: PathBuf,
}

impl FileSessionStore {
    /// Create a new file-based store, creating the directory if needed
    pub fn new(storage_path: PathBuf) -> Result<Self, TransporterError> {
        if !storage_path.exists() {
            fs::create_dir_all(&storage_path)
                .map_err(|e| TransporterError::ConfigIOError { source: e })?;
        }

        Ok(Self { storage_path })
    }

    /// Create the store in the default application data directory
    pub fn new_default() -> Result<Self, TransporterError> {
        Self::new(Self::default_storage_path()?)
    }

    pub fn default_storage_path() -> Result<PathBuf, TransporterError> {
        let app_data_dir = dirs::data_dir().ok_or(TransporterError::NoConfigDir)?;
        Ok(app_data_dir.join("transporter").join("sessions"))
    }

    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }

    /// Copy sessions into `destination`, returning the copies
    pub fn export_to(
        &self,
        sessions: &[SessionRef],
        destination: &Path,
    ) -> Result<Vec<PathBuf>, TransporterError> {
        fs::create_dir_all(destination)
            .map_err(|e| TransporterError::SessionWriteError {
                path: destination.to_path_buf(),
                source: e,
            })?;

        let mut exported = Vec::new();
        for source in self.export_refs(sessions)? {
            let Some(file_name) = source.file_name() else {
                continue;
            };
            let target = destination.join(file_name);
            fs::copy(&source, &target).map_err(|e| TransporterError::SessionWriteError {
                path: target.clone(),
                source: e,
            })?;
            debug!("Exported {:?} to {:?}", source, target);
            exported.push(target);
        }
        Ok(exported)
    }

    /// Resolve a ref to a file inside the store, rejecting anything that
    /// would point outside of it
    fn resolve(&self, session: &SessionRef) -> Result<PathBuf, TransporterError> {
        let name = session.file_name();
        let is_plain_name = !name.is_empty()
            && !name.contains(['/', '\\'])
            && name != "."
            && name != ".."
            && name.ends_with(&format!(".{}", SESSION_EXTENSION));
        let path = self.storage_path.join(name);
        if !is_plain_name || !path.is_file() {
            return Err(TransporterError::UnknownSession {
                reference: name.to_string(),
            });
        }
        Ok(path)
    }

    fn write_atomically(&self, path: &Path, content: &[u8]) -> Result<(), TransporterError> {
        let temp_path = path.with_extension(format!("{}.tmp", SESSION_EXTENSION));

        let written = fs::File::create(&temp_path).and_then(|mut temp_file| {
            temp_file.write_all(content)?;
            temp_file.sync_all()
        });
        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path);
            return Err(TransporterError::SessionWriteError {
                path: temp_path,
                source: e,
            });
        }

        fs::rename(&temp_path, path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            TransporterError::SessionWriteError {
                path: path.to_path_buf(),
                source: e,
            }
        })
    }
}

impl SessionStore for FileSessionStore {
    fn persist(&mut self, session: Session) -> Result<PathBuf, TransporterError> {
        let Some(session_end) = session.session_end else {
            return Err(TransporterError::UnsealedSession {
                session_id: session.session_id,
            });
        };

        let finalized_at = DateTime::<Utc>::from_timestamp_micros((session_end * 1_000_000.) as i64)
            .map(|t| t.with_timezone(&Local))
            .unwrap_or_else(Local::now);
        let path = self
            .storage_path
            .join(session_file_name(finalized_at, session.session_id));

        let content = serde_json::to_string_pretty(&session).map_err(|e| {
            TransporterError::SessionSerializeError {
                session_id: session.session_id,
                source: e,
            }
        })?;

        match self.write_atomically(&path, content.as_bytes()) {
            Ok(()) => {
                info!(
                    "Session {} saved to {:?} ({} samples)",
                    session.session_id,
                    path,
                    session.data.len()
                );
                Ok(path)
            }
            Err(e) => {
                error!("Failed to save session {}: {}", session.session_id, e);
                Err(e)
            }
        }
    }

    fn list_sessions(&self) -> Result<Vec<SessionRef>, TransporterError> {
        let entries = fs::read_dir(&self.storage_path)
            .map_err(|e| TransporterError::SessionLoaderError { source: e })?;

        let mut sessions = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| TransporterError::SessionLoaderError { source: e })?;
            let path = entry.path();

            if path.is_file()
                && path.extension().and_then(|s| s.to_str()) == Some(SESSION_EXTENSION)
            {
                if let Some(name) = path.file_name().and_then(|s| s.to_str()) {
                    sessions.push(SessionRef::new(name));
                }
            }
        }

        sessions.sort();
        Ok(sessions)
    }

    fn delete(&mut self, session: &SessionRef) -> Result<(), TransporterError> {
        let path = self.resolve(session)?;
        fs::remove_file(&path).map_err(|e| TransporterError::SessionWriteError {
            path: path.clone(),
            source: e,
        })?;
        info!("Deleted session file {:?}", path);
        Ok(())
    }

    fn export_refs(&self, sessions: &[SessionRef]) -> Result<Vec<PathBuf>, TransporterError> {
        sessions
            .iter()
            .map(|session| {
                let path = self.resolve(session)?;
                path.canonicalize().or_else(|e| {
                    warn!("Could not canonicalize {:?}: {}", path, e);
                    Ok::<PathBuf, TransporterError>(path)
                })
            })
            .collect()
    }

    fn load(&self, session: &SessionRef) -> Result<Session, TransporterError> {
        let path = self.resolve(session)?;
        let content = fs::read_to_string(&path)
            .map_err(|e| TransporterError::SessionLoaderError { source: e })?;
        serde_json::from_str(&content)
            .map_err(|e| TransporterError::InvalidSessionFile { path, source: e })
    }
}
