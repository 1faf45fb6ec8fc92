// Error types for transporter

use snafu::Snafu;
use std::{io, path::PathBuf};

#[derive(Debug, Snafu)]
pub enum TransporterError {
    // Recording lifecycle errors
    #[snafu(display("A recording is already in progress (session {session_id})"))]
    AlreadyRecording { session_id: u64 },
    #[snafu(display("No recording in progress"))]
    NotRecording,

    // Errors while reading positions
    #[snafu(display("Position source error: {description}"))]
    PositionSourceError { description: String },

    // Errors for the session store
    #[snafu(display("Error serializing session {session_id}"))]
    SessionSerializeError {
        session_id: u64,
        source: serde_json::Error,
    },
    #[snafu(display("Error writing session file {}", path.display()))]
    SessionWriteError { path: PathBuf, source: io::Error },
    #[snafu(display("Session {session_id} has not been finalized"))]
    UnsealedSession { session_id: u64 },
    #[snafu(display("Unknown session: {reference}"))]
    UnknownSession { reference: String },
    #[snafu(display("Invalid session file: {}", path.display()))]
    InvalidSessionFile {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[snafu(display("Error loading session file"))]
    SessionLoaderError { source: io::Error },

    // Session counter errors
    #[snafu(display("Session counter error: {reason}"))]
    SessionCounterError { reason: String },

    // Config management errors
    #[snafu(display("Could not find application data directory to save config file"))]
    NoConfigDir,
    #[snafu(display("Error writing config file"))]
    ConfigIOError { source: io::Error },
    #[snafu(display("Error serializing config file"))]
    ConfigSerializeError { source: serde_json::Error },
}
