// Library interface for transporter
// This allows integration tests to access internal modules

pub mod config;
pub mod errors;
pub mod session;
pub mod telemetry;

// Re-export commonly used types
pub use config::{AppConfig, Preferences};
pub use errors::TransporterError;
pub use session::{FileSessionCounter, FileSessionStore, SessionCounter, SessionRef, SessionStore};
pub use telemetry::{
    Fix, LiveTelemetry, PositionSource, RecorderStatus, RecordingController, SamplePoint, Session,
    TyreType,
};
