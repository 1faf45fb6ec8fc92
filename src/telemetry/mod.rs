pub mod accumulator;
pub mod clock;
pub mod controller;
pub mod source;

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

pub use accumulator::MetricAccumulator;
pub use clock::SessionClock;
pub use controller::{RecorderStatus, RecordingController};
pub use source::{PositionSource, ReplayPositionSource, SimulatedPositionSource};

/// Default sampling period of the session clock
pub const TICK_PERIOD_MS: u64 = 1000;
/// Number of entries kept in the live speed history
pub const ROLLING_WINDOW_CAPACITY: usize = 60;

/// One position and speed reading reported by a [`PositionSource`].
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Fix {
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Longitude in decimal degrees
    pub longitude: f64,
    /// Instantaneous speed in m/s, negative when the device does not know it
    pub speed_mps: f64,
    #[serde(default = "default_valid")]
    pub valid: bool,
}

fn default_valid() -> bool {
    true
}

impl Fix {
    pub fn new(latitude: f64, longitude: f64, speed_mps: f64) -> Self {
        Self {
            latitude,
            longitude,
            speed_mps,
            valid: true,
        }
    }

    /// A fix can be sampled when the source marked it valid and both
    /// coordinates are finite numbers.
    pub fn is_usable(&self) -> bool {
        self.valid && self.latitude.is_finite() && self.longitude.is_finite()
    }
}

/// Location permission state as reported by the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Authorization {
    NotDetermined,
    Authorized,
    Denied,
    Restricted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum TyreType {
    Winter,
    Summer,
    #[serde(rename = "All Season")]
    AllSeason,
}

/// A single persisted telemetry record. Field order is part of the file format.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SamplePoint {
    pub index: u64,
    /// Seconds since the unix epoch
    pub timestamp: f64,
    pub longitude: f64,
    pub latitude: f64,
    /// Speed in m/s, never negative
    pub speed: f64,
    /// Meters travelled since the session started
    pub distance: f64,
}

/// A recording from start to stop. `session_end` is only set once the session is sealed.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub session_id: u64,
    pub session_start: f64,
    pub session_end: Option<f64>,
    pub data: Vec<SamplePoint>,
    #[serde(rename = "tyreType", default, skip_serializing_if = "Option::is_none")]
    pub tyre_type: Option<TyreType>,
    #[serde(rename = "driverName", default, skip_serializing_if = "Option::is_none")]
    pub driver_name: Option<String>,
}

impl Session {
    pub fn new(
        session_id: u64,
        session_start: f64,
        tyre_type: Option<TyreType>,
        driver_name: Option<String>,
    ) -> Self {
        Self {
            session_id,
            session_start,
            session_end: None,
            data: Vec::new(),
            tyre_type,
            driver_name,
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.session_end.is_some()
    }

    pub(crate) fn seal(&mut self, session_end: f64) {
        // the wall clock may step backwards while recording
        self.session_end = Some(session_end.max(self.session_start));
    }
}

/// One entry of the live speed chart.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SpeedSample {
    pub time: f64,
    pub speed_kmh: f64,
}

/// Snapshot of the values the live display shows while recording.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct LiveTelemetry {
    pub current_speed_kmh: f64,
    pub total_distance_m: f64,
    pub average_speed_kmh: f64,
    pub rolling_window: VecDeque<SpeedSample>,
}

/// Fractional seconds since the unix epoch.
pub fn epoch_seconds(time: DateTime<Utc>) -> f64 {
    time.timestamp_micros() as f64 / 1_000_000.
}

pub(crate) fn now_epoch_seconds() -> f64 {
    epoch_seconds(Utc::now())
}
