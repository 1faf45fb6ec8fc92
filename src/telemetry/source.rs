use std::path::Path;

use log::{debug, error, info};

use crate::TransporterError;

use super::{Authorization, Fix, accumulator::haversine_distance_m};

/// A trait for the device capability that reports position fixes.
///
/// The recorder never subscribes to location updates; it asks for the latest
/// known fix once per clock tick, so implementations only need to remember the
/// most recent reading.
///
/// # Lifecycle
///
/// 1. `start()` is called when a recording begins and again when the host
///    reports that the app became active while recording
/// 2. `latest_fix()` is called on every tick
/// 3. `stop()` is called when the recording ends
pub trait PositionSource {
    /// Begin (or resume) delivering location updates.
    fn start(&mut self) -> Result<(), TransporterError>;

    /// Stop delivering location updates.
    fn stop(&mut self);

    /// The most recent fix, or `None` when the device has no position yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying provider failed. The recorder treats
    /// that like a missing fix.
    fn latest_fix(&mut self) -> Result<Option<Fix>, TransporterError>;

    /// Current location permission state.
    fn authorization(&self) -> Authorization;

    /// Whether the source has nothing left to deliver. Live devices never are.
    fn is_exhausted(&self) -> bool {
        false
    }
}

/// Plays back a scripted sequence of fixes, one per `latest_fix()` call.
///
/// Each entry is either a fix or `None` for a tick where the device had no
/// position. Recorded drives are stored as JSON lines, one `Fix` or `null` per line.
pub struct ReplayPositionSource {
    fixes: Vec<Option<Fix>>,
    cur_tick: usize,
    authorization: Authorization,
    start_count: usize,
    updating: bool,
}

impl ReplayPositionSource {
    pub fn from_fixes(fixes: Vec<Option<Fix>>) -> Self {
        Self {
            fixes,
            cur_tick: 0,
            authorization: Authorization::Authorized,
            start_count: 0,
            updating: false,
        }
    }

    /// Load a replay from a JSON lines file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or a line is not a valid fix.
    pub fn from_file(file: &Path) -> Result<Self, TransporterError> {
        let fixes = serde_jsonlines::json_lines::<Option<Fix>, _>(file)
            .map_err(|e| TransporterError::PositionSourceError {
                description: format!("Could not open replay file {}: {}", file.display(), e),
            })?
            .collect::<Result<Vec<Option<Fix>>, std::io::Error>>()
            .map_err(|e| {
                error!("Could not parse replay file: {}", e);
                TransporterError::PositionSourceError {
                    description: format!("Could not parse replay file: {}", e),
                }
            })?;
        info!("Loaded {} replay entries from {}", fixes.len(), file.display());
        Ok(Self::from_fixes(fixes))
    }

    pub fn with_authorization(mut self, authorization: Authorization) -> Self {
        self.authorization = authorization;
        self
    }

    pub fn set_authorization(&mut self, authorization: Authorization) {
        self.authorization = authorization;
    }

    /// How many times `start()` has been called.
    pub fn start_count(&self) -> usize {
        self.start_count
    }

    pub fn is_updating(&self) -> bool {
        self.updating
    }
}

impl PositionSource for ReplayPositionSource {
    fn start(&mut self) -> Result<(), TransporterError> {
        self.start_count += 1;
        self.updating = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.updating = false;
    }

    fn latest_fix(&mut self) -> Result<Option<Fix>, TransporterError> {
        let Some(fix) = self.fixes.get(self.cur_tick).copied() else {
            return Ok(None);
        };
        self.cur_tick += 1;
        Ok(fix)
    }

    fn authorization(&self) -> Authorization {
        self.authorization
    }

    fn is_exhausted(&self) -> bool {
        self.cur_tick >= self.fixes.len()
    }
}

/// Simulates a drive at constant speed along a fixed heading.
///
/// Every call to `latest_fix()` advances the vehicle by one tick worth of travel.
pub struct SimulatedPositionSource {
    latitude: f64,
    longitude: f64,
    speed_mps: f64,
    heading_rad: f64,
    tick_s: f64,
    moved: bool,
}

impl SimulatedPositionSource {
    pub fn new(latitude: f64, longitude: f64, speed_mps: f64, heading_deg: f64, tick_s: f64) -> Self {
        Self {
            latitude,
            longitude,
            speed_mps,
            heading_rad: heading_deg.to_radians(),
            tick_s,
            moved: false,
        }
    }

    fn advance(&mut self) {
        let angular = self.speed_mps.max(0.) * self.tick_s / super::accumulator::EARTH_RADIUS_M;
        let lat1 = self.latitude.to_radians();
        let lon1 = self.longitude.to_radians();

        let lat2 = (lat1.sin() * angular.cos()
            + lat1.cos() * angular.sin() * self.heading_rad.cos())
        .asin();
        let lon2 = lon1
            + (self.heading_rad.sin() * angular.sin() * lat1.cos())
                .atan2(angular.cos() - lat1.sin() * lat2.sin());

        let (prev_lat, prev_lon) = (self.latitude, self.longitude);
        self.latitude = lat2.to_degrees();
        self.longitude = (lon2.to_degrees() + 540.) % 360. - 180.;
        debug!(
            "Simulated vehicle moved {:.2}m",
            haversine_distance_m(prev_lat, prev_lon, self.latitude, self.longitude)
        );
    }
}

impl PositionSource for SimulatedPositionSource {
    fn start(&mut self) -> Result<(), TransporterError> {
        Ok(())
    }

    fn stop(&mut self) {}

    fn latest_fix(&mut self) -> Result<Option<Fix>, TransporterError> {
        // the first fix is the starting point
        if self.moved {
            self.advance();
        }
        self.moved = true;
        Ok(Some(Fix::new(self.latitude, self.longitude, self.speed_mps)))
    }

    fn authorization(&self) -> Authorization {
        Authorization::Authorized
    }
}
