// Persistence of finalized sessions and the durable session id counter

pub mod counter;
pub mod store;

use itertools::Itertools;

use crate::telemetry::{Session, accumulator::mps_to_kmh};

pub use counter::{FileSessionCounter, InMemorySessionCounter, SessionCounter};
pub use store::{FileSessionStore, SessionRef, SessionStore};

/// Aggregate figures for a persisted session, used by `transporter show`.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub session_id: u64,
    pub samples: usize,
    pub duration_s: f64,
    pub distance_m: f64,
    pub max_speed_kmh: f64,
    pub avg_speed_kmh: f64,
    /// Largest time between two consecutive samples, i.e. the longest stretch without a fix
    pub longest_gap_s: f64,
}

impl SessionSummary {
    pub fn from_session(session: &Session) -> Self {
        let duration_s = session
            .session_end
            .map(|end| end - session.session_start)
            .unwrap_or(0.);
        let distance_m = session.data.last().map(|p| p.distance).unwrap_or(0.);
        let max_speed_kmh = session
            .data
            .iter()
            .map(|p| mps_to_kmh(p.speed))
            .fold(0., f64::max);
        let avg_speed_kmh = if session.data.is_empty() {
            0.
        } else {
            session.data.iter().map(|p| mps_to_kmh(p.speed)).sum::<f64>()
                / session.data.len() as f64
        };
        let longest_gap_s = session
            .data
            .iter()
            .tuple_windows()
            .map(|(a, b)| b.timestamp - a.timestamp)
            .fold(0., f64::max);

        Self {
            session_id: session.session_id,
            samples: session.data.len(),
            duration_s,
            distance_m,
            max_speed_kmh,
            avg_speed_kmh,
            longest_gap_s,
        }
    }
}
