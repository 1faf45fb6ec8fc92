use std::collections::VecDeque;

use simple_moving_average::{SMA, SumTreeSMA};
use uom::si::f64::Velocity;
use uom::si::velocity::{kilometer_per_hour, meter_per_second};

use super::{Fix, LiveTelemetry, ROLLING_WINDOW_CAPACITY, SamplePoint, SpeedSample};

/// Mean earth radius used for great-circle distances
pub(crate) const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in meters between two coordinates in decimal degrees.
pub fn haversine_distance_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

pub fn mps_to_kmh(speed_mps: f64) -> f64 {
    Velocity::new::<meter_per_second>(speed_mps).get::<kilometer_per_hour>()
}

pub fn kmh_to_mps(speed_kmh: f64) -> f64 {
    Velocity::new::<kilometer_per_hour>(speed_kmh).get::<meter_per_second>()
}

/// Bounded FIFO of recent speeds feeding the live chart.
pub struct RollingSpeedWindow {
    samples: VecDeque<SpeedSample>,
    average: SumTreeSMA<f64, f64, ROLLING_WINDOW_CAPACITY>,
}

impl RollingSpeedWindow {
    pub fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(ROLLING_WINDOW_CAPACITY),
            average: SumTreeSMA::new(),
        }
    }

    pub fn push(&mut self, sample: SpeedSample) {
        while self.samples.len() >= ROLLING_WINDOW_CAPACITY {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
        self.average.add_sample(sample.speed_kmh);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &VecDeque<SpeedSample> {
        &self.samples
    }

    pub fn average_speed_kmh(&self) -> f64 {
        if self.samples.is_empty() {
            0.
        } else {
            self.average.get_average()
        }
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.average = SumTreeSMA::new();
    }
}

impl Default for RollingSpeedWindow {
    fn default() -> Self {
        Self::new()
    }
}

/// Incremental metrics for the active session: distance, current speed and the
/// rolling speed window.
pub struct MetricAccumulator {
    last_fix: Option<Fix>,
    total_distance_m: f64,
    next_index: u64,
    current_speed_kmh: f64,
    window: RollingSpeedWindow,
}

impl MetricAccumulator {
    pub fn new() -> Self {
        Self {
            last_fix: None,
            total_distance_m: 0.,
            next_index: 0,
            current_speed_kmh: 0.,
            window: RollingSpeedWindow::new(),
        }
    }

    pub fn reset(&mut self) {
        self.last_fix = None;
        self.total_distance_m = 0.;
        self.next_index = 0;
        self.current_speed_kmh = 0.;
        self.window.clear();
    }

    /// Folds a fix taken at `timestamp` into the running metrics and returns the
    /// sample to append to the session.
    pub fn record(&mut self, fix: &Fix, timestamp: f64) -> SamplePoint {
        // unknown (negative) and non-finite speeds are stored as 0
        let speed_mps = if fix.speed_mps.is_finite() && fix.speed_mps >= 0. {
            fix.speed_mps
        } else {
            0.
        };
        self.current_speed_kmh = mps_to_kmh(speed_mps);

        if let Some(last) = self.last_fix {
            self.total_distance_m += haversine_distance_m(
                last.latitude,
                last.longitude,
                fix.latitude,
                fix.longitude,
            );
        }
        self.last_fix = Some(*fix);

        let sample = SamplePoint {
            index: self.next_index,
            timestamp,
            longitude: fix.longitude,
            latitude: fix.latitude,
            speed: speed_mps,
            distance: self.total_distance_m,
        };
        self.next_index += 1;

        self.window.push(SpeedSample {
            time: timestamp,
            speed_kmh: self.current_speed_kmh,
        });

        sample
    }

    pub fn live(&self) -> LiveTelemetry {
        LiveTelemetry {
            current_speed_kmh: self.current_speed_kmh,
            total_distance_m: self.total_distance_m,
            average_speed_kmh: self.window.average_speed_kmh(),
            rolling_window: self.window.samples().clone(),
        }
    }

    pub fn total_distance_m(&self) -> f64 {
        self.total_distance_m
    }

    pub fn current_speed_kmh(&self) -> f64 {
        self.current_speed_kmh
    }

    pub fn samples_recorded(&self) -> u64 {
        self.next_index
    }

    pub fn window(&self) -> &RollingSpeedWindow {
        &self.window
    }
}

impl Default for MetricAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const EPSILON: f64 = 1e-9;

    // 10 meters of latitude at the equator
    fn ten_meters_north() -> f64 {
        (10. / EARTH_RADIUS_M).to_degrees()
    }

    #[test]
    fn test_haversine_zero_for_same_point() {
        assert_eq!(haversine_distance_m(45.5, 9.2, 45.5, 9.2), 0.);
    }

    #[test]
    fn test_haversine_one_degree_latitude() {
        let d = haversine_distance_m(0., 0., 1., 0.);
        assert!((d - 111_194.93).abs() < 1., "got {}", d);
    }

    #[test]
    fn test_speed_conversion() {
        assert!((mps_to_kmh(10.) - 36.).abs() < EPSILON);
        assert_eq!(mps_to_kmh(0.), 0.);
        assert!((kmh_to_mps(36.) - 10.).abs() < EPSILON);
    }

    #[test]
    fn test_two_fixes_ten_meters_apart() {
        let mut accumulator = MetricAccumulator::new();

        let first = accumulator.record(&Fix::new(0., 0., 0.), 100.);
        let second = accumulator.record(&Fix::new(ten_meters_north(), 0., 10.), 101.);

        assert_eq!(first.index, 0);
        assert_eq!(first.distance, 0.);
        assert_eq!(first.speed, 0.);
        assert_eq!(second.index, 1);
        assert!((second.distance - 10.).abs() < 1e-6);
        assert_eq!(second.speed, 10.);

        let live = accumulator.live();
        assert!((live.total_distance_m - 10.).abs() < 1e-6);
        assert!((live.current_speed_kmh - 36.).abs() < EPSILON);
        assert_eq!(live.rolling_window.len(), 2);
    }

    #[test]
    fn test_negative_speed_is_clamped() {
        let mut accumulator = MetricAccumulator::new();
        let sample = accumulator.record(&Fix::new(1., 1., -1.), 0.);
        assert_eq!(sample.speed, 0.);
        assert_eq!(accumulator.current_speed_kmh(), 0.);
    }

    #[test]
    fn test_non_finite_speed_is_zeroed() {
        let mut accumulator = MetricAccumulator::new();
        for (i, speed) in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN].into_iter().enumerate() {
            let sample = accumulator.record(&Fix::new(1., 1., speed), i as f64);
            assert_eq!(sample.speed, 0.);
            assert_eq!(accumulator.current_speed_kmh(), 0.);
        }
        assert!(accumulator.live().average_speed_kmh.is_finite());
    }

    #[test]
    fn test_window_evicts_oldest_after_capacity() {
        let mut window = RollingSpeedWindow::new();
        for i in 0..=ROLLING_WINDOW_CAPACITY {
            window.push(SpeedSample {
                time: i as f64,
                speed_kmh: i as f64,
            });
        }

        assert_eq!(window.len(), ROLLING_WINDOW_CAPACITY);
        assert_eq!(window.samples().front().unwrap().time, 1.);
        assert_eq!(
            window.samples().back().unwrap().time,
            ROLLING_WINDOW_CAPACITY as f64
        );
    }

    #[test]
    fn test_window_average() {
        let mut window = RollingSpeedWindow::new();
        assert_eq!(window.average_speed_kmh(), 0.);
        window.push(SpeedSample {
            time: 0.,
            speed_kmh: 10.,
        });
        window.push(SpeedSample {
            time: 1.,
            speed_kmh: 30.,
        });
        assert!((window.average_speed_kmh() - 20.).abs() < EPSILON);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut accumulator = MetricAccumulator::new();
        accumulator.record(&Fix::new(0., 0., 5.), 0.);
        accumulator.record(&Fix::new(0.001, 0., 5.), 1.);

        accumulator.reset();

        assert_eq!(accumulator.total_distance_m(), 0.);
        assert_eq!(accumulator.samples_recorded(), 0);
        assert!(accumulator.window().is_empty());
        let sample = accumulator.record(&Fix::new(10., 10., 5.), 2.);
        assert_eq!(sample.index, 0);
        assert_eq!(sample.distance, 0.);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_distance_is_sum_of_pairwise_haversine(
            fixes in prop::collection::vec((-60.0f64..60.0, -170.0f64..170.0, -5.0f64..60.0), 1..50),
        ) {
            let mut accumulator = MetricAccumulator::new();
            let mut expected = 0.;
            let mut previous: Option<(f64, f64)> = None;
            let mut last_distance = 0.;

            for (i, (lat, lon, speed)) in fixes.iter().enumerate() {
                let sample = accumulator.record(&Fix::new(*lat, *lon, *speed), i as f64);
                if let Some((plat, plon)) = previous {
                    expected += haversine_distance_m(plat, plon, *lat, *lon);
                }
                previous = Some((*lat, *lon));

                prop_assert_eq!(sample.index, i as u64);
                prop_assert!(sample.distance >= last_distance);
                prop_assert!(sample.speed >= 0.);
                prop_assert!((sample.distance - expected).abs() <= 1e-6 * expected.max(1.));
                last_distance = sample.distance;
            }
        }

        #[test]
        fn prop_window_never_exceeds_capacity(pushes in 0usize..200) {
            let mut window = RollingSpeedWindow::new();
            for i in 0..pushes {
                window.push(SpeedSample { time: i as f64, speed_kmh: 1. });
                prop_assert!(window.len() <= ROLLING_WINDOW_CAPACITY);
            }
            prop_assert_eq!(window.len(), pushes.min(ROLLING_WINDOW_CAPACITY));
            if pushes > 0 {
                prop_assert_eq!(window.samples().back().unwrap().time, (pushes - 1) as f64);
            }
        }
    }
}
