// Integration tests for the recording engine
//
// These drive a full recording through the public API:
// 1. Feed fixes from a replay file or an in-memory script
// 2. Sample on manual ticks
// 3. Stop and persist to a temporary directory
// 4. Re-read the persisted file and check the contract downstream readers rely on

use std::io::Write;

use proptest::prelude::*;
use tempfile::{NamedTempFile, TempDir};
use transporter::{
    AppConfig, FileSessionCounter, FileSessionStore, Fix, RecordingController, Session,
    PositionSource, SessionCounter, SessionStore, TyreType,
    session::InMemorySessionCounter,
    telemetry::{ReplayPositionSource, accumulator::haversine_distance_m},
};

fn manual_controller(
    source: ReplayPositionSource,
    temp_dir: &TempDir,
) -> RecordingController<ReplayPositionSource> {
    RecordingController::new(
        source,
        FileSessionStore::new(temp_dir.path().join("sessions")).unwrap(),
        FileSessionCounter::new(temp_dir.path().join("counter.json")),
        AppConfig {
            tyre_type: Some(TyreType::AllSeason),
            driver_name: "Ada".to_string(),
            ..Default::default()
        },
    )
    .with_tick_period(None)
}

fn persisted_sessions(temp_dir: &TempDir) -> Vec<Session> {
    let store = FileSessionStore::new(temp_dir.path().join("sessions")).unwrap();
    store
        .list_sessions()
        .unwrap()
        .iter()
        .map(|r| store.load(r).unwrap())
        .collect()
}

#[test]
fn test_replayed_drive_is_persisted() {
    let mut replay = NamedTempFile::new().unwrap();
    for line in [
        r#"{"latitude": 45.4642, "longitude": 9.19, "speed_mps": 0.0}"#,
        r#"{"latitude": 45.4643, "longitude": 9.19, "speed_mps": 11.1}"#,
        "null",
        r#"{"latitude": 45.4645, "longitude": 9.1902, "speed_mps": -1.0}"#,
    ] {
        writeln!(replay, "{}", line).unwrap();
    }
    replay.flush().unwrap();

    let temp_dir = TempDir::new().unwrap();
    let source = ReplayPositionSource::from_file(replay.path()).unwrap();
    let mut controller = manual_controller(source, &temp_dir);

    controller.start().unwrap();
    while !controller.source().is_exhausted() {
        controller.on_tick();
    }
    let path = controller.stop().unwrap();

    let sessions = persisted_sessions(&temp_dir);
    assert_eq!(sessions.len(), 1);
    let session = &sessions[0];

    assert_eq!(session.data.len(), 3);
    assert_eq!(
        session.data.iter().map(|p| p.index).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
    assert_eq!(session.data[2].speed, 0.);
    let expected = haversine_distance_m(45.4642, 9.19, 45.4643, 9.19)
        + haversine_distance_m(45.4643, 9.19, 45.4645, 9.1902);
    assert!((session.data[2].distance - expected).abs() < 1e-9);
    assert_eq!(session.tyre_type, Some(TyreType::AllSeason));
    assert_eq!(session.driver_name.as_deref(), Some("Ada"));

    let file_name = path.file_name().unwrap().to_str().unwrap();
    assert!(file_name.ends_with(&format!("_session_{}.json", session.session_id)));
    // yyyy-MM-dd_HH-mm-ss prefix
    let prefix = &file_name[..19];
    assert_eq!(prefix.len(), 19);
    assert_eq!(&prefix[4..5], "-");
    assert_eq!(&prefix[10..11], "_");
    assert_eq!(&prefix[13..14], "-");
}

#[test]
fn test_raw_file_layout() {
    let temp_dir = TempDir::new().unwrap();
    let source = ReplayPositionSource::from_fixes(vec![Some(Fix::new(45.0, 9.0, 3.0))]);
    let mut controller = manual_controller(source, &temp_dir);

    controller.start().unwrap();
    controller.on_tick();
    let path = controller.stop().unwrap();

    let content = std::fs::read_to_string(path).unwrap();
    let mut last = 0;
    for key in [
        "\"session_id\"",
        "\"session_start\"",
        "\"session_end\"",
        "\"data\"",
        "\"index\"",
        "\"timestamp\"",
        "\"longitude\"",
        "\"latitude\"",
        "\"speed\"",
        "\"distance\"",
        "\"tyreType\"",
        "\"driverName\"",
    ] {
        let position = content.find(key).unwrap_or_else(|| panic!("missing {}", key));
        assert!(position >= last, "{} out of order in\n{}", key, content);
        last = position;
    }

    let value: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert!(value["session_start"].is_f64());
    assert!(value["session_end"].as_f64().unwrap() >= value["session_start"].as_f64().unwrap());
    assert_eq!(value["tyreType"], "All Season");
}

#[test]
fn test_counter_is_durable_across_controllers() {
    let temp_dir = TempDir::new().unwrap();

    let mut first = manual_controller(ReplayPositionSource::from_fixes(vec![]), &temp_dir);
    let first_id = first.start().unwrap();
    first.stop().unwrap();
    drop(first);

    let mut second = manual_controller(ReplayPositionSource::from_fixes(vec![]), &temp_dir);
    let second_id = second.start().unwrap();
    second.stop().unwrap();

    assert!(second_id > first_id);
    let counter = FileSessionCounter::new(temp_dir.path().join("counter.json"));
    assert_eq!(counter.last_session_id().unwrap(), second_id);

    let ids: Vec<u64> = persisted_sessions(&temp_dir)
        .iter()
        .map(|s| s.session_id)
        .collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&first_id) && ids.contains(&second_id));
    assert!(
        persisted_sessions(&temp_dir)
            .iter()
            .all(|s| s.data.is_empty())
    );
}

#[test]
fn test_archive_operations_do_not_touch_active_session() {
    let temp_dir = TempDir::new().unwrap();
    let mut controller = manual_controller(
        ReplayPositionSource::from_fixes(vec![Some(Fix::new(1., 1., 1.)); 4]),
        &temp_dir,
    );

    controller.start().unwrap();
    controller.on_tick();
    controller.stop().unwrap();

    controller.start().unwrap();
    controller.on_tick();

    let archived = controller.store().list_sessions().unwrap();
    assert_eq!(archived.len(), 1);
    let exported = controller.store().export_refs(&archived).unwrap();
    assert_eq!(exported.len(), 1);
    assert_eq!(controller.active_session().unwrap().data.len(), 1);
    assert!(controller.is_recording());

    controller.stop().unwrap();
    assert_eq!(persisted_sessions(&temp_dir).len(), 2);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_indices_are_gap_free(
        script in prop::collection::vec(
            prop::option::of((-80.0f64..80.0, -179.0f64..179.0, -2.0f64..50.0)),
            0..80,
        ),
    ) {
        let fixes: Vec<Option<Fix>> = script
            .iter()
            .copied()
            .map(|entry| entry.map(|(lat, lon, speed)| Fix::new(lat, lon, speed)))
            .collect();
        let valid: Vec<Fix> = fixes.iter().flatten().copied().collect();

        let temp_dir = TempDir::new().unwrap();
        let mut controller = RecordingController::new(
            ReplayPositionSource::from_fixes(fixes.clone()),
            FileSessionStore::new(temp_dir.path().to_path_buf()).unwrap(),
            InMemorySessionCounter::default(),
            AppConfig::default(),
        )
        .with_tick_period(None);

        controller.start().unwrap();
        for _ in 0..fixes.len() {
            controller.on_tick();
        }
        prop_assert!(controller.live().rolling_window.len() <= 60);
        prop_assert_eq!(
            controller.live().rolling_window.len(),
            valid.len().min(60)
        );
        controller.stop().unwrap();

        let store = FileSessionStore::new(temp_dir.path().to_path_buf()).unwrap();
        let session = store.load(&store.list_sessions().unwrap()[0]).unwrap();

        prop_assert_eq!(session.data.len(), valid.len());
        let mut expected_distance = 0.;
        for (i, point) in session.data.iter().enumerate() {
            prop_assert_eq!(point.index, i as u64);
            if i > 0 {
                expected_distance += haversine_distance_m(
                    valid[i - 1].latitude,
                    valid[i - 1].longitude,
                    valid[i].latitude,
                    valid[i].longitude,
                );
                prop_assert!(point.distance >= session.data[i - 1].distance);
            }
            prop_assert!((point.distance - expected_distance).abs() <= 1e-6 * expected_distance.max(1.));
            prop_assert!(point.speed >= 0.);
        }
    }
}
