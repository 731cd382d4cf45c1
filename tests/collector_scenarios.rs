use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rstest::rstest;
use stepledger::{
    Baseline, BaselineStore, CollectorController, CollectorEvent, CollectorSettings,
    CollectorStatus, Database, FileBaselineStore, LocationFix, MemoryBaselineStore, RawReading,
    ResetPolicy, StaticCapabilities,
};

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

fn controller() -> CollectorController {
    CollectorController::new(Arc::new(StaticCapabilities {
        step_counter: true,
        step_detector: true,
    }))
}

async fn run_readings(settings: &CollectorSettings, counts: &[u64]) {
    let mut controller = controller();
    let inputs = controller.start(settings).await.unwrap();
    assert_eq!(controller.status(), CollectorStatus::Running);

    for (i, count) in counts.iter().enumerate() {
        inputs
            .readings
            .send(RawReading::new(*count, at(i as i64)))
            .await
            .unwrap();
    }

    controller.stop().await.unwrap();
    assert_eq!(controller.status(), CollectorStatus::Stopped);
}

async fn step_counts(settings: &CollectorSettings) -> Vec<u64> {
    let db = Database::new(settings.ledger_path.clone()).unwrap();
    db.list_step_sessions(0, 1_000)
        .await
        .unwrap()
        .into_iter()
        .map(|row| row.step_count)
        .collect()
}

#[tokio::test]
async fn forward_readings_produce_cumulative_rows() {
    let dir = tempfile::tempdir().unwrap();
    let settings = CollectorSettings::in_dir(dir.path());

    run_readings(&settings, &[100, 105, 112]).await;

    assert_eq!(step_counts(&settings).await, vec![5, 12]);
    let db = Database::new(settings.ledger_path.clone()).unwrap();
    assert_eq!(db.last_step_count().await.unwrap(), 12);
}

#[rstest]
#[case(ResetPolicy::CreditPostResetCount, vec![5, 8])]
#[case(ResetPolicy::CreditSingleStep, vec![5, 6])]
#[tokio::test]
async fn counter_reset_keeps_totals_non_decreasing(
    #[case] policy: ResetPolicy,
    #[case] expected: Vec<u64>,
) {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = CollectorSettings::in_dir(dir.path());
    settings.reset_policy = policy;

    run_readings(&settings, &[100, 105, 3]).await;

    assert_eq!(step_counts(&settings).await, expected);
}

#[tokio::test]
async fn baseline_and_totals_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let settings = CollectorSettings::in_dir(dir.path());

    run_readings(&settings, &[100, 105]).await;
    let stored = FileBaselineStore::new(settings.baseline_path.clone())
        .unwrap()
        .load()
        .unwrap();
    assert_eq!(stored, Some(Baseline::new(105)));

    // New process: the first reading is a delta against the persisted baseline.
    run_readings(&settings, &[111, 120]).await;

    assert_eq!(step_counts(&settings).await, vec![5, 11, 20]);
}

#[tokio::test]
async fn fresh_install_appends_nothing_for_first_reading() {
    let dir = tempfile::tempdir().unwrap();
    let settings = CollectorSettings::in_dir(dir.path());

    run_readings(&settings, &[9_000]).await;

    assert!(step_counts(&settings).await.is_empty());
}

#[tokio::test]
async fn fixes_feed_location_into_rows() {
    let dir = tempfile::tempdir().unwrap();
    let settings = CollectorSettings::in_dir(dir.path());
    let store = Arc::new(MemoryBaselineStore::new(Some(Baseline::new(0))));

    let mut controller = controller().with_baseline_store(store.clone());
    let mut events = controller.subscribe();
    let inputs = controller.start(&settings).await.unwrap();

    inputs.readings.send(RawReading::new(10, at(1))).await.unwrap();
    // Wait for the first row so the fix below is ordered after it.
    loop {
        if let CollectorEvent::RowAppended { .. } = events.recv().await.unwrap() {
            break;
        }
    }

    inputs
        .fixes
        .send(LocationFix {
            latitude: 40.0,
            longitude: -74.0,
            time: at(2),
            speed: None,
        })
        .await
        .unwrap();
    inputs
        .fixes
        .send(LocationFix {
            latitude: 40.0,
            longitude: -74.0,
            time: at(2),
            speed: None,
        })
        .await
        .unwrap();
    // Fixes and readings travel on separate channels; let the fixes land first.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    inputs.readings.send(RawReading::new(25, at(3))).await.unwrap();

    let db = controller.ledger().unwrap();
    controller.stop().await.unwrap();

    let rows = db.list_step_sessions(0, 10).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!((rows[0].latitude, rows[0].longitude, rows[0].speed), (0.0, 0.0, 0.0));
    assert_eq!(rows[1].step_count, 25);
    assert_eq!((rows[1].latitude, rows[1].longitude), (40.0, -74.0));
    assert_eq!(rows[1].speed, 0.0);
    assert_eq!(store.load().unwrap(), Some(Baseline::new(25)));
}

#[tokio::test]
async fn lifecycle_events_are_broadcast() {
    let dir = tempfile::tempdir().unwrap();
    let settings = CollectorSettings::in_dir(dir.path());

    let mut controller = controller();
    let mut events = controller.subscribe();
    let inputs = controller.start(&settings).await.unwrap();
    let start_date = controller.start_date().unwrap();

    inputs.readings.send(RawReading::new(50, at(1))).await.unwrap();
    inputs.readings.send(RawReading::new(52, at(2))).await.unwrap();
    controller.stop().await.unwrap();

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }

    assert_eq!(seen.first(), Some(&CollectorEvent::Started { start_date }));
    assert!(seen.contains(&CollectorEvent::BaselineEstablished {
        cumulative_count: 50
    }));
    assert!(seen
        .iter()
        .any(|e| matches!(e, CollectorEvent::RowAppended { step_count: 2, .. })));
    assert_eq!(seen.last(), Some(&CollectorEvent::Stopped));
}

#[tokio::test]
async fn sync_collaborator_can_mark_rows() {
    let dir = tempfile::tempdir().unwrap();
    let settings = CollectorSettings::in_dir(dir.path());
    run_readings(&settings, &[0, 4, 9, 15]).await;

    let db = Database::new(settings.ledger_path.clone()).unwrap();
    let pending = db.unsynced_step_sessions(10).await.unwrap();
    assert_eq!(pending.len(), 3);

    db.mark_synced_through(pending[1].id).await.unwrap();

    let remaining = db.unsynced_step_sessions(10).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].step_count, 15);
}
