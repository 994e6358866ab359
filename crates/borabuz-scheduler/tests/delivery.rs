//! End-to-end behavior of the queue: foreground and runtime each hold their
//! own connection to one database file.

use std::sync::Arc;
use std::time::Duration;

use borabuz_core::alert::{AlertConfig, Direction, ItemType, Permission};
use borabuz_core::config::Locale;
use borabuz_core::dataset::LineDirectory;
use borabuz_scheduler::{
    AlertDb, DeliveryRuntime, ForegroundBridge, MemoryPlatform, RuntimeOptions, RuntimeState,
};
use chrono::{DateTime, FixedOffset, Local, TimeZone, Timelike};
use tempfile::TempDir;

fn at(day: u32, h: u32, m: u32) -> DateTime<FixedOffset> {
    FixedOffset::west_opt(3 * 3600)
        .unwrap()
        .with_ymd_and_hms(2026, 3, day, h, m, 0)
        .unwrap()
}

fn options(locale: Locale) -> RuntimeOptions {
    RuntimeOptions {
        poll_interval: Duration::from_secs(3600),
        rescan_delay: Duration::from_millis(10),
        retention: None,
        daily_rearm: false,
        fast_timers: false,
        locale,
    }
}

struct Harness {
    dir: TempDir,
    platform: Arc<MemoryPlatform>,
}

impl Harness {
    fn new() -> Self {
        let harness = Self {
            dir: tempfile::tempdir().unwrap(),
            platform: Arc::new(MemoryPlatform::new()),
        };
        harness.connect().set_permission(Permission::Granted).unwrap();
        harness
    }

    /// A fresh connection, as a separate execution context would open.
    fn connect(&self) -> Arc<AlertDb> {
        Arc::new(AlertDb::open(&self.dir.path().join("borabuz.db")).unwrap())
    }

    fn runtime(&self, directory: LineDirectory, locale: Locale) -> DeliveryRuntime {
        DeliveryRuntime::new(
            self.connect(),
            self.platform.clone(),
            Arc::new(directory),
            options(locale),
        )
    }
}

fn b1() -> AlertConfig {
    AlertConfig::new(ItemType::Line, "b1", "B1", None)
        .with_recurring_times(["07:10"])
        .with_advance_times([10])
}

#[tokio::test]
async fn b1_ten_minutes_ahead() {
    let h = Harness::new();
    let rt = h.runtime(LineDirectory::builtin(), Locale::En);

    let records = rt.scheduler().schedule_at(&b1(), &at(2, 6, 55)).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].scheduled_time_epoch_ms, at(2, 7, 0).timestamp_millis());

    let report = rt.scan_at(&at(2, 7, 0)).await.unwrap();
    assert_eq!(report.delivered, 1);
    let shown = h.platform.shown();
    assert_eq!(shown[0].title, "Line B1");
    assert_eq!(shown[0].body, "Departing in 10 minutes (07:10)");
    assert_eq!(shown[0].display_title(), "🚌 Line B1");
}

#[tokio::test]
async fn stop_after_five_lists_each_line() {
    let directory = LineDirectory::from_json(
        r#"{
            "lines": [
                {"id": "b2", "name": "B2", "routeIda": ["a"], "routeVolta": ["x", "y", "ics"], "schedules": ["07:00"]},
                {"id": "b5", "name": "B5", "routeIda": ["ics"], "routeVolta": ["z", "ics"], "schedules": ["07:00"]},
                {"id": "b9", "name": "B9", "routeIda": ["a"], "routeVolta": ["b"], "schedules": ["07:00"]}
            ],
            "stops": [{"id": "ics", "name": "ICS"}]
        }"#,
    )
    .unwrap();
    let h = Harness::new();
    let rt = h.runtime(directory, Locale::PtBr);

    let cfg = AlertConfig::new(ItemType::Stop, "ics", "ICS", None)
        .with_recurring_times(["07:00"])
        .with_advance_times([])
        .with_after_departure_times([5])
        .with_stop_directions([Direction::Inbound]);
    rt.scheduler().schedule_at(&cfg, &at(2, 6, 0)).unwrap();
    rt.scan_at(&at(2, 7, 5)).await.unwrap();

    let shown = h.platform.shown();
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].title, "Ponto ICS");
    assert_eq!(
        shown[0].body,
        "B2 (Volta) iniciou há 5min - 2 paradas até você. B5 (Volta) iniciou há 5min - 1 paradas até você."
    );
}

#[tokio::test]
async fn reschedule_is_idempotent_across_connections() {
    let h = Harness::new();
    let foreground = h.connect();
    let rt = h.runtime(LineDirectory::builtin(), Locale::PtBr);
    let cfg = b1()
        .with_recurring_times(["07:10", "12:10", "18:10"])
        .with_after_departure_times([5, 15]);

    rt.scheduler().schedule_at(&cfg, &at(2, 9, 0)).unwrap();
    let once: Vec<_> = foreground
        .all_records()
        .unwrap()
        .into_iter()
        .map(|r| (r.id, r.scheduled_time_epoch_ms))
        .collect();
    rt.scheduler().schedule_at(&cfg, &at(2, 9, 0)).unwrap();
    let twice: Vec<_> = foreground
        .all_records()
        .unwrap()
        .into_iter()
        .map(|r| (r.id, r.scheduled_time_epoch_ms))
        .collect();

    assert_eq!(once.len(), 9);
    assert_eq!(once, twice);
}

#[tokio::test]
async fn cancellation_purges_every_direction_and_offset() {
    let h = Harness::new();
    let rt = h.runtime(LineDirectory::builtin(), Locale::PtBr);
    for direction in [None, Some(Direction::Outbound), Some(Direction::Inbound)] {
        let mut cfg = b1().with_after_departure_times([5]);
        cfg.direction = direction;
        rt.scheduler().schedule_at(&cfg, &at(2, 6, 0)).unwrap();
    }
    let b10 = AlertConfig::new(ItemType::Line, "b10", "B10", None).with_recurring_times(["07:10"]);
    rt.scheduler().schedule_at(&b10, &at(2, 6, 0)).unwrap();

    assert_eq!(rt.scheduler().cancel(ItemType::Line, "b1").unwrap(), 6);
    rt.scan_at(&at(3, 8, 0)).await.unwrap();

    let shown = h.platform.shown();
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].title, "Linha B10");
}

#[tokio::test]
async fn directions_cancel_independently() {
    let h = Harness::new();
    let rt = h.runtime(LineDirectory::builtin(), Locale::PtBr);
    let mut ida = b1();
    ida.direction = Some(Direction::Outbound);
    let mut volta = b1();
    volta.direction = Some(Direction::Inbound);
    rt.scheduler().schedule_at(&ida, &at(2, 6, 0)).unwrap();
    rt.scheduler().schedule_at(&volta, &at(2, 6, 0)).unwrap();

    rt.scheduler()
        .cancel_direction(ItemType::Line, "b1", Some(Direction::Inbound))
        .unwrap();
    let left = h.connect().all_records().unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].id, "line-b1:ida-07:10-advance-10");
}

#[tokio::test]
async fn disabled_config_only_purges() {
    let h = Harness::new();
    let rt = h.runtime(LineDirectory::builtin(), Locale::PtBr);
    rt.scheduler().schedule_at(&b1(), &at(2, 6, 0)).unwrap();

    let created = rt
        .scheduler()
        .schedule_at(&b1().with_recurring_times(["07:10", "08:10"]).disabled(), &at(2, 6, 0))
        .unwrap();
    assert!(created.is_empty());
    assert!(h.connect().all_records().unwrap().is_empty());
}

#[tokio::test]
async fn crash_between_render_and_commit_redelivers() {
    let h = Harness::new();
    let now = at(2, 7, 0);
    {
        let rt = h.runtime(LineDirectory::builtin(), Locale::PtBr);
        rt.scheduler().schedule_at(&b1(), &at(2, 6, 55)).unwrap();
        let due = rt.due_records(now.timestamp_millis()).unwrap();
        assert_eq!(due.len(), 1);
        rt.deliver(&due[0]).await.unwrap();
        // Runtime dies here: processed is never written.
    }

    let rt = h.runtime(LineDirectory::builtin(), Locale::PtBr);
    let report = rt.scan_at(&now).await.unwrap();
    assert_eq!(report.delivered, 1);

    let shown = h.platform.shown();
    assert_eq!(shown.len(), 2);
    assert_eq!(shown[0].source, shown[1].source);
    assert!(rt.due_records(now.timestamp_millis()).unwrap().is_empty());
}

#[tokio::test]
async fn zero_offset_at_current_minute_fires_on_next_scan() {
    let h = Harness::new();
    let rt = h.runtime(LineDirectory::builtin(), Locale::PtBr);
    let now = at(2, 8, 0) + chrono::Duration::seconds(42);
    let cfg = AlertConfig::new(ItemType::Line, "b4", "B4", None).with_recurring_times(["08:00"]);

    let records = rt.scheduler().schedule_at(&cfg, &now).unwrap();
    assert_eq!(records[0].scheduled_time_epoch_ms, at(2, 8, 0).timestamp_millis());
    assert_eq!(rt.scan_at(&now).await.unwrap().delivered, 1);
    assert_eq!(h.platform.shown()[0].body, "Saída agora às 08:00");
}

#[tokio::test]
async fn bridge_to_spawned_runtime() {
    let h = Harness::new();
    let handle = h.runtime(LineDirectory::builtin(), Locale::PtBr).spawn();
    let bridge = ForegroundBridge::new(h.connect(), h.platform.clone(), handle.sender());
    assert_eq!(handle.state(), RuntimeState::Dormant);

    if Local::now().second() >= 55 {
        tokio::time::sleep(Duration::from_secs(6)).await;
    }
    let now = Local::now();
    let cfg = AlertConfig::new(ItemType::Line, "b3", "B3", None)
        .with_recurring_times([format!("{:02}:{:02}", now.hour(), now.minute())]);
    assert!(bridge.apply_config(&cfg).await);

    tokio::time::timeout(Duration::from_secs(5), async {
        while h.platform.shown().is_empty() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(h.platform.shown()[0].title, "Linha B3");
    assert_ne!(handle.state(), RuntimeState::Dormant);

    bridge.teardown(ItemType::Line, "b3");
    handle.shutdown().await;
    assert!(h.connect().all_records().unwrap().is_empty());
    assert!(bridge.store().list().unwrap().is_empty());
}

#[tokio::test]
async fn editing_within_the_firing_minute_does_not_repeat_it() {
    let h = Harness::new();
    let rt = h.runtime(LineDirectory::builtin(), Locale::PtBr);
    let secs = |s| at(2, 7, 0) + chrono::Duration::seconds(s);
    let cfg = AlertConfig::new(ItemType::Line, "b4", "B4", None).with_recurring_times(["07:00"]);

    rt.scheduler().schedule_at(&cfg, &secs(10)).unwrap();
    assert_eq!(rt.scan_at(&secs(11)).await.unwrap().delivered, 1);

    rt.scheduler()
        .schedule_at(&cfg.clone().with_after_departure_times([5]), &secs(40))
        .unwrap();
    assert_eq!(rt.scan_at(&secs(41)).await.unwrap().delivered, 0);
    rt.scheduler().schedule_at(&cfg, &secs(50)).unwrap();
    assert_eq!(rt.scan_at(&secs(51)).await.unwrap().delivered, 0);

    let bodies: Vec<_> = h.platform.shown().into_iter().map(|n| n.body).collect();
    assert_eq!(bodies, ["Saída agora às 07:00"]);
}

#[tokio::test]
async fn records_on_the_same_instant_fire_independently() {
    let h = Harness::new();
    let rt = h.runtime(LineDirectory::builtin(), Locale::PtBr);
    let cfg = AlertConfig::new(ItemType::Line, "b1", "B1", None)
        .with_recurring_times(["07:50", "08:10"])
        .with_advance_times([10])
        .with_after_departure_times([10]);

    let records = rt.scheduler().schedule_at(&cfg, &at(2, 6, 0)).unwrap();
    let eight: Vec<_> = records
        .iter()
        .filter(|r| r.scheduled_time_epoch_ms == at(2, 8, 0).timestamp_millis())
        .collect();
    assert_eq!(eight.len(), 2);
    assert_ne!(eight[0].id, eight[1].id);

    rt.scan_at(&at(2, 7, 59)).await.unwrap();
    let before = h.platform.shown().len();
    let report = rt.scan_at(&at(2, 8, 0)).await.unwrap();
    assert_eq!(report.delivered, 2);

    let bodies: Vec<_> = h.platform.shown()[before..].iter().map(|n| n.body.clone()).collect();
    assert_eq!(
        bodies,
        ["Saída iniciada há 10 minutos (07:50)", "Saída em 10 minutos (08:10)"]
    );
}
