use core::sync::atomic::{AtomicU32, Ordering};
use core::time::Duration as StdDuration;
use std::{collections::HashMap, fs, sync::Arc};

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, TimeZone};
use omon::{
    config::{Credentials, Status, Timings},
    poller::Poller,
    portal::{CycleError, Launcher, Orchestrator, OrderPortal},
    snapshot::SnapshotStore,
    util::Clock,
};
use serde_json::Value;
use tempfile::tempdir;

/// Each call is three minutes after the previous one.
struct StepClock {
    start: DateTime<FixedOffset>,
    calls: AtomicU32,
}

impl StepClock {
    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> Self {
        let start = FixedOffset::east_opt(8 * 3600)
            .unwrap()
            .with_ymd_and_hms(y, m, d, h, min, 0)
            .unwrap();
        Self {
            start,
            calls: AtomicU32::new(0),
        }
    }
}

impl Clock for StepClock {
    fn now(&self) -> DateTime<FixedOffset> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.start + Duration::minutes(3 * i64::from(n))
    }
}

#[derive(Clone, Default)]
struct Script {
    counts: HashMap<NaiveDate, [u32; 4]>,
    reject_login: bool,
    unreachable: Option<NaiveDate>,
}

struct ScriptedPortal {
    script: Script,
    on_login_page: bool,
    date: Option<NaiveDate>,
    checked: Vec<Status>,
    shown: Option<u32>,
}

impl OrderPortal for ScriptedPortal {
    fn login(&mut self, _: &Credentials) -> anyhow::Result<()> {
        self.on_login_page = self.script.reject_login;
        Ok(())
    }

    fn logged_in(&mut self) -> anyhow::Result<bool> {
        Ok(!self.on_login_page)
    }

    fn open_orders(&mut self, date: NaiveDate) -> anyhow::Result<()> {
        if self.script.unreachable == Some(date) {
            anyhow::bail!("net::ERR_CONNECTION_RESET");
        }
        self.date = Some(date);
        self.shown = None;
        Ok(())
    }

    fn toggle_merchant_delivery(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn open_status_menu(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn clear_statuses(&mut self) -> anyhow::Result<()> {
        self.checked.clear();
        Ok(())
    }

    fn check_status(&mut self, status: Status) -> anyhow::Result<()> {
        self.checked.push(status);
        Ok(())
    }

    fn apply_filter(&mut self) -> anyhow::Result<()> {
        let counts = self
            .date
            .and_then(|d| self.script.counts.get(&d))
            .copied()
            .unwrap_or_default();
        let shown = Status::ALL
            .iter()
            .zip(counts)
            .filter(|(s, _)| self.checked.contains(s))
            .map(|(_, c)| c)
            .sum();
        self.shown = Some(shown);
        Ok(())
    }

    fn result_label(&mut self) -> anyhow::Result<String> {
        if self.on_login_page {
            anyhow::bail!("no result label on the login page");
        }
        Ok(format!("結果 (共 {} 件)", self.shown.unwrap_or(99)))
    }
}

struct ScriptedLauncher {
    script: Script,
    launches: Arc<AtomicU32>,
}

impl Launcher for ScriptedLauncher {
    type Portal = ScriptedPortal;

    fn launch(&self) -> anyhow::Result<ScriptedPortal> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptedPortal {
            script: self.script.clone(),
            on_login_page: true,
            date: None,
            checked: Vec::new(),
            shown: None,
        })
    }
}

fn date(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

fn orchestrator(script: Script, store: SnapshotStore, clock: Arc<dyn Clock>) -> Orchestrator<ScriptedLauncher> {
    Orchestrator {
        launcher: ScriptedLauncher {
            script,
            launches: Arc::default(),
        },
        credentials: Credentials::from_parts(Some("shop".into()), Some("pw".into())).unwrap(),
        store,
        clock,
        timings: Timings::instant(),
        status_msg: "polling".to_owned(),
        verify_login: true,
    }
}

fn two_days() -> Script {
    Script {
        counts: HashMap::from([
            (date("2025-01-10"), [5, 3, 2, 0]),
            (date("2025-01-11"), [0, 0, 0, 0]),
        ]),
        ..Script::default()
    }
}

#[test]
fn cycle_writes_both_days() {
    let dir = tempdir().unwrap();
    let store = SnapshotStore::new(dir.path().join("order_data.json"));
    let clock = Arc::new(StepClock::at(2025, 1, 10, 9, 0));
    let cycle = orchestrator(two_days(), store.clone(), clock);

    let first = cycle.run_cycle().unwrap();
    assert_eq!(first.today.get(Status::Confirmed), Some("5"));
    assert_eq!(first.today.get(Status::Acknowledged), Some("3"));
    assert_eq!(first.today.get(Status::Packed), Some("2"));
    assert_eq!(first.today.get(Status::Picked), Some("0"));
    assert_eq!(first.tomorrow.date.as_deref(), Some("2025-01-11"));
    assert_eq!(first.tomorrow.get(Status::Confirmed), Some("0"));
    assert_eq!(first.status_msg.as_deref(), Some("polling"));

    let second = cycle.run_cycle().unwrap();
    let (a, b) = (first.last_updated.unwrap(), second.last_updated.unwrap());
    assert!(!a.is_empty());
    assert!(b > a, "{b} should be newer than {a}");
    assert_eq!(second.seq, first.seq + 1);

    let on_disk = store.load().unwrap().unwrap();
    assert_eq!(on_disk.today.get(Status::Packed), Some("2"));
    assert_eq!(on_disk.last_updated.as_deref(), Some(b.as_str()));
}

#[test]
fn cycle_keeps_foreign_keys() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("order_data.json");
    fs::write(&path, r#"{"today": {}, "tomorrow": {}, "shop_name": "H0956"}"#).unwrap();
    let cycle = orchestrator(
        two_days(),
        SnapshotStore::new(&path),
        Arc::new(StepClock::at(2025, 1, 10, 9, 0)),
    );

    cycle.run_cycle().unwrap();

    let raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["shop_name"], "H0956");
    assert_eq!(raw["today"]["date"], "2025-01-10");
    assert_eq!(raw["today"]["PACKED"], "2");
}

#[test]
fn tomorrow_crosses_the_month() {
    let dir = tempdir().unwrap();
    let cycle = orchestrator(
        Script::default(),
        SnapshotStore::new(dir.path().join("order_data.json")),
        Arc::new(StepClock::at(2025, 1, 31, 23, 59)),
    );

    let snapshot = cycle.run_cycle().unwrap();
    assert_eq!(snapshot.today.date.as_deref(), Some("2025-01-31"));
    assert_eq!(snapshot.tomorrow.date.as_deref(), Some("2025-02-01"));
}

#[test]
fn rejected_login_writes_nothing() {
    let dir = tempdir().unwrap();
    let store = SnapshotStore::new(dir.path().join("order_data.json"));
    let script = Script {
        reject_login: true,
        ..two_days()
    };
    let cycle = orchestrator(script, store.clone(), Arc::new(StepClock::at(2025, 1, 10, 9, 0)));

    let err = cycle.run_cycle().unwrap_err();
    assert!(matches!(err.downcast_ref::<CycleError>(), Some(CycleError::LoginRejected)));
    assert!(store.load().unwrap().is_none());
}

#[test]
fn unchecked_login_degrades_to_zeros() {
    let dir = tempdir().unwrap();
    let store = SnapshotStore::new(dir.path().join("order_data.json"));
    let script = Script {
        reject_login: true,
        ..two_days()
    };
    let mut cycle = orchestrator(script, store, Arc::new(StepClock::at(2025, 1, 10, 9, 0)));
    cycle.verify_login = false;

    let snapshot = cycle.run_cycle().unwrap();
    for status in Status::ALL {
        assert_eq!(snapshot.today.get(status), Some("0"));
        assert_eq!(snapshot.tomorrow.get(status), Some("0"));
    }
}

#[test]
fn failed_navigation_drops_the_whole_cycle() {
    let dir = tempdir().unwrap();
    let store = SnapshotStore::new(dir.path().join("order_data.json"));
    let clock = Arc::new(StepClock::at(2025, 1, 10, 9, 0));

    orchestrator(two_days(), store.clone(), clock.clone()).run_cycle().unwrap();
    let before = store.load().unwrap().unwrap();

    let script = Script {
        unreachable: Some(date("2025-01-11")),
        ..two_days()
    };
    assert!(orchestrator(script, store.clone(), clock).run_cycle().is_err());

    assert_eq!(store.load().unwrap().unwrap(), before);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn poller_drives_the_orchestrator() {
    let dir = tempdir().unwrap();
    let store = SnapshotStore::new(dir.path().join("order_data.json"));
    let cycle = orchestrator(two_days(), store.clone(), Arc::new(StepClock::at(2025, 1, 10, 9, 0)));

    let handle = Poller::new(cycle, StdDuration::from_millis(5)).spawn();
    for _ in 0..500 {
        if handle.stats().cycles >= 2 {
            break;
        }
        tokio::time::sleep(StdDuration::from_millis(10)).await;
    }
    let stats = handle.stats();
    handle.shutdown().await;

    assert!(stats.cycles >= 2, "{stats:?}");
    assert_eq!(stats.failures, 0);
    assert!(stats.last_seq.is_some_and(|seq| seq >= 2));

    let on_disk = store.load().unwrap().unwrap();
    assert!(on_disk.seq >= 2);
    assert_eq!(on_disk.today.get(Status::Packed), Some("2"));
    assert_eq!(on_disk.tomorrow.get(Status::Confirmed), Some("0"));
}
