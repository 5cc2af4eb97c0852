//! End-to-end roaming scenarios: full daemon ticks against a scripted radio,
//! an in-memory LED bar and virtual time.

use std::time::Duration;

use cellmesh_roam::bssid::Bssid;
use cellmesh_roam::clock::ManualTimer;
use cellmesh_roam::config::{Color, Config, RuntimeConfig, Tower, TowerSet, UnknownMode};
use cellmesh_roam::controller::{HoldReason, Outcome, RoamState};
use cellmesh_roam::daemon::{self, Daemon};
use cellmesh_roam::render::Rgb8;
use cellmesh_roam::test_util::{MemoryBar, ScriptedWifi, WifiCall};
use cellmesh_roam::wifi::{LinkStatus, Sighting, WifiError};

type TestDaemon = Daemon<ScriptedWifi, MemoryBar, ManualTimer>;

const A: Bssid = Bssid::new([0x02, 0, 0, 0, 0, 0x0a]);
const B: Bssid = Bssid::new([0x02, 0, 0, 0, 0, 0x0b]);
const C: Bssid = Bssid::new([0x02, 0, 0, 0, 0, 0x0c]);

fn towers() -> TowerSet {
    let mk = |ssid: &str, bssid, freq, color| Tower {
        ssid: ssid.to_string(),
        bssid,
        freq,
        color,
    };
    TowerSet::new(vec![
        mk("TowerA", A, 2412, Color::new(1.0, 0.0, 0.0)),
        mk("TowerB", B, 2437, Color::new(0.0, 1.0, 0.0)),
        mk("TowerC", C, 2462, Color::new(0.0, 0.0, 1.0)),
    ])
}

fn config(margin_db: f64) -> Config {
    Config {
        towers: towers(),
        runtime: RuntimeConfig {
            roam_margin_db: margin_db,
            ..RuntimeConfig::default()
        },
    }
}

fn daemon(cfg: Config) -> TestDaemon {
    let timer = ManualTimer::new();
    let wifi = ScriptedWifi::new(timer.clock());
    Daemon::new(cfg, wifi, MemoryBar::new(), timer)
}

fn state(d: &TestDaemon) -> RoamState {
    d.controller().state().clone()
}

/// Bootstrap onto TowerA and let every cooldown expire.
fn connected_to_a(d: &mut TestDaemon, rssi_dbm: i32) {
    d.wifi_mut().set_signal(A, rssi_dbm);
    let report = d.tick().unwrap();
    assert!(matches!(report.outcome, Outcome::Connected(_)));
    d.timer().advance(Duration::from_secs(5));
    d.wifi_mut().clear_calls();
}

#[test]
fn unknown_connects_to_best_available() {
    let mut d = daemon(config(-2.0));
    d.wifi_mut().set_signal(A, -50);
    d.wifi_mut().set_signal(B, -70);

    let report = d.tick().unwrap();
    assert!(report.scanned);
    match report.outcome {
        Outcome::Connected(t) => assert_eq!(t.ssid, "TowerA"),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(state(&d), RoamState::Connected("TowerA".into()));
    assert_eq!(d.wifi().actions(), vec![WifiCall::Connect("TowerA".into())]);

    let assoc = d.controller().association();
    assert_eq!(assoc.current_rssi, Some(-50));
    assert!(assoc.associated_since.is_some());
    assert_eq!(assoc.associated_since, assoc.last_roam_attempt_at);

    // -50 dBm on a -90..-20 scale over 8 pixels: round(4.57) = 5 red.
    let frame = d.bar().last().unwrap();
    assert_eq!(frame.pixels[..5], [Rgb8::new(255, 0, 0); 5]);
    assert!(frame.pixels[5..].iter().all(|p| p.is_off()));
}

#[test]
fn scan_is_restricted_to_tower_frequencies() {
    let mut d = daemon(config(-2.0));
    d.tick().unwrap();
    let scans: Vec<_> = d
        .wifi()
        .calls()
        .iter()
        .filter_map(|c| match &c.call {
            WifiCall::Scan(f) => Some(f.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(scans, vec![vec![2412, 2437, 2462]]);
}

#[test]
fn small_advantage_does_not_roam() {
    let mut d = daemon(config(-5.0));
    connected_to_a(&mut d, -60);
    d.wifi_mut().set_signal(B, -58);

    let report = d.tick().unwrap();
    assert_eq!(report.outcome, Outcome::Idle);
    assert_eq!(state(&d), RoamState::Connected("TowerA".into()));
    assert!(d.wifi().actions().is_empty());
}

#[test]
fn large_advantage_roams_with_grace_and_pause() {
    let mut d = daemon(config(-5.0));
    connected_to_a(&mut d, -75);
    d.wifi_mut().set_signal(B, -55);

    let report = d.tick().unwrap();
    match report.outcome {
        Outcome::Roamed { from, to } => {
            assert_eq!(from, "TowerA");
            assert_eq!(to.ssid, "TowerB");
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(state(&d), RoamState::Connected("TowerB".into()));
    assert_eq!(
        d.wifi().actions(),
        vec![WifiCall::Disconnect, WifiCall::Connect("TowerB".into())]
    );
    assert_eq!(
        d.timer().sleeps(),
        vec![Duration::from_secs(3), Duration::from_millis(250)]
    );

    let at = |want: &WifiCall| {
        d.wifi()
            .calls()
            .iter()
            .find(|c| &c.call == want)
            .map(|c| c.at)
            .unwrap()
    };
    let gap = at(&WifiCall::Connect("TowerB".into()))
        .saturating_duration_since(at(&WifiCall::Disconnect));
    assert_eq!(gap, Duration::from_millis(3250));

    let frame = d.bar().last().unwrap();
    assert_eq!(frame.pixels[0], Rgb8::new(0, 255, 0));
}

#[test]
fn no_second_roam_inside_cooldown() {
    let mut d = daemon(config(-2.0));
    connected_to_a(&mut d, -80);
    d.wifi_mut().set_signal(B, -60);
    assert!(matches!(d.tick().unwrap().outcome, Outcome::Roamed { .. }));

    // A third tower now clearly beats B, but the roam cooldown is running.
    d.wifi_mut().set_signal(C, -30);
    d.timer().advance(Duration::from_secs(2));
    let report = d.tick().unwrap();
    assert_eq!(report.outcome, Outcome::Held(HoldReason::RoamCooldown));
    assert_eq!(state(&d), RoamState::Connected("TowerB".into()));

    d.timer().advance(Duration::from_secs(2));
    match d.tick().unwrap().outcome {
        Outcome::Roamed { from, to } => {
            assert_eq!(from, "TowerB");
            assert_eq!(to.ssid, "TowerC");
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn connect_cooldown_holds_next_decision() {
    let mut d = daemon(config(-2.0));
    d.wifi_mut().set_signal(A, -70);
    d.tick().unwrap();

    d.wifi_mut().set_signal(B, -40);
    d.timer().advance(Duration::from_millis(100));
    assert_eq!(
        d.tick().unwrap().outcome,
        Outcome::Held(HoldReason::ConnectCooldown)
    );
}

#[test]
fn stale_readings_render_unknown_but_keep_association() {
    let mut cfg = config(-2.0);
    cfg.runtime.unknown_mode = UnknownMode::DimWhite;
    let mut d = daemon(cfg);
    connected_to_a(&mut d, -60);

    // Only readings the driver last heard 2 s ago, and no link signal.
    d.wifi_mut().remove_signal(&A);
    d.wifi_mut().push_scan(Ok(vec![Sighting {
        bssid: A,
        rssi_dbm: -60,
        last_seen: Some(Duration::from_secs(2)),
    }]));

    let report = d.tick().unwrap();
    assert!(report.score.is_unknown());
    assert_eq!(report.outcome, Outcome::Idle);
    assert_eq!(state(&d), RoamState::Connected("TowerA".into()));
    let frame = d.bar().last().unwrap();
    assert!(frame.pixels.iter().all(|p| *p == Rgb8::new(10, 10, 10)));
}

#[test]
fn link_signal_keeps_incumbent_fresh_between_scans() {
    let mut d = daemon(config(-2.0));
    connected_to_a(&mut d, -60);
    d.tick().unwrap();

    // No scan is due yet and the last scan reading is already stale.
    d.timer().advance(Duration::from_millis(1600));
    let report = d.tick().unwrap();
    assert!(!report.scanned);
    let sig = report.score.signal_for("TowerA").unwrap();
    assert_eq!(sig.rssi_dbm, -60);
    assert_eq!(sig.source, cellmesh_roam::scanner::ReadingSource::Link);
}

#[test]
fn frames_are_pushed_only_on_change() {
    let mut d = daemon(config(-2.0));
    connected_to_a(&mut d, -60);
    let before = d.bar().frames().len();

    d.tick().unwrap();
    d.timer().advance(Duration::from_secs(1));
    d.tick().unwrap();
    assert_eq!(d.bar().frames().len(), before);

    d.wifi_mut().set_signal(A, -20);
    d.timer().advance(Duration::from_secs(2));
    let report = d.tick().unwrap();
    assert!(report.frame.is_some());
    assert_eq!(d.bar().last().unwrap().lit(), 8);
}

#[test]
fn zero_segment_connection_is_still_reported() {
    let mut d = daemon(config(-2.0));
    let first = d.tick().unwrap();
    assert_eq!(first.status.as_deref(), Some("Unknown -> LED off"));

    // At the bottom of the scale nothing lights, so the frame matches the
    // blank unknown frame, but the association is new.
    d.wifi_mut().set_signal(A, -95);
    d.timer().advance(Duration::from_secs(2));
    let report = d.tick().unwrap();
    assert!(matches!(report.outcome, Outcome::Connected(_)));
    assert!(report.frame.is_none());
    assert_eq!(
        report.status.as_deref(),
        Some("Connected TowerA RSSI=-95 dBm LEDs=0/8")
    );
    assert_eq!(d.bar().frames().len(), 1);

    d.timer().advance(Duration::from_secs(1));
    assert_eq!(d.tick().unwrap().status, None);
}

#[test]
fn failed_roam_connect_falls_back_to_unknown_then_recovers() {
    let mut d = daemon(config(-2.0));
    connected_to_a(&mut d, -80);
    d.wifi_mut().set_signal(B, -50);
    d.wifi_mut().fail_next_connect();

    assert!(matches!(d.tick().unwrap().outcome, Outcome::RoamFailed { .. }));
    assert_eq!(state(&d), RoamState::Unknown);
    assert_eq!(d.wifi().linked_ssid(), None);

    d.timer().advance(Duration::from_secs(1));
    match d.tick().unwrap().outcome {
        Outcome::Connected(t) => assert_eq!(t.ssid, "TowerB"),
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn existing_association_is_adopted_without_reconnecting() {
    let mut d = daemon(config(-2.0));
    d.wifi_mut().set_signal(A, -70);
    d.wifi_mut().set_signal(B, -69);
    d.wifi_mut().set_link(Some(LinkStatus {
        bssid: B,
        ssid: "TowerB".into(),
        rssi_dbm: Some(-69),
    }));

    let report = d.tick().unwrap();
    assert_eq!(report.outcome, Outcome::Idle);
    assert_eq!(state(&d), RoamState::Connected("TowerB".into()));
    assert!(d.wifi().actions().is_empty());
}

#[test]
fn unmanaged_network_is_left_for_a_tower() {
    let mut d = daemon(config(-2.0));
    d.wifi_mut().set_signal(A, -60);
    d.wifi_mut().set_link(Some(LinkStatus {
        bssid: Bssid::new([0x0a, 0xbb, 0xcc, 0xdd, 0xee, 0xff]),
        ssid: "Guest".into(),
        rssi_dbm: Some(-40),
    }));

    let report = d.tick().unwrap();
    assert!(matches!(report.outcome, Outcome::Connected(_)));
    assert_eq!(
        d.wifi().actions(),
        vec![WifiCall::Disconnect, WifiCall::Connect("TowerA".into())]
    );
}

#[test]
fn transient_failures_do_not_stop_the_loop() {
    let mut d = daemon(config(-2.0));
    d.wifi_mut().set_signal(A, -60);
    d.wifi_mut().push_scan(Err(WifiError::Timeout {
        op: "scan",
        after: Duration::from_secs(3),
    }));
    d.wifi_mut().fail_next_link();

    let report = d.tick().unwrap();
    assert!(!report.scanned);
    assert!(report.score.is_unknown());
    assert_eq!(state(&d), RoamState::Unknown);

    d.timer().advance(Duration::from_secs(2));
    assert!(matches!(d.tick().unwrap().outcome, Outcome::Connected(_)));
}

#[test]
fn missing_tool_is_fatal() {
    let mut d = daemon(config(-2.0));
    d.wifi_mut().push_scan(Err(WifiError::ToolMissing {
        program: "iw".into(),
    }));
    assert!(d.tick().is_err());
}

#[test]
fn run_clears_bar_on_shutdown() {
    let mut d = daemon(config(-2.0));
    d.wifi_mut().set_signal(A, -60);
    let (tx, rx) = crossbeam_channel::bounded(1);
    tx.send(()).unwrap();

    d.run(&rx).unwrap();
    assert_eq!(d.bar().clears(), 1);
    assert_eq!(state(&d), RoamState::Connected("TowerA".into()));
}

#[test]
fn next_wakeup_is_nearest_deadline() {
    let mut d = daemon(config(-2.0));
    d.tick().unwrap();
    assert_eq!(d.until_next(), Duration::from_secs(1));
    d.timer().advance(Duration::from_millis(400));
    assert_eq!(d.until_next(), Duration::from_millis(600));
}

#[test]
fn validate_reports_success_and_failure() {
    let dir = tempfile::tempdir().unwrap();
    let write = |name: &str, body: &str| {
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        path
    };
    let good = write(
        "towers.json",
        r#"{"TowerA": {"color": [1, 0, 0], "freq": 2412, "bssid": "02:00:00:00:00:0a"}}"#,
    );
    let bad = write(
        "bad.json",
        r#"{"TowerA": {"color": [1, 0], "freq": 2412, "bssid": "00:00:00:00:00:00"}}"#,
    );
    let spare = write(
        "spare.json",
        r#"{"TowerA": {"color": [1, 0, 0], "freq": 2412, "bssid": "02:00:00:00:00:0a"},
            "Spare": {"color": [0, 1, 0], "freq": 2437, "bssid": "00:00:00:00:00:00"}}"#,
    );
    let runtime = write("runtime.json", r#"{"roam_margin_db": -5}"#);

    assert!(daemon::validate(&good, &runtime, None));
    assert!(daemon::validate(&spare, &runtime, None));
    let cfg = Config::load(&spare, &runtime, None).unwrap();
    assert_eq!(cfg.towers.len(), 1);
    assert!(!daemon::validate(&bad, &runtime, None));
    assert!(!daemon::validate(&good, &dir.path().join("missing.json"), Some("")));
}

#[test]
fn diagnose_needs_a_working_link_query() {
    let cfg = config(-2.0);
    let timer = ManualTimer::new();
    let mut wifi = ScriptedWifi::new(timer.clock());
    wifi.set_signal(A, -61);
    daemon::diagnose(&cfg, &mut wifi, &timer).unwrap();

    wifi.fail_next_link();
    assert!(daemon::diagnose(&cfg, &mut wifi, &timer).is_err());
    assert!(wifi.actions().is_empty());
}
