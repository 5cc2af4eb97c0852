//! # Roam controller
//!
//! Owns the association and turns scorer recommendations into radio
//! actions. One decision per loop tick:
//!
//! ```text
//!            connect ok                  margin + cooldown passed
//! Unknown ───────────────► Connected(X) ─────────────────────────► Roaming(X, Y)
//!    ▲                          ▲                                        │
//!    │                          └──────────── connect(Y) ok ─────────────┤
//!    └────────────────────────────────────── connect(Y) failed ──────────┘
//! ```
//!
//! Stability gates, in evaluation order:
//! 1. `connect_cooldown` hold after every successful connect;
//! 2. hysteresis margin (see [`crate::scorer::passes_margin`]);
//! 3. `roam_cooldown` between roam attempts.
//!
//! The controller never clears an association because data went stale;
//! only an observed link loss, an unmanaged link or a failed connect
//! demotes it to `Unknown`.

use std::time::Duration;

use quanta::Instant;
use tracing::{info, warn};

use crate::clock::Timer;
use crate::config::{RuntimeConfig, TowerSet};
use crate::report;
use crate::scorer::{recommend, Recommendation, Score, TowerSignal};
use crate::wifi::{LinkStatus, WifiControl};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoamState {
    Unknown,
    Connected(String),
    /// Only observable while a roam sequence is executing.
    Roaming { from: String, to: String },
}

impl RoamState {
    /// SSID of the associated tower, if any.
    pub fn current(&self) -> Option<&str> {
        match self {
            RoamState::Connected(ssid) => Some(ssid),
            _ => None,
        }
    }
}

/// Association bookkeeping. Mutated only on successful transitions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssociationState {
    pub current_tower: Option<String>,
    pub current_rssi: Option<i32>,
    pub associated_since: Option<Instant>,
    pub last_roam_attempt_at: Option<Instant>,
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub roam_margin_db: f64,
    pub roam_cooldown: Duration,
    pub disconnect_grace: Duration,
    pub disconnect_pause: Duration,
    pub connect_cooldown: Duration,
    pub connect_timeout: Duration,
    pub disconnect_timeout: Duration,
}

impl From<&RuntimeConfig> for ControllerConfig {
    fn from(cfg: &RuntimeConfig) -> Self {
        ControllerConfig {
            roam_margin_db: cfg.roam_margin_db,
            roam_cooldown: cfg.roam_cooldown,
            disconnect_grace: cfg.disconnect_grace,
            disconnect_pause: cfg.disconnect_pause,
            connect_cooldown: cfg.connect_cooldown,
            connect_timeout: cfg.connect_timeout,
            disconnect_timeout: cfg.disconnect_timeout,
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::from(&RuntimeConfig::default())
    }
}

/// What the radio said about the current link this tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkObservation {
    /// The link query itself failed.
    Unavailable,
    NotConnected,
    Associated(LinkStatus),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldReason {
    ConnectCooldown,
    RoamCooldown,
    NoIncumbentReading,
}

/// Result of one [`RoamController::step`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Idle,
    Held(HoldReason),
    Connected(TowerSignal),
    ConnectFailed(TowerSignal),
    Roamed { from: String, to: TowerSignal },
    RoamFailed { from: String, to: TowerSignal },
}

#[derive(Debug)]
pub struct RoamController {
    cfg: ControllerConfig,
    state: RoamState,
    assoc: AssociationState,
    hold_until: Option<Instant>,
    /// The radio is associated with something outside the tower set.
    unmanaged_link: bool,
    link_missing_since: Option<Instant>,
}

impl RoamController {
    pub fn new(cfg: ControllerConfig) -> Self {
        RoamController {
            cfg,
            state: RoamState::Unknown,
            assoc: AssociationState::default(),
            hold_until: None,
            unmanaged_link: false,
            link_missing_since: None,
        }
    }

    pub fn state(&self) -> &RoamState {
        &self.state
    }

    pub fn association(&self) -> &AssociationState {
        &self.assoc
    }

    /// Reconcile with the radio's own view of the link.
    pub fn observe_link(&mut self, obs: &LinkObservation, towers: &TowerSet, now: Instant) {
        match obs {
            LinkObservation::Unavailable => {}
            LinkObservation::NotConnected => {
                self.unmanaged_link = false;
                if self.state.current().is_none() {
                    self.link_missing_since = None;
                    return;
                }
                let since = *self.link_missing_since.get_or_insert(now);
                if now.saturating_duration_since(since) >= self.cfg.disconnect_grace {
                    warn!(tower = ?self.assoc.current_tower, "Link lost");
                    self.demote();
                }
            }
            LinkObservation::Associated(link) => {
                self.link_missing_since = None;
                let Some(tower) = towers.by_bssid(&link.bssid) else {
                    if !self.unmanaged_link {
                        info!(
                            ssid = %link.ssid,
                            bssid = %link.bssid,
                            "Current network is unmanaged; switching to a configured tower"
                        );
                    }
                    self.unmanaged_link = true;
                    if self.state.current().is_some() {
                        self.demote();
                    }
                    return;
                };
                self.unmanaged_link = false;
                if self.state.current() == Some(tower.ssid.as_str()) {
                    return;
                }
                match self.state.current() {
                    None => info!(tower = %tower.ssid, "Adopting existing association"),
                    Some(prev) => info!(from = %prev, to = %tower.ssid, "Association changed externally"),
                }
                self.state = RoamState::Connected(tower.ssid.clone());
                self.assoc.current_tower = Some(tower.ssid.clone());
                self.assoc.current_rssi = link.rssi_dbm;
                self.assoc.associated_since = Some(now);
            }
        }
    }

    /// Evaluate one decision and carry it out.
    pub fn step<W: WifiControl, T: Timer>(
        &mut self,
        score: &Score,
        wifi: &mut W,
        towers: &TowerSet,
        timer: &T,
    ) -> Outcome {
        let now = timer.now();
        let current = self.state.current().map(str::to_owned);
        if let Some(sig) = current.as_deref().and_then(|c| score.signal_for(c)) {
            self.assoc.current_rssi = Some(sig.rssi_dbm);
        }

        if let Some(until) = self.hold_until {
            if now < until {
                return Outcome::Held(HoldReason::ConnectCooldown);
            }
            self.hold_until = None;
        }

        match recommend(score, current.as_deref(), self.cfg.roam_margin_db) {
            Recommendation::Unknown | Recommendation::Stay => Outcome::Idle,
            Recommendation::Hold => Outcome::Held(HoldReason::NoIncumbentReading),
            Recommendation::Select(candidate) => self.bootstrap(candidate, wifi, towers, timer),
            Recommendation::Roam {
                candidate,
                incumbent_rssi,
            } => {
                let cooling = self
                    .assoc
                    .last_roam_attempt_at
                    .is_some_and(|at| now.saturating_duration_since(at) < self.cfg.roam_cooldown);
                if cooling {
                    return Outcome::Held(HoldReason::RoamCooldown);
                }
                let from = current.unwrap_or_default();
                self.roam(from, incumbent_rssi, candidate, wifi, towers, timer)
            }
        }
    }

    // ─── Transitions ────────────────────────────────────────────────────

    fn bootstrap<W: WifiControl, T: Timer>(
        &mut self,
        candidate: TowerSignal,
        wifi: &mut W,
        towers: &TowerSet,
        timer: &T,
    ) -> Outcome {
        let Some(tower) = towers.by_ssid(&candidate.ssid) else {
            return Outcome::Idle;
        };

        if self.unmanaged_link {
            if let Err(e) = wifi.disconnect(self.cfg.disconnect_timeout) {
                warn!(error = %e, "Disconnect from unmanaged network failed");
            }
            timer.sleep(self.cfg.disconnect_pause);
            self.unmanaged_link = false;
        }

        let result = wifi.connect(tower, self.cfg.connect_timeout);
        let now = timer.now();
        match result {
            Ok(()) => {
                info!("{}", report::connect_event(&candidate, true));
                self.associate(&candidate, now);
                Outcome::Connected(candidate)
            }
            Err(e) => {
                warn!(error = %e, "{}", report::connect_event(&candidate, false));
                Outcome::ConnectFailed(candidate)
            }
        }
    }

    fn roam<W: WifiControl, T: Timer>(
        &mut self,
        from: String,
        from_rssi: i32,
        candidate: TowerSignal,
        wifi: &mut W,
        towers: &TowerSet,
        timer: &T,
    ) -> Outcome {
        let Some(tower) = towers.by_ssid(&candidate.ssid) else {
            return Outcome::Idle;
        };

        self.state = RoamState::Roaming {
            from: from.clone(),
            to: candidate.ssid.clone(),
        };
        self.assoc.last_roam_attempt_at = Some(timer.now());

        if let Err(e) = wifi.disconnect(self.cfg.disconnect_timeout) {
            warn!(error = %e, "Disconnect failed during roam; continuing");
        }
        timer.sleep(self.cfg.disconnect_grace);
        timer.sleep(self.cfg.disconnect_pause);

        let result = wifi.connect(tower, self.cfg.connect_timeout);
        let now = timer.now();
        match result {
            Ok(()) => {
                info!("{}", report::roam_event(&from, from_rssi, &candidate, true));
                self.associate(&candidate, now);
                Outcome::Roamed {
                    from,
                    to: candidate,
                }
            }
            Err(e) => {
                warn!(error = %e, "{}", report::roam_event(&from, from_rssi, &candidate, false));
                self.demote();
                Outcome::RoamFailed {
                    from,
                    to: candidate,
                }
            }
        }
    }

    fn associate(&mut self, tower: &TowerSignal, now: Instant) {
        self.state = RoamState::Connected(tower.ssid.clone());
        self.assoc.current_tower = Some(tower.ssid.clone());
        self.assoc.current_rssi = Some(tower.rssi_dbm);
        self.assoc.associated_since = Some(now);
        self.assoc.last_roam_attempt_at = Some(now);
        self.hold_until = Some(now + self.cfg.connect_cooldown);
        self.link_missing_since = None;
    }

    fn demote(&mut self) {
        self.state = RoamState::Unknown;
        self.assoc.current_tower = None;
        self.assoc.current_rssi = None;
        self.assoc.associated_since = None;
        self.link_missing_since = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bssid::Bssid;
    use crate::clock::ManualTimer;
    use crate::config::{Color, Tower};
    use crate::scanner::{ReadingSource, ScanReading};
    use crate::scorer::score;
    use crate::test_util::{ScriptedWifi, WifiCall};

    fn towers() -> TowerSet {
        let mk = |ssid: &str, last: u8| Tower {
            ssid: ssid.to_string(),
            bssid: Bssid::new([2, 0, 0, 0, 0, last]),
            freq: 2412,
            color: Color::new(1.0, 0.0, 0.0),
        };
        TowerSet::new(vec![mk("TowerA", 1), mk("TowerB", 2), mk("TowerC", 3)])
    }

    fn scored(timer: &ManualTimer, set: &TowerSet, values: &[(u8, i32)]) -> Score {
        let readings: Vec<_> = values
            .iter()
            .map(|&(last, rssi_dbm)| ScanReading {
                bssid: Bssid::new([2, 0, 0, 0, 0, last]),
                rssi_dbm,
                observed_at: timer.now(),
                source: ReadingSource::Scan,
            })
            .collect();
        score(set, &readings)
    }

    fn link(last: u8, ssid: &str) -> LinkObservation {
        LinkObservation::Associated(LinkStatus {
            bssid: Bssid::new([2, 0, 0, 0, 0, last]),
            ssid: ssid.to_string(),
            rssi_dbm: Some(-60),
        })
    }

    #[test]
    fn connect_failure_stays_unknown_and_retries() {
        let timer = ManualTimer::new();
        let set = towers();
        let mut wifi = ScriptedWifi::new(timer.clock());
        wifi.fail_next_connect();
        let mut ctl = RoamController::new(ControllerConfig::default());

        let s = scored(&timer, &set, &[(1, -50)]);
        assert!(matches!(
            ctl.step(&s, &mut wifi, &set, &timer),
            Outcome::ConnectFailed(_)
        ));
        assert_eq!(ctl.state(), &RoamState::Unknown);
        assert_eq!(ctl.association().last_roam_attempt_at, None);

        timer.advance(Duration::from_secs(1));
        assert!(matches!(
            ctl.step(&s, &mut wifi, &set, &timer),
            Outcome::Connected(_)
        ));
        assert_eq!(ctl.state(), &RoamState::Connected("TowerA".into()));
    }

    #[test]
    fn connect_cooldown_holds_decisions() {
        let timer = ManualTimer::new();
        let set = towers();
        let mut wifi = ScriptedWifi::new(timer.clock());
        let mut ctl = RoamController::new(ControllerConfig::default());

        let s = scored(&timer, &set, &[(1, -50)]);
        ctl.step(&s, &mut wifi, &set, &timer);
        assert_eq!(
            ctl.step(&s, &mut wifi, &set, &timer),
            Outcome::Held(HoldReason::ConnectCooldown)
        );
        timer.advance(Duration::from_millis(250));
        assert_eq!(ctl.step(&s, &mut wifi, &set, &timer), Outcome::Idle);
    }

    #[test]
    fn roam_failure_demotes_to_unknown() {
        let timer = ManualTimer::new();
        let set = towers();
        let mut wifi = ScriptedWifi::new(timer.clock());
        let mut ctl = RoamController::new(ControllerConfig::default());
        ctl.observe_link(&link(1, "TowerA"), &set, timer.now());

        wifi.fail_next_connect();
        let s = scored(&timer, &set, &[(1, -80), (2, -50)]);
        let out = ctl.step(&s, &mut wifi, &set, &timer);
        assert!(matches!(out, Outcome::RoamFailed { .. }));
        assert_eq!(ctl.state(), &RoamState::Unknown);
        assert_eq!(ctl.association().current_tower, None);
        assert!(ctl.association().last_roam_attempt_at.is_some());
    }

    #[test]
    fn failed_disconnect_does_not_abort_roam() {
        let timer = ManualTimer::new();
        let set = towers();
        let mut wifi = ScriptedWifi::new(timer.clock());
        let mut ctl = RoamController::new(ControllerConfig::default());
        ctl.observe_link(&link(1, "TowerA"), &set, timer.now());

        wifi.fail_next_disconnect();
        let s = scored(&timer, &set, &[(1, -80), (2, -50)]);
        assert!(matches!(
            ctl.step(&s, &mut wifi, &set, &timer),
            Outcome::Roamed { .. }
        ));
        assert_eq!(ctl.state(), &RoamState::Connected("TowerB".into()));
    }

    #[test]
    fn observe_link_seeds_and_tracks_external_changes() {
        let timer = ManualTimer::new();
        let set = towers();
        let mut ctl = RoamController::new(ControllerConfig::default());

        ctl.observe_link(&LinkObservation::Unavailable, &set, timer.now());
        assert_eq!(ctl.state(), &RoamState::Unknown);

        ctl.observe_link(&link(2, "TowerB"), &set, timer.now());
        assert_eq!(ctl.state(), &RoamState::Connected("TowerB".into()));
        assert_eq!(ctl.association().current_rssi, Some(-60));

        ctl.observe_link(&link(3, "TowerC"), &set, timer.now());
        assert_eq!(ctl.state(), &RoamState::Connected("TowerC".into()));
    }

    #[test]
    fn link_loss_demotes_after_grace() {
        let timer = ManualTimer::new();
        let set = towers();
        let mut ctl = RoamController::new(ControllerConfig::default());
        ctl.observe_link(&link(1, "TowerA"), &set, timer.now());

        ctl.observe_link(&LinkObservation::NotConnected, &set, timer.now());
        timer.advance(Duration::from_millis(2999));
        ctl.observe_link(&LinkObservation::NotConnected, &set, timer.now());
        assert_eq!(ctl.state(), &RoamState::Connected("TowerA".into()));

        timer.advance(Duration::from_millis(1));
        ctl.observe_link(&LinkObservation::NotConnected, &set, timer.now());
        assert_eq!(ctl.state(), &RoamState::Unknown);
    }

    #[test]
    fn unmanaged_link_disconnects_before_bootstrap() {
        let timer = ManualTimer::new();
        let set = towers();
        let mut wifi = ScriptedWifi::new(timer.clock());
        let mut ctl = RoamController::new(ControllerConfig::default());
        ctl.observe_link(&link(1, "TowerA"), &set, timer.now());

        ctl.observe_link(&link(9, "CoffeeShop"), &set, timer.now());
        assert_eq!(ctl.state(), &RoamState::Unknown);

        let s = scored(&timer, &set, &[(2, -50)]);
        assert!(matches!(
            ctl.step(&s, &mut wifi, &set, &timer),
            Outcome::Connected(_)
        ));
        let calls: Vec<_> = wifi.calls().iter().map(|c| c.call.clone()).collect();
        assert_eq!(
            calls,
            vec![
                WifiCall::Disconnect,
                WifiCall::Connect("TowerB".into())
            ]
        );
        assert_eq!(timer.sleeps(), vec![Duration::from_millis(250)]);
    }
}
