//! # Daemon loop
//!
//! One tick:
//!
//! 1. scan, if the scan cadence is due;
//! 2. read the current link and let the controller reconcile with it;
//! 3. score fresh readings (plus the link's own signal as a fill-in);
//! 4. let the controller decide and act;
//! 5. render, pushing to the bar only when the frame changed.
//!
//! Between ticks the loop sleeps to the nearest deadline (tick or scan)
//! on the shutdown channel, so a termination signal wakes it at once.

use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{debug, error, info, warn};

use crate::clock::{Cadence, Timer};
use crate::config::{Config, RuntimeConfig, TowerSet};
use crate::controller::{ControllerConfig, LinkObservation, Outcome, RoamController};
use crate::render::{render, segment_count, Frame, LedBar, View};
use crate::report;
use crate::scanner::{fill_from_link, ReadingSource, ScanOutcome, Scanner};
use crate::scorer::{score, Score};
use crate::wifi::WifiControl;

/// What one tick did, for callers that want more than the log.
#[derive(Debug, Clone)]
pub struct TickReport {
    /// A scan completed this tick.
    pub scanned: bool,
    pub score: Score,
    pub outcome: Outcome,
    /// The frame pushed to the bar, if it changed.
    pub frame: Option<Frame>,
    /// The display line logged this tick, if what the bar shows changed.
    pub status: Option<String>,
}

/// What the bar means to an operator, independent of pixel values.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Shown {
    Unknown,
    Connected { ssid: String, lit: usize },
}

pub struct Daemon<W, B, T> {
    cfg: RuntimeConfig,
    towers: TowerSet,
    wifi: W,
    bar: B,
    timer: T,
    scanner: Scanner,
    controller: RoamController,
    tick: Cadence,
    last_frame: Option<Frame>,
    last_shown: Option<Shown>,
    link_failing: bool,
}

impl<W: WifiControl, B: LedBar, T: Timer> Daemon<W, B, T> {
    pub fn new(config: Config, wifi: W, bar: B, timer: T) -> Self {
        let Config { towers, runtime } = config;
        Daemon {
            scanner: Scanner::new(&towers, &runtime),
            controller: RoamController::new(ControllerConfig::from(&runtime)),
            tick: Cadence::new(runtime.poll_interval),
            cfg: runtime,
            towers,
            wifi,
            bar,
            timer,
            last_frame: None,
            last_shown: None,
            link_failing: false,
        }
    }

    pub fn controller(&self) -> &RoamController {
        &self.controller
    }

    pub fn wifi(&self) -> &W {
        &self.wifi
    }

    pub fn wifi_mut(&mut self) -> &mut W {
        &mut self.wifi
    }

    pub fn bar(&self) -> &B {
        &self.bar
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    /// Run one tick. Errors are fatal (missing tool, dead output device);
    /// transient radio failures are absorbed.
    pub fn tick(&mut self) -> anyhow::Result<TickReport> {
        self.tick.mark_run(self.timer.now());

        let scanned = match self
            .scanner
            .poll(&mut self.wifi, &self.towers, &self.timer)
            .context("scan")?
        {
            Some(ScanOutcome::Completed(_)) => true,
            Some(ScanOutcome::Failed(_)) | None => false,
        };

        let link = self.read_link()?;
        let now = self.timer.now();
        self.controller.observe_link(&link, &self.towers, now);

        let mut fresh = self.scanner.fresh_readings(now, self.cfg.scan_freshness);
        if let LinkObservation::Associated(status) = &link {
            fill_from_link(&mut fresh, Some(status), &self.towers, now);
        }
        let score = score(&self.towers, &fresh);
        if scanned {
            info!("{}", report::scan_summary(self.controller.state().current(), &score));
        }

        let outcome = self
            .controller
            .step(&score, &mut self.wifi, &self.towers, &self.timer);
        debug!(?outcome, state = ?self.controller.state(), "decision");

        let (frame, status) = self.render(&score)?;
        Ok(TickReport {
            scanned,
            score,
            outcome,
            frame,
            status,
        })
    }

    /// Time until the next tick or scan, whichever is sooner.
    pub fn until_next(&self) -> Duration {
        let now = self.timer.now();
        self.tick.until_due(now).min(self.scanner.until_due(now))
    }

    /// Tick until `shutdown` fires (or its sender goes away), then clear
    /// the bar.
    pub fn run(&mut self, shutdown: &Receiver<()>) -> anyhow::Result<()> {
        info!(
            "{}",
            report::started(&self.cfg, self.towers.len(), self.scanner.frequencies())
        );

        let result = loop {
            if let Err(e) = self.tick() {
                break Err(e);
            }
            match shutdown.recv_timeout(self.until_next()) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break Ok(()),
                Err(RecvTimeoutError::Timeout) => {}
            }
        };

        if let Err(e) = self.bar.clear() {
            warn!(error = %e, "Failed to clear LEDs on exit");
        }
        info!("Stopped; LEDs cleared");
        result
    }

    fn read_link(&mut self) -> anyhow::Result<LinkObservation> {
        match self.wifi.current_link(self.cfg.link_timeout) {
            Ok(link) => {
                if self.link_failing {
                    info!("Link read recovered");
                    self.link_failing = false;
                }
                Ok(link.map_or(LinkObservation::NotConnected, LinkObservation::Associated))
            }
            Err(e) if e.is_transient() => {
                if self.link_failing {
                    debug!(error = %e, "link read still failing");
                } else {
                    warn!(error = %e, "Link read failed");
                    self.link_failing = true;
                }
                Ok(LinkObservation::Unavailable)
            }
            Err(e) => Err(e).context("reading link state"),
        }
    }

    fn view<'a>(&'a self, score: &Score) -> View<'a> {
        if score.is_unknown() {
            return View::Unknown;
        }
        self.controller
            .state()
            .current()
            .and_then(|ssid| self.towers.by_ssid(ssid))
            .map_or(View::Unknown, |tower| View::Connected {
                tower,
                rssi_dbm: self.controller.association().current_rssi,
            })
    }

    /// Push the frame if its pixels changed; log the display line if what
    /// it shows (unknown, or tower and lit count) changed.
    fn render(&mut self, score: &Score) -> anyhow::Result<(Option<Frame>, Option<String>)> {
        let view = self.view(score);
        let frame = render(view, &self.cfg);
        let (shown, line) = match view {
            View::Unknown => (Shown::Unknown, report::unknown(self.cfg.unknown_mode)),
            View::Connected { tower, rssi_dbm } => {
                let lit = segment_count(rssi_dbm, &self.cfg);
                let line = report::connected(&tower.ssid, rssi_dbm, lit, self.cfg.pixels);
                let shown = Shown::Connected {
                    ssid: tower.ssid.clone(),
                    lit,
                };
                (shown, line)
            }
        };

        let pushed = if self.last_frame.as_ref() == Some(&frame) {
            None
        } else {
            self.bar.show(&frame).context("updating LEDs")?;
            self.last_frame = Some(frame.clone());
            Some(frame)
        };

        let status = if self.last_shown.as_ref() == Some(&shown) {
            None
        } else {
            info!("{line}");
            self.last_shown = Some(shown);
            Some(line)
        };
        Ok((pushed, status))
    }
}

/// `--validate-config`: load both files and report. Returns success.
pub fn validate(tower_path: &Path, runtime_path: &Path, interface: Option<&str>) -> bool {
    match Config::load(tower_path, runtime_path, interface) {
        Ok(cfg) => {
            info!(
                "{}",
                report::validation_passed(cfg.towers.len(), &cfg.towers.frequencies())
            );
            true
        }
        Err(e) => {
            for v in e.into_violations() {
                error!("{}", report::violation(&v));
            }
            false
        }
    }
}

/// `--diagnose`: one link query and one scan, logged, then return.
pub fn diagnose<W: WifiControl, T: Timer>(
    config: &Config,
    wifi: &mut W,
    timer: &T,
) -> anyhow::Result<()> {
    let Config { towers, runtime } = config;
    let mut scanner = Scanner::new(towers, runtime);
    info!("DIAG start");
    info!(
        "DIAG interface={} towers={} freqs={:?}",
        runtime.interface,
        towers.len(),
        scanner.frequencies()
    );

    let link = wifi
        .current_link(runtime.link_timeout)
        .context("DIAG failed to read link state")?;
    let linked_tower = link.as_ref().and_then(|l| towers.by_bssid(&l.bssid));
    info!("{}", report::diag_link(link.as_ref(), linked_tower));

    scanner
        .scan_now(wifi, towers, timer)
        .context("DIAG scan failed")?;
    let now = timer.now();
    let mut seen = scanner.readings().to_vec();
    fill_from_link(&mut seen, link.as_ref(), towers, now);
    let score = score(towers, &seen);

    if score.is_unknown() {
        warn!("DIAG scan: no configured towers detected");
    }
    for sig in score.signals() {
        let age_ms = match sig.source {
            ReadingSource::Scan => scanner
                .readings()
                .iter()
                .find(|r| r.bssid == sig.bssid)
                .map(|r| r.age(now).as_millis()),
            ReadingSource::Link => None,
        };
        info!("{}", report::diag_tower(sig, age_ms));
    }
    info!("DIAG complete");
    Ok(())
}
