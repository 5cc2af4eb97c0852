//! Periodic scans over the tower frequency set.
//!
//! Raw sightings are matched to towers strictly by BSSID and stamped with
//! the time the driver last heard them. The reading set is replaced
//! wholesale on every scan; [`Scanner::fresh_readings`] applies the
//! freshness window at decision time.

use std::time::Duration;

use quanta::Instant;
use tracing::{debug, info, warn};

use crate::bssid::Bssid;
use crate::clock::{Cadence, Timer};
use crate::config::{RuntimeConfig, TowerSet};
use crate::wifi::{LinkStatus, Sighting, WifiControl, WifiError};

/// Where a reading came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadingSource {
    Scan,
    /// Taken from `currentLink()` because the scan had nothing fresh.
    Link,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReading {
    pub bssid: Bssid,
    pub rssi_dbm: i32,
    pub observed_at: Instant,
    pub source: ReadingSource,
}

impl ScanReading {
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.observed_at)
    }
}

/// Result of a due scan.
#[derive(Debug)]
pub enum ScanOutcome {
    /// Number of configured towers seen.
    Completed(usize),
    /// Transient failure; the reading set was cleared.
    Failed(WifiError),
}

#[derive(Debug)]
pub struct Scanner {
    freqs: Vec<u32>,
    timeout: Duration,
    cadence: Cadence,
    readings: Vec<ScanReading>,
    failing: bool,
}

impl Scanner {
    pub fn new(towers: &TowerSet, cfg: &RuntimeConfig) -> Self {
        Scanner {
            freqs: towers.frequencies(),
            timeout: cfg.scan_timeout,
            cadence: Cadence::new(cfg.scan_interval),
            readings: Vec::new(),
            failing: false,
        }
    }

    pub fn frequencies(&self) -> &[u32] {
        &self.freqs
    }

    /// Latest reading set, fresh or not.
    pub fn readings(&self) -> &[ScanReading] {
        &self.readings
    }

    pub fn until_due(&self, now: Instant) -> Duration {
        self.cadence.until_due(now)
    }

    /// Scan if the cadence says so. `Err` only for failures that make
    /// further scanning pointless (missing tool).
    pub fn poll<W: WifiControl, T: Timer>(
        &mut self,
        wifi: &mut W,
        towers: &TowerSet,
        timer: &T,
    ) -> Result<Option<ScanOutcome>, WifiError> {
        let now = timer.now();
        if !self.cadence.is_due(now) {
            return Ok(None);
        }
        self.cadence.mark_run(now);

        match self.scan_now(wifi, towers, timer) {
            Ok(seen) => {
                if self.failing {
                    info!("Scan recovered");
                    self.failing = false;
                }
                Ok(Some(ScanOutcome::Completed(seen)))
            }
            Err(e) if e.is_transient() => {
                if self.failing {
                    debug!(error = %e, "scan still failing");
                } else {
                    warn!(error = %e, "Scan failed; treating as empty");
                    self.failing = true;
                }
                Ok(Some(ScanOutcome::Failed(e)))
            }
            Err(e) => Err(e),
        }
    }

    /// Scan immediately and replace the reading set. Returns the number of
    /// configured towers seen.
    pub fn scan_now<W: WifiControl, T: Timer>(
        &mut self,
        wifi: &mut W,
        towers: &TowerSet,
        timer: &T,
    ) -> Result<usize, WifiError> {
        let result = wifi.scan(&self.freqs, self.timeout);
        let captured_at = timer.now();
        self.readings.clear();
        let sightings = result?;
        self.ingest(&sightings, towers, captured_at);
        Ok(self.readings.len())
    }

    fn ingest(&mut self, sightings: &[Sighting], towers: &TowerSet, captured_at: Instant) {
        for s in sightings {
            if towers.by_bssid(&s.bssid).is_none() {
                continue;
            }
            let observed_at = s
                .last_seen
                .and_then(|age| captured_at.checked_sub(age))
                .unwrap_or(captured_at);
            let reading = ScanReading {
                bssid: s.bssid,
                rssi_dbm: s.rssi_dbm,
                observed_at,
                source: ReadingSource::Scan,
            };
            match self.readings.iter_mut().find(|r| r.bssid == s.bssid) {
                Some(prev) if prev.rssi_dbm >= s.rssi_dbm => {}
                Some(prev) => *prev = reading,
                None => self.readings.push(reading),
            }
        }
    }

    /// Readings no older than `freshness` at `now`.
    pub fn fresh_readings(&self, now: Instant, freshness: Duration) -> Vec<ScanReading> {
        self.readings
            .iter()
            .filter(|r| r.age(now) <= freshness)
            .cloned()
            .collect()
    }
}

/// Add a link-sourced reading for the associated tower when the scan has
/// nothing fresh for it.
pub fn fill_from_link(
    fresh: &mut Vec<ScanReading>,
    link: Option<&LinkStatus>,
    towers: &TowerSet,
    now: Instant,
) {
    let Some(link) = link else { return };
    let Some(rssi_dbm) = link.rssi_dbm else { return };
    if towers.by_bssid(&link.bssid).is_none() {
        return;
    }
    if fresh.iter().any(|r| r.bssid == link.bssid) {
        return;
    }
    fresh.push(ScanReading {
        bssid: link.bssid,
        rssi_dbm,
        observed_at: now,
        source: ReadingSource::Link,
    });
}
