//! Ranking of towers from fresh readings, and the hysteresis rule.

use crate::bssid::Bssid;
use crate::config::TowerSet;
use crate::scanner::{ReadingSource, ScanReading};

/// A configured tower's best fresh signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TowerSignal {
    pub ssid: String,
    pub bssid: Bssid,
    pub rssi_dbm: i32,
    pub source: ReadingSource,
}

/// Scored view of the fresh reading set, ordered by SSID.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Score {
    signals: Vec<TowerSignal>,
}

impl Score {
    pub fn signals(&self) -> &[TowerSignal] {
        &self.signals
    }

    /// No tower has a fresh reading.
    pub fn is_unknown(&self) -> bool {
        self.signals.is_empty()
    }

    pub fn signal_for(&self, ssid: &str) -> Option<&TowerSignal> {
        self.signals.iter().find(|s| s.ssid == ssid)
    }

    /// Strongest tower. Equal RSSI goes to the SSID that sorts first.
    pub fn best(&self) -> Option<&TowerSignal> {
        self.best_excluding(None)
    }

    pub fn best_excluding(&self, exclude: Option<&str>) -> Option<&TowerSignal> {
        self.signals
            .iter()
            .filter(|s| Some(s.ssid.as_str()) != exclude)
            .fold(None, |best: Option<&TowerSignal>, s| match best {
                Some(b) if b.rssi_dbm >= s.rssi_dbm => Some(b),
                _ => Some(s),
            })
    }
}

/// Build a [`Score`] from fresh readings. Readings for BSSIDs outside the
/// tower set are ignored.
pub fn score(towers: &TowerSet, fresh: &[ScanReading]) -> Score {
    let mut signals: Vec<TowerSignal> = Vec::new();
    for r in fresh {
        let Some(tower) = towers.by_bssid(&r.bssid) else {
            continue;
        };
        match signals.iter_mut().find(|s| s.bssid == r.bssid) {
            Some(prev) if prev.rssi_dbm >= r.rssi_dbm => {}
            Some(prev) => {
                prev.rssi_dbm = r.rssi_dbm;
                prev.source = r.source;
            }
            None => signals.push(TowerSignal {
                ssid: tower.ssid.clone(),
                bssid: r.bssid,
                rssi_dbm: r.rssi_dbm,
                source: r.source,
            }),
        }
    }
    signals.sort_by(|a, b| a.ssid.cmp(&b.ssid));
    Score { signals }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recommendation {
    /// Nothing fresh to decide on.
    Unknown,
    /// No current tower: take the best candidate.
    Select(TowerSignal),
    /// Keep the current tower.
    Stay,
    /// Current tower has no fresh reading to compare against.
    Hold,
    Roam {
        candidate: TowerSignal,
        incumbent_rssi: i32,
    },
}

/// True when `candidate` beats `incumbent` by more than the margin's
/// magnitude. Both `-5` and `5` mean "need more than 5 dB better".
pub fn passes_margin(candidate_dbm: i32, incumbent_dbm: i32, margin_db: f64) -> bool {
    f64::from(candidate_dbm - incumbent_dbm) > margin_db.abs()
}

pub fn recommend(score: &Score, current: Option<&str>, margin_db: f64) -> Recommendation {
    if score.is_unknown() {
        return Recommendation::Unknown;
    }
    let Some(current) = current else {
        return match score.best() {
            Some(best) => Recommendation::Select(best.clone()),
            None => Recommendation::Unknown,
        };
    };
    let Some(incumbent) = score.signal_for(current) else {
        return Recommendation::Hold;
    };
    match score.best_excluding(Some(current)) {
        Some(candidate) if passes_margin(candidate.rssi_dbm, incumbent.rssi_dbm, margin_db) => {
            Recommendation::Roam {
                candidate: candidate.clone(),
                incumbent_rssi: incumbent.rssi_dbm,
            }
        }
        _ => Recommendation::Stay,
    }
}
