//! Operator-facing log lines.
//!
//! Field order and labels here are consumed by tooling that greps the log
//! stream, so each line is built by a pure function and pinned by a test.

use std::fmt::Write as _;

use crate::config::{RuntimeConfig, Tower, UnknownMode, Violation};
use crate::scanner::ReadingSource;
use crate::scorer::{Score, TowerSignal};
use crate::wifi::LinkStatus;

fn outcome(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "failed"
    }
}

/// `SCAN current=<ssid>(<rssi>) | <ssid>=<rssi>[(link)] ...`
pub fn scan_summary(current: Option<&str>, score: &Score) -> String {
    if score.is_unknown() {
        return "SCAN saw no configured towers".to_string();
    }

    let mut line = String::from("SCAN current=");
    match current {
        None => line.push_str("None"),
        Some(ssid) => match score.signal_for(ssid) {
            Some(sig) => {
                let _ = write!(line, "{ssid}({})", sig.rssi_dbm);
            }
            None => {
                let _ = write!(line, "{ssid}(unknown)");
            }
        },
    }
    line.push_str(" |");
    for sig in score.signals() {
        let _ = write!(line, " {}={}", sig.ssid, sig.rssi_dbm);
        if sig.source == ReadingSource::Link {
            line.push_str("(link)");
        }
    }
    line
}

/// `ROAM <from>(<rssi> dBm) -> <to>(<rssi> dBm) [<bssid>] outcome=<ok|failed>`
pub fn roam_event(from: &str, from_rssi: i32, to: &TowerSignal, ok: bool) -> String {
    format!(
        "ROAM {from}({from_rssi} dBm) -> {}({} dBm) [{}] outcome={}",
        to.ssid,
        to.rssi_dbm,
        to.bssid,
        outcome(ok)
    )
}

/// `CONNECT -> <to>(<rssi> dBm) [<bssid>] outcome=<ok|failed>`
pub fn connect_event(to: &TowerSignal, ok: bool) -> String {
    format!(
        "CONNECT -> {}({} dBm) [{}] outcome={}",
        to.ssid,
        to.rssi_dbm,
        to.bssid,
        outcome(ok)
    )
}

/// `Connected <ssid> RSSI=<rssi> dBm LEDs=<n>/<pixels>`
pub fn connected(ssid: &str, rssi_dbm: Option<i32>, lit: usize, pixels: usize) -> String {
    match rssi_dbm {
        Some(rssi) => format!("Connected {ssid} RSSI={rssi} dBm LEDs={lit}/{pixels}"),
        None => format!("Connected {ssid} RSSI=unknown LEDs={lit}/{pixels}"),
    }
}

pub fn unknown(mode: UnknownMode) -> String {
    format!("Unknown -> LED {mode}")
}

pub fn started(cfg: &RuntimeConfig, towers: usize, freqs: &[u32]) -> String {
    format!(
        "Started interface={} towers={towers} freqs={freqs:?} brightness={:.2} unknown_mode={}",
        cfg.interface, cfg.brightness, cfg.unknown_mode
    )
}

pub fn diag_link(link: Option<&LinkStatus>, tower: Option<&Tower>) -> String {
    let Some(link) = link else {
        return "DIAG link: not connected".to_string();
    };
    let signal = link
        .rssi_dbm
        .map_or_else(|| "unknown".to_string(), |s| s.to_string());
    let tower = tower.map_or("unmanaged", |t| t.ssid.as_str());
    format!(
        "DIAG link: ssid={} bssid={} signal={signal} tower={tower}",
        link.ssid, link.bssid
    )
}

/// `age_ms` is `None` for link-sourced readings.
pub fn diag_tower(sig: &TowerSignal, age_ms: Option<u128>) -> String {
    let source = match sig.source {
        ReadingSource::Scan => "scan",
        ReadingSource::Link => "link",
    };
    let age = age_ms.map_or_else(|| "-".to_string(), |a| a.to_string());
    format!(
        "DIAG tower={} bssid={} signal={} source={source} age_ms={age}",
        sig.ssid, sig.bssid, sig.rssi_dbm
    )
}

pub fn validation_passed(towers: usize, freqs: &[u32]) -> String {
    format!("Config validation passed: towers={towers} freqs={freqs:?}")
}

pub fn violation(v: &Violation) -> String {
    format!("Config violation: {v}")
}
