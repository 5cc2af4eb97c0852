//! [`WifiControl`] on top of the `iw` command-line utility.
//!
//! Each operation spawns `iw dev <interface> ...` under a hard time limit;
//! the child is killed when the limit expires. Output parsing is split
//! into free functions so it can be tested against captured text.

use std::io;
use std::process::{Command, Stdio};
use std::time::Duration;

use process_control::{ChildExt, Control};
use tracing::debug;

use super::{LinkStatus, Sighting, WifiControl, WifiError};
use crate::bssid::Bssid;
use crate::config::Tower;

pub const DEFAULT_PROGRAM: &str = "iw";

#[derive(Debug, Clone)]
pub struct IwControl {
    interface: String,
    program: String,
}

impl IwControl {
    pub fn new(interface: impl Into<String>) -> Self {
        Self::with_program(interface, DEFAULT_PROGRAM)
    }

    /// Use a different executable (e.g. a wrapper script on a bench rig).
    pub fn with_program(interface: impl Into<String>, program: impl Into<String>) -> Self {
        IwControl {
            interface: interface.into(),
            program: program.into(),
        }
    }

    /// Run `iw dev <if> <args>` and return stdout. A non-zero exit is an
    /// error unless `tolerate_failure` is set.
    fn run(
        &self,
        op: &'static str,
        args: &[String],
        timeout: Duration,
        tolerate_failure: bool,
    ) -> Result<String, WifiError> {
        debug!(op, interface = %self.interface, ?args, ?timeout, "running iw");

        let child = Command::new(&self.program)
            .arg("dev")
            .arg(&self.interface)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| match source.kind() {
                io::ErrorKind::NotFound => WifiError::ToolMissing {
                    program: self.program.clone(),
                },
                _ => WifiError::Io { op, source },
            })?;

        let output = child
            .controlled_with_output()
            .time_limit(timeout)
            .terminate_for_timeout()
            .wait()
            .map_err(|source| WifiError::Io { op, source })?
            .ok_or(WifiError::Timeout { op, after: timeout })?;

        if !output.status.success() && !tolerate_failure {
            return Err(WifiError::CommandFailed {
                op,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl WifiControl for IwControl {
    fn scan(&mut self, freqs: &[u32], timeout: Duration) -> Result<Vec<Sighting>, WifiError> {
        let mut args = vec!["scan".to_string()];
        for freq in freqs {
            args.push("freq".to_string());
            args.push(freq.to_string());
        }
        let out = self.run("scan", &args, timeout, false)?;
        Ok(parse_scan(&out))
    }

    fn current_link(&mut self, timeout: Duration) -> Result<Option<LinkStatus>, WifiError> {
        let out = self.run("link", &["link".to_string()], timeout, false)?;
        parse_link(&out).map_err(|detail| WifiError::Parse { op: "link", detail })
    }

    fn disconnect(&mut self, timeout: Duration) -> Result<(), WifiError> {
        // iw exits non-zero when already disconnected.
        self.run("disconnect", &["disconnect".to_string()], timeout, true)
            .map(drop)
    }

    fn connect(&mut self, tower: &Tower, timeout: Duration) -> Result<(), WifiError> {
        let args = [
            "connect".to_string(),
            tower.ssid.clone(),
            tower.freq.to_string(),
            tower.bssid.to_string(),
        ];
        self.run("connect", &args, timeout, false).map(drop)
    }
}

/// `signal: -61.00 dBm` → `-61`.
fn parse_signal(line: &str) -> Option<i32> {
    let rest = line.trim().strip_prefix("signal:")?.trim();
    let value = rest.strip_suffix("dBm")?.trim();
    let dbm: f64 = value.parse().ok()?;
    dbm.is_finite().then(|| dbm.round() as i32)
}

/// `last seen: 120 ms ago` → 120 ms.
fn parse_last_seen(line: &str) -> Option<Duration> {
    let rest = line.trim().strip_prefix("last seen:")?.trim();
    let ms = rest.strip_suffix("ms ago")?.trim();
    ms.parse::<u64>().ok().map(Duration::from_millis)
}

/// `BSS 02:00:00:00:00:0a(on wlan0) -- associated` → the address.
fn parse_bss_header(line: &str) -> Option<Bssid> {
    let rest = line.strip_prefix("BSS ")?;
    let (mac, _) = rest.split_once('(')?;
    Bssid::parse(mac).ok()
}

type ScanRecord = (Bssid, Option<i32>, Option<Duration>);

fn commit_sighting(record: Option<ScanRecord>, out: &mut Vec<Sighting>) {
    let Some((bssid, Some(rssi_dbm), last_seen)) = record else {
        return;
    };
    match out.iter_mut().find(|s| s.bssid == bssid) {
        Some(prev) if prev.rssi_dbm >= rssi_dbm => {}
        Some(prev) => {
            prev.rssi_dbm = rssi_dbm;
            prev.last_seen = last_seen;
        }
        None => out.push(Sighting {
            bssid,
            rssi_dbm,
            last_seen,
        }),
    }
}

/// Parse `iw dev <if> scan` output. Records without a signal line are
/// dropped; repeated BSSIDs keep the strongest reading.
pub fn parse_scan(output: &str) -> Vec<Sighting> {
    let mut sightings: Vec<Sighting> = Vec::new();
    let mut current: Option<ScanRecord> = None;

    for line in output.lines() {
        if let Some(bssid) = parse_bss_header(line) {
            commit_sighting(current.take(), &mut sightings);
            current = Some((bssid, None, None));
            continue;
        }
        let Some((_, signal, last_seen)) = current.as_mut() else {
            continue;
        };
        if let Some(dbm) = parse_signal(line) {
            *signal = Some(dbm);
        } else if let Some(age) = parse_last_seen(line) {
            *last_seen = Some(age);
        }
    }
    commit_sighting(current, &mut sightings);
    sightings
}

/// Parse `iw dev <if> link` output.
pub fn parse_link(output: &str) -> Result<Option<LinkStatus>, String> {
    if output.contains("Not connected.") {
        return Ok(None);
    }

    let mut bssid = None;
    let mut ssid = None;
    let mut rssi_dbm = None;
    for line in output.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("Connected to ") {
            let mac = rest.split_whitespace().next().unwrap_or_default();
            bssid = Some(Bssid::parse(mac).map_err(|e| e.to_string())?);
        } else if let Some(rest) = line.strip_prefix("SSID:") {
            ssid = Some(rest.trim().to_string());
        } else if let Some(dbm) = parse_signal(line) {
            rssi_dbm = Some(dbm);
        }
    }

    match (bssid, ssid) {
        (Some(bssid), Some(ssid)) => Ok(Some(LinkStatus {
            bssid,
            ssid,
            rssi_dbm,
        })),
        _ => Err(output.lines().next().unwrap_or_default().trim().to_string()),
    }
}
