//! Scripted stand-ins for the radio and the LED bar, shared by unit and
//! integration tests.

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use quanta::{Clock, Instant};

use crate::bssid::Bssid;
use crate::config::Tower;
use crate::render::{Frame, LedBar, OutputError};
use crate::wifi::{LinkStatus, Sighting, WifiControl, WifiError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WifiCall {
    Scan(Vec<u32>),
    Link,
    Disconnect,
    /// SSID of the tower asked for.
    Connect(String),
}

#[derive(Debug, Clone)]
pub struct CallRecord {
    pub at: Instant,
    pub call: WifiCall,
}

/// A radio whose environment and failures are set by the test.
///
/// Scans return queued results first, then the current environment (every
/// BSSID set with [`ScriptedWifi::set_signal`], heard just now). A
/// successful connect moves the link to that tower and its RSSI then tracks
/// the environment (`None` once the signal is removed).
pub struct ScriptedWifi {
    clock: Clock,
    environment: BTreeMap<Bssid, i32>,
    queued_scans: VecDeque<Result<Vec<Sighting>, WifiError>>,
    link: Option<LinkStatus>,
    /// Link RSSI is read from the environment (set after a connect).
    link_tracks_environment: bool,
    connect_failures: usize,
    disconnect_failures: usize,
    link_failures: usize,
    calls: Vec<CallRecord>,
}

impl ScriptedWifi {
    /// `clock` should be the test's timer clock so calls are stamped in
    /// the same virtual time.
    pub fn new(clock: Clock) -> Self {
        ScriptedWifi {
            clock,
            environment: BTreeMap::new(),
            queued_scans: VecDeque::new(),
            link: None,
            link_tracks_environment: false,
            connect_failures: 0,
            disconnect_failures: 0,
            link_failures: 0,
            calls: Vec::new(),
        }
    }

    pub fn set_signal(&mut self, bssid: Bssid, rssi_dbm: i32) {
        self.environment.insert(bssid, rssi_dbm);
    }

    pub fn remove_signal(&mut self, bssid: &Bssid) {
        self.environment.remove(bssid);
    }

    pub fn push_scan(&mut self, result: Result<Vec<Sighting>, WifiError>) {
        self.queued_scans.push_back(result);
    }

    /// Force the reported link, e.g. to an unmanaged network.
    pub fn set_link(&mut self, link: Option<LinkStatus>) {
        self.link = link;
        self.link_tracks_environment = false;
    }

    pub fn fail_next_connect(&mut self) {
        self.connect_failures += 1;
    }

    pub fn fail_next_disconnect(&mut self) {
        self.disconnect_failures += 1;
    }

    pub fn fail_next_link(&mut self) {
        self.link_failures += 1;
    }

    pub fn linked_ssid(&self) -> Option<&str> {
        self.link.as_ref().map(|l| l.ssid.as_str())
    }

    pub fn calls(&self) -> &[CallRecord] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Radio-changing calls only (connect/disconnect), in order.
    pub fn actions(&self) -> Vec<WifiCall> {
        self.calls
            .iter()
            .filter(|c| matches!(c.call, WifiCall::Connect(_) | WifiCall::Disconnect))
            .map(|c| c.call.clone())
            .collect()
    }

    fn record(&mut self, call: WifiCall) {
        self.calls.push(CallRecord {
            at: self.clock.now(),
            call,
        });
    }

    fn scripted_failure(op: &'static str) -> WifiError {
        WifiError::CommandFailed {
            op,
            status: "exit status: 1".to_string(),
            stderr: "scripted failure".to_string(),
        }
    }
}

impl WifiControl for ScriptedWifi {
    fn scan(&mut self, freqs: &[u32], _timeout: Duration) -> Result<Vec<Sighting>, WifiError> {
        self.record(WifiCall::Scan(freqs.to_vec()));
        if let Some(result) = self.queued_scans.pop_front() {
            return result;
        }
        Ok(self
            .environment
            .iter()
            .map(|(&bssid, &rssi_dbm)| Sighting {
                bssid,
                rssi_dbm,
                last_seen: Some(Duration::ZERO),
            })
            .collect())
    }

    fn current_link(&mut self, _timeout: Duration) -> Result<Option<LinkStatus>, WifiError> {
        self.record(WifiCall::Link);
        if self.link_failures > 0 {
            self.link_failures -= 1;
            return Err(WifiError::Timeout {
                op: "link",
                after: Duration::from_secs(2),
            });
        }
        Ok(self.link.clone().map(|mut link| {
            if self.link_tracks_environment {
                link.rssi_dbm = self.environment.get(&link.bssid).copied();
            }
            link
        }))
    }

    fn disconnect(&mut self, _timeout: Duration) -> Result<(), WifiError> {
        self.record(WifiCall::Disconnect);
        if self.disconnect_failures > 0 {
            self.disconnect_failures -= 1;
            return Err(Self::scripted_failure("disconnect"));
        }
        self.link = None;
        Ok(())
    }

    fn connect(&mut self, tower: &Tower, _timeout: Duration) -> Result<(), WifiError> {
        self.record(WifiCall::Connect(tower.ssid.clone()));
        if self.connect_failures > 0 {
            self.connect_failures -= 1;
            return Err(Self::scripted_failure("connect"));
        }
        self.link = Some(LinkStatus {
            bssid: tower.bssid,
            ssid: tower.ssid.clone(),
            rssi_dbm: self.environment.get(&tower.bssid).copied(),
        });
        self.link_tracks_environment = true;
        Ok(())
    }
}

/// Keeps every frame it is shown.
#[derive(Debug, Default)]
pub struct MemoryBar {
    frames: Vec<Frame>,
    clears: usize,
}

impl MemoryBar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn last(&self) -> Option<&Frame> {
        self.frames.last()
    }

    pub fn clears(&self) -> usize {
        self.clears
    }
}

impl LedBar for MemoryBar {
    fn show(&mut self, frame: &Frame) -> Result<(), OutputError> {
        self.frames.push(frame.clone());
        Ok(())
    }

    fn clear(&mut self) -> Result<(), OutputError> {
        self.clears += 1;
        Ok(())
    }
}
