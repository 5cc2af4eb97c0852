//! # Radio control
//!
//! [`WifiControl`] is the only way the daemon touches the radio. Every call
//! carries its own timeout and reports success or failure; no retry policy
//! lives here, the caller decides.
//!
//! - [`iw::IwControl`] drives the host `iw` utility.
//! - [`sim::SimulatedRadio`] random-walks tower signals for bench runs.
//! - [`crate::test_util::ScriptedWifi`] scripts results for tests.

pub mod iw;
pub mod sim;

use std::time::Duration;

use thiserror::Error;

use crate::bssid::Bssid;
use crate::config::Tower;

/// One BSS seen in a scan, before it is stamped with a capture time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sighting {
    pub bssid: Bssid,
    pub rssi_dbm: i32,
    /// How long before the scan returned the driver last heard this BSS.
    pub last_seen: Option<Duration>,
}

/// Current association as reported by the radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkStatus {
    pub bssid: Bssid,
    pub ssid: String,
    pub rssi_dbm: Option<i32>,
}

#[derive(Debug, Error)]
pub enum WifiError {
    #[error("{program} not found")]
    ToolMissing { program: String },
    #[error("{op} timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },
    #[error("{op} failed ({status}): {stderr}")]
    CommandFailed {
        op: &'static str,
        status: String,
        stderr: String,
    },
    #[error("{op}: {source}")]
    Io {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{op}: unrecognised output: {detail}")]
    Parse { op: &'static str, detail: String },
}

impl WifiError {
    /// Everything except a missing control tool is worth retrying next tick.
    pub fn is_transient(&self) -> bool {
        !matches!(self, WifiError::ToolMissing { .. })
    }
}

/// Radio-control capability.
pub trait WifiControl {
    /// Scan only the given frequencies (MHz).
    fn scan(&mut self, freqs: &[u32], timeout: Duration) -> Result<Vec<Sighting>, WifiError>;

    /// `Ok(None)` when not associated.
    fn current_link(&mut self, timeout: Duration) -> Result<Option<LinkStatus>, WifiError>;

    /// Tear the link down. Succeeds when already disconnected.
    fn disconnect(&mut self, timeout: Duration) -> Result<(), WifiError>;

    /// Associate with exactly `tower.bssid` on `tower.freq`.
    fn connect(&mut self, tower: &Tower, timeout: Duration) -> Result<(), WifiError>;
}

impl<W: WifiControl + ?Sized> WifiControl for Box<W> {
    fn scan(&mut self, freqs: &[u32], timeout: Duration) -> Result<Vec<Sighting>, WifiError> {
        (**self).scan(freqs, timeout)
    }

    fn current_link(&mut self, timeout: Duration) -> Result<Option<LinkStatus>, WifiError> {
        (**self).current_link(timeout)
    }

    fn disconnect(&mut self, timeout: Duration) -> Result<(), WifiError> {
        (**self).disconnect(timeout)
    }

    fn connect(&mut self, tower: &Tower, timeout: Duration) -> Result<(), WifiError> {
        (**self).connect(tower, timeout)
    }
}
