//! # Cell-mesh client roaming
//!
//! Client side of the cell-mesh simulator: fixed Wi-Fi "towers" broadcast
//! distinct BSSIDs and this daemon decides which one to associate with,
//! then shows that decision on an LED bar (tower colour + signal level).
//!
//! Pipeline per loop tick:
//!
//! ```text
//! Scanner ──► Scorer ──► RoamController ──► Renderer ──► LedBar
//!    ▲                         │
//!    └──────── WifiControl ◄───┘   (iw dev <if> scan|link|connect|disconnect)
//! ```
//!
//! All radio access goes through the [`wifi::WifiControl`] trait and all
//! time through [`clock::Timer`], so the decision engine runs unchanged
//! against scripted radios and a mock clock in tests.

pub mod bssid;
pub mod clock;
pub mod config;
pub mod controller;
pub mod daemon;
pub mod render;
pub mod report;
pub mod scanner;
pub mod scorer;
pub mod wifi;

pub mod test_util;
