//! Runtime tunables: loop cadence, roam gates, LED options.
//!
//! Every key is optional; missing keys take the documented default.
//! Unknown keys are ignored with a warning.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use super::{ConfigError, Violation};

/// What the LED bar shows when no tower can be identified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownMode {
    /// All segments unlit.
    Off,
    /// Every segment a faint neutral white.
    DimWhite,
}

impl UnknownMode {
    pub const ALL: [UnknownMode; 2] = [UnknownMode::Off, UnknownMode::DimWhite];

    pub fn as_str(self) -> &'static str {
        match self {
            UnknownMode::Off => "off",
            UnknownMode::DimWhite => "dim_white",
        }
    }
}

impl fmt::Display for UnknownMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnknownMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UnknownMode::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| format!("unrecognized unknown_mode {s:?}"))
    }
}

/// Resolved runtime configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    pub interface: String,
    pub poll_interval: Duration,
    pub scan_interval: Duration,
    pub scan_timeout: Duration,
    /// Maximum age of a reading that may still be scored.
    pub scan_freshness: Duration,
    /// Hysteresis band in dB. Sign is accepted either way; the magnitude
    /// is what a candidate must beat the incumbent by.
    pub roam_margin_db: f64,
    pub roam_cooldown: Duration,
    pub disconnect_grace: Duration,
    pub disconnect_pause: Duration,
    pub connect_cooldown: Duration,
    pub connect_timeout: Duration,
    pub disconnect_timeout: Duration,
    pub link_timeout: Duration,
    pub brightness: f64,
    pub unknown_mode: UnknownMode,
    pub signal_min_dbm: f64,
    pub signal_max_dbm: f64,
    pub pixels: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            interface: "wlan0".to_string(),
            poll_interval: Duration::from_secs(1),
            scan_interval: Duration::from_secs(2),
            scan_timeout: Duration::from_secs(3),
            scan_freshness: Duration::from_millis(1500),
            roam_margin_db: -2.0,
            roam_cooldown: Duration::from_secs(4),
            disconnect_grace: Duration::from_secs(3),
            disconnect_pause: Duration::from_millis(250),
            connect_cooldown: Duration::from_millis(250),
            connect_timeout: Duration::from_secs(8),
            disconnect_timeout: Duration::from_secs(5),
            link_timeout: Duration::from_secs(2),
            brightness: 0.2,
            unknown_mode: UnknownMode::Off,
            signal_min_dbm: -90.0,
            signal_max_dbm: -20.0,
            pixels: 8,
        }
    }
}

/// Raw document shape. Values stay as JSON so type errors become
/// per-key violations rather than one opaque parse failure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RuntimeConfigInput {
    pub interface: Option<Value>,
    pub poll_interval_sec: Option<Value>,
    pub scan_interval_sec: Option<Value>,
    pub scan_timeout_sec: Option<Value>,
    pub scan_freshness_ms: Option<Value>,
    pub roam_margin_db: Option<Value>,
    pub roam_cooldown_sec: Option<Value>,
    pub disconnect_grace_sec: Option<Value>,
    pub disconnect_pause_sec: Option<Value>,
    pub connect_cooldown_sec: Option<Value>,
    pub connect_timeout_sec: Option<Value>,
    pub disconnect_timeout_sec: Option<Value>,
    pub link_timeout_sec: Option<Value>,
    pub brightness: Option<Value>,
    pub unknown_mode: Option<Value>,
    pub signal_min_dbm: Option<Value>,
    pub signal_max_dbm: Option<Value>,
    pub pixels: Option<Value>,
    #[serde(flatten)]
    pub unknown: BTreeMap<String, Value>,
}

#[derive(Clone, Copy)]
enum Bound {
    Positive,
    NonNegative,
}

struct Resolver {
    violations: Vec<Violation>,
}

impl Resolver {
    fn number(&mut self, key: &str, value: Option<Value>, default: f64) -> Option<f64> {
        let Some(value) = value else {
            return Some(default);
        };
        match value.as_f64() {
            Some(v) if v.is_finite() => Some(v),
            _ => {
                self.violations
                    .push(Violation::new(format!("runtime.{key}"), "must be numeric"));
                None
            }
        }
    }

    fn seconds(
        &mut self,
        key: &str,
        value: Option<Value>,
        default: Duration,
        bound: Bound,
    ) -> Duration {
        let Some(v) = self.number(key, value, default.as_secs_f64()) else {
            return default;
        };
        let (ok, rule) = match bound {
            Bound::Positive => (v > 0.0, "must be > 0"),
            Bound::NonNegative => (v >= 0.0, "must be >= 0"),
        };
        if !ok {
            self.violations.push(Violation::new(
                format!("runtime.{key}"),
                format!("{rule} (got {v})"),
            ));
            return default;
        }
        Duration::try_from_secs_f64(v).unwrap_or_else(|_| {
            self.violations.push(Violation::new(
                format!("runtime.{key}"),
                format!("out of range (got {v})"),
            ));
            default
        })
    }

    fn integer(&mut self, key: &str, value: Option<Value>, default: u64, min: u64) -> u64 {
        let Some(v) = self.number(key, value, default as f64) else {
            return default;
        };
        if v.fract() != 0.0 || v < min as f64 || v > u32::MAX as f64 {
            let rule = if min == 0 {
                "must be a non-negative integer"
            } else {
                "must be a positive integer"
            };
            self.violations.push(Violation::new(
                format!("runtime.{key}"),
                format!("{rule} (got {v})"),
            ));
            return default;
        }
        v as u64
    }
}

impl RuntimeConfigInput {
    /// Apply defaults and validate. Returns every violation found.
    pub fn resolve(self) -> Result<RuntimeConfig, Vec<Violation>> {
        let d = RuntimeConfig::default();
        let mut r = Resolver {
            violations: Vec::new(),
        };

        let interface = match self.interface {
            None => d.interface.clone(),
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            Some(_) => {
                r.violations
                    .push(Violation::new("runtime.interface", "must be a non-empty string"));
                d.interface.clone()
            }
        };

        let unknown_mode = match self.unknown_mode {
            None => d.unknown_mode,
            Some(value) => match value.as_str().map(str::parse::<UnknownMode>) {
                Some(Ok(mode)) => mode,
                _ => {
                    r.violations.push(Violation::new(
                        "runtime.unknown_mode",
                        "must be either 'off' or 'dim_white'",
                    ));
                    d.unknown_mode
                }
            },
        };

        let poll_interval = r.seconds(
            "poll_interval_sec",
            self.poll_interval_sec,
            d.poll_interval,
            Bound::Positive,
        );
        let scan_interval = r.seconds(
            "scan_interval_sec",
            self.scan_interval_sec,
            d.scan_interval,
            Bound::Positive,
        );
        let scan_timeout = r.seconds(
            "scan_timeout_sec",
            self.scan_timeout_sec,
            d.scan_timeout,
            Bound::Positive,
        );
        let roam_cooldown = r.seconds(
            "roam_cooldown_sec",
            self.roam_cooldown_sec,
            d.roam_cooldown,
            Bound::Positive,
        );
        let disconnect_grace = r.seconds(
            "disconnect_grace_sec",
            self.disconnect_grace_sec,
            d.disconnect_grace,
            Bound::Positive,
        );
        let disconnect_pause = r.seconds(
            "disconnect_pause_sec",
            self.disconnect_pause_sec,
            d.disconnect_pause,
            Bound::NonNegative,
        );
        let connect_cooldown = r.seconds(
            "connect_cooldown_sec",
            self.connect_cooldown_sec,
            d.connect_cooldown,
            Bound::Positive,
        );
        let connect_timeout = r.seconds(
            "connect_timeout_sec",
            self.connect_timeout_sec,
            d.connect_timeout,
            Bound::Positive,
        );
        let disconnect_timeout = r.seconds(
            "disconnect_timeout_sec",
            self.disconnect_timeout_sec,
            d.disconnect_timeout,
            Bound::Positive,
        );
        let link_timeout = r.seconds(
            "link_timeout_sec",
            self.link_timeout_sec,
            d.link_timeout,
            Bound::Positive,
        );

        let scan_freshness_ms = r.integer(
            "scan_freshness_ms",
            self.scan_freshness_ms,
            d.scan_freshness.as_millis() as u64,
            0,
        );
        let pixels = r.integer("pixels", self.pixels, d.pixels as u64, 1) as usize;

        let roam_margin_db = r
            .number("roam_margin_db", self.roam_margin_db, d.roam_margin_db)
            .unwrap_or(d.roam_margin_db);

        let brightness = r
            .number("brightness", self.brightness, d.brightness)
            .unwrap_or(d.brightness);
        if !(0.0..=1.0).contains(&brightness) {
            r.violations.push(Violation::new(
                "runtime.brightness",
                format!("must be between 0.0 and 1.0 (got {brightness})"),
            ));
        }

        let signal_min_dbm = r.number("signal_min_dbm", self.signal_min_dbm, d.signal_min_dbm);
        let signal_max_dbm = r.number("signal_max_dbm", self.signal_max_dbm, d.signal_max_dbm);
        if let (Some(lo), Some(hi)) = (signal_min_dbm, signal_max_dbm) {
            if hi <= lo {
                r.violations.push(Violation::new(
                    "runtime.signal_max_dbm",
                    format!("must be greater than signal_min_dbm ({hi} <= {lo})"),
                ));
            }
        }

        if !r.violations.is_empty() {
            return Err(r.violations);
        }

        Ok(RuntimeConfig {
            interface,
            poll_interval,
            scan_interval,
            scan_timeout,
            scan_freshness: Duration::from_millis(scan_freshness_ms),
            roam_margin_db,
            roam_cooldown,
            disconnect_grace,
            disconnect_pause,
            connect_cooldown,
            connect_timeout,
            disconnect_timeout,
            link_timeout,
            brightness,
            unknown_mode,
            signal_min_dbm: signal_min_dbm.unwrap_or(d.signal_min_dbm),
            signal_max_dbm: signal_max_dbm.unwrap_or(d.signal_max_dbm),
            pixels,
        })
    }
}

impl RuntimeConfig {
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let parsed: RuntimeConfigInput =
            serde_json::from_str(input).map_err(|source| ConfigError::Json {
                path: "<inline>".into(),
                source,
            })?;
        parsed.resolve().map_err(ConfigError::Invalid)
    }
}

/// Load the runtime document at `path`, falling back to defaults when the
/// file does not exist. `interface_override` replaces the `interface` key.
pub fn load_runtime_config(
    path: &Path,
    interface_override: Option<&str>,
) -> Result<RuntimeConfig, ConfigError> {
    let mut input = if path.exists() {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str::<RuntimeConfigInput>(&text).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?
    } else {
        tracing::warn!(path = %path.display(), "runtime config not found; using defaults");
        RuntimeConfigInput::default()
    };

    if !input.unknown.is_empty() {
        let keys: Vec<&str> = input.unknown.keys().map(String::as_str).collect();
        tracing::warn!("Ignoring unknown runtime config keys: {}", keys.join(", "));
    }

    if let Some(iface) = interface_override {
        input.interface = Some(Value::String(iface.to_string()));
    }

    input.resolve().map_err(ConfigError::Invalid)
}
