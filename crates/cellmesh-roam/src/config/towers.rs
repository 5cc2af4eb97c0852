//! Tower map: SSID → (BSSID, frequency, colour).
//!
//! ```json
//! { "TowerA": { "color": [1.0, 0.0, 0.0], "freq": 2412, "bssid": "02:00:00:00:00:0a" } }
//! ```

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;

use serde_json::Value;
use tracing::warn;

use super::{ConfigError, Violation};
use crate::bssid::Bssid;

/// Tower colour, each channel in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Color {
    pub const fn new(r: f64, g: f64, b: f64) -> Self {
        Color { r, g, b }
    }

    /// 8-bit channels, `round(255 * c)`.
    pub fn to_rgb8(self) -> [u8; 3] {
        let q = |c: f64| (255.0 * c.clamp(0.0, 1.0)).round() as u8;
        [q(self.r), q(self.g), q(self.b)]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tower {
    pub ssid: String,
    pub bssid: Bssid,
    /// Channel centre frequency in MHz.
    pub freq: u32,
    pub color: Color,
}

/// The active tower set, ordered by SSID, indexed by BSSID.
#[derive(Debug, Clone, Default)]
pub struct TowerSet {
    towers: Vec<Tower>,
    by_bssid: HashMap<Bssid, usize>,
}

impl TowerSet {
    pub fn new(mut towers: Vec<Tower>) -> Self {
        towers.sort_by(|a, b| a.ssid.cmp(&b.ssid));
        let by_bssid = towers
            .iter()
            .enumerate()
            .map(|(i, t)| (t.bssid, i))
            .collect();
        TowerSet { towers, by_bssid }
    }

    pub fn len(&self) -> usize {
        self.towers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.towers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tower> {
        self.towers.iter()
    }

    pub fn by_bssid(&self, bssid: &Bssid) -> Option<&Tower> {
        self.by_bssid.get(bssid).map(|&i| &self.towers[i])
    }

    pub fn by_ssid(&self, ssid: &str) -> Option<&Tower> {
        self.towers
            .binary_search_by(|t| t.ssid.as_str().cmp(ssid))
            .ok()
            .map(|i| &self.towers[i])
    }

    /// Sorted, deduplicated scan frequencies.
    pub fn frequencies(&self) -> Vec<u32> {
        self.towers
            .iter()
            .map(|t| t.freq)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Read and validate the tower map at `path`.
pub fn load_tower_map(path: &Path) -> Result<TowerSet, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let root: Value = serde_json::from_str(&text).map_err(|source| ConfigError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    resolve_tower_map(&root).map_err(ConfigError::Invalid)
}

/// Validate a parsed tower-map document.
///
/// Malformed entries are violations. Well-formed entries that cannot be
/// used (placeholder BSSID, a BSSID or SSID already taken) are skipped
/// with a warning; the map is only rejected if nothing usable remains.
pub fn resolve_tower_map(root: &Value) -> Result<TowerSet, Vec<Violation>> {
    let Some(entries) = root.as_object() else {
        return Err(vec![Violation::new("towers", "root must be an object")]);
    };

    let mut violations = Vec::new();
    let mut towers = Vec::new();
    let mut seen_bssids: HashMap<Bssid, String> = HashMap::new();
    let mut seen_ssids: HashSet<String> = HashSet::new();

    for (key, entry) in entries {
        let ssid = key.trim();
        if ssid.is_empty() {
            violations.push(Violation::new("towers", format!("invalid SSID key {key:?}")));
            continue;
        }
        let scope = |field: &str| format!("towers.{ssid}.{field}");

        let Some(fields) = entry.as_object() else {
            violations.push(Violation::new(format!("towers.{ssid}"), "entry must be an object"));
            continue;
        };

        let color = resolve_color(fields.get("color"), &scope("color"), &mut violations);
        let freq = resolve_freq(fields.get("freq"), &scope("freq"), &mut violations);
        let bssid = resolve_bssid(fields.get("bssid"), &scope("bssid"), &mut violations);
        let (Some(color), Some(freq), Some(bssid)) = (color, freq, bssid) else {
            continue;
        };

        if bssid.is_placeholder() {
            warn!(tower = %ssid, %bssid, "Skipping tower with placeholder bssid");
            continue;
        }
        if let Some(other) = seen_bssids.get(&bssid) {
            warn!(tower = %ssid, %bssid, also = %other, "Skipping tower with duplicate bssid");
            continue;
        }
        if !seen_ssids.insert(ssid.to_string()) {
            warn!(tower = %ssid, key = ?key, "Skipping tower with duplicate SSID");
            continue;
        }
        seen_bssids.insert(bssid, ssid.to_string());
        towers.push(Tower {
            ssid: ssid.to_string(),
            bssid,
            freq,
            color,
        });
    }

    if entries.is_empty() {
        violations.push(Violation::new("towers", "contains no tower entries"));
    } else if violations.is_empty() && towers.is_empty() {
        violations.push(Violation::new("towers", "no usable tower entries"));
    }

    if violations.is_empty() {
        Ok(TowerSet::new(towers))
    } else {
        Err(violations)
    }
}

fn resolve_color(value: Option<&Value>, scope: &str, out: &mut Vec<Violation>) -> Option<Color> {
    let Some(items) = value.and_then(Value::as_array) else {
        out.push(Violation::new(scope, "must be a 3-element list"));
        return None;
    };
    if items.len() != 3 {
        out.push(Violation::new(
            scope,
            format!("must be a 3-element list (got {})", items.len()),
        ));
        return None;
    }

    let mut channels = [0.0f64; 3];
    let mut ok = true;
    for (idx, item) in items.iter().enumerate() {
        match item.as_f64() {
            Some(c) if (0.0..=1.0).contains(&c) => channels[idx] = c,
            Some(c) => {
                out.push(Violation::new(
                    format!("{scope}[{idx}]"),
                    format!("must be between 0.0 and 1.0 (got {c})"),
                ));
                ok = false;
            }
            None => {
                out.push(Violation::new(format!("{scope}[{idx}]"), "must be numeric"));
                ok = false;
            }
        }
    }
    ok.then(|| Color::new(channels[0], channels[1], channels[2]))
}

fn resolve_freq(value: Option<&Value>, scope: &str, out: &mut Vec<Violation>) -> Option<u32> {
    let Some(v) = value.and_then(Value::as_f64) else {
        out.push(Violation::new(scope, "must be numeric"));
        return None;
    };
    if v.fract() != 0.0 || v <= 0.0 || v > f64::from(u32::MAX) {
        out.push(Violation::new(scope, format!("must be a positive integer (got {v})")));
        return None;
    }
    Some(v as u32)
}

fn resolve_bssid(value: Option<&Value>, scope: &str, out: &mut Vec<Violation>) -> Option<Bssid> {
    let Some(raw) = value.and_then(Value::as_str) else {
        out.push(Violation::new(scope, "must be a string"));
        return None;
    };
    match Bssid::parse(raw) {
        Ok(b) => Some(b),
        Err(e) => {
            out.push(Violation::new(scope, e.to_string()));
            None
        }
    }
}
