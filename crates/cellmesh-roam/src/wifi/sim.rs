use rand::rngs::StdRng;
use rand::RngExt as _;
use rand::SeedableRng;
use std::time::Duration;

use super::{LinkStatus, Sighting, WifiControl, WifiError};
use crate::bssid::Bssid;
use crate::config::{Tower, TowerSet};

const RSSI_FLOOR_DBM: f64 = -85.0;
const RSSI_CEIL_DBM: f64 = -35.0;
const RSSI_STEP_DBM: f64 = 4.0;

/// Deterministic stand-in radio for bench runs.
///
/// Every configured tower's signal follows a bounded random walk that
/// advances once per scan. `connect` always succeeds and the reported
/// link follows it.
#[derive(Debug)]
pub struct SimulatedRadio {
    rng: StdRng,
    towers: Vec<SimTower>,
    link: Option<usize>,
}

#[derive(Debug, Clone)]
struct SimTower {
    ssid: String,
    bssid: Bssid,
    freq: u32,
    rssi_dbm: f64,
}

impl SimulatedRadio {
    pub fn new(towers: &TowerSet, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let towers = towers
            .iter()
            .map(|t| SimTower {
                ssid: t.ssid.clone(),
                bssid: t.bssid,
                freq: t.freq,
                rssi_dbm: RSSI_FLOOR_DBM + rng.random::<f64>() * (RSSI_CEIL_DBM - RSSI_FLOOR_DBM),
            })
            .collect();
        SimulatedRadio {
            rng,
            towers,
            link: None,
        }
    }

    fn step(&mut self) {
        for tower in &mut self.towers {
            let delta = rand_signed(&mut self.rng, RSSI_STEP_DBM);
            tower.rssi_dbm = (tower.rssi_dbm + delta).clamp(RSSI_FLOOR_DBM, RSSI_CEIL_DBM);
        }
    }
}

fn rand_signed(rng: &mut StdRng, max_step: f64) -> f64 {
    let mag = rng.random::<f64>() * max_step;
    if rng.random::<bool>() { mag } else { -mag }
}

impl WifiControl for SimulatedRadio {
    fn scan(&mut self, freqs: &[u32], _timeout: Duration) -> Result<Vec<Sighting>, WifiError> {
        self.step();
        Ok(self
            .towers
            .iter()
            .filter(|t| freqs.contains(&t.freq))
            .map(|t| Sighting {
                bssid: t.bssid,
                rssi_dbm: t.rssi_dbm.round() as i32,
                last_seen: Some(Duration::ZERO),
            })
            .collect())
    }

    fn current_link(&mut self, _timeout: Duration) -> Result<Option<LinkStatus>, WifiError> {
        Ok(self.link.map(|i| {
            let t = &self.towers[i];
            LinkStatus {
                bssid: t.bssid,
                ssid: t.ssid.clone(),
                rssi_dbm: Some(t.rssi_dbm.round() as i32),
            }
        }))
    }

    fn disconnect(&mut self, _timeout: Duration) -> Result<(), WifiError> {
        self.link = None;
        Ok(())
    }

    fn connect(&mut self, tower: &Tower, _timeout: Duration) -> Result<(), WifiError> {
        match self.towers.iter().position(|t| t.bssid == tower.bssid) {
            Some(i) => {
                self.link = Some(i);
                Ok(())
            }
            None => Err(WifiError::CommandFailed {
                op: "connect",
                status: "simulated".to_string(),
                stderr: format!("no simulated tower with bssid {}", tower.bssid),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Color;

    fn towers() -> TowerSet {
        let mk = |ssid: &str, last: u8, freq| Tower {
            ssid: ssid.to_string(),
            bssid: Bssid::new([2, 0, 0, 0, 0, last]),
            freq,
            color: Color::new(1.0, 0.0, 0.0),
        };
        TowerSet::new(vec![mk("TowerA", 1, 2412), mk("TowerB", 2, 2437)])
    }

    #[test]
    fn walk_is_deterministic_and_bounded() {
        let set = towers();
        let freqs = set.frequencies();
        let mut a = SimulatedRadio::new(&set, 7);
        let mut b = SimulatedRadio::new(&set, 7);
        for _ in 0..200 {
            let sa = a.scan(&freqs, Duration::from_secs(1)).unwrap();
            let sb = b.scan(&freqs, Duration::from_secs(1)).unwrap();
            assert_eq!(sa, sb);
            for s in sa {
                assert!((-85..=-35).contains(&s.rssi_dbm));
            }
        }
    }

    #[test]
    fn scan_respects_frequencies() {
        let set = towers();
        let mut radio = SimulatedRadio::new(&set, 1);
        let seen = radio.scan(&[2437], Duration::from_secs(1)).unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].bssid, Bssid::new([2, 0, 0, 0, 0, 2]));
    }

    #[test]
    fn link_follows_connect_and_disconnect() {
        let set = towers();
        let mut radio = SimulatedRadio::new(&set, 1);
        let t = Duration::from_secs(1);
        assert_eq!(radio.current_link(t).unwrap(), None);

        let b = set.by_ssid("TowerB").unwrap();
        radio.connect(b, t).unwrap();
        let link = radio.current_link(t).unwrap().unwrap();
        assert_eq!(link.ssid, "TowerB");
        assert_eq!(link.bssid, b.bssid);

        radio.disconnect(t).unwrap();
        radio.disconnect(t).unwrap();
        assert_eq!(radio.current_link(t).unwrap(), None);
    }
}
