//! # Rendering
//!
//! Association + signal → LED frame. [`render`] is pure; devices only see
//! finished [`Frame`]s through the [`LedBar`] trait.

pub mod blinkt;

use std::path::PathBuf;

use thiserror::Error;
use tracing::info;

use crate::config::{RuntimeConfig, Tower, UnknownMode};

const DIM_WHITE: Rgb8 = Rgb8::new(10, 10, 10);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rgb8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb8 {
    pub const OFF: Rgb8 = Rgb8::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Rgb8 { r, g, b }
    }

    pub fn is_off(self) -> bool {
        self == Self::OFF
    }
}

/// One full bar state.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub pixels: Vec<Rgb8>,
    /// Global brightness in `[0, 1]`.
    pub brightness: f64,
}

impl Frame {
    pub fn blank(pixels: usize, brightness: f64) -> Self {
        Frame {
            pixels: vec![Rgb8::OFF; pixels],
            brightness,
        }
    }

    pub fn lit(&self) -> usize {
        self.pixels.iter().filter(|p| !p.is_off()).count()
    }
}

/// What the bar should show.
#[derive(Debug, Clone, Copy)]
pub enum View<'a> {
    Unknown,
    Connected {
        tower: &'a Tower,
        rssi_dbm: Option<i32>,
    },
}

/// Lit segments for a connected tower. Monotonic in RSSI; `0` at or below
/// `signal_min_dbm`, `pixels` at or above `signal_max_dbm`, and never `0`
/// for a signal strictly above the minimum. No RSSI at all lights one.
pub fn segment_count(rssi_dbm: Option<i32>, cfg: &RuntimeConfig) -> usize {
    let pixels = cfg.pixels;
    let Some(rssi) = rssi_dbm.map(f64::from) else {
        return pixels.min(1);
    };
    let (lo, hi) = (cfg.signal_min_dbm, cfg.signal_max_dbm);
    if rssi <= lo {
        return 0;
    }
    if rssi >= hi {
        return pixels;
    }
    let norm = ((rssi - lo) / (hi - lo)).clamp(0.0, 1.0);
    let count = (norm * pixels as f64).round() as usize;
    count.max(1).min(pixels)
}

pub fn render(view: View<'_>, cfg: &RuntimeConfig) -> Frame {
    let mut frame = Frame::blank(cfg.pixels, cfg.brightness);
    match view {
        View::Unknown => {
            if cfg.unknown_mode == UnknownMode::DimWhite {
                frame.pixels.fill(DIM_WHITE);
            }
        }
        View::Connected { tower, rssi_dbm } => {
            let [r, g, b] = tower.color.to_rgb8();
            let n = segment_count(rssi_dbm, cfg);
            frame.pixels[..n].fill(Rgb8::new(r, g, b));
        }
    }
    frame
}

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("frame has {got} pixels, device has {want}")]
    Size { got: usize, want: usize },
}

/// An addressable LED strip.
pub trait LedBar {
    fn show(&mut self, frame: &Frame) -> Result<(), OutputError>;

    /// Turn every pixel off.
    fn clear(&mut self) -> Result<(), OutputError>;

    /// Number of physical pixels, if the device has a fixed size.
    fn capacity(&self) -> Option<usize> {
        None
    }
}

/// Fail unless frames of `pixels` fit on `bar`.
pub fn ensure_fits<B: LedBar + ?Sized>(bar: &B, pixels: usize) -> Result<(), OutputError> {
    match bar.capacity() {
        Some(want) if pixels > want => Err(OutputError::Size { got: pixels, want }),
        _ => Ok(()),
    }
}

impl<B: LedBar + ?Sized> LedBar for Box<B> {
    fn show(&mut self, frame: &Frame) -> Result<(), OutputError> {
        (**self).show(frame)
    }

    fn clear(&mut self) -> Result<(), OutputError> {
        (**self).clear()
    }

    fn capacity(&self) -> Option<usize> {
        (**self).capacity()
    }
}

/// Writes frames to the log instead of hardware.
#[derive(Debug, Default)]
pub struct LogBar;

impl LedBar for LogBar {
    fn show(&mut self, frame: &Frame) -> Result<(), OutputError> {
        let strip: String = frame
            .pixels
            .iter()
            .map(|p| if p.is_off() { '.' } else { '#' })
            .collect();
        let color = frame
            .pixels
            .iter()
            .find(|p| !p.is_off())
            .map(|p| format!("#{:02x}{:02x}{:02x}", p.r, p.g, p.b))
            .unwrap_or_else(|| "off".to_string());
        info!(strip = %strip, color = %color, brightness = frame.brightness, "LED frame");
        Ok(())
    }

    fn clear(&mut self) -> Result<(), OutputError> {
        info!("LED clear");
        Ok(())
    }
}
