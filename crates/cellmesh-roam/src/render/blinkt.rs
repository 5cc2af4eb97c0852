//! Pimoroni Blinkt! (8 × APA102) driven by bit-banging two GPIO lines
//! through the Linux sysfs interface.
//!
//! APA102 framing: 32 zero bits, then per pixel
//! `0b111_bbbbb` (5-bit global brightness), blue, green, red, then at least
//! `n/2` extra clocks to latch. Data is sampled on the rising clock edge,
//! MSB first.

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{Frame, LedBar, OutputError};

/// BCM pin numbers on the Blinkt! header.
pub const DATA_PIN: u32 = 23;
pub const CLOCK_PIN: u32 = 24;
pub const PIXELS: usize = 8;

const SYSFS_GPIO: &str = "/sys/class/gpio";
const START_CLOCKS: usize = 32;
const LATCH_CLOCKS: usize = 36;

/// A single output line.
pub trait OutputPin {
    fn set(&mut self, high: bool) -> Result<(), OutputError>;
}

/// An exported sysfs GPIO line configured as output.
#[derive(Debug)]
pub struct SysfsPin {
    value_path: PathBuf,
    value: File,
}

impl SysfsPin {
    /// Export `gpio<number>` (if needed), set it to output and open its
    /// value file.
    pub fn open(number: u32) -> Result<Self, OutputError> {
        let root = Path::new(SYSFS_GPIO);
        let dir = root.join(format!("gpio{number}"));
        if !dir.exists() {
            let export = root.join("export");
            match std::fs::write(&export, number.to_string()) {
                Ok(()) => {}
                // Raced with another exporter.
                Err(e) if e.kind() == ErrorKind::ResourceBusy => {}
                Err(source) => return Err(OutputError::Io { path: export, source }),
            }
        }

        let direction = dir.join("direction");
        std::fs::write(&direction, "out").map_err(|source| OutputError::Io {
            path: direction.clone(),
            source,
        })?;

        let value_path = dir.join("value");
        let value = OpenOptions::new()
            .write(true)
            .open(&value_path)
            .map_err(|source| OutputError::Io {
                path: value_path.clone(),
                source,
            })?;
        debug!(pin = number, "gpio line ready");
        Ok(SysfsPin { value_path, value })
    }
}

impl OutputPin for SysfsPin {
    fn set(&mut self, high: bool) -> Result<(), OutputError> {
        let byte: &[u8] = if high { b"1" } else { b"0" };
        self.value
            .write_at(byte, 0)
            .map(drop)
            .map_err(|source| OutputError::Io {
                path: self.value_path.clone(),
                source,
            })
    }
}

/// The APA102 byte stream for one frame, excluding the latch clocks.
pub fn encode_frame(frame: &Frame) -> Vec<u8> {
    let global = (31.0 * frame.brightness.clamp(0.0, 1.0)).round() as u8;
    let mut out = vec![0u8; START_CLOCKS / 8];
    out.reserve(frame.pixels.len() * 4);
    for p in &frame.pixels {
        out.extend_from_slice(&[0b1110_0000 | global, p.b, p.g, p.r]);
    }
    out
}

pub struct BlinktBar<P: OutputPin = SysfsPin> {
    data: P,
    clock: P,
    pixels: usize,
}

impl BlinktBar<SysfsPin> {
    /// Open the Blinkt! lines. `gpio_base` is added to the BCM numbers for
    /// kernels whose gpiochip does not start at 0.
    pub fn open(gpio_base: u32) -> Result<Self, OutputError> {
        let data = SysfsPin::open(gpio_base + DATA_PIN)?;
        let clock = SysfsPin::open(gpio_base + CLOCK_PIN)?;
        info!(data = gpio_base + DATA_PIN, clock = gpio_base + CLOCK_PIN, "Blinkt ready");
        Ok(BlinktBar::with_pins(data, clock, PIXELS))
    }
}

impl<P: OutputPin> BlinktBar<P> {
    pub fn with_pins(data: P, clock: P, pixels: usize) -> Self {
        BlinktBar {
            data,
            clock,
            pixels,
        }
    }

    fn pulse(&mut self) -> Result<(), OutputError> {
        self.clock.set(true)?;
        self.clock.set(false)
    }

    fn write_byte(&mut self, byte: u8) -> Result<(), OutputError> {
        for bit in (0..8).rev() {
            self.data.set(byte & (1 << bit) != 0)?;
            self.pulse()?;
        }
        Ok(())
    }

    fn latch(&mut self) -> Result<(), OutputError> {
        self.data.set(false)?;
        for _ in 0..LATCH_CLOCKS {
            self.pulse()?;
        }
        Ok(())
    }
}

impl<P: OutputPin> LedBar for BlinktBar<P> {
    fn show(&mut self, frame: &Frame) -> Result<(), OutputError> {
        if frame.pixels.len() > self.pixels {
            return Err(OutputError::Size {
                got: frame.pixels.len(),
                want: self.pixels,
            });
        }
        let mut padded = frame.clone();
        padded.pixels.resize(self.pixels, super::Rgb8::OFF);
        for byte in encode_frame(&padded) {
            self.write_byte(byte)?;
        }
        self.latch()
    }

    fn clear(&mut self) -> Result<(), OutputError> {
        self.show(&Frame::blank(self.pixels, 0.0))
    }

    fn capacity(&self) -> Option<usize> {
        Some(self.pixels)
    }
}
