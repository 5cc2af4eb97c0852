//! Access-point hardware address (BSSID).

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid bssid format: {0:?}")]
pub struct BssidError(pub String);

/// A 6-byte BSSID. Displays in canonical lower-case colon-hex form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Bssid([u8; 6]);

impl Bssid {
    pub const fn new(octets: [u8; 6]) -> Self {
        Bssid(octets)
    }

    /// Strict parse: exactly six two-digit hex groups joined by `:`.
    /// Surrounding whitespace and upper-case digits are accepted.
    pub fn parse(input: &str) -> Result<Self, BssidError> {
        let norm = input.trim().to_ascii_lowercase();
        let bytes = norm.as_bytes();
        if bytes.len() != 17 || !norm.is_ascii() {
            return Err(BssidError(input.to_string()));
        }

        let mut octets = [0u8; 6];
        for (i, octet) in octets.iter_mut().enumerate() {
            let at = i * 3;
            if i < 5 && bytes[at + 2] != b':' {
                return Err(BssidError(input.to_string()));
            }
            let pair = &norm[at..at + 2];
            if !pair.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(BssidError(input.to_string()));
            }
            *octet = u8::from_str_radix(pair, 16).map_err(|_| BssidError(input.to_string()))?;
        }
        Ok(Bssid(octets))
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// All-zero and broadcast addresses never identify a real radio.
    pub fn is_placeholder(&self) -> bool {
        self.0 == [0u8; 6] || self.0 == [0xffu8; 6]
    }
}

impl FromStr for Bssid {
    type Err = BssidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Bssid::parse(s)
    }
}

impl fmt::Display for Bssid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}
