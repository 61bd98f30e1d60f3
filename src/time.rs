// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fixed-point NTP-like timestamp used throughout the OWAMP/TWAMP wire and
//! session-file formats.
//!
//! A `Num64` is a 64-bit fixed-point value: the high 32 bits are whole
//! seconds since 1900-01-01 UTC, the low 32 bits are a fractional part
//! (1 / 2^32 of a second).

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

/// Seconds between the NTP epoch (1900-01-01) and the Unix epoch
/// (1970-01-01).
pub const OWPJAN_1970: u32 = 2_208_988_800;

/// A 64-bit fixed-point timestamp: `seconds.fraction`, NTP-style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct Num64 {
    pub seconds: u32,
    pub fraction: u32,
}

impl Num64 {
    pub const ZERO: Num64 = Num64 {
        seconds: 0,
        fraction: 0,
    };

    pub fn new(seconds: u32, fraction: u32) -> Self {
        Self { seconds, fraction }
    }

    /// Build a `Num64` from a floating point number of seconds (NTP
    /// epoch, not Unix epoch).
    pub fn from_f64(secs: f64) -> Self {
        let whole = secs.floor();
        let frac = secs - whole;
        Num64 {
            seconds: whole as u32,
            fraction: (frac * 4_294_967_296.0) as u32,
        }
    }

    /// Render as a floating point number of seconds (NTP epoch).
    pub fn to_f64(self) -> f64 {
        self.seconds as f64 + (self.fraction as f64 / 4_294_967_296.0)
    }

    /// Convert to a Unix-epoch floating point number of seconds.
    pub fn to_unix_f64(self) -> f64 {
        self.seconds as f64 - OWPJAN_1970 as f64 + (self.fraction as f64 / 4_294_967_296.0)
    }

    /// Signed difference `self - other`, in seconds, as f64. Can be
    /// negative when clocks disagree or ordering is violated.
    pub fn diff_secs(self, other: Num64) -> f64 {
        self.to_f64() - other.to_f64()
    }

    /// `self + delta_secs`, saturating rather than wrapping on overflow.
    pub fn add_secs(self, delta_secs: f64) -> Num64 {
        Num64::from_f64((self.to_f64() + delta_secs).max(0.0))
    }

    pub fn read<R: Read>(r: &mut R) -> io::Result<Self> {
        let seconds = r.read_u32::<BigEndian>()?;
        let fraction = r.read_u32::<BigEndian>()?;
        Ok(Num64 { seconds, fraction })
    }

    pub fn write<W: Write>(self, w: &mut W) -> io::Result<()> {
        w.write_u32::<BigEndian>(self.seconds)?;
        w.write_u32::<BigEndian>(self.fraction)?;
        Ok(())
    }
}

impl std::ops::Sub for Num64 {
    type Output = f64;
    fn sub(self, rhs: Num64) -> f64 {
        self.diff_secs(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_f64() {
        let n = Num64::from_f64(12345.25);
        assert_eq!(n.seconds, 12345);
        assert!((n.to_f64() - 12345.25).abs() < 1e-9);
    }

    #[test]
    fn diff_is_signed() {
        let a = Num64::from_f64(10.0);
        let b = Num64::from_f64(10.5);
        assert!((a - b + 0.5).abs() < 1e-9);
        assert!((b - a - 0.5).abs() < 1e-9);
    }

    #[test]
    fn unix_conversion() {
        let n = Num64::new(OWPJAN_1970, 0);
        assert!((n.to_unix_f64()).abs() < 1e-9);
    }

    #[test]
    fn wire_round_trip() {
        let n = Num64::new(0xdeadbeef, 0x01020304);
        let mut buf = Vec::new();
        n.write(&mut buf).unwrap();
        let back = Num64::read(&mut &buf[..]).unwrap();
        assert_eq!(n, back);
    }
}
