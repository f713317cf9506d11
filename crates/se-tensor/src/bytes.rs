// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralEvo — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Human-readable byte sizes for arena diagnostics and driver logs.

use core::fmt;
use std::str::FromStr;

const UNITS: [&str; 9] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB", "ZiB", "YiB"];

/// A byte count that renders as `"16.00 MiB"` and parses back from the same
/// shape (a bare unit letter such as `"512 K"` is accepted too).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HumanSize(f64);

impl HumanSize {
    pub fn new(bytes: f64) -> Self {
        Self(bytes)
    }

    pub fn bytes(&self) -> f64 {
        self.0
    }
}

impl fmt::Display for HumanSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut size = self.0;
        let mut unit = 0;
        while size > 1024.0 && unit + 1 < UNITS.len() {
            size /= 1024.0;
            unit += 1;
        }
        write!(f, "{size:.2} {}", UNITS[unit])
    }
}

/// Parse failure for [`HumanSize`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParseSizeError;

impl fmt::Display for ParseSizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected a number optionally followed by B/K/M/G/T/P/E/Z/Y")
    }
}

impl std::error::Error for ParseSizeError {}

impl FromStr for HumanSize {
    type Err = ParseSizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s
            .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
            .unwrap_or(s.len());
        let (number, rest) = s.split_at(split);
        let mut value: f64 = number.parse().map_err(|_| ParseSizeError)?;

        if let Some(unit) = rest.trim().chars().next() {
            let exponent = "BKMGTPEZY"
                .find(unit.to_ascii_uppercase())
                .ok_or(ParseSizeError)?;
            value *= 1024f64.powi(exponent as i32);
        }

        Ok(Self(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_binary_units() {
        assert_eq!(HumanSize::new(512.0).to_string(), "512.00 B");
        assert_eq!(HumanSize::new(16.0 * 1024.0 * 1024.0).to_string(), "16.00 MiB");
        assert_eq!(HumanSize::new(1536.0).to_string(), "1.50 KiB");
    }

    #[test]
    fn parses_back_what_it_prints() {
        let size: HumanSize = "16.00 MiB".parse().unwrap();
        assert_eq!(size.bytes(), 16.0 * 1024.0 * 1024.0);
        let bare: HumanSize = "512 K".parse().unwrap();
        assert_eq!(bare.bytes(), 512.0 * 1024.0);
        let plain: HumanSize = "42".parse().unwrap();
        assert_eq!(plain.bytes(), 42.0);
    }

    #[test]
    fn rejects_unknown_units() {
        assert!("12 Q".parse::<HumanSize>().is_err());
        assert!("twelve".parse::<HumanSize>().is_err());
    }
}
