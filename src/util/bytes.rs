//! Human-readable sizes for logs and command output.

use std::fmt;

const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

/// Byte count rendered in IEC units with trailing zeros trimmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteSize(pub u64);

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut value = self.0 as f64;
        let mut unit = 0;
        while value >= 1024.0 && unit < UNITS.len() - 1 {
            value /= 1024.0;
            unit += 1;
        }

        if unit == 0 {
            return write!(f, "{} {}", self.0, UNITS[0]);
        }

        let rendered = if value >= 10.0 {
            format!("{value:.1}")
        } else {
            format!("{value:.2}")
        };
        let trimmed = rendered.trim_end_matches('0').trim_end_matches('.');
        write!(f, "{trimmed} {}", UNITS[unit])
    }
}

/// Convert mebibytes from configuration into bytes.
pub fn mib(value: u64) -> u64 {
    value.saturating_mul(1024 * 1024)
}
