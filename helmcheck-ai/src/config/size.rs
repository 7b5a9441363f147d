//! Human-readable byte sizes and durations

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

const KB: u64 = 1024;
const MB: u64 = KB * 1024;
const GB: u64 = MB * 1024;
const TB: u64 = GB * 1024;

/// Longer suffixes first so "MB" is not read as "B"
const UNITS: [(&str, u64); 5] = [("TB", TB), ("GB", GB), ("MB", MB), ("KB", KB), ("B", 1)];

/// Parse sizes like `"100MB"`, `"1.5GB"` or a bare byte count
pub fn parse_size(input: &str) -> Result<u64, String> {
    let normalized = input.trim().to_ascii_uppercase();
    if normalized.is_empty() {
        return Err("empty size string".to_string());
    }

    for (suffix, multiplier) in UNITS {
        if let Some(number) = normalized.strip_suffix(suffix) {
            let number = number.trim();
            let value: f64 = number
                .parse()
                .map_err(|_| format!("invalid number '{}' in size '{}'", number, input))?;
            if !value.is_finite() || value < 0.0 {
                return Err(format!("size must be a non-negative number, got '{}'", input));
            }
            return Ok((value * multiplier as f64) as u64);
        }
    }

    normalized
        .parse()
        .map_err(|_| format!("invalid size format: '{}'", input))
}

/// Parse durations like `"500ms"`, `"30s"`, `"2m"`, `"1h"` or bare seconds
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let trimmed = input.trim();
    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);
    let value: f64 = number
        .parse()
        .map_err(|_| format!("invalid duration '{}'", input))?;
    if !value.is_finite() || value < 0.0 {
        return Err(format!("duration must be non-negative, got '{}'", input));
    }
    let seconds = match unit.trim() {
        "ms" => value / 1000.0,
        "" | "s" => value,
        "m" => value * 60.0,
        "h" => value * 3600.0,
        other => return Err(format!("unknown duration unit '{}' in '{}'", other, input)),
    };
    Ok(Duration::from_secs_f64(seconds))
}

/// A byte count written as `"100MB"` in configuration files
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct ByteSize(pub u64);

impl ByteSize {
    pub const fn mb(n: u64) -> Self {
        Self(n * MB)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (suffix, multiplier) in UNITS {
            if self.0 >= multiplier && self.0 % multiplier == 0 {
                return write!(f, "{}{}", self.0 / multiplier, suffix);
            }
        }
        write!(f, "{}B", self.0)
    }
}

impl FromStr for ByteSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_size(s).map(ByteSize)
    }
}

impl Serialize for ByteSize {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ByteSize {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Bytes(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Bytes(bytes) => Ok(ByteSize(bytes)),
            Raw::Text(text) => text.parse().map_err(serde::de::Error::custom),
        }
    }
}
