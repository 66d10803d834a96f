//! Human-readable byte sizes: `512KB`, `1.5M`, `2GB`, `8150`, `8 bytes`.

use crate::error::SizeError;
use std::num::{IntErrorKind, ParseIntError};

pub const KIB: u64 = 1 << 10;
pub const MIB: u64 = 1 << 20;
pub const GIB: u64 = 1 << 30;

/// Accepted suffixes, longest first so `KB` is never read as `K` + junk.
const UNITS: &[(&str, u64)] = &[
    ("BYTES", 1),
    ("BYTE", 1),
    ("KB", KIB),
    ("MB", MIB),
    ("GB", GIB),
    ("B", 1),
    ("K", KIB),
    ("M", MIB),
    ("G", GIB),
];

/// Parse a single size string into a byte count.
///
/// The mantissa may carry a decimal fraction; the product is truncated toward
/// zero. Suffixes are case-insensitive and may be separated from the number by
/// whitespace.
pub fn parse(text: &str) -> Result<u64, SizeError> {
    let s = text.trim();
    if s.is_empty() {
        return Err(SizeError::Empty);
    }
    let split = s.find(|c: char| !(c.is_ascii_digit() || c == '.')).unwrap_or(s.len());
    let (num, suffix) = s.split_at(split);
    let suffix = suffix.trim_start();

    let multiplier = multiplier_for(suffix).ok_or_else(|| {
        if num.is_empty() {
            // "abc", "-5MB": nothing numeric up front
            SizeError::InvalidNumber { input: s.to_string() }
        } else {
            SizeError::UnknownUnit { input: s.to_string(), unit: suffix.to_string() }
        }
    })?;
    if num.is_empty() {
        return Err(SizeError::InvalidNumber { input: s.to_string() });
    }

    if !num.contains('.') {
        let whole: u64 = num.parse().map_err(|e: ParseIntError| match e.kind() {
            IntErrorKind::PosOverflow => SizeError::Overflow { input: s.to_string() },
            _ => SizeError::InvalidNumber { input: s.to_string() },
        })?;
        return whole
            .checked_mul(multiplier)
            .ok_or_else(|| SizeError::Overflow { input: s.to_string() });
    }

    let value: f64 = num.parse().map_err(|_| SizeError::InvalidNumber { input: s.to_string() })?;
    let bytes = value * multiplier as f64;
    if !bytes.is_finite() || bytes >= u64::MAX as f64 {
        return Err(SizeError::Overflow { input: s.to_string() });
    }
    Ok(bytes as u64)
}

fn multiplier_for(suffix: &str) -> Option<u64> {
    if suffix.is_empty() {
        return Some(1);
    }
    UNITS.iter().find(|(name, _)| name.eq_ignore_ascii_case(suffix)).map(|&(_, mul)| mul)
}

/// Parse a comma-separated list of sizes. Fails on the first bad element and
/// returns nothing in that case.
pub fn parse_list(text: &str) -> Result<Vec<u64>, SizeError> {
    if text.trim().is_empty() {
        return Err(SizeError::EmptyList);
    }
    text.split(',')
        .enumerate()
        .map(|(i, part)| {
            parse(part).map_err(|e| SizeError::InList { position: i + 1, source: Box::new(e) })
        })
        .collect()
}

/// Render a byte count in the largest unit it reaches, two decimals.
pub fn format(bytes: u64) -> String {
    match bytes {
        b if b >= GIB => format!("{:.2} GB", b as f64 / GIB as f64),
        b if b >= MIB => format!("{:.2} MB", b as f64 / MIB as f64),
        b if b >= KIB => format!("{:.2} KB", b as f64 / KIB as f64),
        b => format!("{} bytes", b),
    }
}

/// Leaf file name for a payload of `bytes`, e.g. `512.00KB-file`.
pub fn file_name(bytes: u64) -> String {
    let mut name: String = format(bytes).chars().filter(|c| !c.is_whitespace()).collect();
    name.push_str("-file");
    name
}
