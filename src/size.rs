//! Human-readable size parsing for listing pages.
//!
//! Every unit is 1024-scaled: `KB` and `KiB` both mean 2^10 bytes. Anything
//! that does not parse yields -1 (unknown).

const UNITS: &[(&str, i64)] = &[
    ("B", 1),
    ("BYTES", 1),
    ("KB", 1 << 10),
    ("KIB", 1 << 10),
    ("MB", 1 << 20),
    ("MIB", 1 << 20),
    ("GB", 1 << 30),
    ("GIB", 1 << 30),
    ("TB", 1 << 40),
    ("TIB", 1 << 40),
    ("PB", 1 << 50),
    ("PIB", 1 << 50),
    ("EB", 1 << 60),
    ("EIB", 1 << 60),
];

pub const UNKNOWN_SIZE: i64 = -1;

/// Multiplier for a unit label, case-insensitive.
pub fn unit_multiplier(unit: &str) -> Option<i64> {
    let unit = unit.trim().to_ascii_uppercase();
    UNITS
        .iter()
        .find(|(label, _)| *label == unit)
        .map(|(_, multiplier)| *multiplier)
}

/// Parses `"<amount> <unit>"`, e.g. `"1.5 GiB"`, `"700&nbsp;MB"` or `"2,048 KB"`.
pub fn parse_size(text: &str) -> i64 {
    let cleaned = text.replace("&nbsp;", " ").replace(['\u{a0}', ','], " ");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return UNKNOWN_SIZE;
    }

    let split = cleaned
        .find(|c: char| c.is_alphabetic())
        .unwrap_or(cleaned.len());
    let (amount, unit) = cleaned.split_at(split);
    let amount: String = amount.chars().filter(|c| !c.is_whitespace()).collect();

    let Ok(amount) = amount.parse::<f64>() else {
        return UNKNOWN_SIZE;
    };
    if !amount.is_finite() || amount < 0.0 {
        return UNKNOWN_SIZE;
    }
    let multiplier = if unit.trim().is_empty() {
        1
    } else {
        match unit_multiplier(unit) {
            Some(m) => m,
            None => return UNKNOWN_SIZE,
        }
    };

    let bytes = (amount * multiplier as f64).round();
    if bytes >= i64::MAX as f64 {
        return UNKNOWN_SIZE;
    }
    bytes as i64
}
