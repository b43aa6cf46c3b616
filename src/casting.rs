//! Coercion of numeric and boolean literals.
//!
//! Numbers may carry a unit suffix that scales the value: `k`, `m`, `g`
//! (powers of 1000), `kb`, `mb`, `gb` (powers of 1024) and the durations
//! `ms`, `s`, `min`, `h`, `d`, `w`, `y`, all expressed in seconds.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::Number;

static NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^([-+]?(?:[0-9]*\.?[0-9]+|[0-9]+\.)(?:e[-+]?[0-9]+)?)(ms|min|[kmg]b?|[shdwy])?$")
        .expect("number pattern is valid")
});

/// Converts a numeric literal to a number, applying its unit suffix.
/// Text that is not a number at all yields zero.
pub fn to_number(literal: &str) -> Number {
    let Some(captures) = NUMBER.captures(literal.trim()) else {
        return Number::Int(0);
    };

    let mantissa = &captures[1];
    let base = if mantissa.contains(['.', 'e', 'E']) {
        Number::Float(mantissa.parse::<f64>().unwrap_or(0.0))
    } else {
        match mantissa.parse::<i64>() {
            Ok(i) => Number::Int(i),
            Err(_) => Number::Float(mantissa.parse::<f64>().unwrap_or(0.0)),
        }
    };

    match captures.get(2) {
        Some(unit) => apply_unit(base, &unit.as_str().to_ascii_lowercase()),
        None => base,
    }
}

/// `true`, `yes` and `on` (any case) are true; everything else is false.
pub fn to_bool(literal: &str) -> bool {
    matches!(literal.to_ascii_lowercase().as_str(), "true" | "yes" | "on")
}

fn apply_unit(number: Number, unit: &str) -> Number {
    let factor: i64 = match unit {
        "k" => 1_000,
        "m" => 1_000_000,
        "g" => 1_000_000_000,
        "kb" => 1 << 10,
        "mb" => 1 << 20,
        "gb" => 1 << 30,
        "min" => 60,
        "h" => 3_600,
        "d" => 86_400,
        "w" => 604_800,
        "y" => 31_536_000,
        "ms" => return divide(number, 1_000),
        _ => 1,
    };

    match number {
        Number::Int(i) => i
            .checked_mul(factor)
            .map(Number::Int)
            .unwrap_or(Number::Float(i as f64 * factor as f64)),
        Number::Float(f) => Number::Float(f * factor as f64),
    }
}

fn divide(number: Number, divisor: i64) -> Number {
    match number {
        Number::Int(i) if i % divisor == 0 => Number::Int(i / divisor),
        other => Number::Float(other.as_f64() / divisor as f64),
    }
}
