//! Input coercion for inventory settings and forecast parameters
//!
//! Settings input never fails: numbers are truncated and clamped into their
//! bounds, anything unparseable falls back to the previous value.

use serde_json::Value;

/// Inclusive integer bounds for a settings field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub min: i32,
    pub max: i32,
}

impl Bounds {
    pub const fn new(min: i32, max: i32) -> Self {
        Self { min, max }
    }

    pub fn clamp(&self, value: i32) -> i32 {
        value.clamp(self.min, self.max)
    }
}

pub const MIN_ON_HAND_BOUNDS: Bounds = Bounds::new(0, 500);
pub const BUFFER_DAYS_BOUNDS: Bounds = Bounds::new(0, 180);
pub const LEAD_TIME_DAYS_BOUNDS: Bounds = Bounds::new(0, 120);
pub const BUFFER_KITS_BOUNDS: Bounds = Bounds::new(0, 500);

/// Forecast horizon limits, in days
pub const MIN_HORIZON_DAYS: i32 = 1;
pub const MAX_HORIZON_DAYS: i32 = 180;
pub const DEFAULT_HORIZON_DAYS: i32 = 30;

/// Coerce a JSON value into an integer within `bounds`.
///
/// Accepts JSON numbers and numeric strings. Fractions are truncated toward
/// zero. Missing, null, non-finite or malformed input yields `fallback`.
pub fn coerce_int(value: Option<&Value>, fallback: i32, bounds: Bounds) -> i32 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match parsed {
        Some(n) if n.is_finite() => {
            let truncated = n.trunc().clamp(bounds.min as f64, bounds.max as f64);
            truncated as i32
        }
        _ => bounds.clamp(fallback),
    }
}

/// Coerce a JSON value into a boolean, falling back on anything unrecognized
pub fn coerce_bool(value: Option<&Value>, fallback: bool) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => match n.as_i64() {
            Some(1) => true,
            Some(0) => false,
            _ => fallback,
        },
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => true,
            "false" | "0" => false,
            _ => fallback,
        },
        _ => fallback,
    }
}

/// Clamp a requested horizon into `[MIN_HORIZON_DAYS, max_days]`
pub fn clamp_horizon(requested: Option<i64>, default_days: i32, max_days: i32) -> i32 {
    let max_days = max_days.clamp(MIN_HORIZON_DAYS, MAX_HORIZON_DAYS);
    match requested {
        Some(days) => days.clamp(MIN_HORIZON_DAYS as i64, max_days as i64) as i32,
        None => default_days.clamp(MIN_HORIZON_DAYS, max_days),
    }
}
