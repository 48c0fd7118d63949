use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
pub struct CalcError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl CalcError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Half-up rounding to `decimals` places.
///
/// `f64::EPSILON` is added before scaling so that values such as `2.005`,
/// whose binary form sits just below the tie, still round up. Ties round
/// away from zero.
pub fn round_half_up(value: f64, decimals: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let factor = 10f64.powi(decimals as i32);
    let magnitude = ((value.abs() + f64::EPSILON) * factor).round() / factor;
    if value < 0.0 {
        -magnitude
    } else {
        magnitude
    }
}

/// Converts a raw contribution fraction to the 3-point scale.
///
/// A scaled result of exactly zero is reported as `None`: it means "no
/// signal" and must stay out of averages.
pub fn to_three_scale(raw: f64) -> Option<f64> {
    if !raw.is_finite() {
        return None;
    }
    let scaled = round_half_up(round_half_up(raw, 2) * 3.0, 2);
    if scaled == 0.0 {
        None
    } else {
        Some(scaled)
    }
}

/// `mark / max * 100` with one decimal and a trailing `.0` trimmed.
/// Returns `-` when the ratio is undefined.
pub fn pct(mark: f64, max: f64) -> String {
    if !mark.is_finite() || !max.is_finite() || max == 0.0 {
        return "-".to_string();
    }
    let v = round_half_up(mark / max * 100.0, 1);
    let s = format!("{:.1}", v);
    match s.strip_suffix(".0") {
        Some(trimmed) => trimmed.to_string(),
        None => s,
    }
}

pub fn format_2dp(v: f64) -> String {
    format!("{:.2}", round_half_up(v, 2))
}

/// Arithmetic mean of the present values; `None` when nothing is present.
pub fn mean_present<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let mut sum = 0.0_f64;
    let mut count = 0_usize;
    for v in values.into_iter().flatten() {
        if !v.is_finite() {
            continue;
        }
        sum += v;
        count += 1;
    }
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Lenient numeric coercion for loosely typed JSON: numbers and numeric
/// strings convert, everything else (null, blank, garbage) is `None`.
pub fn coerce_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64().filter(|x| x.is_finite()),
        Value::String(s) => {
            let t = s.trim();
            if t.is_empty() {
                return None;
            }
            t.parse::<f64>().ok().filter(|x| x.is_finite())
        }
        _ => None,
    }
}

/// Coercion for sums: anything non-numeric counts as 0.
pub fn coerce_or_zero(v: Option<&Value>) -> f64 {
    v.and_then(coerce_number).unwrap_or(0.0)
}
