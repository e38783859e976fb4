//! Conversions between the raw export encodings and canonical units.
//!
//! Time metrics are minutes, FCR is a fraction in `[0, 1]` and satisfaction
//! sits on a `0..=5` scale. Time parsing falls back to `0.0` on anything it
//! cannot read; decimal parsing yields `None` so that missing scores stay out
//! of averages.

/// Parses `HH:MM:SS` or `MM:SS` into fractional minutes. Any other shape is `0.0`.
pub fn parse_time(raw: &str) -> f64 {
    let raw = raw.trim();
    if raw.is_empty() {
        return 0.0;
    }

    let parts: Option<Vec<f64>> = raw
        .split(':')
        .map(|part| part.trim().parse::<f64>().ok())
        .collect();

    let minutes = match parts.as_deref() {
        Some([hours, minutes, seconds]) => hours * 60.0 + minutes + seconds / 60.0,
        Some([minutes, seconds]) => minutes + seconds / 60.0,
        _ => 0.0,
    };
    if minutes.is_finite() {
        minutes.max(0.0)
    } else {
        0.0
    }
}

/// Formats minutes as `MM:SS`, rounding to the nearest second.
pub fn format_time(minutes: Option<f64>) -> String {
    let minutes = match minutes {
        Some(value) if value.is_finite() && value > 0.0 => value,
        _ => return "00:00".to_string(),
    };

    let total_seconds = (minutes * 60.0).round() as u64;
    format!("{:02}:{:02}", total_seconds / 60, total_seconds % 60)
}

/// Strips `%`, swaps a decimal comma for a period and parses the remainder.
pub fn parse_decimal(raw: &str) -> Option<f64> {
    let cleaned = raw.replace('%', "").replace(',', ".");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|value| value.is_finite())
}

/// Like [`parse_decimal`], but a value written with a percent sign is read
/// as a fraction of one hundred.
pub fn parse_ratio(raw: &str) -> Option<f64> {
    let value = parse_decimal(raw)?;
    if raw.contains('%') {
        Some(value / 100.0)
    } else {
        Some(value)
    }
}

/// FCR arrives as a 0-100 percentage.
pub fn fcr_from_raw(raw: &str) -> Option<f64> {
    parse_decimal(raw).map(|value| value / 100.0)
}

/// Satisfaction arrives as a 0-100 percentage and is kept on a 0-5 scale.
pub fn satisfaction_from_raw(raw: &str) -> Option<f64> {
    parse_decimal(raw).map(|value| value / 100.0 * 5.0)
}

pub fn nps_from_raw(raw: &str) -> Option<f64> {
    parse_decimal(raw)
}

/// Non-negative counts. Exports sometimes write them as `12.0`. Values a
/// `u64` cannot hold are treated as unreadable.
pub fn parse_count(raw: &str) -> Option<u64> {
    let value = parse_decimal(raw)?;
    if !value.is_finite() || value < 0.0 || value >= u64::MAX as f64 {
        return None;
    }
    Some(value.round() as u64)
}

pub fn format_fcr(fraction: Option<f64>) -> String {
    match fraction {
        Some(value) => format!("{:.2}%", value * 100.0),
        None => "N/A".to_string(),
    }
}

pub fn format_satisfaction(score: Option<f64>) -> String {
    match score {
        Some(value) => format!("{:.2}%", value / 5.0 * 100.0),
        None => "N/A".to_string(),
    }
}

pub fn format_count(count: Option<u64>) -> String {
    count
        .map(|value| value.to_string())
        .unwrap_or_else(|| "N/A".to_string())
}

pub fn format_decimal(value: Option<f64>) -> String {
    value
        .map(|value| format!("{value:.2}"))
        .unwrap_or_else(|| "N/A".to_string())
}
