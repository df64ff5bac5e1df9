//! Go-style duration strings.
//!
//! Accepts a sequence of `<integer><unit>` terms such as `168h`, `1h30m`,
//! `500ms` or `2m30s`. Supported units: `h`, `m`, `s`, `ms`, `us`, `ns`.
//! A bare `0` is accepted as the zero duration.

use std::time::Duration;

use crate::errors::ConfigError;

/// Parse a Go-style duration string
pub fn parse_duration(input: &str) -> Result<Duration, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidDuration {
        input: input.to_string(),
        reason,
    };

    let s = input.trim();
    if s.is_empty() {
        return Err(invalid("duration cannot be empty".to_string()));
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let mut remaining = s;
    let mut total = Duration::ZERO;

    while !remaining.is_empty() {
        let num_end = remaining
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(remaining.len());
        if num_end == 0 {
            return Err(invalid(format!(
                "expected a number at position {}",
                s.len() - remaining.len()
            )));
        }
        let value: u64 = remaining[..num_end]
            .parse()
            .map_err(|_| invalid("number out of range".to_string()))?;
        remaining = &remaining[num_end..];

        let unit_end = remaining
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(remaining.len());
        let unit = &remaining[..unit_end];
        remaining = &remaining[unit_end..];

        let term = match unit {
            "h" => value.checked_mul(3600).map(Duration::from_secs),
            "m" => value.checked_mul(60).map(Duration::from_secs),
            "s" => Some(Duration::from_secs(value)),
            "ms" => Some(Duration::from_millis(value)),
            "us" | "µs" => Some(Duration::from_micros(value)),
            "ns" => Some(Duration::from_nanos(value)),
            "" => return Err(invalid("missing unit suffix (h, m, s, ms, us, ns)".to_string())),
            other => return Err(invalid(format!("unknown unit {other:?}"))),
        };

        total = term
            .and_then(|t| total.checked_add(t))
            .ok_or_else(|| invalid("duration overflows".to_string()))?;
    }

    Ok(total)
}
