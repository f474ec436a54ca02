use std::collections::BTreeMap;
use std::time::Duration;

use tracing::debug;

use crate::error::{AppError, AppResult, ConfigError};

/// Parse `250ms`, `10s`, `5m`, `1h`. A bare number is seconds.
///
/// # Errors
///
/// Returns an error for empty, malformed, overflowing or zero durations.
pub fn parse_duration_value(value: &str) -> AppResult<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::config(ConfigError::DurationEmpty));
    }

    let digits_len = value.chars().take_while(char::is_ascii_digit).count();
    if digits_len == 0 {
        return Err(AppError::config(ConfigError::InvalidDurationFormat {
            value: value.to_owned(),
        }));
    }
    let (num_part, unit_part) = value.split_at(digits_len);
    let number: u64 = num_part.parse().map_err(|err| {
        AppError::config(ConfigError::InvalidDurationNumber {
            value: value.to_owned(),
            source: err,
        })
    })?;

    let unit = if unit_part.is_empty() { "s" } else { unit_part };
    let duration = match unit {
        "ms" => Duration::from_millis(number),
        "s" => Duration::from_secs(number),
        "m" => {
            let secs = number
                .checked_mul(60)
                .ok_or_else(|| AppError::config(ConfigError::DurationOverflow))?;
            Duration::from_secs(secs)
        }
        "h" => {
            let secs = number
                .checked_mul(60)
                .and_then(|seconds| seconds.checked_mul(60))
                .ok_or_else(|| AppError::config(ConfigError::DurationOverflow))?;
            Duration::from_secs(secs)
        }
        _ => {
            return Err(AppError::config(ConfigError::InvalidDurationUnit {
                unit: unit.to_owned(),
            }));
        }
    };

    if duration.as_millis() == 0 {
        return Err(AppError::config(ConfigError::DurationZero));
    }

    Ok(duration)
}

/// Parse a single `name=value` limit as given on the command line.
///
/// # Errors
///
/// Returns an error when the separator, the name or the number is missing.
pub fn parse_limit(value: &str) -> AppResult<(String, i64)> {
    let invalid = || {
        AppError::config(ConfigError::InvalidLimit {
            value: value.to_owned(),
        })
    };
    let (name, limit) = value.split_once('=').ok_or_else(invalid)?;
    let name = name.trim();
    if name.is_empty() {
        return Err(invalid());
    }
    let limit: i64 = limit.trim().parse().map_err(|_err| invalid())?;
    Ok((name.to_owned(), limit))
}

/// Parse the `name1=value1;name2=value2;` limits attribute. Malformed and
/// non-positive entries are skipped.
#[must_use]
pub fn parse_limits(attribute: &str) -> BTreeMap<String, i64> {
    let mut limits = BTreeMap::new();
    for entry in attribute.split(';').filter(|entry| !entry.trim().is_empty()) {
        match parse_limit(entry) {
            Ok((name, limit)) if limit > 0 => {
                limits.insert(name, limit);
            }
            Ok((name, limit)) => debug!("Ignoring non-positive limit {}={}", name, limit),
            Err(err) => debug!("Ignoring limit entry: {}", err),
        }
    }
    limits
}

#[must_use]
pub fn format_limits(limits: &BTreeMap<String, i64>) -> String {
    limits
        .iter()
        .map(|(name, limit)| format!("{}={};", name, limit))
        .collect()
}
