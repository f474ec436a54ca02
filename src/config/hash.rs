use std::fmt::Write;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{AppError, AppResult, ConfigError};

/// Hex SHA-256 of the JSON form of `value`.
///
/// # Errors
///
/// Returns an error if `value` cannot be serialized.
pub fn content_hash<T>(value: &T) -> AppResult<String>
where
    T: Serialize,
{
    let bytes = serde_json::to_vec(value)
        .map_err(|err| AppError::config(ConfigError::Serialize { source: err }))?;
    let digest = Sha256::digest(&bytes);
    let mut hex = String::with_capacity(64);
    for byte in digest {
        if write!(hex, "{:02x}", byte).is_err() {
            break;
        }
    }
    Ok(hex)
}
