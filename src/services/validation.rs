//! Input checks shared by the lifecycle entry points.
//!
//! Addresses and hashes are normalized to lowercase `0x`-prefixed hex so that
//! every comparison downstream is a plain string equality.

use crate::error::AppError;

fn strip_hex_prefix(value: &str) -> Option<&str> {
    value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
}

fn normalize_fixed_hex(value: &str, bytes: usize, what: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    let body = strip_hex_prefix(trimmed)
        .ok_or_else(|| AppError::InvalidInput(format!("{what} must start with 0x: {trimmed}")))?;
    if body.len() != bytes * 2 {
        return Err(AppError::InvalidInput(format!(
            "{what} must be {bytes} bytes of hex: {trimmed}"
        )));
    }
    hex::decode(body)
        .map_err(|e| AppError::InvalidInput(format!("{what} is not valid hex ({e}): {trimmed}")))?;
    Ok(format!("0x{}", body.to_ascii_lowercase()))
}

/// Validates a 20-byte EVM address and returns its lowercase form.
pub fn normalize_address(value: &str) -> Result<String, AppError> {
    normalize_fixed_hex(value, 20, "Address")
}

/// Validates a 32-byte transaction hash and returns its lowercase form.
pub fn normalize_tx_hash(value: &str) -> Result<String, AppError> {
    normalize_fixed_hex(value, 32, "Transaction hash")
}

/// Validates a 32-byte chain-native operation id.
pub fn normalize_operation_id(value: &str) -> Result<String, AppError> {
    normalize_fixed_hex(value, 32, "Operation id")
}

/// Call data must be non-empty, even-length hex.
pub fn normalize_call_data(value: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    let body = strip_hex_prefix(trimmed).unwrap_or(trimmed);
    if body.is_empty() {
        return Err(AppError::InvalidInput("Call data must not be empty".to_string()));
    }
    hex::decode(body)
        .map_err(|e| AppError::InvalidInput(format!("Call data is not valid hex: {e}")))?;
    Ok(format!("0x{}", body.to_ascii_lowercase()))
}

/// Call value in wei, as an unsigned decimal string.
pub fn validate_value(value: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AppError::InvalidInput(format!(
            "Value must be a non-negative decimal integer: {trimmed}"
        )));
    }
    let normalized = trimmed.trim_start_matches('0');
    Ok(if normalized.is_empty() {
        "0".to_string()
    } else {
        normalized.to_string()
    })
}
