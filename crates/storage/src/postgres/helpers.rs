//! Shared helper functions for PostgreSQL row conversion.

use vesta_core::error::{DiscardReason, StorageError, StorageResult};
use vesta_core::models::{EventKey, EventStatus, TxHash};

/// Convert a `Vec<u8>` to a transaction hash.
///
/// Returns an error if the length doesn't match.
pub fn bytes_to_tx_hash(bytes: Vec<u8>, field_name: &str) -> StorageResult<TxHash> {
    let arr: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| {
        StorageError::SerializationError(format!(
            "{} has invalid length: expected 32, got {}",
            field_name,
            v.len()
        ))
    })?;
    Ok(TxHash::from(arr))
}

/// Convert a signed column back to `u64`, rejecting negative values as corrupt.
pub fn to_u64(value: i64, field_name: &str) -> StorageResult<u64> {
    u64::try_from(value).map_err(|_| {
        StorageError::SerializationError(format!("{} is negative: {}", field_name, value))
    })
}

/// Convert a `u64` to the signed column type.
pub fn to_i64(value: u64, field_name: &str) -> StorageResult<i64> {
    i64::try_from(value).map_err(|_| {
        StorageError::SerializationError(format!("{} exceeds BIGINT: {}", field_name, value))
    })
}

/// Ordering key as bindable column values.
pub fn key_columns(key: EventKey) -> StorageResult<(i64, i32)> {
    let log_index = i32::try_from(key.log_index).map_err(|_| {
        StorageError::SerializationError(format!("log_index exceeds INTEGER: {}", key.log_index))
    })?;
    Ok((to_i64(key.block_number, "block_number")?, log_index))
}

/// Ordering key from column values.
pub fn key_from_columns(block_number: i64, log_index: i32) -> StorageResult<EventKey> {
    let log_index = u32::try_from(log_index).map_err(|_| {
        StorageError::SerializationError(format!("log_index is negative: {}", log_index))
    })?;
    Ok(EventKey::new(to_u64(block_number, "block_number")?, log_index))
}

/// Split a status into its label column and optional discard reason.
pub fn status_to_columns(status: &EventStatus) -> StorageResult<(&'static str, Option<serde_json::Value>)> {
    let reason = match status {
        EventStatus::Discarded { reason } => Some(
            serde_json::to_value(reason).map_err(|e| StorageError::SerializationError(e.to_string()))?,
        ),
        _ => None,
    };
    Ok((status.label(), reason))
}

/// Rebuild a status from its label column and optional discard reason.
pub fn status_from_columns(label: &str, reason: Option<serde_json::Value>) -> StorageResult<EventStatus> {
    match (label, reason) {
        ("pending", _) => Ok(EventStatus::Pending),
        ("applied", _) => Ok(EventStatus::Applied),
        ("discarded", Some(value)) => {
            let reason: DiscardReason =
                serde_json::from_value(value).map_err(|e| StorageError::SerializationError(e.to_string()))?;
            Ok(EventStatus::Discarded { reason })
        }
        ("discarded", None) => Err(StorageError::SerializationError(
            "event_log.discard_reason is missing for a discarded event".to_string(),
        )),
        (other, _) => Err(StorageError::SerializationError(format!(
            "event_log.status has unknown value: {}",
            other
        ))),
    }
}
