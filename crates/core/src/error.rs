//! Error types for the indexer domain layer.
//!
//! This module defines a hierarchy of error types:
//!
//! - [`ValidationError`] - Recoverable, caller-caused rejections
//! - [`InvariantViolation`] - Fatal accounting integrity failures
//! - [`DiscardReason`] - Structured reason attached to a discarded event
//! - [`StorageError`] - Database/repository errors
//! - [`FeedError`] - Event feed errors
//! - [`IndexerError`] - Top-level orchestration errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{EventKey, GrantId, serde_amount};

// =============================================================================
// Validation Errors
// =============================================================================

/// Business rule rejections.
///
/// These are recoverable: the offending event is discarded, logged with
/// full context, and processing continues with the next event.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationError {
    /// Vesting window is empty or inverted.
    #[error("Invalid schedule: start {start} must be before maturation {maturation}")]
    InvalidSchedule { start: u64, maturation: u64 },

    /// A grant with this id was already deposited.
    #[error("Duplicate grant: {grant_id}")]
    DuplicateGrant { grant_id: GrantId },

    /// No grant with this id exists.
    #[error("Unknown grant: {grant_id}")]
    UnknownGrant { grant_id: GrantId },

    /// Claim would exceed the grant's face value.
    #[error("Over-claim on grant {grant_id}: {claimed} claimed + {requested} requested > {total} total")]
    OverClaim {
        grant_id: GrantId,
        #[serde(with = "serde_amount")]
        requested: u128,
        #[serde(with = "serde_amount")]
        claimed: u128,
        #[serde(with = "serde_amount")]
        total: u128,
    },

    /// Claim exceeds what the vesting curve has released so far.
    #[error("Premature claim on grant {grant_id}: {claimed} claimed + {requested} requested > {vested} vested")]
    PrematureClaim {
        grant_id: GrantId,
        #[serde(with = "serde_amount")]
        requested: u128,
        #[serde(with = "serde_amount")]
        claimed: u128,
        #[serde(with = "serde_amount")]
        vested: u128,
    },

    /// Redeem amount exceeds outstanding vS supply.
    #[error("Insufficient supply: requested {requested}, supply {supply}")]
    InsufficientSupply {
        #[serde(with = "serde_amount")]
        requested: u128,
        #[serde(with = "serde_amount")]
        supply: u128,
    },

    /// Redemption attempted before the vault matured.
    #[error("Vault has not matured")]
    NotMatured,
}

impl ValidationError {
    /// Stable short code used for metrics labels and aggregate counters.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidSchedule { .. } => "invalid_schedule",
            Self::DuplicateGrant { .. } => "duplicate_grant",
            Self::UnknownGrant { .. } => "unknown_grant",
            Self::OverClaim { .. } => "over_claim",
            Self::PrematureClaim { .. } => "premature_claim",
            Self::InsufficientSupply { .. } => "insufficient_supply",
            Self::NotMatured => "not_matured",
        }
    }
}

// =============================================================================
// Invariant Violations
// =============================================================================

/// Accounting integrity failure.
///
/// Always fatal: the indexer halts further mutation and financial state is
/// never patched automatically.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvariantViolation {
    /// Assets fell below the configured backing floor.
    #[error("Backing floor breached: assets {total_assets} < required {required} for supply {total_supply}")]
    BackingFloor {
        #[serde(with = "serde_amount")]
        total_assets: u128,
        #[serde(with = "serde_amount")]
        total_supply: u128,
        #[serde(with = "serde_amount")]
        required: u128,
    },

    /// A subtraction would take a total below zero.
    #[error("Negative {field}: {current} - {delta}")]
    Underflow {
        field: String,
        #[serde(with = "serde_amount")]
        current: u128,
        #[serde(with = "serde_amount")]
        delta: u128,
    },

    /// A fixed-point intermediate did not fit in 128 bits.
    #[error("Arithmetic overflow in {context}")]
    ArithmeticOverflow { context: String },
}

// =============================================================================
// Policy Errors
// =============================================================================

/// Rejected fee policy parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    /// A fee rate above 10 000 bps.
    #[error("{fee} fee {bps} bps exceeds 100%")]
    FeeTooHigh { fee: &'static str, bps: u32 },

    /// A backing floor above 1.0.
    #[error("Backing ratio floor {floor} exceeds 1.0")]
    FloorAboveOne { floor: String },
}

// =============================================================================
// Discard Reasons
// =============================================================================

/// Why an event was moved to `Discarded` instead of `Applied`.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DiscardReason {
    /// Event name is not part of the consumed schema.
    #[error("Unknown event: {name}")]
    UnknownEvent { name: String },

    /// Event payload is missing fields or has unparseable values.
    #[error("Malformed {name} event: {detail}")]
    Malformed { name: String, detail: String },

    /// Event was well-formed but rejected by a business rule.
    #[error("Rejected: {error}")]
    Rejected { error: ValidationError },

    /// Reported redemption amounts disagree with the accountant's quote.
    #[error(
        "Redeem quote mismatch: expected assets {expected_assets} fee {expected_fee}, reported assets {reported_assets} fee {reported_fee}"
    )]
    QuoteMismatch {
        #[serde(with = "serde_amount")]
        expected_assets: u128,
        #[serde(with = "serde_amount")]
        expected_fee: u128,
        #[serde(with = "serde_amount")]
        reported_assets: u128,
        #[serde(with = "serde_amount")]
        reported_fee: u128,
    },
}

impl DiscardReason {
    /// Stable short code used for metrics labels and aggregate counters.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownEvent { .. } => "unknown_event",
            Self::Malformed { .. } => "malformed",
            Self::Rejected { error } => error.code(),
            Self::QuoteMismatch { .. } => "quote_mismatch",
        }
    }
}

impl From<ValidationError> for DiscardReason {
    fn from(error: ValidationError) -> Self {
        Self::Rejected { error }
    }
}

// =============================================================================
// Accounting Errors
// =============================================================================

/// Outcome of a failed ledger or accountant operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccountingError {
    /// Recoverable rejection.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Fatal integrity failure.
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Database and repository errors.
///
/// These errors originate from storage operations like queries,
/// transactions, and data serialization.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Failed to establish database connection.
    #[error("Database connection error: {0}")]
    ConnectionError(String),

    /// SQL query execution failed.
    #[error("Query execution error: {0}")]
    QueryError(String),

    /// Database migration failed.
    #[error("Migration error: {0}")]
    MigrationError(String),

    /// Transaction commit/rollback failed.
    #[error("Transaction error: {0}")]
    TransactionError(String),

    /// Data serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

// =============================================================================
// Feed Errors
// =============================================================================

/// Event feed errors.
///
/// Retry and backoff on these is the service's job; the domain core never
/// sees them.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Feed could not be opened.
    #[error("Failed to open feed: {0}")]
    OpenFailed(String),

    /// Reading from the feed failed.
    #[error("Feed read error: {0}")]
    ReadError(String),

    /// A feed record could not be decoded into an event envelope.
    #[error("Feed decode error at line {line}: {message}")]
    DecodeError {
        /// 1-based line number in the feed.
        line: u64,
        /// Error details.
        message: String,
    },
}

// =============================================================================
// Indexer Errors
// =============================================================================

/// Top-level indexer orchestration errors.
///
/// This is the main error type returned by [`crate::services::EventIndexer`]
/// and [`crate::services::IndexerService`]. It wraps all lower-level errors
/// and adds indexer-specific variants.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// Accounting invariant broke while applying an event.
    #[error("Invariant violation at {key}: {violation}")]
    Invariant {
        /// Ordering key of the event being applied.
        key: EventKey,
        violation: InvariantViolation,
    },

    /// An unseen event arrived below the last retained ordering key.
    #[error("Gap detected: event {missing} arrived after {last_retained} was already retained")]
    GapDetected {
        missing: EventKey,
        last_retained: EventKey,
    },

    /// A different event was delivered at an ordering key already in use.
    #[error("Conflicting event at {key}: retained tx {retained_tx}, delivered tx {delivered_tx}")]
    ConflictingEvent {
        key: EventKey,
        retained_tx: String,
        delivered_tx: String,
    },

    /// Indexing is halted; writes are refused until resolved externally.
    #[error("Indexing halted: {0}")]
    Halted(String),

    /// Stored checkpoint was computed under different fee parameters.
    ///
    /// This is a fatal error that requires manual intervention.
    #[error("Policy mismatch: configured {configured} but checkpoint was built with {checkpoint}")]
    PolicyMismatch {
        /// Configured fee policy.
        configured: String,
        /// Fee policy recorded in the checkpoint.
        checkpoint: String,
    },

    /// Storage/database error.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Event feed error.
    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Graceful shutdown was requested.
    ///
    /// This is not really an error but uses the error type for control flow.
    #[error("Indexer shutdown requested")]
    ShutdownRequested,
}

impl From<PolicyError> for IndexerError {
    fn from(err: PolicyError) -> Self {
        Self::ConfigError(err.to_string())
    }
}

impl IndexerError {
    /// Whether this error halts indexing (as opposed to a transient failure).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Invariant { .. }
                | Self::GapDetected { .. }
                | Self::ConflictingEvent { .. }
                | Self::Halted(_)
                | Self::PolicyMismatch { .. }
        )
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for indexer operations.
pub type IndexerResult<T> = Result<T, IndexerError>;

/// Result type for ledger/accountant operations.
pub type AccountingResult<T> = Result<T, AccountingError>;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type for feed operations.
pub type FeedResult<T> = Result<T, FeedError>;

#[cfg(test)]
mod tests {
    use super::*;

    // Test critique: la chaîne de conversion d'erreurs fonctionne
    // Permet d'utiliser ? à travers les couches
    #[test]
    fn test_error_conversion_chain() {
        let storage_err = StorageError::QueryError("db failed".into());
        let indexer_err: IndexerError = storage_err.into();
        assert!(indexer_err.to_string().contains("db failed"));
        assert!(!indexer_err.is_fatal());

        let accounting: AccountingError = ValidationError::NotMatured.into();
        assert!(matches!(accounting, AccountingError::Validation(_)));
    }

    // Test critique: les codes de rejet sont stables (labels de métriques)
    #[test]
    fn test_discard_reason_codes() {
        let reason: DiscardReason = ValidationError::NotMatured.into();
        assert_eq!(reason.code(), "not_matured");

        let reason = DiscardReason::Malformed {
            name: "Deposited".into(),
            detail: "missing owner".into(),
        };
        assert_eq!(reason.code(), "malformed");
    }

    // Test critique: le motif de rejet survit à la sérialisation (persisté dans le log)
    #[test]
    fn test_discard_reason_serde_roundtrip() {
        let reason: DiscardReason = ValidationError::OverClaim {
            grant_id: GrantId::new(7, 1),
            requested: 10,
            claimed: 995,
            total: 1000,
        }
        .into();
        let json = serde_json::to_value(&reason).unwrap();
        assert_eq!(json["reason"], "rejected");
        let back: DiscardReason = serde_json::from_value(json).unwrap();
        assert_eq!(back, reason);
    }

    #[test]
    fn test_gap_detected_is_fatal_and_names_keys() {
        let err = IndexerError::GapDetected {
            missing: EventKey::new(10, 2),
            last_retained: EventKey::new(12, 0),
        };
        assert!(err.is_fatal());
        let msg = err.to_string();
        assert!(msg.contains("10:2") && msg.contains("12:0"));
    }
}
