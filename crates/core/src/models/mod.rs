//! Domain models representing indexed vault data.
//!
//! These models are storage-agnostic and represent the canonical
//! form of indexed data within the domain layer. Ledger and vault
//! entities live next to the components that own them
//! ([`crate::domain::ledger::Grant`], [`crate::domain::accountant::VaultState`]).

mod aggregates;
mod checkpoint;
mod events;

pub use aggregates::{AccountPosition, Aggregates, IndexerStatus};
pub use checkpoint::Checkpoint;
pub use events::{EventStatus, LoggedEvent, VaultEvent};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

// =============================================================================
// Fixed-size Hex Types
// =============================================================================

/// Macro to generate fixed-size byte newtypes with common functionality.
///
/// Generates:
/// - `from_hex()` - Parse from hex string (with or without 0x prefix)
/// - `to_hex()` - Convert to 0x-prefixed hex string
/// - `Display` / `FromStr` implementations
/// - Serde as a 0x-prefixed hex string
/// - `From<[u8; N]>` implementation
macro_rules! hex_newtype {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            /// Length in bytes.
            pub const LEN: usize = $len;

            /// Parse from hex string (with or without 0x prefix).
            pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
                let s = s.strip_prefix("0x").unwrap_or(s);
                let bytes = hex::decode(s)?;
                let arr: [u8; $len] = bytes
                    .try_into()
                    .map_err(|_| hex::FromHexError::InvalidStringLength)?;
                Ok(Self(arr))
            }

            /// Convert to 0x-prefixed hex string.
            pub fn to_hex(&self) -> String {
                format!("0x{}", hex::encode(self.0))
            }

            /// Get the inner bytes.
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }

        impl FromStr for $name {
            type Err = hex::FromHexError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_hex(s)
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::from_hex(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

hex_newtype!(
    /// 20-byte account address (EVM).
    Address,
    20
);

hex_newtype!(
    /// 32-byte transaction hash.
    TxHash,
    32
);

// =============================================================================
// Grant Identification
// =============================================================================

/// Identifier of a deposited grant: the fNFT token id plus its season.
///
/// Rendered and parsed as `"<token_id>-<season>"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GrantId {
    pub token_id: u64,
    pub season: u32,
}

impl GrantId {
    pub fn new(token_id: u64, season: u32) -> Self {
        Self { token_id, season }
    }
}

impl fmt::Display for GrantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.token_id, self.season)
    }
}

impl FromStr for GrantId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (token, season) = s
            .split_once('-')
            .ok_or_else(|| format!("grant id '{s}' must be '<token_id>-<season>'"))?;
        let token_id = token
            .trim()
            .parse()
            .map_err(|e| format!("grant id '{s}': bad token id: {e}"))?;
        let season = season
            .trim()
            .parse()
            .map_err(|e| format!("grant id '{s}': bad season: {e}"))?;
        Ok(Self { token_id, season })
    }
}

impl TryFrom<String> for GrantId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<GrantId> for String {
    fn from(id: GrantId) -> Self {
        id.to_string()
    }
}

// =============================================================================
// Event Identification
// =============================================================================

/// Position of an event in the log's total order.
///
/// Ordering is lexicographic on `(block_number, log_index)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventKey {
    pub block_number: u64,
    pub log_index: u32,
}

impl EventKey {
    pub fn new(block_number: u64, log_index: u32) -> Self {
        Self {
            block_number,
            log_index,
        }
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.block_number, self.log_index)
    }
}

/// Delivery identity of an event, used for dedup on redelivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId {
    pub tx_hash: TxHash,
    pub log_index: u32,
}

// =============================================================================
// Amount Serialization
// =============================================================================

/// Serde adapter for `u128` amounts.
///
/// Amounts serialize as decimal strings because JSON numbers lose precision
/// past `u64`. Deserialization accepts either a string or a `u64` number.
pub mod serde_amount {
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Number(u64),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Text(s) => s.parse().map_err(de::Error::custom),
            Repr::Number(n) => Ok(u128::from(n)),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
