//! Decoding raw feed records into typed vault events.
//!
//! Feeds differ in field naming (`grantId` vs `grant_id`) and in how they
//! encode integers, so every field is looked up under a list of aliases
//! and parsed leniently. Payloads may also be positional JSON arrays.

use serde_json::Value;

use crate::error::DiscardReason;
use crate::models::{Address, GrantId, LoggedEvent, VaultEvent};
use crate::ports::RawEvent;

// =============================================================================
// Field Aliases
// =============================================================================

const GRANT_ID: &[&str] = &["grantId", "grant_id", "id"];
const TOKEN_ID: &[&str] = &["tokenId", "token_id"];
const SEASON: &[&str] = &["season", "seasonId", "season_id"];
const OWNER: &[&str] = &["owner", "user", "account"];
const REDEEMER: &[&str] = &["owner", "redeemer", "user", "account"];
const TOTAL_VALUE: &[&str] = &["totalValue", "total_value", "value", "amount"];
const START_TIME: &[&str] = &["startTime", "start_time", "start"];
const MATURATION_TIME: &[&str] = &["maturationTime", "maturation_time", "maturity", "end"];
const CLAIM_AMOUNT: &[&str] = &["amount", "value"];
const VS_AMOUNT: &[&str] = &["vsAmount", "vs_amount", "shares"];
const ASSET_AMOUNT: &[&str] = &["assetAmount", "asset_amount", "assets"];
const FEE: &[&str] = &["fee", "feeAmount", "fee_amount"];

// =============================================================================
// Decoding
// =============================================================================

/// Decode a raw record, or explain why it cannot be applied.
pub fn decode(raw: &RawEvent) -> Result<LoggedEvent, DiscardReason> {
    let data = &raw.data;
    let field_error = |field: &str| DiscardReason::Malformed {
        name: raw.name.clone(),
        detail: format!("missing or invalid field '{field}'"),
    };

    let event = match raw.name.as_str() {
        VaultEvent::DEPOSITED => VaultEvent::Deposited {
            grant_id: parse_grant_id(data, 0).ok_or_else(|| field_error("grantId"))?,
            owner: extract_field(data, OWNER, 1, parse_address).ok_or_else(|| field_error("owner"))?,
            total_value: extract_field(data, TOTAL_VALUE, 2, parse_amount)
                .ok_or_else(|| field_error("totalValue"))?,
            start_time: extract_field(data, START_TIME, 3, parse_u64).ok_or_else(|| field_error("startTime"))?,
            maturation_time: extract_field(data, MATURATION_TIME, 4, parse_u64)
                .ok_or_else(|| field_error("maturationTime"))?,
        },
        VaultEvent::WITHDRAWN | "Claimed" => VaultEvent::Withdrawn {
            grant_id: parse_grant_id(data, 0).ok_or_else(|| field_error("grantId"))?,
            amount: extract_field(data, CLAIM_AMOUNT, 1, parse_amount).ok_or_else(|| field_error("amount"))?,
        },
        VaultEvent::REDEEMED => VaultEvent::Redeemed {
            owner: extract_field(data, REDEEMER, 0, parse_address).ok_or_else(|| field_error("owner"))?,
            vs_amount: extract_field(data, VS_AMOUNT, 1, parse_amount).ok_or_else(|| field_error("vsAmount"))?,
            asset_amount: extract_field(data, ASSET_AMOUNT, 2, parse_amount)
                .ok_or_else(|| field_error("assetAmount"))?,
            fee: extract_field(data, FEE, 3, parse_amount).ok_or_else(|| field_error("fee"))?,
        },
        other => {
            return Err(DiscardReason::UnknownEvent {
                name: other.to_string(),
            });
        }
    };

    Ok(LoggedEvent {
        key: raw.key(),
        tx_hash: raw.tx_hash,
        block_timestamp: raw.block_timestamp,
        event,
    })
}

// =============================================================================
// Field extraction
// =============================================================================

/// Look a field up by name (first alias wins), falling back to a
/// positional index for array payloads.
fn extract_field<T>(data: &Value, keys: &[&str], index: usize, parser: fn(&Value) -> Option<T>) -> Option<T> {
    keys.iter()
        .find_map(|key| data.get(*key))
        .or_else(|| data.get(index))
        .and_then(parser)
}

/// A grant id is either one `"<token>-<season>"` field or a token id plus
/// a season.
fn parse_grant_id(data: &Value, index: usize) -> Option<GrantId> {
    if let Some(id) = extract_field(data, GRANT_ID, index, parse_grant_value) {
        return Some(id);
    }
    let token_id = extract_field(data, TOKEN_ID, usize::MAX, parse_u64)?;
    let season = extract_field(data, SEASON, usize::MAX, parse_u32)?;
    Some(GrantId::new(token_id, season))
}

fn parse_grant_value(value: &Value) -> Option<GrantId> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Object(_) => {
            let token_id = extract_field(value, TOKEN_ID, usize::MAX, parse_u64)?;
            let season = extract_field(value, SEASON, usize::MAX, parse_u32)?;
            Some(GrantId::new(token_id, season))
        }
        _ => None,
    }
}

/// Parse an address from a hex string or a `{ "id": "0x.." }` wrapper.
fn parse_address(value: &Value) -> Option<Address> {
    match value {
        Value::String(s) => Address::from_hex(s).ok(),
        Value::Object(obj) => obj.get("Id").or_else(|| obj.get("id")).and_then(parse_address),
        _ => None,
    }
}

/// Parse an amount from a JSON number, a decimal string or a `0x` hex
/// string.
fn parse_amount(value: &Value) -> Option<u128> {
    match value {
        Value::Number(n) => n.as_u64().map(u128::from),
        Value::String(s) => match s.strip_prefix("0x") {
            Some(hex) => u128::from_str_radix(hex, 16).ok(),
            None => s.parse().ok(),
        },
        _ => None,
    }
}

fn parse_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn parse_u32(value: &Value) -> Option<u32> {
    parse_u64(value).and_then(|v| v.try_into().ok())
}

// =============================================================================
// Tests
// =============================================================================
