//! Fixed-point helpers.
//!
//! Amounts are `u128` in the token's smallest unit. Ratios and fractions
//! are WAD-scaled (`WAD` == 1.0). Fee rates are basis points. Every
//! `a * b / d` goes through [`mul_div`], which widens to 256 bits so the
//! product never overflows and rounds toward zero.

use alloy_primitives::U256;

/// Decimal places of amounts and WAD values.
pub const DECIMALS: u32 = 18;

/// 1.0 in WAD fixed point.
pub const WAD: u128 = 10u128.pow(DECIMALS);

/// 100% in basis points.
pub const BPS_DENOMINATOR: u128 = 10_000;

/// Computes `floor(a * b / denominator)`.
///
/// Returns `None` when `denominator` is zero or the quotient does not fit
/// in a `u128`.
pub fn mul_div(a: u128, b: u128, denominator: u128) -> Option<u128> {
    if denominator == 0 {
        return None;
    }
    let product = U256::from(a).checked_mul(U256::from(b))?;
    let quotient = product / U256::from(denominator);
    u128::try_from(quotient).ok()
}

/// `floor(amount * bps / 10_000)`.
pub fn bps_of(amount: u128, bps: u32) -> u128 {
    // bps <= 10_000 keeps the quotient <= amount; a wider rate still fits 256 bits
    mul_div(amount, u128::from(bps), BPS_DENOMINATOR).unwrap_or(u128::MAX)
}

/// Parse a non-negative decimal string (`"1"`, `"0.95"`, `"1.000"`) into WAD.
pub fn parse_wad(s: &str) -> Result<u128, String> {
    let s = s.trim();
    let (int_part, frac_part) = s.split_once('.').unwrap_or((s, ""));

    if int_part.is_empty() && frac_part.is_empty() {
        return Err(format!("'{s}' is not a decimal number"));
    }
    if !int_part.chars().all(|c| c.is_ascii_digit()) || !frac_part.chars().all(|c| c.is_ascii_digit()) {
        return Err(format!("'{s}' is not a decimal number"));
    }
    if frac_part.len() > DECIMALS as usize {
        return Err(format!("'{s}' has more than {DECIMALS} decimal places"));
    }

    let int_value: u128 = if int_part.is_empty() {
        0
    } else {
        int_part.parse().map_err(|e| format!("'{s}': {e}"))?
    };
    let frac_value: u128 = if frac_part.is_empty() {
        0
    } else {
        let padded = format!("{frac_part:0<width$}", width = DECIMALS as usize);
        padded.parse().map_err(|e| format!("'{s}': {e}"))?
    };

    int_value
        .checked_mul(WAD)
        .and_then(|v| v.checked_add(frac_value))
        .ok_or_else(|| format!("'{s}' is too large"))
}

/// Render a WAD value as a decimal string with trailing zeros trimmed.
pub fn format_wad(value: u128) -> String {
    let int_part = value / WAD;
    let frac_part = value % WAD;
    if frac_part == 0 {
        return format!("{int_part}.0");
    }
    let frac = format!("{frac_part:0>width$}", width = DECIMALS as usize);
    format!("{int_part}.{}", frac.trim_end_matches('0'))
}
