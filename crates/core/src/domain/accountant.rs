//! Vault accountant: mint/redeem fee math and the backing invariant.
//!
//! The accountant owns the only copy of the fee policy. Every mutation is
//! computed on a copy of [`VaultState`], checked, then committed, so a
//! failed operation leaves the accountant untouched.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::fixed::{BPS_DENOMINATOR, WAD, bps_of, format_wad, mul_div};
use crate::error::{AccountingResult, InvariantViolation, PolicyError, ValidationError};
use crate::models::serde_amount;

// =============================================================================
// Fee Policy
// =============================================================================

/// Fee and backing parameters, fixed for the lifetime of an epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeePolicy {
    /// Fee kept by the vault on deposit, in basis points.
    pub mint_fee_bps: u32,
    /// Fee charged on redemption, in basis points.
    pub redeem_fee_bps: u32,
    /// Minimum `total_assets / total_supply`, WAD-scaled.
    #[serde(with = "serde_amount")]
    pub backing_ratio_floor: u128,
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self {
            mint_fee_bps: 100,
            redeem_fee_bps: 200,
            backing_ratio_floor: WAD,
        }
    }
}

impl FeePolicy {
    pub fn new(mint_fee_bps: u32, redeem_fee_bps: u32, backing_ratio_floor: u128) -> Result<Self, PolicyError> {
        let policy = Self {
            mint_fee_bps,
            redeem_fee_bps,
            backing_ratio_floor,
        };
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        if u128::from(self.mint_fee_bps) > BPS_DENOMINATOR {
            return Err(PolicyError::FeeTooHigh {
                fee: "mint",
                bps: self.mint_fee_bps,
            });
        }
        if u128::from(self.redeem_fee_bps) > BPS_DENOMINATOR {
            return Err(PolicyError::FeeTooHigh {
                fee: "redeem",
                bps: self.redeem_fee_bps,
            });
        }
        if self.backing_ratio_floor > WAD {
            return Err(PolicyError::FloorAboveOne {
                floor: format_wad(self.backing_ratio_floor),
            });
        }
        Ok(())
    }
}

impl fmt::Display for FeePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mint {} bps, redeem {} bps, floor {}",
            self.mint_fee_bps,
            self.redeem_fee_bps,
            format_wad(self.backing_ratio_floor)
        )
    }
}

// =============================================================================
// Vault State
// =============================================================================

/// The single vault aggregate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultState {
    /// Underlying asset held by the vault.
    #[serde(with = "serde_amount")]
    pub total_assets: u128,
    /// Outstanding vS supply.
    #[serde(with = "serde_amount")]
    pub total_supply: u128,
    /// Last maturity fact observed by the accountant.
    pub matured: bool,
}

impl VaultState {
    /// `total_assets / total_supply` in WAD; 1.0 when nothing is outstanding.
    pub fn backing_ratio(&self) -> u128 {
        if self.total_supply == 0 {
            return WAD;
        }
        mul_div(self.total_assets, WAD, self.total_supply).unwrap_or(u128::MAX)
    }
}

// =============================================================================
// Outcomes
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MintOutcome {
    /// vS issued to the depositor.
    pub minted: u128,
    /// Value retained by the vault.
    pub fee: u128,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedeemOutcome {
    /// Assets released from the vault before fees.
    pub gross: u128,
    /// Assets paid to the redeemer.
    pub asset_amount: u128,
    pub fee: u128,
}

// =============================================================================
// Accountant
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultAccountant {
    policy: FeePolicy,
    state: VaultState,
}

impl VaultAccountant {
    pub fn new(policy: FeePolicy) -> Self {
        Self {
            policy,
            state: VaultState::default(),
        }
    }

    /// Resume from a checkpointed state.
    pub fn with_state(policy: FeePolicy, state: VaultState) -> Self {
        Self { policy, state }
    }

    pub fn policy(&self) -> &FeePolicy {
        &self.policy
    }

    pub fn state(&self) -> VaultState {
        self.state
    }

    /// Record the externally derived maturity fact.
    pub fn observe_maturity(&mut self, matured: bool) {
        self.state.matured = matured;
    }

    /// Preview a mint without touching state.
    pub fn quote_mint(&self, deposit_value: u128) -> AccountingResult<(MintOutcome, VaultState)> {
        let fee = bps_of(deposit_value, self.policy.mint_fee_bps);
        let minted = checked_sub("minted", deposit_value, fee)?;

        let mut next = self.state;
        next.total_assets = next
            .total_assets
            .checked_add(deposit_value)
            .ok_or_else(|| overflow("total_assets on mint"))?;
        next.total_supply = next
            .total_supply
            .checked_add(minted)
            .ok_or_else(|| overflow("total_supply on mint"))?;
        self.check_invariants(&next)?;

        Ok((MintOutcome { minted, fee }, next))
    }

    /// Convert a deposit into vS. The fee stays in the vault.
    pub fn mint(&mut self, deposit_value: u128) -> AccountingResult<MintOutcome> {
        let (outcome, next) = self.quote_mint(deposit_value)?;
        self.state = next;
        Ok(outcome)
    }

    /// Preview a redemption without touching state.
    pub fn quote_redeem(&self, vs_amount: u128, matured: bool) -> AccountingResult<(RedeemOutcome, VaultState)> {
        if vs_amount > self.state.total_supply {
            return Err(ValidationError::InsufficientSupply {
                requested: vs_amount,
                supply: self.state.total_supply,
            }
            .into());
        }
        if !matured {
            return Err(ValidationError::NotMatured.into());
        }

        let gross = if vs_amount == 0 {
            0
        } else {
            mul_div(vs_amount, self.state.total_assets, self.state.total_supply)
                .ok_or_else(|| overflow("gross redeem amount"))?
        };
        let fee = bps_of(gross, self.policy.redeem_fee_bps);
        let asset_amount = checked_sub("asset_amount", gross, fee)?;

        let mut next = self.state;
        next.matured = matured;
        next.total_supply = checked_sub("total_supply", next.total_supply, vs_amount)?;
        next.total_assets = checked_sub("total_assets", next.total_assets, gross)?;
        self.check_invariants(&next)?;

        Ok((
            RedeemOutcome {
                gross,
                asset_amount,
                fee,
            },
            next,
        ))
    }

    /// Burn `vs_amount` for its share of the vault's assets.
    pub fn redeem(&mut self, vs_amount: u128, matured: bool) -> AccountingResult<RedeemOutcome> {
        let (outcome, next) = self.quote_redeem(vs_amount, matured)?;
        self.state = next;
        Ok(outcome)
    }

    /// `total_assets + 1 >= floor(total_supply * floor / WAD)`.
    pub fn check_invariants(&self, state: &VaultState) -> Result<(), InvariantViolation> {
        let required = mul_div(state.total_supply, self.policy.backing_ratio_floor, WAD)
            .ok_or_else(|| overflow("backing floor"))?;
        if state.total_assets.saturating_add(1) < required {
            return Err(InvariantViolation::BackingFloor {
                total_assets: state.total_assets,
                total_supply: state.total_supply,
                required,
            });
        }
        Ok(())
    }
}

fn checked_sub(field: &str, current: u128, delta: u128) -> Result<u128, InvariantViolation> {
    current.checked_sub(delta).ok_or_else(|| InvariantViolation::Underflow {
        field: field.to_string(),
        current,
        delta,
    })
}

fn overflow(context: &str) -> InvariantViolation {
    InvariantViolation::ArithmeticOverflow {
        context: context.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AccountingError;

    fn accountant() -> VaultAccountant {
        VaultAccountant::new(FeePolicy::default())
    }

    // Test critique: 1% de frais de mint, conservés dans le vault
    #[test]
    fn mint_retains_fee_in_vault() {
        let mut acc = accountant();
        let out = acc.mint(1000).unwrap();
        assert_eq!(out, MintOutcome { minted: 990, fee: 10 });
        assert_eq!(acc.state().total_assets, 1000);
        assert_eq!(acc.state().total_supply, 990);
    }

    #[test]
    fn redeem_at_par_charges_redeem_fee() {
        let mut acc = VaultAccountant::with_state(
            FeePolicy::default(),
            VaultState {
                total_assets: 1000,
                total_supply: 1000,
                matured: true,
            },
        );
        assert_eq!(acc.state().backing_ratio(), WAD);

        let out = acc.redeem(100, true).unwrap();
        assert_eq!(
            out,
            RedeemOutcome {
                gross: 100,
                asset_amount: 98,
                fee: 2
            }
        );
        assert_eq!(acc.state().total_supply, 900);
        assert_eq!(acc.state().total_assets, 900);
    }

    // Test critique: un redeem refusé ne modifie pas l'état
    #[test]
    fn redeem_before_maturity_leaves_state_unchanged() {
        let mut acc = accountant();
        acc.mint(1000).unwrap();
        let before = acc.clone();

        let err = acc.redeem(100, false).unwrap_err();
        assert_eq!(err, AccountingError::Validation(ValidationError::NotMatured));
        assert_eq!(acc, before);
    }

    #[test]
    fn redeem_above_supply_is_rejected() {
        let mut acc = accountant();
        acc.mint(1000).unwrap();
        let err = acc.redeem(991, true).unwrap_err();
        assert!(matches!(
            err,
            AccountingError::Validation(ValidationError::InsufficientSupply {
                requested: 991,
                supply: 990
            })
        ));
        assert_eq!(acc.state().total_supply, 990);
    }

    #[test]
    fn redeem_uses_backing_ratio_above_par() {
        let mut acc = accountant();
        acc.mint(1000).unwrap();
        // 990 vS backed by 1000: ratio slightly above 1
        let out = acc.redeem(990, true).unwrap();
        assert_eq!(out.gross, 1000);
        assert_eq!(out.fee, 20);
        assert_eq!(acc.state().total_supply, 0);
        assert_eq!(acc.state().total_assets, 0);
        assert_eq!(acc.state().backing_ratio(), WAD);
    }

    #[test]
    fn backing_floor_breach_is_an_invariant_violation() {
        let acc = VaultAccountant::with_state(
            FeePolicy::default(),
            VaultState {
                total_assets: 50,
                total_supply: 100,
                matured: false,
            },
        );
        let err = acc.quote_mint(0).unwrap_err();
        assert!(matches!(
            err,
            AccountingError::Invariant(InvariantViolation::BackingFloor { required: 100, .. })
        ));
    }

    #[test]
    fn one_unit_of_rounding_is_tolerated() {
        let acc = accountant();
        let state = VaultState {
            total_assets: 99,
            total_supply: 100,
            matured: true,
        };
        assert!(acc.check_invariants(&state).is_ok());
        let state = VaultState {
            total_assets: 98,
            ..state
        };
        assert!(acc.check_invariants(&state).is_err());
    }

    // Test critique: l'invariant de couverture tient après toute séquence valide
    #[test]
    fn floor_holds_over_mixed_sequence() {
        let mut acc = accountant();
        let deposits = [1000u128, 7, 333_333, 12 * WAD, 1, 999];
        for d in deposits {
            acc.mint(d).unwrap();
        }
        let mut vs = acc.state().total_supply;
        for divisor in [3u128, 7, 11, 2, 1] {
            let amount = vs / divisor;
            acc.redeem(amount, true).unwrap();
            vs -= amount;
            let s = acc.state();
            assert!(acc.check_invariants(&s).is_ok());
            assert!(s.backing_ratio() >= WAD);
        }
        assert_eq!(acc.state().total_supply, 0);
    }

    #[test]
    fn policy_validation_and_display() {
        assert_eq!(
            FeePolicy::new(10_001, 0, WAD),
            Err(PolicyError::FeeTooHigh {
                fee: "mint",
                bps: 10_001
            })
        );
        assert_eq!(
            FeePolicy::new(0, 20_000, WAD).unwrap_err().to_string(),
            "redeem fee 20000 bps exceeds 100%"
        );
        assert!(matches!(
            FeePolicy::new(0, 0, WAD + 1),
            Err(PolicyError::FloorAboveOne { .. })
        ));

        let err: crate::error::IndexerError = FeePolicy::new(0, 0, WAD * 2).unwrap_err().into();
        assert_eq!(err.to_string(), "Configuration error: Backing ratio floor 2.0 exceeds 1.0");
        let policy = FeePolicy::new(100, 200, WAD).unwrap();
        assert_eq!(policy.to_string(), "mint 100 bps, redeem 200 bps, floor 1.0");
    }
}
