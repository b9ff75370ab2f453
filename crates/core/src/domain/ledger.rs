//! Position ledger: deposited grants and their claim state.
//!
//! A grant is created by a deposit, mutated only by claims, and never
//! removed; it is marked closed once fully claimed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::vesting::VestingSchedule;
use crate::error::ValidationError;
use crate::models::{AccountPosition, Address, EventKey, GrantId, serde_amount};

// =============================================================================
// Grant
// =============================================================================

/// One deposited fNFT allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub grant_id: GrantId,
    pub owner: Address,
    /// Face value at deposit; immutable.
    #[serde(with = "serde_amount")]
    pub total_value: u128,
    pub schedule: VestingSchedule,
    /// Cumulative value released; never decreases.
    #[serde(with = "serde_amount")]
    pub claimed_value: u128,
    /// vS minted for this deposit.
    #[serde(with = "serde_amount")]
    pub minted: u128,
    /// Mint fee retained by the vault for this deposit.
    #[serde(with = "serde_amount")]
    pub mint_fee: u128,
    /// Ordering key of the deposit event.
    pub deposited_at: EventKey,
    pub closed: bool,
}

impl Grant {
    pub fn new(
        grant_id: GrantId,
        owner: Address,
        total_value: u128,
        schedule: VestingSchedule,
        deposited_at: EventKey,
    ) -> Self {
        Self {
            grant_id,
            owner,
            total_value,
            schedule,
            claimed_value: 0,
            minted: 0,
            mint_fee: 0,
            deposited_at,
            closed: false,
        }
    }

    /// Attach the mint outcome computed for this deposit.
    pub fn with_mint(mut self, minted: u128, mint_fee: u128) -> Self {
        self.minted = minted;
        self.mint_fee = mint_fee;
        self
    }

    /// Value not yet claimed.
    pub fn remaining(&self) -> u128 {
        self.total_value - self.claimed_value
    }

    /// Value released by the vesting curve at `now`.
    pub fn vested(&self, now: u64) -> u128 {
        self.schedule.vested_amount(self.total_value, now)
    }

    /// Vested minus already claimed, floored at zero.
    pub fn projected_claimable(&self, now: u64) -> u128 {
        self.vested(now).saturating_sub(self.claimed_value)
    }
}

/// Result of a successful claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimReceipt {
    pub owner: Address,
    pub claimed_value: u128,
    /// This claim brought `claimed_value` up to `total_value`.
    pub closed: bool,
}

// =============================================================================
// Ledger
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PositionLedger {
    grants: BTreeMap<GrantId, Grant>,
    accounts: BTreeMap<Address, AccountPosition>,
    /// Max maturation time over `grants`, kept in step with deposits.
    latest_maturation: Option<u64>,
}

impl PositionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from checkpointed grants and accounts.
    pub fn from_parts(
        grants: impl IntoIterator<Item = Grant>,
        accounts: impl IntoIterator<Item = AccountPosition>,
    ) -> Self {
        let grants: BTreeMap<GrantId, Grant> = grants.into_iter().map(|g| (g.grant_id, g)).collect();
        let latest_maturation = grants.values().map(|g| g.schedule.maturation_time()).max();
        Self {
            grants,
            accounts: accounts.into_iter().map(|a| (a.owner, a)).collect(),
            latest_maturation,
        }
    }

    /// Check a deposit without recording it.
    pub fn validate_deposit(&self, grant: &Grant) -> Result<(), ValidationError> {
        if self.grants.contains_key(&grant.grant_id) {
            return Err(ValidationError::DuplicateGrant {
                grant_id: grant.grant_id,
            });
        }
        Ok(())
    }

    pub fn record_deposit(&mut self, grant: Grant) -> Result<(), ValidationError> {
        self.validate_deposit(&grant)?;

        let account = self.account_mut(grant.owner);
        account.grants += 1;
        account.deposited = account.deposited.saturating_add(grant.total_value);
        account.minted = account.minted.saturating_add(grant.minted);

        let maturation = grant.schedule.maturation_time();
        self.latest_maturation = Some(self.latest_maturation.map_or(maturation, |m| m.max(maturation)));
        self.grants.insert(grant.grant_id, grant);
        Ok(())
    }

    /// Release `amount` from a grant at block time `now`.
    ///
    /// The face value bound is checked before the vesting ceiling.
    pub fn record_claim(
        &mut self,
        grant_id: GrantId,
        amount: u128,
        now: u64,
    ) -> Result<ClaimReceipt, ValidationError> {
        let grant = self
            .grants
            .get_mut(&grant_id)
            .ok_or(ValidationError::UnknownGrant { grant_id })?;

        let over_claim = ValidationError::OverClaim {
            grant_id,
            requested: amount,
            claimed: grant.claimed_value,
            total: grant.total_value,
        };
        let next = grant.claimed_value.checked_add(amount).ok_or(over_claim.clone())?;
        if next > grant.total_value {
            return Err(over_claim);
        }

        let vested = grant.vested(now);
        if next > vested {
            return Err(ValidationError::PrematureClaim {
                grant_id,
                requested: amount,
                claimed: grant.claimed_value,
                vested,
            });
        }

        let was_closed = grant.closed;
        grant.claimed_value = next;
        grant.closed = next == grant.total_value;
        let receipt = ClaimReceipt {
            owner: grant.owner,
            claimed_value: next,
            closed: grant.closed && !was_closed,
        };

        let account = self.account_mut(receipt.owner);
        account.claimed = account.claimed.saturating_add(amount);
        Ok(receipt)
    }

    /// Track a redemption against the redeemer's account.
    pub fn record_redemption(&mut self, owner: Address, vs_amount: u128, asset_amount: u128, fee: u128) {
        let account = self.account_mut(owner);
        account.redeemed = account.redeemed.saturating_add(vs_amount);
        account.assets_received = account.assets_received.saturating_add(asset_amount);
        account.redeem_fees_paid = account.redeem_fees_paid.saturating_add(fee);
    }

    pub fn get_grant(&self, grant_id: &GrantId) -> Option<&Grant> {
        self.grants.get(grant_id)
    }

    pub fn projected_claimable(&self, grant_id: GrantId, now: u64) -> Result<u128, ValidationError> {
        self.grants
            .get(&grant_id)
            .map(|g| g.projected_claimable(now))
            .ok_or(ValidationError::UnknownGrant { grant_id })
    }

    pub fn account(&self, owner: &Address) -> Option<&AccountPosition> {
        self.accounts.get(owner)
    }

    /// Grants deposited by `owner`, ordered by grant id.
    pub fn grants_for_owner<'a>(&'a self, owner: &'a Address) -> impl Iterator<Item = &'a Grant> + 'a {
        self.grants.values().filter(move |g| &g.owner == owner)
    }

    pub fn grants(&self) -> impl Iterator<Item = &Grant> {
        self.grants.values()
    }

    pub fn accounts(&self) -> impl Iterator<Item = &AccountPosition> {
        self.accounts.values()
    }

    /// Latest maturation time among all grants.
    pub fn latest_maturation(&self) -> Option<u64> {
        self.latest_maturation
    }

    pub fn len(&self) -> usize {
        self.grants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }

    pub fn closed_count(&self) -> u64 {
        self.grants.values().filter(|g| g.closed).count() as u64
    }

    fn account_mut(&mut self, owner: Address) -> &mut AccountPosition {
        self.accounts
            .entry(owner)
            .or_insert_with(|| AccountPosition::new(owner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(n: u8) -> Address {
        Address::from([n; 20])
    }

    fn grant(token_id: u64, value: u128) -> Grant {
        Grant::new(
            GrantId::new(token_id, 1),
            owner(1),
            value,
            VestingSchedule::new(0, 900).unwrap(),
            EventKey::new(1, token_id as u32),
        )
    }

    #[test]
    fn duplicate_deposit_is_rejected() {
        let mut ledger = PositionLedger::new();
        ledger.record_deposit(grant(1, 1000)).unwrap();
        assert_eq!(
            ledger.record_deposit(grant(1, 5)),
            Err(ValidationError::DuplicateGrant {
                grant_id: GrantId::new(1, 1)
            })
        );
        assert_eq!(ledger.get_grant(&GrantId::new(1, 1)).unwrap().total_value, 1000);
    }

    #[test]
    fn claim_on_unknown_grant_fails() {
        let mut ledger = PositionLedger::new();
        let err = ledger.record_claim(GrantId::new(9, 9), 1, 0).unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnknownGrant {
                grant_id: GrantId::new(9, 9)
            }
        );
    }

    // Test critique: jamais plus que la valeur faciale, même après maturité
    #[test]
    fn over_claim_is_rejected() {
        let mut ledger = PositionLedger::new();
        ledger.record_deposit(grant(1, 1000)).unwrap();
        ledger.record_claim(GrantId::new(1, 1), 995, 10_000).unwrap();

        let err = ledger.record_claim(GrantId::new(1, 1), 10, 10_000).unwrap_err();
        assert!(matches!(err, ValidationError::OverClaim { claimed: 995, .. }));
        assert_eq!(ledger.get_grant(&GrantId::new(1, 1)).unwrap().claimed_value, 995);
    }

    // Test critique: le plafond de la courbe de vesting s'applique à `now`
    #[test]
    fn premature_claim_is_rejected() {
        let mut ledger = PositionLedger::new();
        ledger.record_deposit(grant(1, 1000)).unwrap();

        let err = ledger.record_claim(GrantId::new(1, 1), 501, 450).unwrap_err();
        assert!(matches!(err, ValidationError::PrematureClaim { vested: 500, .. }));

        ledger.record_claim(GrantId::new(1, 1), 500, 450).unwrap();
        assert_eq!(ledger.projected_claimable(GrantId::new(1, 1), 450).unwrap(), 0);
    }

    #[test]
    fn projected_claimable_halfway() {
        let mut ledger = PositionLedger::new();
        ledger.record_deposit(grant(1, 1000)).unwrap();
        assert_eq!(ledger.projected_claimable(GrantId::new(1, 1), 450).unwrap(), 500);

        ledger.record_claim(GrantId::new(1, 1), 200, 450).unwrap();
        assert_eq!(ledger.projected_claimable(GrantId::new(1, 1), 450).unwrap(), 300);
        assert!(ledger.projected_claimable(GrantId::new(2, 1), 450).is_err());
    }

    #[test]
    fn full_claim_closes_grant() {
        let mut ledger = PositionLedger::new();
        ledger.record_deposit(grant(1, 1000)).unwrap();
        let receipt = ledger.record_claim(GrantId::new(1, 1), 1000, 900).unwrap();
        assert!(receipt.closed);
        assert!(ledger.get_grant(&GrantId::new(1, 1)).unwrap().closed);
        assert_eq!(ledger.closed_count(), 1);
        assert_eq!(ledger.account(&owner(1)).unwrap().claimed, 1000);
    }

    #[test]
    fn accounts_track_deposits_and_redemptions() {
        let mut ledger = PositionLedger::new();
        ledger.record_deposit(grant(1, 1000).with_mint(990, 10)).unwrap();
        ledger.record_deposit(grant(2, 500).with_mint(495, 5)).unwrap();
        ledger.record_redemption(owner(1), 100, 98, 2);

        let account = ledger.account(&owner(1)).unwrap();
        assert_eq!(account.grants, 2);
        assert_eq!(account.deposited, 1500);
        assert_eq!(account.minted, 1485);
        assert_eq!(account.redeemed, 100);
        assert_eq!(account.assets_received, 98);
        assert_eq!(ledger.grants_for_owner(&owner(1)).count(), 2);
        assert_eq!(ledger.grants_for_owner(&owner(2)).count(), 0);
    }

    #[test]
    fn latest_maturation_over_all_grants() {
        let mut ledger = PositionLedger::new();
        assert_eq!(ledger.latest_maturation(), None);
        ledger.record_deposit(grant(1, 1)).unwrap();
        let mut late = grant(2, 1);
        late.schedule = VestingSchedule::new(0, 5_000).unwrap();
        ledger.record_deposit(late).unwrap();
        assert_eq!(ledger.latest_maturation(), Some(5_000));
    }

    // Test critique: la maturité en cache survit à un dépôt plus précoce et à la restauration
    #[test]
    fn latest_maturation_cached_across_deposits_and_restore() {
        let mut ledger = PositionLedger::new();
        let mut late = grant(1, 1);
        late.schedule = VestingSchedule::new(0, 9_000).unwrap();
        ledger.record_deposit(late).unwrap();
        let mut early = grant(2, 1);
        early.schedule = VestingSchedule::new(0, 3_000).unwrap();
        ledger.record_deposit(early).unwrap();
        assert_eq!(ledger.latest_maturation(), Some(9_000));

        // A rejected duplicate leaves the cached value untouched.
        let mut dup = grant(3, 1);
        dup.grant_id = grant(1, 1).grant_id;
        dup.schedule = VestingSchedule::new(0, 50_000).unwrap();
        assert!(ledger.record_deposit(dup).is_err());
        assert_eq!(ledger.latest_maturation(), Some(9_000));

        let restored = PositionLedger::from_parts(ledger.grants().cloned(), ledger.accounts().cloned());
        assert_eq!(restored.latest_maturation(), Some(9_000));
        assert_eq!(restored, ledger);
    }

    #[test]
    fn from_parts_restores_lookup() {
        let mut ledger = PositionLedger::new();
        ledger.record_deposit(grant(3, 10)).unwrap();
        let rebuilt = PositionLedger::from_parts(
            ledger.grants().cloned().collect::<Vec<_>>(),
            ledger.accounts().cloned().collect::<Vec<_>>(),
        );
        assert_eq!(rebuilt, ledger);
    }
}
