//! Event indexer - ordering, dedup, apply and replay.
//!
//! The indexer owns the retained event log and is the single writer of the
//! shared [`IndexState`]. Each event is decoded, validated and applied to
//! the ledger and accountant under one write lock; a rejected event leaves
//! the state untouched and is recorded as `Discarded`.
//!
//! # Delivery rules
//!
//! - Batches are sorted by `(block_number, log_index)` before application.
//! - Redelivery of a retained event (same key, same identity, same payload)
//!   is a no-op.
//! - A different event at a retained key, or a retained identity at a new
//!   key, is a fatal `ConflictingEvent`.
//! - An unseen event below the last retained key is a fatal `GapDetected`.
//!
//! Fatal errors halt mutation. Reads keep serving the last good state.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound::{Excluded, Unbounded};

use tracing::{debug, error, info, instrument, trace, warn};

use super::decode::decode;
use super::query::QueryService;
use super::state::{IndexState, SharedState};
use crate::domain::{FeePolicy, Grant, PositionLedger, VestingSchedule};
use crate::error::{
    AccountingError, DiscardReason, IndexerError, IndexerResult, InvariantViolation, ValidationError,
};
use crate::metrics::{
    ProcessingTimer, record_duplicate_delivery, record_event_applied, record_event_discarded,
    record_invariant_violation, record_rollback, set_halted,
};
use crate::models::{Checkpoint, EventId, EventKey, EventStatus, IndexerStatus, LoggedEvent, VaultEvent};
use crate::ports::{LogRecord, RawEvent, ResumePoint};

// =============================================================================
// Configuration
// =============================================================================

/// Parameters that determine how events are applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexerSettings {
    /// Fee and backing policy for this epoch.
    pub policy: FeePolicy,
    /// Explicit vault maturity time. When `None`, the vault is mature once
    /// every recorded grant has reached its maturation time.
    pub vault_maturity_time: Option<u64>,
}

// =============================================================================
// Reports
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub applied: u64,
    pub discarded: u64,
    /// Redeliveries absorbed by dedup.
    pub duplicates: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollbackReport {
    pub boundary: EventKey,
    /// Retained events removed.
    pub removed: u64,
    /// A halt caused beyond the boundary was lifted.
    pub halt_cleared: bool,
}

// =============================================================================
// EventIndexer
// =============================================================================

pub struct EventIndexer {
    settings: IndexerSettings,
    state: SharedState,
    log: BTreeMap<EventKey, LogRecord>,
    ids: HashMap<EventId, EventKey>,
    dirty: BTreeSet<EventKey>,
}

impl EventIndexer {
    /// Start from genesis.
    pub fn new(settings: IndexerSettings) -> Self {
        Self {
            settings,
            state: SharedState::new(IndexState::new(settings.policy)),
            log: BTreeMap::new(),
            ids: HashMap::new(),
            dirty: BTreeSet::new(),
        }
    }

    /// Rebuild from persisted data.
    ///
    /// With a checkpoint, records after its cursor are re-applied on top of
    /// it; without one, the whole log is replayed from genesis. An invariant
    /// violation during replay leaves the indexer halted at the offending
    /// event rather than failing, so reads can still be served.
    #[instrument(skip_all, fields(records = records.len(), checkpoint = checkpoint.is_some()))]
    pub fn restore(
        settings: IndexerSettings,
        checkpoint: Option<Checkpoint>,
        records: Vec<LogRecord>,
    ) -> IndexerResult<Self> {
        let (mut base, cursor) = match checkpoint {
            Some(cp) => {
                if cp.policy != settings.policy {
                    error!(
                        configured = %settings.policy,
                        checkpoint = %cp.policy,
                        "❌ Fee policy mismatch! Stored state was built under different parameters"
                    );
                    error!("   Manual action required: restore the original parameters or purge the database");
                    return Err(IndexerError::PolicyMismatch {
                        configured: settings.policy.to_string(),
                        checkpoint: cp.policy.to_string(),
                    });
                }
                (IndexState::from_checkpoint(&cp), Some(cp.cursor))
            }
            None => (IndexState::new(settings.policy), None),
        };

        let mut indexer = Self::new(settings);
        for record in records {
            indexer.ids.insert(record.raw.id(), record.key());
            indexer.log.insert(record.key(), record);
        }

        let tail: Vec<EventKey> = match cursor {
            Some(cursor) => indexer.log.range((Excluded(cursor), Unbounded)).map(|(k, _)| *k).collect(),
            None => indexer.log.keys().copied().collect(),
        };
        debug!(cursor = ?cursor, replay = tail.len(), "Replaying retained log");

        if let Err((key, violation)) = indexer.replay_into(&mut base, &tail) {
            record_invariant_violation();
            let err = IndexerError::Invariant { key, violation };
            error!(error = %err, "❌ Replay hit an invariant violation, indexing halted");
            base.status = IndexerStatus::Halted {
                reason: err.to_string(),
                at: Some(key),
            };
            set_halted(true);
        }
        indexer.state.replace(base);

        info!(
            retained = indexer.log.len(),
            last = ?indexer.last_key(),
            "📦 Index state restored"
        );
        Ok(indexer)
    }

    pub fn settings(&self) -> &IndexerSettings {
        &self.settings
    }

    /// Handle to the live state for readers.
    pub fn shared(&self) -> SharedState {
        self.state.clone()
    }

    pub fn query(&self) -> QueryService {
        QueryService::new(self.state.clone())
    }

    pub fn status(&self) -> IndexerStatus {
        self.state.read().status.clone()
    }

    /// Highest retained ordering key.
    pub fn last_key(&self) -> Option<EventKey> {
        self.log.keys().next_back().copied()
    }

    /// Resume position for the feed: the last retained event.
    pub fn resume_point(&self) -> Option<ResumePoint> {
        self.log.values().next_back().map(|record| ResumePoint::of(&record.raw))
    }

    pub fn record(&self, key: &EventKey) -> Option<&LogRecord> {
        self.log.get(key)
    }

    pub fn retained(&self) -> usize {
        self.log.len()
    }

    /// Apply a batch of raw events.
    ///
    /// Events applied before a fatal error stay applied; the error is
    /// returned and the indexer refuses further batches until a rollback
    /// clears the halt.
    #[instrument(skip_all, fields(events = batch.len()))]
    pub fn ingest(&mut self, mut batch: Vec<RawEvent>) -> IndexerResult<IngestReport> {
        self.ensure_running()?;
        batch.sort_by_key(RawEvent::key);

        let mut report = IngestReport::default();
        for raw in batch {
            let key = raw.key();

            match self.check_delivery(&raw) {
                Ok(true) => {}
                Ok(false) => {
                    trace!(key = %key, "Duplicate delivery, skipping");
                    record_duplicate_delivery();
                    report.duplicates += 1;
                    continue;
                }
                Err(err) => {
                    self.halt(&err, Some(key));
                    return Err(err);
                }
            }

            let processed = {
                let mut state = self.state.write();
                process(&mut state, &self.settings, &raw)
            };

            self.ids.insert(raw.id(), key);
            self.dirty.insert(key);
            match processed {
                Ok(status) => {
                    match status {
                        EventStatus::Applied => report.applied += 1,
                        _ => report.discarded += 1,
                    }
                    self.log.insert(key, LogRecord { raw, status });
                }
                Err(violation) => {
                    record_invariant_violation();
                    self.log.insert(key, LogRecord::pending(raw));
                    let err = IndexerError::Invariant { key, violation };
                    self.halt(&err, Some(key));
                    return Err(err);
                }
            }
        }

        debug!(
            applied = report.applied,
            discarded = report.discarded,
            duplicates = report.duplicates,
            "Batch ingested"
        );
        Ok(report)
    }

    /// Revert everything after `boundary` by replaying the retained log up
    /// to it from genesis, then swapping the rebuilt state in.
    #[instrument(skip(self), fields(boundary = %boundary))]
    pub fn rollback(&mut self, boundary: EventKey) -> IndexerResult<RollbackReport> {
        let removed: Vec<EventKey> = self
            .log
            .range((Excluded(boundary), Unbounded))
            .map(|(k, _)| *k)
            .collect();
        let previous_status = self.status();
        let halt_beyond = matches!(&previous_status, IndexerStatus::Halted { at: Some(at), .. } if *at > boundary);

        if removed.is_empty() && !halt_beyond {
            debug!("Nothing to roll back");
            return Ok(RollbackReport {
                boundary,
                removed: 0,
                halt_cleared: false,
            });
        }

        for key in &removed {
            if let Some(record) = self.log.remove(key) {
                self.ids.remove(&record.raw.id());
            }
            self.dirty.remove(key);
        }

        let mut fresh = IndexState::new(self.settings.policy);
        let keys: Vec<EventKey> = self.log.keys().copied().collect();
        let replayed = self.replay_into(&mut fresh, &keys);

        if !halt_beyond {
            fresh.status = previous_status;
        }
        let report = RollbackReport {
            boundary,
            removed: removed.len() as u64,
            halt_cleared: halt_beyond,
        };

        if let Err((key, violation)) = replayed {
            record_invariant_violation();
            let err = IndexerError::Invariant { key, violation };
            self.state.replace(fresh);
            self.halt(&err, Some(key));
            return Err(err);
        }

        self.state.replace(fresh);
        if halt_beyond {
            set_halted(false);
        }
        record_rollback(report.removed);
        info!(
            removed = report.removed,
            halt_cleared = report.halt_cleared,
            "🔄 Rolled back"
        );
        Ok(report)
    }

    /// Checkpoint of the current state; `None` while halted or empty.
    pub fn checkpoint(&self) -> Option<Checkpoint> {
        let state = self.state.read();
        if state.status.is_halted() {
            return None;
        }
        state.to_checkpoint()
    }

    /// Records changed since they were last persisted.
    pub fn dirty_records(&self) -> Vec<LogRecord> {
        self.dirty
            .iter()
            .filter_map(|key| self.log.get(key).cloned())
            .collect()
    }

    /// Clear the dirty flag of records that were persisted.
    pub fn mark_persisted<'a>(&mut self, keys: impl IntoIterator<Item = &'a EventKey>) {
        for key in keys {
            self.dirty.remove(key);
        }
    }

    /// Returns `Ok(true)` for a new event, `Ok(false)` for a duplicate.
    fn check_delivery(&self, raw: &RawEvent) -> IndexerResult<bool> {
        let key = raw.key();
        let id = raw.id();

        if let Some(retained) = self.log.get(&key) {
            if retained.raw == *raw {
                return Ok(false);
            }
            return Err(IndexerError::ConflictingEvent {
                key,
                retained_tx: retained.raw.tx_hash.to_hex(),
                delivered_tx: raw.tx_hash.to_hex(),
            });
        }

        if let Some(other) = self.ids.get(&id) {
            return Err(IndexerError::ConflictingEvent {
                key,
                retained_tx: format!("{} at {other}", raw.tx_hash),
                delivered_tx: format!("{} at {key}", raw.tx_hash),
            });
        }

        if let Some(last) = self.last_key()
            && key < last
        {
            return Err(IndexerError::GapDetected {
                missing: key,
                last_retained: last,
            });
        }

        Ok(true)
    }

    /// Re-process `keys` on top of `state`, updating record statuses.
    fn replay_into(&mut self, state: &mut IndexState, keys: &[EventKey]) -> Result<(), (EventKey, InvariantViolation)> {
        for key in keys {
            let Some(record) = self.log.get_mut(key) else {
                continue;
            };
            let status = process(state, &self.settings, &record.raw).map_err(|v| (*key, v))?;
            if status != record.status {
                record.status = status;
                self.dirty.insert(*key);
            }
        }
        Ok(())
    }

    fn ensure_running(&self) -> IndexerResult<()> {
        if let IndexerStatus::Halted { reason, .. } = &self.state.read().status {
            return Err(IndexerError::Halted(reason.clone()));
        }
        Ok(())
    }

    fn halt(&self, err: &IndexerError, at: Option<EventKey>) {
        error!(error = %err, "❌ Indexing halted");
        self.state.write().status = IndexerStatus::Halted {
            reason: err.to_string(),
            at,
        };
        set_halted(true);
    }
}

// =============================================================================
// Apply
// =============================================================================

enum ApplyError {
    Discard(DiscardReason),
    Fatal(InvariantViolation),
}

impl From<DiscardReason> for ApplyError {
    fn from(reason: DiscardReason) -> Self {
        Self::Discard(reason)
    }
}

impl From<ValidationError> for ApplyError {
    fn from(err: ValidationError) -> Self {
        Self::Discard(err.into())
    }
}

impl From<InvariantViolation> for ApplyError {
    fn from(violation: InvariantViolation) -> Self {
        Self::Fatal(violation)
    }
}

impl From<AccountingError> for ApplyError {
    fn from(err: AccountingError) -> Self {
        match err {
            AccountingError::Validation(e) => e.into(),
            AccountingError::Invariant(v) => v.into(),
        }
    }
}

/// Decode and apply one record, updating aggregates.
///
/// State is only mutated once every check for the event has passed, so a
/// discard or a fatal violation leaves `state` as it was.
fn process(state: &mut IndexState, settings: &IndexerSettings, raw: &RawEvent) -> Result<EventStatus, InvariantViolation> {
    let _timer = ProcessingTimer::new();

    let result = decode(raw)
        .map_err(ApplyError::from)
        .and_then(|event| apply(state, settings, &event));

    let status = match result {
        Ok(()) => {
            state.aggregates.applied_events += 1;
            record_event_applied(&raw.name);
            EventStatus::Applied
        }
        Err(ApplyError::Discard(reason)) => {
            warn!(
                key = %raw.key(),
                event = %raw.name,
                tx = %raw.tx_hash,
                code = reason.code(),
                reason = %reason,
                "⚠️  Event discarded"
            );
            state.aggregates.record_discard(reason.code());
            record_event_discarded(reason.code());
            EventStatus::Discarded { reason }
        }
        Err(ApplyError::Fatal(violation)) => return Err(violation),
    };

    state.aggregates.last_processed = Some(raw.key());
    state.aggregates.last_block_timestamp = Some(raw.block_timestamp);
    Ok(status)
}

fn apply(state: &mut IndexState, settings: &IndexerSettings, logged: &LoggedEvent) -> Result<(), ApplyError> {
    let now = logged.block_timestamp;

    match &logged.event {
        VaultEvent::Deposited {
            grant_id,
            owner,
            total_value,
            start_time,
            maturation_time,
        } => {
            let schedule = VestingSchedule::new(*start_time, *maturation_time)?;
            let grant = Grant::new(*grant_id, *owner, *total_value, schedule, logged.key);
            state.ledger.validate_deposit(&grant)?;
            let (mint, _) = state.accountant.quote_mint(*total_value)?;

            state.ledger.record_deposit(grant.with_mint(mint.minted, mint.fee))?;
            state.accountant.mint(*total_value)?;

            let agg = &mut state.aggregates;
            agg.minted_supply = agg.minted_supply.saturating_add(mint.minted);
            agg.mint_fees = agg.mint_fees.saturating_add(mint.fee);
            agg.assets_deposited = agg.assets_deposited.saturating_add(*total_value);
            agg.open_grants += 1;
            trace!(grant = %grant_id, minted = %mint.minted, fee = %mint.fee, "Grant deposited");
        }

        VaultEvent::Withdrawn { grant_id, amount } => {
            let receipt = state.ledger.record_claim(*grant_id, *amount, now)?;

            let agg = &mut state.aggregates;
            agg.claimed_value = agg.claimed_value.saturating_add(*amount);
            if receipt.closed {
                agg.open_grants = agg.open_grants.saturating_sub(1);
                agg.closed_grants += 1;
            }
            trace!(grant = %grant_id, amount = %amount, closed = receipt.closed, "Grant claimed");
        }

        VaultEvent::Redeemed {
            owner,
            vs_amount,
            asset_amount,
            fee,
        } => {
            let matured = vault_matured(&state.ledger, settings, now);
            let (quote, _) = state.accountant.quote_redeem(*vs_amount, matured)?;
            if quote.asset_amount.abs_diff(*asset_amount) > 1 || quote.fee.abs_diff(*fee) > 1 {
                return Err(DiscardReason::QuoteMismatch {
                    expected_assets: quote.asset_amount,
                    expected_fee: quote.fee,
                    reported_assets: *asset_amount,
                    reported_fee: *fee,
                }
                .into());
            }

            state.accountant.redeem(*vs_amount, matured)?;
            state
                .ledger
                .record_redemption(*owner, *vs_amount, quote.asset_amount, quote.fee);

            let agg = &mut state.aggregates;
            agg.redeemed_supply = agg.redeemed_supply.saturating_add(*vs_amount);
            agg.redeem_fees = agg.redeem_fees.saturating_add(quote.fee);
            agg.assets_paid_out = agg.assets_paid_out.saturating_add(quote.asset_amount);
            trace!(owner = %owner, vs = %vs_amount, assets = %quote.asset_amount, "vS redeemed");
        }
    }

    let matured = vault_matured(&state.ledger, settings, now);
    state.accountant.observe_maturity(matured);
    Ok(())
}

/// Whether the vault has matured at block time `now`.
fn vault_matured(ledger: &PositionLedger, settings: &IndexerSettings, now: u64) -> bool {
    match settings.vault_maturity_time {
        Some(at) => now >= at,
        None => ledger.latest_maturation().is_some_and(|latest| now >= latest),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Address, GrantId, TxHash};
    use serde_json::json;

    const OWNER: &str = "0x1111111111111111111111111111111111111111";

    fn tx(block: u64, log: u32) -> TxHash {
        let mut bytes = [0u8; 32];
        bytes[..8].copy_from_slice(&block.to_be_bytes());
        bytes[8..12].copy_from_slice(&log.to_be_bytes());
        TxHash::from(bytes)
    }

    fn raw(block: u64, log: u32, ts: u64, name: &str, data: serde_json::Value) -> RawEvent {
        RawEvent {
            block_number: block,
            log_index: log,
            tx_hash: tx(block, log),
            block_timestamp: ts,
            name: name.to_string(),
            data,
        }
    }

    fn deposit(block: u64, token: u64, value: u128, ts: u64) -> RawEvent {
        raw(
            block,
            0,
            ts,
            "Deposited",
            json!({
                "grantId": format!("{token}-1"),
                "owner": OWNER,
                "totalValue": value.to_string(),
                "startTime": 0,
                "maturationTime": 900
            }),
        )
    }

    fn withdraw(block: u64, token: u64, amount: u128, ts: u64) -> RawEvent {
        raw(
            block,
            0,
            ts,
            "Withdrawn",
            json!({"grantId": format!("{token}-1"), "amount": amount.to_string()}),
        )
    }

    fn redeem(block: u64, vs: u128, assets: u128, fee: u128, ts: u64) -> RawEvent {
        raw(
            block,
            0,
            ts,
            "Redeemed",
            json!({
                "owner": OWNER,
                "vsAmount": vs.to_string(),
                "assetAmount": assets.to_string(),
                "fee": fee.to_string()
            }),
        )
    }

    fn snapshot(indexer: &EventIndexer) -> IndexState {
        indexer.shared().read().clone()
    }

    fn indexer() -> EventIndexer {
        EventIndexer::new(IndexerSettings::default())
    }

    // Test critique: scénario A - dépôt de 1000 avec 1% de frais
    #[test]
    fn deposit_mints_net_of_fee() {
        let mut indexer = indexer();
        let report = indexer.ingest(vec![deposit(1, 1, 1000, 0)]).unwrap();
        assert_eq!(report.applied, 1);

        let state = snapshot(&indexer);
        let vault = state.accountant.state();
        assert_eq!(vault.total_assets, 1000);
        assert_eq!(vault.total_supply, 990);
        assert_eq!(state.aggregates.minted_supply, 990);
        assert_eq!(state.aggregates.mint_fees, 10);
        assert_eq!(state.aggregates.open_grants, 1);

        let grant = state.ledger.get_grant(&GrantId::new(1, 1)).unwrap();
        assert_eq!((grant.minted, grant.mint_fee), (990, 10));
    }

    // Test critique: scénario B - projection à mi-parcours
    #[test]
    fn projection_halfway_through_vesting() {
        let mut indexer = indexer();
        indexer.ingest(vec![deposit(1, 1, 1000, 0)]).unwrap();
        let state = snapshot(&indexer);
        assert_eq!(state.ledger.projected_claimable(GrantId::new(1, 1), 450).unwrap(), 500);
    }

    #[test]
    fn claims_are_capped_by_block_time() {
        let mut indexer = indexer();
        indexer
            .ingest(vec![
                deposit(1, 1, 1000, 0),
                withdraw(2, 1, 600, 450),
                withdraw(3, 1, 500, 450),
            ])
            .unwrap();

        assert_eq!(
            indexer.record(&EventKey::new(2, 0)).unwrap().status.label(),
            "discarded"
        );
        let state = snapshot(&indexer);
        assert_eq!(state.aggregates.discarded_by_reason["premature_claim"], 1);
        assert_eq!(state.aggregates.claimed_value, 500);
        assert_eq!(state.ledger.get_grant(&GrantId::new(1, 1)).unwrap().claimed_value, 500);
    }

    // Test critique: un lecteur concurrent ne voit jamais un état à moitié appliqué
    #[test]
    fn concurrent_snapshots_stay_consistent_during_ingest() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let mut indexer = indexer();
        let query = indexer.query();
        let done = AtomicBool::new(false);

        std::thread::scope(|scope| {
            let readers: Vec<_> = (0..4)
                .map(|_| {
                    let query = query.clone();
                    let done = &done;
                    scope.spawn(move || {
                        let mut seen = 0u64;
                        loop {
                            let finished = done.load(Ordering::Acquire);
                            let snap = query.snapshot();
                            let vault = snap.vault.state;
                            assert_eq!(vault.total_assets, snap.aggregates.assets_deposited);
                            assert_eq!(vault.total_supply, snap.aggregates.minted_supply);
                            assert_eq!(snap.aggregates.minted_supply + snap.aggregates.mint_fees, vault.total_assets);
                            seen += 1;
                            if finished {
                                break seen;
                            }
                        }
                    })
                })
                .collect();

            for token in 1..=500u64 {
                indexer.ingest(vec![deposit(token, token, 1000 + u128::from(token), 0)]).unwrap();
            }
            done.store(true, Ordering::Release);

            for reader in readers {
                assert!(reader.join().unwrap() > 0);
            }
        });

        let snap = query.snapshot();
        assert_eq!(snap.aggregates.open_grants, 500);
        assert_eq!(snap.vault.state.total_assets, snap.aggregates.assets_deposited);
    }

    #[test]
    fn full_claim_closes_grant_in_aggregates() {
        let mut indexer = indexer();
        indexer
            .ingest(vec![deposit(1, 1, 1000, 0), withdraw(2, 1, 1000, 900)])
            .unwrap();
        let agg = snapshot(&indexer).aggregates;
        assert_eq!((agg.open_grants, agg.closed_grants), (0, 1));
    }

    // Test critique: scénario D - redeem avant maturité rejeté, état inchangé
    #[test]
    fn redeem_before_maturity_is_discarded() {
        let mut indexer = indexer();
        indexer.ingest(vec![deposit(1, 1, 1000, 0)]).unwrap();
        let before = snapshot(&indexer).accountant.state();

        let report = indexer.ingest(vec![redeem(2, 100, 99, 2, 100)]).unwrap();
        assert_eq!(report.discarded, 1);

        let state = snapshot(&indexer);
        assert_eq!(state.accountant.state(), before);
        assert_eq!(state.aggregates.discarded_by_reason["not_matured"], 1);
    }

    // Test critique: scénario E - double livraison du même Redeemed
    #[test]
    fn duplicate_redeem_delivery_is_a_noop() {
        let mut indexer = indexer();
        indexer.ingest(vec![deposit(1, 1, 1000, 0)]).unwrap();

        // 100 * 1000 / 990 = 101, fee 2% = 2, net 99
        let event = redeem(2, 100, 99, 2, 1_000);
        let first = indexer.ingest(vec![event.clone()]).unwrap();
        assert_eq!(first.applied, 1);
        let once = snapshot(&indexer);

        let second = indexer.ingest(vec![event.clone(), event]).unwrap();
        assert_eq!(second.duplicates, 2);
        assert_eq!(snapshot(&indexer), once);

        let vault = once.accountant.state();
        assert_eq!(vault.total_supply, 890);
        assert_eq!(vault.total_assets, 899);
        assert!(vault.matured);
        let account = once.ledger.account(&Address::from_hex(OWNER).unwrap()).unwrap();
        assert_eq!(account.assets_received, 99);
    }

    #[test]
    fn redeem_with_wrong_reported_amounts_is_discarded() {
        let mut indexer = indexer();
        indexer.ingest(vec![deposit(1, 1, 1000, 0)]).unwrap();
        indexer.ingest(vec![redeem(2, 100, 90, 10, 1_000)]).unwrap();

        let state = snapshot(&indexer);
        assert_eq!(state.accountant.state().total_supply, 990);
        assert_eq!(state.aggregates.discarded_by_reason["quote_mismatch"], 1);
    }

    #[test]
    fn configured_maturity_time_overrides_grants() {
        let mut indexer = EventIndexer::new(IndexerSettings {
            policy: FeePolicy::default(),
            vault_maturity_time: Some(50),
        });
        indexer.ingest(vec![deposit(1, 1, 1000, 0)]).unwrap();
        let report = indexer.ingest(vec![redeem(2, 100, 99, 2, 60)]).unwrap();
        assert_eq!(report.applied, 1);
    }

    #[test]
    fn malformed_and_unknown_events_are_counted() {
        let mut indexer = indexer();
        let report = indexer
            .ingest(vec![
                raw(1, 0, 0, "Deposited", json!({"grantId": "1-1"})),
                raw(1, 1, 0, "Transfer", json!({})),
                deposit(2, 1, 1000, 0),
                deposit(3, 1, 1000, 0),
            ])
            .unwrap();

        assert_eq!(report.applied, 1);
        assert_eq!(report.discarded, 3);
        let agg = snapshot(&indexer).aggregates;
        assert_eq!(agg.discarded_events, 3);
        assert_eq!(agg.discarded_by_reason["malformed"], 1);
        assert_eq!(agg.discarded_by_reason["unknown_event"], 1);
        assert_eq!(agg.discarded_by_reason["duplicate_grant"], 1);
        assert!(!indexer.status().is_halted());
    }

    // Test critique: n'importe quelle permutation d'un lot donne le même état
    #[test]
    fn batch_order_does_not_matter() {
        let events = vec![
            deposit(1, 1, 1000, 0),
            deposit(2, 2, 5_000, 10),
            withdraw(3, 1, 500, 450),
            redeem(4, 100, 99, 2, 1_000),
            withdraw(5, 2, 5_000, 2_000),
        ];
        let mut sorted = indexer();
        sorted.ingest(events.clone()).unwrap();

        let mut reversed = indexer();
        reversed.ingest(events.into_iter().rev().collect()).unwrap();

        assert_eq!(snapshot(&sorted), snapshot(&reversed));
    }

    // Test critique: rejouer le log depuis zéro reproduit l'état incrémental
    #[test]
    fn full_replay_matches_incremental_state() {
        let mut incremental = indexer();
        incremental.ingest(vec![deposit(1, 1, 1000, 0)]).unwrap();
        incremental.ingest(vec![withdraw(2, 1, 300, 300), deposit(3, 2, 777, 300)]).unwrap();
        incremental.ingest(vec![redeem(4, 100, 99, 2, 1_000)]).unwrap();

        let replayed =
            EventIndexer::restore(IndexerSettings::default(), None, incremental.dirty_records()).unwrap();
        assert_eq!(snapshot(&replayed), snapshot(&incremental));
        assert_eq!(replayed.last_key(), Some(EventKey::new(4, 0)));
    }

    #[test]
    fn restore_from_checkpoint_applies_tail() {
        let mut indexer = indexer();
        indexer.ingest(vec![deposit(1, 1, 1000, 0)]).unwrap();
        let checkpoint = indexer.checkpoint().unwrap();
        assert_eq!(checkpoint.cursor, EventKey::new(1, 0));

        indexer.ingest(vec![withdraw(2, 1, 100, 450)]).unwrap();
        let mut records = indexer.dirty_records();
        // tail record not yet applied when it was persisted
        records[1].status = EventStatus::Pending;

        let restored = EventIndexer::restore(IndexerSettings::default(), Some(checkpoint), records).unwrap();
        assert_eq!(snapshot(&restored), snapshot(&indexer));
        assert_eq!(restored.dirty_records().len(), 1);
    }

    #[test]
    fn restore_rejects_policy_mismatch() {
        let mut indexer = indexer();
        indexer.ingest(vec![deposit(1, 1, 1000, 0)]).unwrap();
        let checkpoint = indexer.checkpoint().unwrap();

        let other = IndexerSettings {
            policy: FeePolicy::new(50, 200, crate::domain::WAD).unwrap(),
            vault_maturity_time: None,
        };
        let err = EventIndexer::restore(other, Some(checkpoint), indexer.dirty_records())
            .err()
            .unwrap();
        assert!(matches!(err, IndexerError::PolicyMismatch { .. }));
    }

    #[test]
    fn conflicting_event_halts_but_keeps_state_readable() {
        let mut indexer = indexer();
        indexer.ingest(vec![deposit(1, 1, 1000, 0)]).unwrap();

        let mut forged = deposit(1, 9, 1, 0);
        forged.tx_hash = TxHash::from([0xee; 32]);
        let err = indexer.ingest(vec![forged]).unwrap_err();
        assert!(matches!(err, IndexerError::ConflictingEvent { .. }));
        assert!(err.is_fatal());

        assert!(indexer.status().is_halted());
        assert!(matches!(
            indexer.ingest(vec![deposit(2, 2, 1, 0)]),
            Err(IndexerError::Halted(_))
        ));
        assert_eq!(indexer.query().vault_state().total_assets, 1000);
    }

    #[test]
    fn unseen_event_below_last_key_is_a_gap() {
        let mut indexer = indexer();
        indexer
            .ingest(vec![deposit(1, 1, 1000, 0), deposit(5, 2, 1000, 0)])
            .unwrap();

        let err = indexer.ingest(vec![deposit(3, 3, 10, 0)]).unwrap_err();
        match err {
            IndexerError::GapDetected {
                missing,
                last_retained,
            } => {
                assert_eq!(missing, EventKey::new(3, 0));
                assert_eq!(last_retained, EventKey::new(5, 0));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(indexer.status().is_halted());
    }

    #[test]
    fn overflow_is_fatal_and_leaves_state_unchanged() {
        let mut indexer = indexer();
        indexer.ingest(vec![deposit(1, 1, u128::MAX, 0)]).unwrap();
        let before = snapshot(&indexer).accountant.state();

        let err = indexer.ingest(vec![deposit(2, 2, 1, 0)]).unwrap_err();
        assert!(matches!(err, IndexerError::Invariant { .. }));
        let state = snapshot(&indexer);
        assert_eq!(state.accountant.state(), before);
        assert!(state.ledger.get_grant(&GrantId::new(2, 1)).is_none());
        assert!(indexer.record(&EventKey::new(2, 0)).unwrap().status.is_pending());
    }

    // Test critique: un rollback reconstruit l'état par rejeu déterministe
    #[test]
    fn rollback_rebuilds_state_up_to_boundary() {
        let mut reference = indexer();
        reference
            .ingest(vec![deposit(1, 1, 1000, 0), withdraw(2, 1, 200, 450)])
            .unwrap();

        let mut indexer = indexer();
        indexer
            .ingest(vec![
                deposit(1, 1, 1000, 0),
                withdraw(2, 1, 200, 450),
                deposit(3, 2, 400, 500),
                redeem(4, 100, 99, 2, 1_000),
            ])
            .unwrap();

        let report = indexer.rollback(EventKey::new(2, 0)).unwrap();
        assert_eq!(report.removed, 2);
        assert_eq!(snapshot(&indexer), snapshot(&reference));
        assert_eq!(indexer.last_key(), Some(EventKey::new(2, 0)));
        assert!(indexer.dirty_records().iter().all(|r| r.key() <= EventKey::new(2, 0)));

        // The reorged chain may put a different event at a freed key
        let mut replacement = deposit(3, 7, 50, 600);
        replacement.tx_hash = TxHash::from([0x77; 32]);
        assert_eq!(indexer.ingest(vec![replacement]).unwrap().applied, 1);
    }

    #[test]
    fn rollback_clears_halt_caused_beyond_boundary() {
        let mut indexer = indexer();
        indexer
            .ingest(vec![deposit(1, 1, 1000, 0), deposit(5, 2, 1000, 0)])
            .unwrap();
        indexer.ingest(vec![deposit(3, 3, 10, 0)]).unwrap_err();

        let report = indexer.rollback(EventKey::new(2, 0)).unwrap();
        assert!(report.halt_cleared);
        assert!(!indexer.status().is_halted());
        assert_eq!(indexer.ingest(vec![deposit(3, 3, 10, 0)]).unwrap().applied, 1);
    }

    #[test]
    fn rollback_past_the_end_is_a_noop() {
        let mut indexer = indexer();
        indexer.ingest(vec![deposit(1, 1, 1000, 0)]).unwrap();
        let before = snapshot(&indexer);
        let report = indexer.rollback(EventKey::new(10, 0)).unwrap();
        assert_eq!(report.removed, 0);
        assert_eq!(snapshot(&indexer), before);
    }

    #[test]
    fn persisted_records_are_no_longer_dirty() {
        let mut indexer = indexer();
        indexer.ingest(vec![deposit(1, 1, 1000, 0)]).unwrap();
        let dirty = indexer.dirty_records();
        assert_eq!(dirty.len(), 1);
        let keys: Vec<EventKey> = dirty.iter().map(LogRecord::key).collect();
        indexer.mark_persisted(&keys);
        assert!(indexer.dirty_records().is_empty());
    }
}
