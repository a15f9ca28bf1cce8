//! Working set of attestations due for revocation or removal.
//!
//! [`ExpiryInventory`] is pure in-memory state rebuilt from a full history
//! scan; [`ExpiryService`] drives it on a fixed schedule, pushes due items
//! through the transaction batcher and reconciles the sets against what
//! actually landed on-chain.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::{debug, info, warn};

use attestry_core::{should_remove, should_revoke, AttestationRecord, ClaimHash};

use crate::batcher::TransactionBatcher;
use crate::ledger::AttestationCall;
use crate::oracle::RevocationOracle;
use crate::scanner::AttestationScanner;

/// Which post-transaction state a reconciliation pass checks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileTarget {
    /// Items were submitted for revocation.
    Revoked,
    /// Items were submitted for removal.
    Removed,
}

/// Set sizes, for logging and the dry-run command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InventorySummary {
    /// Items due for revocation.
    pub to_revoke: usize,
    /// Items due for removal.
    pub to_remove: usize,
    /// Items old enough to revoke but not yet to remove.
    pub to_remove_later: usize,
}

/// Attestations the issuer still owes lifecycle work for.
#[derive(Debug, Default)]
pub struct ExpiryInventory {
    to_revoke: HashMap<ClaimHash, AttestationRecord>,
    to_remove: HashMap<ClaimHash, AttestationRecord>,
    to_remove_later: HashMap<ClaimHash, AttestationRecord>,
}

impl ExpiryInventory {
    /// Create an empty inventory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the working set: promote watched items across the removal
    /// threshold, then rescan the full attestation history from block 0.
    pub async fn refresh(
        &mut self,
        scanner: &AttestationScanner,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.promote(now);

        let mut stream = scanner.scan(0).await?;
        while let Some(record) = stream.next().await? {
            self.classify(record, now);
        }

        let summary = self.summary();
        info!(
            to_revoke = summary.to_revoke,
            to_remove = summary.to_remove,
            watched = summary.to_remove_later,
            "Inventory refreshed"
        );
        Ok(())
    }

    /// Move items that have crossed the removal threshold from the watch set
    /// into the removal set.
    pub fn promote(&mut self, now: DateTime<Utc>) {
        let crossed: Vec<ClaimHash> = self
            .to_remove_later
            .iter()
            .filter(|(_, record)| should_remove(record.created_at, now))
            .map(|(claim, _)| *claim)
            .collect();

        for claim in crossed {
            if let Some(record) = self.to_remove_later.remove(&claim) {
                debug!(claim = %claim, "Promoting into removal set");
                self.to_revoke.remove(&claim);
                self.to_remove.insert(claim, record);
            }
        }
    }

    /// Sort one scanned record into the sets.
    pub fn classify(&mut self, record: AttestationRecord, now: DateTime<Utc>) {
        let claim = record.claim_hash;
        let Some(revoked) = record.revoked else {
            // Already gone from the ledger; nothing left to expire.
            self.purge(&claim);
            return;
        };

        if should_remove(record.created_at, now) {
            self.to_revoke.remove(&claim);
            self.to_remove_later.remove(&claim);
            self.to_remove.insert(claim, record);
        } else if should_revoke(record.created_at, now) {
            if revoked {
                self.to_revoke.remove(&claim);
            } else {
                self.to_revoke.insert(claim, record.clone());
            }
            // Watched for future removal whether or not the revocation has
            // happened yet.
            self.to_remove_later.insert(claim, record);
        }
    }

    /// Drop every item whose observed on-chain state already matches the
    /// target. Claims not tracked in any set are a no-op.
    pub fn apply_observed(
        &mut self,
        observed: &HashMap<ClaimHash, Option<bool>>,
        target: ReconcileTarget,
    ) {
        for (claim, state) in observed {
            match state {
                // Gone from the ledger: no set has work left for it.
                None => self.purge(claim),
                Some(true) if target == ReconcileTarget::Revoked => {
                    self.to_revoke.remove(claim);
                }
                _ => {}
            }
        }
    }

    /// Records currently due for revocation, oldest first.
    pub fn due_for_revocation(&self) -> Vec<AttestationRecord> {
        let mut records: Vec<AttestationRecord> = self.to_revoke.values().cloned().collect();
        records.sort_by_key(|r| r.block);
        records
    }

    /// Records currently due for removal, oldest first.
    pub fn due_for_removal(&self) -> Vec<AttestationRecord> {
        let mut records: Vec<AttestationRecord> = self.to_remove.values().cloned().collect();
        records.sort_by_key(|r| r.block);
        records
    }

    /// Current set sizes.
    pub fn summary(&self) -> InventorySummary {
        InventorySummary {
            to_revoke: self.to_revoke.len(),
            to_remove: self.to_remove.len(),
            to_remove_later: self.to_remove_later.len(),
        }
    }

    fn purge(&mut self, claim: &ClaimHash) {
        self.to_revoke.remove(claim);
        self.to_remove.remove(claim);
        self.to_remove_later.remove(claim);
    }
}

/// Background loop discovering and expiring old attestations.
///
/// Runs on a fixed period; a failed cycle is logged and retried on the next
/// tick, never escalated.
pub struct ExpiryService {
    scanner: AttestationScanner,
    oracle: RevocationOracle,
    batcher: TransactionBatcher,
    inventory: ExpiryInventory,
    cycle_interval: Duration,
}

impl ExpiryService {
    /// Create the service.
    pub fn new(
        scanner: AttestationScanner,
        oracle: RevocationOracle,
        batcher: TransactionBatcher,
        cycle_interval: Duration,
    ) -> Self {
        Self {
            scanner,
            oracle,
            batcher,
            inventory: ExpiryInventory::new(),
            cycle_interval,
        }
    }

    /// Run the expiry loop indefinitely. Should be spawned as a background
    /// task.
    pub async fn run(mut self) -> Result<()> {
        info!(interval = ?self.cycle_interval, "Expiry service starting");

        let mut ticker = tokio::time::interval(self.cycle_interval);
        loop {
            // First tick completes immediately, so the first cycle runs at
            // startup.
            ticker.tick().await;

            if let Err(e) = self.cycle().await {
                warn!("Expiry cycle failed: {:#}", e);
            }
        }
    }

    /// One full pass: refresh the working set, then drive due revocations
    /// and removals through the batcher and reconcile.
    pub async fn cycle(&mut self) -> Result<()> {
        let now = Utc::now();
        self.inventory.refresh(&self.scanner, now).await?;
        self.expire(ReconcileTarget::Revoked).await?;
        self.expire(ReconcileTarget::Removed).await?;
        Ok(())
    }

    /// Submit everything due for `target` and reconcile the outcome.
    async fn expire(&mut self, target: ReconcileTarget) -> Result<()> {
        let due = match target {
            ReconcileTarget::Revoked => self.inventory.due_for_revocation(),
            ReconcileTarget::Removed => self.inventory.due_for_removal(),
        };
        if due.is_empty() {
            return Ok(());
        }

        info!(items = due.len(), target = ?target, "Submitting expiry transactions");

        let handles: Vec<_> = due
            .iter()
            .map(|record| {
                let call = match target {
                    ReconcileTarget::Revoked => AttestationCall::Revoke {
                        claim_hash: record.claim_hash,
                    },
                    ReconcileTarget::Removed => AttestationCall::Remove {
                        claim_hash: record.claim_hash,
                    },
                };
                self.batcher.submit(call)
            })
            .collect();

        // Per-item failures are logged and left in the sets; reconciliation
        // below drops whatever did land on-chain.
        let outcomes = join_all(handles.into_iter().map(|h| h.wait())).await;
        for (record, outcome) in due.iter().zip(outcomes) {
            if let Err(e) = outcome {
                warn!(claim = %record.claim_hash, "Expiry submission failed: {}", e);
            }
        }

        let claims: Vec<ClaimHash> = due.iter().map(|r| r.claim_hash).collect();
        self.reconcile(&claims, target).await
    }

    /// Re-query on-chain state for `claims` and drop everything that already
    /// matches `target`. Safe to call with claims that were never submitted
    /// this round.
    pub async fn reconcile(&mut self, claims: &[ClaimHash], target: ReconcileTarget) -> Result<()> {
        let observed = self.oracle.query_revoked(claims).await?;
        self.inventory.apply_observed(&observed, target);
        Ok(())
    }

    /// Read access to the working set.
    pub fn inventory(&self) -> &ExpiryInventory {
        &self.inventory
    }
}
