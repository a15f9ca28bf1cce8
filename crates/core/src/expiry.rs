//! Age-based lifecycle policy for attestations.
//!
//! Attestations older than one year must be revoked; attestations older than
//! two years must be removed from the ledger entirely. Thresholds use
//! calendar arithmetic, so "one year before" February 29th lands on
//! February 28th rather than drifting by leap-day milliseconds.

use chrono::{DateTime, Months, Utc};

use crate::types::{AttestationRecord, ExpiryState};

/// Calendar months after which an attestation is due for revocation.
pub const REVOKE_AFTER_MONTHS: u32 = 12;

/// Calendar months after which an attestation is due for removal.
pub const REMOVE_AFTER_MONTHS: u32 = 24;

fn threshold(now: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    now.checked_sub_months(Months::new(months))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Whether an attestation created at `created_at` is due for revocation as
/// of `now`. Exactly-at-threshold is not yet due.
pub fn should_revoke(created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    created_at < threshold(now, REVOKE_AFTER_MONTHS)
}

/// Whether an attestation created at `created_at` is due for removal as of
/// `now`. Exactly-at-threshold is not yet due.
pub fn should_remove(created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    created_at < threshold(now, REMOVE_AFTER_MONTHS)
}

/// Compute the target lifecycle state of a record as of `now`.
///
/// A record that is already gone from the ledger is `Removed` regardless of
/// age; otherwise age decides, with the on-chain revoked flag as floor.
pub fn expiry_state(record: &AttestationRecord, now: DateTime<Utc>) -> ExpiryState {
    match record.revoked {
        None => ExpiryState::Removed,
        Some(revoked) => {
            if should_remove(record.created_at, now) {
                ExpiryState::Removed
            } else if revoked || should_revoke(record.created_at, now) {
                ExpiryState::Revoked
            } else {
                ExpiryState::Valid
            }
        }
    }
}
