//! Reconstruction of the issuer's attestation history.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::DateTime;

use attestry_core::{AttestationRecord, DidIdentifier};

use crate::indexer::{EventSource, EventStream, PageTransform, RawEvent};
use crate::ledger::LedgerClient;
use crate::oracle::RevocationOracle;

/// Ledger module that stores attestations.
pub const ATTESTATION_MODULE: &str = "attestation";

/// Event kind emitted when an attestation is written.
pub const CREATED_EVENT: &str = "AttestationCreated";

/// Lazy scans of everything this issuer has ever attested.
pub struct AttestationScanner {
    source: EventSource,
    ledger: Arc<dyn LedgerClient>,
    issuer: DidIdentifier,
}

impl AttestationScanner {
    /// Create a scanner for `issuer`'s attestations.
    pub fn new(source: EventSource, ledger: Arc<dyn LedgerClient>, issuer: DidIdentifier) -> Self {
        Self {
            source,
            ledger,
            issuer,
        }
    }

    /// Start a scan at `from_block`, yielding fully classified records oldest
    /// block first.
    ///
    /// The stream ends at the chain head observed now; the consumer decides
    /// how far to read before that. It is not restartable mid-flight.
    pub async fn scan(&self, from_block: u64) -> Result<EventStream<AttestationRecord>> {
        let head = self
            .ledger
            .block_height()
            .await
            .context("Failed to read chain head")?;

        let oracle = RevocationOracle::new(self.ledger.clone());
        let issuer = self.issuer.clone();
        let transform: PageTransform<AttestationRecord> = Box::new(move |rows| {
            let oracle = oracle.clone();
            let issuer = issuer.clone();
            Box::pin(async move { decode_page(rows, &issuer, &oracle).await })
        });

        Ok(self
            .source
            .events(ATTESTATION_MODULE, CREATED_EVENT, from_block, head, transform))
    }
}

/// Decode one page of raw events into records and attach revocation state.
///
/// Rows attested by other accounts are dropped on the attester param alone,
/// before any digest is decoded. The whole surviving page is classified with
/// a single oracle query.
async fn decode_page(
    rows: Vec<RawEvent>,
    issuer: &DidIdentifier,
    oracle: &RevocationOracle,
) -> Result<Vec<AttestationRecord>> {
    let mut records = Vec::new();
    for row in rows {
        let params = row.decode_params()?;
        if params.attester()? != issuer.as_str() {
            continue;
        }

        let created_at = DateTime::from_timestamp(row.block_timestamp, 0)
            .with_context(|| format!("Invalid block timestamp {}", row.block_timestamp))?;

        records.push(AttestationRecord {
            claim_hash: params.claim_hash()?,
            ctype_hash: params.ctype_hash()?,
            owner: issuer.clone(),
            delegation_id: params.delegation_id()?,
            created_at,
            block: row.block_num,
            revoked: Some(false),
        });
    }

    let claims: Vec<_> = records.iter().map(|r| r.claim_hash).collect();
    let observed = oracle.query_revoked(&claims).await?;
    for record in &mut records {
        record.revoked = observed.get(&record.claim_hash).copied().flatten();
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::mock::MockLedger;
    use crate::ledger::StoredAttestation;
    use crate::testutil::{attestation_event, FakeEventApi};
    use attestry_core::{ClaimHash, CtypeHash};
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    const ISSUER: &str = "did:sample:issuer-1";

    fn claim(byte: u8) -> ClaimHash {
        ClaimHash::from([byte; 32])
    }

    #[tokio::test]
    async fn test_scan_filters_foreign_attesters() {
        let created = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let api = FakeEventApi::new(vec![
            attestation_event(100, created, ISSUER, claim(1)),
            attestation_event(110, created, "did:sample:someone-else", claim(2)),
            attestation_event(120, created, ISSUER, claim(3)),
        ]);
        let ledger = Arc::new(MockLedger::new());
        ledger.set_height(500);

        let source = EventSource::new(api, 100, 1_000, Duration::ZERO);
        let scanner = AttestationScanner::new(
            source,
            ledger,
            DidIdentifier::new(ISSUER).unwrap(),
        );

        let mut stream = scanner.scan(0).await.unwrap();
        let mut seen = Vec::new();
        while let Some(record) = stream.next().await.unwrap() {
            seen.push((record.block, record.claim_hash));
        }

        assert_eq!(seen, vec![(100, claim(1)), (120, claim(3))]);
    }

    #[tokio::test]
    async fn test_scan_attaches_revocation_state() {
        let created = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let api = FakeEventApi::new(vec![
            attestation_event(100, created, ISSUER, claim(1)),
            attestation_event(110, created, ISSUER, claim(2)),
            attestation_event(120, created, ISSUER, claim(3)),
        ]);

        let ledger = Arc::new(MockLedger::new());
        ledger.set_height(500);
        ledger.store(
            claim(1),
            StoredAttestation {
                ctype_hash: CtypeHash::from([0x22; 32]),
                revoked: false,
            },
        );
        ledger.store(
            claim(2),
            StoredAttestation {
                ctype_hash: CtypeHash::from([0x22; 32]),
                revoked: true,
            },
        );
        // claim 3 has no stored record: removed.

        let source = EventSource::new(api, 100, 1_000, Duration::ZERO);
        let scanner = AttestationScanner::new(
            source,
            ledger,
            DidIdentifier::new(ISSUER).unwrap(),
        );

        let mut stream = scanner.scan(0).await.unwrap();
        let mut revoked = Vec::new();
        while let Some(record) = stream.next().await.unwrap() {
            revoked.push(record.revoked);
        }

        assert_eq!(revoked, vec![Some(false), Some(true), None]);
    }

    #[tokio::test]
    async fn test_scan_decodes_record_fields() {
        let created = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let api = FakeEventApi::new(vec![attestation_event(100, created, ISSUER, claim(1))]);
        let ledger = Arc::new(MockLedger::new());
        ledger.set_height(500);

        let source = EventSource::new(api, 100, 1_000, Duration::ZERO);
        let scanner = AttestationScanner::new(
            source,
            ledger,
            DidIdentifier::new(ISSUER).unwrap(),
        );

        let mut stream = scanner.scan(0).await.unwrap();
        let record = stream.next().await.unwrap().unwrap();
        assert_eq!(record.claim_hash, claim(1));
        assert_eq!(record.ctype_hash, CtypeHash::from([0x22; 32]));
        assert_eq!(record.owner.as_str(), ISSUER);
        assert_eq!(record.delegation_id, None);
        assert_eq!(record.created_at, created);
        assert_eq!(record.block, 100);
        assert!(stream.next().await.unwrap().is_none());
    }
}
