//! Bulk revocation-status lookups.

use std::collections::HashMap;
use std::sync::Arc;

use attestry_core::ClaimHash;

use crate::ledger::{LedgerClient, LedgerError};

/// Classifies claims against current on-chain state in bulk.
///
/// One oracle query is one ledger round-trip regardless of how many claims it
/// covers; callers hand over whole pages or working sets, never single items.
#[derive(Clone)]
pub struct RevocationOracle {
    ledger: Arc<dyn LedgerClient>,
}

impl RevocationOracle {
    /// Create an oracle over the given ledger client.
    pub fn new(ledger: Arc<dyn LedgerClient>) -> Self {
        Self { ledger }
    }

    /// Classify every claim as valid (`Some(false)`), revoked (`Some(true)`)
    /// or removed from the ledger (`None`).
    ///
    /// An empty input returns an empty map without a network call.
    pub async fn query_revoked(
        &self,
        claims: &[ClaimHash],
    ) -> Result<HashMap<ClaimHash, Option<bool>>, LedgerError> {
        if claims.is_empty() {
            return Ok(HashMap::new());
        }

        let stored = self.ledger.fetch_attestations(claims).await?;
        Ok(claims
            .iter()
            .map(|claim| (*claim, stored.get(claim).map(|s| s.revoked)))
            .collect())
    }
}
