//! Shared in-memory fakes for unit tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use attestry_core::{ClaimHash, CtypeHash};

use crate::indexer::{BlockRange, EventApi, IndexerError, RawEvent};

/// In-memory event history answering indexer queries.
pub(crate) struct FakeEventApi {
    events: Vec<RawEvent>,
}

impl FakeEventApi {
    pub fn new(events: Vec<RawEvent>) -> Arc<Self> {
        Arc::new(Self { events })
    }

    fn matching(&self, range: BlockRange) -> Vec<RawEvent> {
        // Newest first, the way the real service answers.
        let mut rows: Vec<RawEvent> = self
            .events
            .iter()
            .filter(|e| e.block_num >= range.from && e.block_num <= range.to)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.block_num.cmp(&a.block_num));
        rows
    }
}

#[async_trait]
impl EventApi for FakeEventApi {
    async fn count(
        &self,
        _module: &str,
        _event_id: &str,
        range: BlockRange,
    ) -> Result<u64, IndexerError> {
        Ok(self.matching(range).len() as u64)
    }

    async fn page(
        &self,
        _module: &str,
        _event_id: &str,
        range: BlockRange,
        page: u32,
        row: u32,
    ) -> Result<Vec<RawEvent>, IndexerError> {
        Ok(self
            .matching(range)
            .into_iter()
            .skip(page as usize * row as usize)
            .take(row as usize)
            .collect())
    }
}

/// A well-formed attestation-creation event row.
pub(crate) fn attestation_event(
    block: u64,
    created_at: DateTime<Utc>,
    attester: &str,
    claim_hash: ClaimHash,
) -> RawEvent {
    let params = serde_json::json!([
        attester,
        claim_hash.to_string(),
        CtypeHash::from([0x22; 32]).to_string(),
        null
    ]);
    RawEvent {
        block_num: block,
        block_timestamp: created_at.timestamp(),
        params: params.to_string(),
    }
}
