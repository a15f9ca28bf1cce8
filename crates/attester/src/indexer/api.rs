//! Wire types for the event-indexing API.
//!
//! The service answers `POST /events` queries scoped to a module, an event
//! kind and a block range, with row-capped pages. Event parameters arrive as
//! a JSON-encoded positional array; only the positions are fixed: attester,
//! claim hash, schema hash, optional delegation id.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use attestry_core::{ClaimHash, CtypeHash, DelegationId};

/// Errors from the indexer client.
#[derive(Error, Debug)]
pub enum IndexerError {
    /// The indexer could not be reached.
    #[error("Indexer transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The indexer answered with a non-success status.
    #[error("Indexer returned HTTP {0}")]
    Status(u16),

    /// The indexer answered with a payload this client cannot interpret.
    /// Fatal for the whole scan pass.
    #[error("Malformed indexer payload: {0}")]
    Malformed(String),
}

impl IndexerError {
    /// Whether retrying the same request later can reasonably succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            IndexerError::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            IndexerError::Status(status) => *status == 429 || *status >= 500,
            IndexerError::Malformed(_) => false,
        }
    }
}

/// An inclusive block range, rendered as `from-to` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    /// First block of the range.
    pub from: u64,
    /// Last block of the range.
    pub to: u64,
}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.from, self.to)
    }
}

/// Body of a `POST /events` query.
#[derive(Debug, Clone, Serialize)]
pub struct EventQuery<'a> {
    /// Ledger module that emitted the events.
    pub module: &'a str,
    /// Event kind within the module.
    pub event_id: &'a str,
    /// Block range to search, `from-to`.
    pub block_range: String,
    /// Zero-based page index; page 0 holds the newest events.
    pub page: u32,
    /// Maximum rows per page.
    pub row: u32,
    /// Restrict to finalized blocks.
    pub finalized: bool,
}

/// One page of the indexer's answer.
#[derive(Debug, Clone, Deserialize)]
pub struct EventPage {
    /// Total number of matching events in the queried range.
    pub count: u64,
    /// The requested rows, newest first.
    #[serde(default)]
    pub events: Vec<RawEvent>,
}

/// One raw event row.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEvent {
    /// Block the event was emitted in.
    pub block_num: u64,
    /// Unix timestamp of that block, in seconds.
    pub block_timestamp: i64,
    /// JSON-encoded positional parameter array.
    pub params: String,
}

impl RawEvent {
    /// Decode the positional parameter array.
    pub fn decode_params(&self) -> Result<EventParams, IndexerError> {
        let values: Vec<Option<String>> = serde_json::from_str(&self.params)
            .map_err(|e| IndexerError::Malformed(format!("event params: {}", e)))?;
        Ok(EventParams(values))
    }
}

/// Decoded event parameters of an attestation-creation event.
///
/// Accessors decode lazily so that the attester position can be inspected
/// (and foreign events discarded) without parsing the digests.
#[derive(Debug, Clone)]
pub struct EventParams(Vec<Option<String>>);

impl EventParams {
    fn position(&self, index: usize, name: &str) -> Result<&str, IndexerError> {
        self.0
            .get(index)
            .and_then(|v| v.as_deref())
            .ok_or_else(|| IndexerError::Malformed(format!("missing {} param", name)))
    }

    /// The attesting account, as the raw wire string.
    pub fn attester(&self) -> Result<&str, IndexerError> {
        self.position(0, "attester")
    }

    /// The attested claim's hash.
    pub fn claim_hash(&self) -> Result<ClaimHash, IndexerError> {
        self.position(1, "claim hash")?
            .parse()
            .map_err(|e| IndexerError::Malformed(format!("claim hash param: {}", e)))
    }

    /// The credential schema hash.
    pub fn ctype_hash(&self) -> Result<CtypeHash, IndexerError> {
        self.position(2, "schema hash")?
            .parse()
            .map_err(|e| IndexerError::Malformed(format!("schema hash param: {}", e)))
    }

    /// The optional delegation id.
    pub fn delegation_id(&self) -> Result<Option<DelegationId>, IndexerError> {
        match self.0.get(3) {
            None | Some(None) => Ok(None),
            Some(Some(value)) => value
                .parse()
                .map(Some)
                .map_err(|e| IndexerError::Malformed(format!("delegation id param: {}", e))),
        }
    }
}

/// Paginated access to the indexer, one method per query shape.
///
/// The seam exists so pagination logic can be driven against an in-memory
/// event set in tests.
#[async_trait]
pub trait EventApi: Send + Sync {
    /// Number of matching events in `range`.
    async fn count(
        &self,
        module: &str,
        event_id: &str,
        range: BlockRange,
    ) -> Result<u64, IndexerError>;

    /// Fetch one page of matching events, newest first within the range.
    async fn page(
        &self,
        module: &str,
        event_id: &str,
        range: BlockRange,
        page: u32,
        row: u32,
    ) -> Result<Vec<RawEvent>, IndexerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_range_display() {
        let range = BlockRange { from: 0, to: 99_999 };
        assert_eq!(range.to_string(), "0-99999");
    }

    #[test]
    fn test_params_decode() {
        let event = RawEvent {
            block_num: 42,
            block_timestamp: 1_700_000_000,
            params: format!(
                r#"["did:sample:issuer-1", "0x{}", "0x{}", null]"#,
                "11".repeat(32),
                "22".repeat(32)
            ),
        };
        let params = event.decode_params().unwrap();
        assert_eq!(params.attester().unwrap(), "did:sample:issuer-1");
        assert_eq!(params.claim_hash().unwrap(), ClaimHash::from([0x11; 32]));
        assert_eq!(params.ctype_hash().unwrap(), CtypeHash::from([0x22; 32]));
        assert_eq!(params.delegation_id().unwrap(), None);
    }

    #[test]
    fn test_params_decode_with_delegation() {
        let event = RawEvent {
            block_num: 42,
            block_timestamp: 1_700_000_000,
            params: format!(
                r#"["did:sample:issuer-1", "0x{}", "0x{}", "0x{}"]"#,
                "11".repeat(32),
                "22".repeat(32),
                "33".repeat(32)
            ),
        };
        let params = event.decode_params().unwrap();
        assert_eq!(
            params.delegation_id().unwrap(),
            Some(DelegationId::from([0x33; 32]))
        );
    }

    #[test]
    fn test_transient_classification() {
        assert!(IndexerError::Status(503).is_transient());
        assert!(IndexerError::Status(429).is_transient());
        assert!(!IndexerError::Status(404).is_transient());
        assert!(!IndexerError::Malformed("bad".to_string()).is_transient());
    }

    #[test]
    fn test_params_reject_garbage() {
        let event = RawEvent {
            block_num: 42,
            block_timestamp: 1_700_000_000,
            params: "not json".to_string(),
        };
        assert!(event.decode_params().is_err());

        let event = RawEvent {
            block_num: 42,
            block_timestamp: 1_700_000_000,
            params: r#"["did:sample:issuer-1"]"#.to_string(),
        };
        let params = event.decode_params().unwrap();
        assert!(params.claim_hash().is_err());
    }
}
