//! Ledger client seam.
//!
//! Everything this service knows about the chain goes through
//! [`LedgerClient`]: bulk attestation-state lookups, the current block
//! height, and submission of batched attestation calls. The trait keeps the
//! rest of the crate independent of how transactions are signed and encoded;
//! the [`HttpLedgerClient`] implementation delegates that to a gateway
//! process holding the issuer's keys.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use attestry_core::{ClaimHash, CtypeHash, DelegationId};

/// Errors from the ledger client.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// The gateway could not be reached.
    #[error("Ledger gateway transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The gateway answered with a non-success status.
    #[error("Ledger gateway returned HTTP {status}: {message}")]
    Gateway {
        /// HTTP status code of the response.
        status: u16,
        /// Response body, as far as it could be read.
        message: String,
    },

    /// The gateway answered with a body this client cannot interpret.
    #[error("Malformed ledger gateway response: {0}")]
    Malformed(String),
}

impl LedgerError {
    /// Whether retrying the same request later can reasonably succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            LedgerError::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            LedgerError::Gateway { status, .. } => *status == 429 || *status >= 500,
            LedgerError::Malformed(_) => false,
        }
    }
}

/// A claim as handed over by the credential layer for attestation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    /// Content-addressed identifier of the claim.
    pub claim_hash: ClaimHash,
    /// Schema the claim was built against.
    pub ctype_hash: CtypeHash,
    /// Delegation authorizing the attestation, if any.
    pub delegation_id: Option<DelegationId>,
}

/// One attestation call inside a ledger transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttestationCall {
    /// Write a new attestation for a claim.
    Attest {
        /// The claim being attested.
        claim_hash: ClaimHash,
        /// Schema of the claim.
        ctype_hash: CtypeHash,
        /// Delegation authorizing the attestation, if any.
        delegation_id: Option<DelegationId>,
    },
    /// Set the revoked flag on a stored attestation.
    Revoke {
        /// The claim whose attestation is revoked.
        claim_hash: ClaimHash,
    },
    /// Delete a stored attestation from the ledger entirely.
    Remove {
        /// The claim whose attestation is removed.
        claim_hash: ClaimHash,
    },
}

impl AttestationCall {
    /// The claim this call applies to.
    pub fn claim_hash(&self) -> &ClaimHash {
        match self {
            AttestationCall::Attest { claim_hash, .. }
            | AttestationCall::Revoke { claim_hash }
            | AttestationCall::Remove { claim_hash } => claim_hash,
        }
    }

    /// Whether the observed on-chain state already satisfies this call.
    ///
    /// `observed` is the stored attestation for the claim, or `None` when the
    /// ledger holds no record. A revoke against a record that is gone counts
    /// as settled: there is nothing left to flag.
    pub fn is_settled(&self, observed: Option<&StoredAttestation>) -> bool {
        match self {
            AttestationCall::Attest { .. } => observed.is_some(),
            AttestationCall::Revoke { .. } => observed.is_none_or(|s| s.revoked),
            AttestationCall::Remove { .. } => observed.is_none(),
        }
    }
}

impl From<Claim> for AttestationCall {
    fn from(claim: Claim) -> Self {
        AttestationCall::Attest {
            claim_hash: claim.claim_hash,
            ctype_hash: claim.ctype_hash,
            delegation_id: claim.delegation_id,
        }
    }
}

/// Stored attestation state as read back from the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredAttestation {
    /// Schema the attestation was issued against.
    pub ctype_hash: CtypeHash,
    /// The on-chain revoked flag.
    pub revoked: bool,
}

/// Client-side view of the ledger.
///
/// Implementations are expected to resolve `submit_calls` only once the
/// transaction is finalized; any re-sign/resubmit machinery on the way there
/// is their own business.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Current block height of the chain.
    async fn block_height(&self) -> Result<u64, LedgerError>;

    /// Bulk-fetch stored attestation state for the given claims.
    ///
    /// Claims with no stored record are absent from the returned map. An
    /// empty input returns an empty map without touching the network.
    async fn fetch_attestations(
        &self,
        claims: &[ClaimHash],
    ) -> Result<HashMap<ClaimHash, StoredAttestation>, LedgerError>;

    /// Build, authorize and submit one transaction carrying all given calls
    /// atomically, resolving once it is finalized.
    async fn submit_calls(&self, calls: Vec<AttestationCall>) -> Result<(), LedgerError>;
}

#[derive(Debug, Deserialize)]
struct HeightResponse {
    height: u64,
}

#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    claims: &'a [ClaimHash],
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    attestations: HashMap<ClaimHash, StoredAttestation>,
}

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    calls: &'a [AttestationCall],
}

/// HTTP client for the ledger gateway.
pub struct HttpLedgerClient {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl HttpLedgerClient {
    /// Build a gateway client.
    pub fn new(
        base_url: &str,
        timeout: Duration,
        auth_token: Option<String>,
        retry_attempts: u32,
        retry_delay: Duration,
    ) -> Result<Self, LedgerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("attestry-attester/ledger")
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token,
            retry_attempts,
            retry_delay,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(token) = &self.auth_token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, LedgerError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LedgerError::Gateway {
                status: status.as_u16(),
                message,
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|e| LedgerError::Malformed(e.to_string()))
    }

    /// Run a read request, retrying transient failures a bounded number of
    /// times with a fixed delay.
    async fn with_retry<T, F, Fut>(&self, mut operation: F) -> Result<T, LedgerError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, LedgerError>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.retry_attempts => {
                    warn!(attempt, error = %e, "Ledger gateway request failed, retrying");
                    tokio::time::sleep(self.retry_delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn block_height(&self) -> Result<u64, LedgerError> {
        let response: HeightResponse = self
            .with_retry(|| async {
                let response = self
                    .request(reqwest::Method::GET, "/v1/chain/height")
                    .send()
                    .await?;
                Self::read_json(response).await
            })
            .await?;
        Ok(response.height)
    }

    async fn fetch_attestations(
        &self,
        claims: &[ClaimHash],
    ) -> Result<HashMap<ClaimHash, StoredAttestation>, LedgerError> {
        if claims.is_empty() {
            return Ok(HashMap::new());
        }
        let response: QueryResponse = self
            .with_retry(|| async {
                let response = self
                    .request(reqwest::Method::POST, "/v1/attestations/query")
                    .json(&QueryRequest { claims })
                    .send()
                    .await?;
                Self::read_json(response).await
            })
            .await?;
        Ok(response.attestations)
    }

    async fn submit_calls(&self, calls: Vec<AttestationCall>) -> Result<(), LedgerError> {
        // No client-side retry here: the gateway owns resubmission of a
        // transaction it has accepted, and repeating the request from this
        // side risks double submission.
        let response = self
            .request(reqwest::Method::POST, "/v1/transactions")
            .json(&SubmitRequest { calls: &calls })
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LedgerError::Gateway {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn claim(byte: u8) -> ClaimHash {
        ClaimHash::from([byte; 32])
    }

    fn stored(revoked: bool) -> StoredAttestation {
        StoredAttestation {
            ctype_hash: CtypeHash::from([0x22; 32]),
            revoked,
        }
    }

    #[test]
    fn test_attest_settled_only_when_stored() {
        let call = AttestationCall::Attest {
            claim_hash: claim(1),
            ctype_hash: CtypeHash::from([0x22; 32]),
            delegation_id: None,
        };
        assert!(!call.is_settled(None));
        assert!(call.is_settled(Some(&stored(false))));
        assert!(call.is_settled(Some(&stored(true))));
    }

    #[test]
    fn test_revoke_settled_when_flagged_or_gone() {
        let call = AttestationCall::Revoke {
            claim_hash: claim(1),
        };
        assert!(!call.is_settled(Some(&stored(false))));
        assert!(call.is_settled(Some(&stored(true))));
        assert!(call.is_settled(None));
    }

    #[test]
    fn test_remove_settled_only_when_gone() {
        let call = AttestationCall::Remove {
            claim_hash: claim(1),
        };
        assert!(!call.is_settled(Some(&stored(false))));
        assert!(!call.is_settled(Some(&stored(true))));
        assert!(call.is_settled(None));
    }

    #[test]
    fn test_call_wire_format() {
        let call = AttestationCall::Revoke {
            claim_hash: claim(0xab),
        };
        let json = serde_json::to_value(&call).unwrap();
        assert_eq!(json["kind"], "revoke");
        assert_eq!(json["claim_hash"], format!("0x{}", "ab".repeat(32)));
    }

    #[test]
    fn test_transient_classification() {
        let gateway_busy = LedgerError::Gateway {
            status: 503,
            message: String::new(),
        };
        let gateway_rejected = LedgerError::Gateway {
            status: 400,
            message: String::new(),
        };
        assert!(gateway_busy.is_transient());
        assert!(!gateway_rejected.is_transient());
        assert!(!LedgerError::Malformed("bad".to_string()).is_transient());
    }

    #[tokio::test]
    async fn test_mock_ledger_applies_calls() {
        let ledger = mock::MockLedger::new();
        let c = claim(1);
        ledger
            .submit_calls(vec![AttestationCall::Attest {
                claim_hash: c,
                ctype_hash: CtypeHash::from([0x22; 32]),
                delegation_id: None,
            }])
            .await
            .unwrap();
        assert_eq!(ledger.stored(&c), Some(stored(false)));

        ledger
            .submit_calls(vec![AttestationCall::Revoke { claim_hash: c }])
            .await
            .unwrap();
        assert_eq!(ledger.stored(&c), Some(stored(true)));

        ledger
            .submit_calls(vec![AttestationCall::Remove { claim_hash: c }])
            .await
            .unwrap();
        assert_eq!(ledger.stored(&c), None);
    }
}
