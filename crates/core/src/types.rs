//! Core types for attestry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Length in bytes of a content-addressed ledger digest.
pub const DIGEST_LEN: usize = 32;

fn parse_digest(s: &str) -> Result<[u8; DIGEST_LEN], CoreError> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(stripped).map_err(|_| CoreError::InvalidHex)?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| CoreError::InvalidDigestLength(len))
}

/// Content-addressed identifier of an attested claim (32-byte hex digest).
///
/// This is the primary key of an attestation on the ledger: the claim's
/// root hash as minted by the credential layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClaimHash([u8; DIGEST_LEN]);

impl ClaimHash {
    /// Create a new ClaimHash from a 32-byte array.
    pub const fn new(bytes: [u8; DIGEST_LEN]) -> Self {
        ClaimHash(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }
}

impl From<[u8; DIGEST_LEN]> for ClaimHash {
    fn from(bytes: [u8; DIGEST_LEN]) -> Self {
        ClaimHash(bytes)
    }
}

impl FromStr for ClaimHash {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_digest(s).map(ClaimHash)
    }
}

impl fmt::Display for ClaimHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl Serialize for ClaimHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ClaimHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Identifier of the credential schema (CType) an attestation was issued
/// against (32-byte hex digest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CtypeHash([u8; DIGEST_LEN]);

impl CtypeHash {
    /// Create a new CtypeHash from a 32-byte array.
    pub const fn new(bytes: [u8; DIGEST_LEN]) -> Self {
        CtypeHash(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }
}

impl From<[u8; DIGEST_LEN]> for CtypeHash {
    fn from(bytes: [u8; DIGEST_LEN]) -> Self {
        CtypeHash(bytes)
    }
}

impl FromStr for CtypeHash {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_digest(s).map(CtypeHash)
    }
}

impl fmt::Display for CtypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl Serialize for CtypeHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CtypeHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Identifier of a delegation node authorizing an attestation (32-byte hex
/// digest). Usually absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DelegationId([u8; DIGEST_LEN]);

impl DelegationId {
    /// Create a new DelegationId from a 32-byte array.
    pub const fn new(bytes: [u8; DIGEST_LEN]) -> Self {
        DelegationId(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }
}

impl From<[u8; DIGEST_LEN]> for DelegationId {
    fn from(bytes: [u8; DIGEST_LEN]) -> Self {
        DelegationId(bytes)
    }
}

impl FromStr for DelegationId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_digest(s).map(DelegationId)
    }
}

impl fmt::Display for DelegationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl Serialize for DelegationId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DelegationId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Decentralized identifier of a ledger account.
///
/// Stored in normalized (trimmed) form; comparison is exact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct DidIdentifier(String);

impl DidIdentifier {
    /// Create a new DidIdentifier, rejecting empty input.
    pub fn new(s: impl Into<String>) -> Result<Self, CoreError> {
        let s = s.into();
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(CoreError::InvalidDid(s));
        }
        Ok(DidIdentifier(trimmed.to_string()))
    }

    /// Get the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for DidIdentifier {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DidIdentifier::new(s)
    }
}

impl fmt::Display for DidIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for DidIdentifier {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        DidIdentifier::new(s).map_err(serde::de::Error::custom)
    }
}

/// One claim attested by this issuer, as reconstructed from the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationRecord {
    /// The claim's content-addressed identifier (primary key).
    pub claim_hash: ClaimHash,
    /// The credential schema the attestation was issued against.
    pub ctype_hash: CtypeHash,
    /// The account that wrote the attestation.
    pub owner: DidIdentifier,
    /// The delegation node authorizing the attestation, if any.
    pub delegation_id: Option<DelegationId>,
    /// Timestamp of the block the attestation was created in.
    pub created_at: DateTime<Utc>,
    /// Block height of creation; used as a scan cursor.
    pub block: u64,
    /// Current on-chain flag: `Some(false)` valid, `Some(true)` revoked but
    /// still stored, `None` removed from the ledger entirely.
    pub revoked: Option<bool>,
}

/// Derived lifecycle state of an attestation. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpiryState {
    /// Stored and unrevoked, younger than the revocation threshold.
    Valid,
    /// Revoked on-chain, or due for revocation by age.
    Revoked,
    /// Gone from the ledger, or due for removal by age.
    Removed,
}

impl fmt::Display for ExpiryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpiryState::Valid => write!(f, "valid"),
            ExpiryState::Revoked => write!(f, "revoked"),
            ExpiryState::Removed => write!(f, "removed"),
        }
    }
}
