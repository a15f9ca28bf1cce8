//! # Attestry Attester
//!
//! Attestation lifecycle service for a credential issuer. This crate owns
//! everything between the credential layer and the chain:
//!
//! - Event scanning that reconstructs the issuer's attestation history from
//!   a paginated indexing service
//! - Bulk revocation-status lookups against current chain state
//! - An hourly background loop revoking attestations past one year of age
//!   and removing them past two
//! - A transaction batcher coalescing concurrent submissions into as few
//!   ledger transactions as possible
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  attestry-attester                          │
//! │                                             │
//! │  ┌──────────────┐      ┌─────────────────┐  │
//! │  │ EventSource  │◄─────│ indexing service│  │
//! │  │ (paginated)  │      │ (HTTP, remote)  │  │
//! │  └──────┬───────┘      └─────────────────┘  │
//! │         │ pages                             │
//! │  ┌──────▼───────────┐   ┌────────────────┐  │
//! │  │ AttestationScanner│◄─│ RevocationOracle│ │
//! │  └──────┬───────────┘   └───────▲────────┘  │
//! │         │ records               │           │
//! │  ┌──────▼────────┐              │           │
//! │  │ ExpiryService │──────────────┘           │
//! │  │ (hourly loop) │                          │
//! │  └──────┬────────┘    ┌──────────────────┐  │
//! │         │ calls       │ credential layer │  │
//! │  ┌──────▼────────┐    └────────┬─────────┘  │
//! │  │ Transaction   │◄────────────┘            │
//! │  │ Batcher       │  request_attestation     │
//! │  └──────┬────────┘                          │
//! │         ▼                                   │
//! │   ledger gateway (signs + submits)          │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! The HTTP surface of the wider application is not here; it consumes
//! [`TransactionBatcher::request_attestation`] as a library call.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batcher;
pub mod config;
pub mod indexer;
pub mod inventory;
pub mod ledger;
pub mod oracle;
pub mod scanner;

#[cfg(test)]
pub(crate) mod testutil;

// Re-export common types
pub use attestry_core::types::*;
pub use batcher::{BatchError, SubmissionHandle, TransactionBatcher};
pub use ledger::{AttestationCall, Claim, LedgerClient};
