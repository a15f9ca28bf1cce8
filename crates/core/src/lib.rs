//! # Attestry Core
//!
//! Core types and expiry policy for the attestry attestation lifecycle.
//!
//! This crate provides the fundamental building blocks used across all attestry
//! components, keeping the domain model and the age-based lifecycle rules in
//! one dependency-light place.
//!
//! ## Features
//!
//! - **Digest Types**: `ClaimHash`, `CtypeHash`, `DelegationId` hex digests
//! - **Domain Types**: `DidIdentifier`, `AttestationRecord`, `ExpiryState`
//! - **Expiry Policy**: calendar-correct revoke-after-one-year,
//!   remove-after-two-years classification

#![warn(missing_docs)]

pub mod error;
pub mod expiry;
pub mod types;

// Re-export commonly used items
pub use error::{CoreError, Result};
pub use expiry::{expiry_state, should_remove, should_revoke};
pub use types::*;
