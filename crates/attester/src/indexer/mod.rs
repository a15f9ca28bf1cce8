//! Client for the remote event-indexing service.
//!
//! The indexer exposes the chain's event history as a paginated HTTP API.
//! This module splits the concern in three:
//!
//! - [`api`]: wire types and the [`api::EventApi`] seam between pagination
//!   logic and HTTP
//! - [`client`]: the reqwest-backed [`client::IndexerClient`] with bounded
//!   retry on transient failures
//! - [`stream`]: [`stream::EventSource`], the lazy range-chunked,
//!   page-reversed scan over an event kind

pub mod api;
pub mod client;
pub mod stream;

pub use api::{BlockRange, EventApi, EventParams, IndexerError, RawEvent};
pub use client::IndexerClient;
pub use stream::{EventSource, EventStream, PageTransform};
