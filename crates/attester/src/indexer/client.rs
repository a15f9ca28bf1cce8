//! HTTP implementation of the indexer API.

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::api::{BlockRange, EventApi, EventPage, EventQuery, IndexerError, RawEvent};

/// Reqwest-backed indexer client.
///
/// Transient failures (timeouts, connection errors, 429/5xx) are retried a
/// bounded number of times with a fixed delay; anything else propagates and
/// fails the current scan pass.
pub struct IndexerClient {
    client: reqwest::Client,
    base_url: String,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl IndexerClient {
    /// Build an indexer client.
    pub fn new(
        base_url: &str,
        timeout: Duration,
        retry_attempts: u32,
        retry_delay: Duration,
    ) -> Result<Self, IndexerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("attestry-attester/indexer")
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry_attempts,
            retry_delay,
        })
    }

    async fn post_events(&self, query: &EventQuery<'_>) -> Result<EventPage, IndexerError> {
        let response = self
            .client
            .post(format!("{}/events", self.base_url))
            .json(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(IndexerError::Status(status.as_u16()));
        }

        response
            .json::<EventPage>()
            .await
            .map_err(|e| IndexerError::Malformed(e.to_string()))
    }

    async fn fetch(&self, query: &EventQuery<'_>) -> Result<EventPage, IndexerError> {
        let mut attempt = 1;
        loop {
            match self.post_events(query).await {
                Ok(page) => return Ok(page),
                Err(e) if e.is_transient() && attempt < self.retry_attempts => {
                    warn!(attempt, error = %e, "Indexer request failed, retrying");
                    tokio::time::sleep(self.retry_delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl EventApi for IndexerClient {
    async fn count(
        &self,
        module: &str,
        event_id: &str,
        range: BlockRange,
    ) -> Result<u64, IndexerError> {
        // A single-row page is the cheapest way to read the range's count.
        let query = EventQuery {
            module,
            event_id,
            block_range: range.to_string(),
            page: 0,
            row: 1,
            finalized: true,
        };
        Ok(self.fetch(&query).await?.count)
    }

    async fn page(
        &self,
        module: &str,
        event_id: &str,
        range: BlockRange,
        page: u32,
        row: u32,
    ) -> Result<Vec<RawEvent>, IndexerError> {
        let query = EventQuery {
            module,
            event_id,
            block_range: range.to_string(),
            page,
            row,
            finalized: true,
        };
        Ok(self.fetch(&query).await?.events)
    }
}
