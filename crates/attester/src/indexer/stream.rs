//! Lazy, range-chunked event scanning.
//!
//! [`EventSource::events`] turns the indexer's page-oriented API into a
//! pull-based stream of typed items, oldest block first. The consumer drives
//! it one item at a time and decides when to stop; nothing is fetched ahead
//! of demand beyond the current page.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::future::BoxFuture;
use tokio::time::sleep;
use tracing::debug;

use super::api::{BlockRange, EventApi, RawEvent};

/// Page-level enrichment hook.
///
/// Every fetched page passes through the transform before its items are
/// yielded, so bulk per-page work (owner filtering, revocation lookups) costs
/// one call per page instead of one per item.
pub type PageTransform<T> =
    Box<dyn FnMut(Vec<RawEvent>) -> BoxFuture<'static, Result<Vec<T>>> + Send>;

/// Factory for event scans over one indexer.
pub struct EventSource {
    api: Arc<dyn EventApi>,
    page_size: u32,
    range_size: u64,
    fetch_interval: Duration,
}

impl EventSource {
    /// Create an event source.
    ///
    /// `range_size` bounds each indexer query to the upstream per-query range
    /// cap; `fetch_interval` is the rate-limit pause between fetches.
    pub fn new(
        api: Arc<dyn EventApi>,
        page_size: u32,
        range_size: u64,
        fetch_interval: Duration,
    ) -> Self {
        Self {
            api,
            page_size: page_size.max(1),
            range_size: range_size.max(1),
            fetch_interval,
        }
    }

    /// Start a scan for `event_id` of `module` at `from_block`, bounded by
    /// `head` (the chain head at call time).
    ///
    /// The stream is not restartable mid-flight; a fresh call re-queries from
    /// `from_block`.
    pub fn events<T>(
        &self,
        module: &str,
        event_id: &str,
        from_block: u64,
        head: u64,
        transform: PageTransform<T>,
    ) -> EventStream<T> {
        let range = (from_block <= head).then(|| BlockRange {
            from: from_block,
            to: from_block
                .saturating_add(self.range_size - 1)
                .min(head),
        });

        EventStream {
            api: self.api.clone(),
            module: module.to_string(),
            event_id: event_id.to_string(),
            page_size: self.page_size,
            range_size: self.range_size,
            fetch_interval: self.fetch_interval,
            head,
            range,
            next_page: None,
            buffer: VecDeque::new(),
            transform,
        }
    }
}

/// One in-progress scan. Yields transformed items oldest block first.
pub struct EventStream<T> {
    api: Arc<dyn EventApi>,
    module: String,
    event_id: String,
    page_size: u32,
    range_size: u64,
    fetch_interval: Duration,
    head: u64,
    /// Range currently being drained; `None` once the head is reached.
    range: Option<BlockRange>,
    /// Pages left in the current range. `None` means the count query has not
    /// run yet; `Some(n)` means page `n - 1` is fetched next.
    next_page: Option<u32>,
    buffer: VecDeque<T>,
    transform: PageTransform<T>,
}

impl<T> EventStream<T> {
    /// Pull the next item, fetching as needed. `Ok(None)` once the scan has
    /// reached the chain head recorded at stream creation.
    pub async fn next(&mut self) -> Result<Option<T>> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Ok(Some(item));
            }

            let Some(range) = self.range else {
                return Ok(None);
            };

            match self.next_page {
                None => {
                    let count = self.api.count(&self.module, &self.event_id, range).await?;
                    if count == 0 {
                        // The indexer is eventually consistent and may simply
                        // not have seen this range yet.
                        debug!(range = %range, "No events in range");
                        sleep(self.fetch_interval).await;
                        self.advance_range();
                    } else {
                        let pages = count.div_ceil(self.page_size as u64);
                        self.next_page = Some(pages.min(u32::MAX as u64) as u32);
                    }
                }
                Some(0) => {
                    self.advance_range();
                }
                Some(remaining) => {
                    let index = remaining - 1;
                    let mut rows = self
                        .api
                        .page(&self.module, &self.event_id, range, index, self.page_size)
                        .await?;
                    // Pages arrive newest first; flip each one so the overall
                    // yield order is ascending by block.
                    rows.reverse();
                    let items = (self.transform)(rows).await?;
                    self.buffer.extend(items);
                    self.next_page = Some(index);
                    sleep(self.fetch_interval).await;
                }
            }
        }
    }

    fn advance_range(&mut self) {
        self.next_page = None;
        self.range = self.range.and_then(|r| {
            let from = r.to.checked_add(1)?;
            if from > self.head {
                return None;
            }
            Some(BlockRange {
                from,
                to: from.saturating_add(self.range_size - 1).min(self.head),
            })
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::api::IndexerError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// In-memory indexer holding one ascending event history.
    struct FakeApi {
        events: Vec<RawEvent>,
        count_calls: Mutex<Vec<BlockRange>>,
        page_calls: Mutex<Vec<(BlockRange, u32)>>,
    }

    impl FakeApi {
        fn new(events: Vec<RawEvent>) -> Arc<Self> {
            Arc::new(Self {
                events,
                count_calls: Mutex::new(Vec::new()),
                page_calls: Mutex::new(Vec::new()),
            })
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
    impl EventApi for FakeApi {
        async fn count(
            &self,
            _module: &str,
            _event_id: &str,
            range: BlockRange,
        ) -> Result<u64, IndexerError> {
            self.count_calls.lock().unwrap().push(range);
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
            self.page_calls.lock().unwrap().push((range, page));
            Ok(self
                .matching(range)
                .into_iter()
                .skip(page as usize * row as usize)
                .take(row as usize)
                .collect())
        }
    }

    fn event(block: u64) -> RawEvent {
        RawEvent {
            block_num: block,
            block_timestamp: 1_700_000_000 + block as i64,
            params: "[]".to_string(),
        }
    }

    fn identity() -> PageTransform<RawEvent> {
        Box::new(|rows| Box::pin(async move { Ok(rows) }))
    }

    async fn drain(stream: &mut EventStream<RawEvent>) -> Vec<u64> {
        let mut blocks = Vec::new();
        while let Some(item) = stream.next().await.unwrap() {
            blocks.push(item.block_num);
        }
        blocks
    }

    #[tokio::test]
    async fn test_paginates_backward_from_highest_page() {
        let api = FakeApi::new((1..=250).map(event).collect());
        let source = EventSource::new(api.clone(), 100, 1_000, Duration::ZERO);

        let mut stream = source.events("attestation", "AttestationCreated", 0, 999, identity());
        let blocks = drain(&mut stream).await;

        assert_eq!(blocks.len(), 250);
        assert_eq!(blocks, (1..=250).collect::<Vec<u64>>());

        // count = 250 at page size 100 means exactly 3 pages, highest first.
        let pages: Vec<u32> = api.page_calls.lock().unwrap().iter().map(|c| c.1).collect();
        assert_eq!(pages, vec![2, 1, 0]);
    }

    #[tokio::test]
    async fn test_chunks_scan_into_block_ranges() {
        let api = FakeApi::new(vec![event(10), event(150), event(260)]);
        let source = EventSource::new(api.clone(), 100, 100, Duration::ZERO);

        let mut stream = source.events("attestation", "AttestationCreated", 0, 299, identity());
        let blocks = drain(&mut stream).await;
        assert_eq!(blocks, vec![10, 150, 260]);

        let counted: Vec<BlockRange> = api.count_calls.lock().unwrap().clone();
        assert_eq!(
            counted,
            vec![
                BlockRange { from: 0, to: 99 },
                BlockRange { from: 100, to: 199 },
                BlockRange { from: 200, to: 299 },
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_ranges_skip_page_fetches() {
        let api = FakeApi::new(vec![event(250)]);
        let source = EventSource::new(api.clone(), 100, 100, Duration::ZERO);

        let mut stream = source.events("attestation", "AttestationCreated", 0, 299, identity());
        let blocks = drain(&mut stream).await;
        assert_eq!(blocks, vec![250]);

        // Two empty ranges counted, only the populated one paged.
        assert_eq!(api.count_calls.lock().unwrap().len(), 3);
        assert_eq!(api.page_calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_from_block_past_head_yields_nothing() {
        let api = FakeApi::new(vec![event(10)]);
        let source = EventSource::new(api.clone(), 100, 100, Duration::ZERO);

        let mut stream = source.events("attestation", "AttestationCreated", 500, 299, identity());
        assert!(stream.next().await.unwrap().is_none());
        assert!(api.count_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transform_runs_once_per_page() {
        let api = FakeApi::new((1..=250).map(event).collect());
        let source = EventSource::new(api.clone(), 100, 1_000, Duration::ZERO);

        let calls = Arc::new(Mutex::new(0u32));
        let transform: PageTransform<u64> = {
            let calls = calls.clone();
            Box::new(move |rows| {
                *calls.lock().unwrap() += 1;
                Box::pin(async move { Ok(rows.into_iter().map(|e| e.block_num).collect()) })
            })
        };

        let mut stream = source.events("attestation", "AttestationCreated", 0, 999, transform);
        let mut yielded = 0;
        while stream.next().await.unwrap().is_some() {
            yielded += 1;
        }

        assert_eq!(yielded, 250);
        assert_eq!(*calls.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_transform_error_fails_the_scan() {
        let api = FakeApi::new(vec![event(10)]);
        let source = EventSource::new(api.clone(), 100, 100, Duration::ZERO);

        let transform: PageTransform<u64> =
            Box::new(|_rows| Box::pin(async move { anyhow::bail!("decode failure") }));

        let mut stream = source.events("attestation", "AttestationCreated", 0, 99, transform);
        assert!(stream.next().await.is_err());
    }
}
