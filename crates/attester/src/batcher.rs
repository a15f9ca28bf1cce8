//! Transaction batcher.
//!
//! Coalesces concurrent attestation calls into as few ledger transactions as
//! possible. A worker task owns two slots: `current`, the batch whose
//! transaction is in flight, and `pending`, the batch accumulating behind it.
//! All slot mutation runs on the worker, serialized through a command
//! channel; the ledger call itself is awaited outside any state access, so
//! new submissions keep flowing in while a transaction settles.
//!
//! Guarantees:
//! - at most one transaction is in flight at a time;
//! - a claim never rides two in-flight transactions: a duplicate `submit`
//!   attaches to the batch already carrying the claim and observes its
//!   outcome;
//! - a failed item is retried in later batches at most a bounded number of
//!   times, and is dropped silently if the ledger shows it already settled
//!   through another path.

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::error::Elapsed;
use tracing::{debug, info, warn};

use attestry_core::ClaimHash;

use crate::ledger::{AttestationCall, Claim, LedgerClient, LedgerError};

/// Terminal failure reported to submission waiters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BatchError {
    /// The item failed too many submission attempts and was dropped.
    #[error("Gave up after {attempts} failed submission attempts")]
    GaveUp {
        /// Number of attempts made before giving up.
        attempts: u32,
    },

    /// The transaction carrying the item did not settle within the deadline.
    #[error("Transaction did not settle within {0:?}")]
    Timeout(Duration),

    /// The batcher shut down before the item settled.
    #[error("Batcher shut down before the transaction settled")]
    Shutdown,
}

type Waiter = oneshot::Sender<Result<(), BatchError>>;

/// Resolves once the transaction carrying the submitted item settles.
///
/// Every caller that submitted the same claim into the same batch window
/// observes the same outcome through its own handle.
pub struct SubmissionHandle {
    rx: oneshot::Receiver<Result<(), BatchError>>,
}

impl SubmissionHandle {
    /// Wait for the item's terminal outcome.
    pub async fn wait(self) -> Result<(), BatchError> {
        self.rx.await.unwrap_or(Err(BatchError::Shutdown))
    }
}

struct SubmitRequest {
    call: AttestationCall,
    waiter: Waiter,
}

/// Cloneable submit handle to the batcher worker.
///
/// The worker exits once every handle is dropped and in-flight work has
/// settled.
#[derive(Clone)]
pub struct TransactionBatcher {
    tx: mpsc::UnboundedSender<SubmitRequest>,
}

impl TransactionBatcher {
    /// Spawn the batcher worker.
    ///
    /// `max_failures` bounds submission attempts per item; `submit_timeout`
    /// caps each transaction attempt end to end.
    pub fn spawn(
        ledger: Arc<dyn LedgerClient>,
        max_failures: u32,
        submit_timeout: Duration,
    ) -> (Self, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = BatcherWorker {
            ledger,
            rx,
            current: Vec::new(),
            pending: Vec::new(),
            max_failures: max_failures.max(1),
            submit_timeout,
        };
        let handle = tokio::spawn(worker.run());
        (Self { tx }, handle)
    }

    /// Submit one attestation call, batching it with whatever else is on the
    /// way to the ledger.
    pub fn submit(&self, call: AttestationCall) -> SubmissionHandle {
        let (tx, rx) = oneshot::channel();
        // A send failure means the worker is gone; dropping the waiter makes
        // the handle resolve to Shutdown.
        let _ = self.tx.send(SubmitRequest { call, waiter: tx });
        SubmissionHandle { rx }
    }

    /// Entry point for the credential layer: attest `claim`.
    pub fn request_attestation(&self, claim: Claim) -> SubmissionHandle {
        self.submit(AttestationCall::from(claim))
    }
}

struct BatchItem {
    call: AttestationCall,
    failures: u32,
    waiters: Vec<Waiter>,
}

type SubmitOutcome = Result<Result<(), LedgerError>, Elapsed>;

struct BatcherWorker {
    ledger: Arc<dyn LedgerClient>,
    rx: mpsc::UnboundedReceiver<SubmitRequest>,
    current: Vec<BatchItem>,
    pending: Vec<BatchItem>,
    max_failures: u32,
    submit_timeout: Duration,
}

impl BatcherWorker {
    async fn run(mut self) {
        'idle: loop {
            // Quiesced: nothing in flight, nothing pending.
            let Some(request) = self.rx.recv().await else {
                return;
            };
            self.enqueue(request);
            let Some(mut in_flight) = self.dispatch() else {
                continue 'idle;
            };

            // One transaction in flight; keep accepting submissions while it
            // settles.
            loop {
                tokio::select! {
                    request = self.rx.recv() => match request {
                        Some(request) => self.enqueue(request),
                        None => {
                            // Graceful shutdown: let the in-flight
                            // transaction finish (or hit its timeout) rather
                            // than abandoning it mid-air. Anything still
                            // pending afterwards is never submitted; dropping
                            // its waiters surfaces Shutdown to the callers.
                            let outcome = in_flight.as_mut().await;
                            self.settle(outcome).await;
                            return;
                        }
                    },
                    outcome = in_flight.as_mut() => {
                        self.settle(outcome).await;
                        match self.dispatch() {
                            Some(next) => in_flight = next,
                            None => continue 'idle,
                        }
                    }
                }
            }
        }
    }

    fn enqueue(&mut self, request: SubmitRequest) {
        let claim = *request.call.claim_hash();

        if let Some(item) = self
            .current
            .iter_mut()
            .find(|i| *i.call.claim_hash() == claim)
        {
            // Already riding the in-flight transaction.
            item.waiters.push(request.waiter);
            return;
        }

        if let Some(item) = self
            .pending
            .iter_mut()
            .find(|i| *i.call.claim_hash() == claim)
        {
            item.waiters.push(request.waiter);
            return;
        }

        self.pending.push(BatchItem {
            call: request.call,
            failures: 0,
            waiters: vec![request.waiter],
        });
    }

    /// Rotate `pending` into `current` and submit it. Returns `None` when
    /// there is nothing to send, quiescing the worker until the next submit.
    fn dispatch(&mut self) -> Option<BoxFuture<'static, SubmitOutcome>> {
        if self.pending.is_empty() {
            return None;
        }
        self.current = std::mem::take(&mut self.pending);

        let calls: Vec<AttestationCall> = self.current.iter().map(|i| i.call.clone()).collect();
        info!(items = calls.len(), "Submitting attestation batch");

        let ledger = self.ledger.clone();
        let deadline = self.submit_timeout;
        Some(Box::pin(async move {
            tokio::time::timeout(deadline, ledger.submit_calls(calls)).await
        }))
    }

    async fn settle(&mut self, outcome: SubmitOutcome) {
        let settled = std::mem::take(&mut self.current);
        match outcome {
            Ok(Ok(())) => {
                debug!(items = settled.len(), "Batch finalized");
                for item in settled {
                    resolve(item.waiters, Ok(()));
                }
            }
            Err(_elapsed) => {
                // The transaction may still land after the deadline; a later
                // fresh submit re-checks chain state before resubmitting.
                warn!(items = settled.len(), "Batch submission timed out");
                for item in settled {
                    resolve(item.waiters, Err(BatchError::Timeout(self.submit_timeout)));
                }
            }
            Ok(Err(e)) => {
                warn!(items = settled.len(), error = %e, "Batch submission failed");
                self.requeue_failed(settled).await;
            }
        }
    }

    /// Fold the items of a failed batch into the next window, dropping
    /// anything the ledger shows as already settled and anything out of
    /// attempts.
    async fn requeue_failed(&mut self, failed: Vec<BatchItem>) {
        let claims: Vec<ClaimHash> = failed.iter().map(|i| *i.call.claim_hash()).collect();
        let observed = match self.ledger.fetch_attestations(&claims).await {
            Ok(map) => Some(map),
            Err(e) => {
                // Without chain state nothing can be dropped as settled;
                // every item goes through the failure count instead.
                warn!(error = %e, "Could not re-check failed items against the ledger");
                None
            }
        };

        for mut item in failed {
            let claim = *item.call.claim_hash();

            let settled = observed
                .as_ref()
                .is_some_and(|map| item.call.is_settled(map.get(&claim)));
            if settled {
                debug!(claim = %claim, "Item already settled on-chain, dropping");
                resolve(item.waiters, Ok(()));
                continue;
            }

            item.failures += 1;
            if item.failures >= self.max_failures {
                warn!(claim = %claim, attempts = item.failures, "Giving up on item");
                resolve(
                    item.waiters,
                    Err(BatchError::GaveUp {
                        attempts: item.failures,
                    }),
                );
                continue;
            }

            match self
                .pending
                .iter_mut()
                .find(|i| *i.call.claim_hash() == claim)
            {
                Some(existing) => {
                    existing.waiters.append(&mut item.waiters);
                    existing.failures = existing.failures.max(item.failures);
                }
                None => self.pending.push(item),
            }
        }
    }
}

fn resolve(waiters: Vec<Waiter>, result: Result<(), BatchError>) {
    for waiter in waiters {
        let _ = waiter.send(result.clone());
    }
}
