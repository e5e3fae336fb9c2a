//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the main crawl loop that coordinates one crawl from
//! the first listing page to the final report:
//! - A pagination task feeds listing pages into a bounded channel
//! - The main loop buffers each page and dispatches its items to at most
//!   `concurrency` workers
//! - Finished records are forwarded to the caller's [`RecordStream`]
//! - Progress counters are written here and nowhere else
//!
//! Cancellation stops dispatch immediately. Items still buffered are dropped,
//! in-flight workers get a grace period and are then aborted.

use crate::config::SearchConfig;
use crate::crawler::extractor::DetailExtractor;
use crate::crawler::fetcher::{FetchError, PageFetcher, ReqwestTransport, Transport};
use crate::crawler::paginator::{ListingPaginator, StopReason};
use crate::state::{CrawlProgress, ItemRef, ProductRecord, ProgressSnapshot, RejectionKind};
use crate::ScoutError;
use futures::Stream;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio::task::{Id, JoinError, JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Log a progress line every this many resolved items
const PROGRESS_LOG_INTERVAL: u64 = 25;

/// Messages from the pagination task to the main loop
enum ListingEvent {
    Page {
        page: u32,
        items: Vec<ItemRef>,
        duplicates: usize,
    },
    Finished(StopReason),
    Failed {
        page: u32,
        error: FetchError,
    },
}

enum WorkerOutcome {
    Resolved(ProductRecord),
    /// The crawl was stopped before the worker started
    Skipped(ItemRef),
}

/// Controls a running crawl from outside the record stream
#[derive(Debug, Clone)]
pub struct CrawlHandle {
    cancel: CancellationToken,
    progress: Arc<CrawlProgress>,
}

impl CrawlHandle {
    /// Requests a cooperative stop
    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() {
            tracing::info!("Stop requested");
        }
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Current counters; never blocks the crawl
    pub fn progress(&self) -> ProgressSnapshot {
        self.progress.snapshot()
    }
}

/// Final accounting of a crawl
#[derive(Debug, Clone, Serialize)]
pub struct CrawlReport {
    pub progress: ProgressSnapshot,
    pub stop_reason: StopReason,
}

/// Records of a running crawl, in completion order
///
/// Yields `Ok(record)` once per listed item that reached an outcome. If the
/// first listing page cannot be fetched, the last item is
/// `Err(ScoutError::ListingUnreachable)`.
pub struct RecordStream {
    records: mpsc::Receiver<Result<ProductRecord, ScoutError>>,
    driver: JoinHandle<CrawlReport>,
    handle: CrawlHandle,
}

impl RecordStream {
    pub fn handle(&self) -> CrawlHandle {
        self.handle.clone()
    }

    /// Waits for the crawl to wind down and returns its report
    ///
    /// Records not yet received are discarded. A crawl that is still running
    /// is stopped as if cancelled.
    pub async fn finish(self) -> Result<CrawlReport, ScoutError> {
        let RecordStream {
            records,
            driver,
            handle,
        } = self;
        handle.cancel();
        drop(records);
        driver.await.map_err(|e| ScoutError::Task(e.to_string()))
    }
}

impl Stream for RecordStream {
    type Item = Result<ProductRecord, ScoutError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.records.poll_recv(cx)
    }
}

/// Entry point for one crawl
pub struct Orchestrator {
    config: SearchConfig,
    transport: Arc<dyn Transport>,
    cancel: CancellationToken,
    progress: Arc<CrawlProgress>,
}

impl Orchestrator {
    /// Creates an orchestrator over any transport
    pub fn new(config: SearchConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            cancel: CancellationToken::new(),
            progress: Arc::new(CrawlProgress::new()),
        }
    }

    /// Creates an orchestrator using real HTTP clients
    ///
    /// # Returns
    ///
    /// * `Ok(Orchestrator)` - Clients for every proxy were built
    /// * `Err(ScoutError)` - A proxy descriptor or the TLS backend was rejected
    pub fn with_reqwest(config: SearchConfig) -> Result<Self, ScoutError> {
        let transport = ReqwestTransport::new(&config)?;
        Ok(Self::new(config, Arc::new(transport)))
    }

    pub fn handle(&self) -> CrawlHandle {
        CrawlHandle {
            cancel: self.cancel.clone(),
            progress: Arc::clone(&self.progress),
        }
    }

    /// Starts the crawl in the background
    ///
    /// Must be called from within a Tokio runtime.
    pub fn run(self) -> RecordStream {
        let handle = self.handle();
        let (records_tx, records_rx) = mpsc::channel(self.config.concurrency.max(1) * 2);
        let driver = tokio::spawn(CrawlDriver::new(self, records_tx).run());

        RecordStream {
            records: records_rx,
            driver,
            handle,
        }
    }
}

/// State owned by the main loop
struct CrawlDriver {
    config: SearchConfig,
    cancel: CancellationToken,
    progress: Arc<CrawlProgress>,
    fetcher: Arc<PageFetcher>,
    extractor: Arc<DetailExtractor>,
    records: mpsc::Sender<Result<ProductRecord, ScoutError>>,
    pending: VecDeque<ItemRef>,
    workers: JoinSet<WorkerOutcome>,
    in_flight: HashMap<Id, String>,
    consumer_gone: bool,
    /// Progress interval last logged
    logged_interval: u64,
}

impl CrawlDriver {
    fn new(
        orchestrator: Orchestrator,
        records: mpsc::Sender<Result<ProductRecord, ScoutError>>,
    ) -> Self {
        let Orchestrator {
            config,
            transport,
            cancel,
            progress,
        } = orchestrator;

        let fetcher = Arc::new(PageFetcher::new(&config, transport, cancel.clone()));
        let extractor = Arc::new(DetailExtractor::new(
            Arc::clone(&fetcher),
            config.endpoints.clone(),
        ));

        Self {
            config,
            cancel,
            progress,
            fetcher,
            extractor,
            records,
            pending: VecDeque::new(),
            workers: JoinSet::new(),
            in_flight: HashMap::new(),
            consumer_gone: false,
            logged_interval: 0,
        }
    }

    /// Runs the main crawl loop
    ///
    /// This is the core logic that:
    /// 1. Receives listing pages once the previous page is fully dispatched
    /// 2. Dispatches buffered items while fewer than `concurrency` workers are busy
    /// 3. Settles finished workers and forwards their records
    /// 4. Winds down on cancellation
    async fn run(mut self) -> CrawlReport {
        tracing::info!(
            "Starting crawl for '{}': up to {} page(s) of {}, {} worker(s)",
            self.config.keyword,
            self.config.max_pages,
            self.config.page_size,
            self.config.concurrency
        );

        let (events_tx, mut events) = mpsc::channel(1);
        let pager = ListingPaginator::new(Arc::clone(&self.fetcher), &self.config);
        let listing = tokio::spawn(paginate(pager, events_tx));

        let mut listing_open = true;
        let mut stop_reason = None;
        let mut terminal_error = None;

        let cancelled = loop {
            if !self.cancel.is_cancelled() {
                self.fill();
            }
            if !listing_open && self.workers.is_empty() && self.pending.is_empty() {
                break false;
            }

            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break true,

                Some(joined) = self.workers.join_next_with_id(), if !self.workers.is_empty() => {
                    self.settle(joined).await;
                }

                event = events.recv(), if listing_open && self.pending.is_empty() => {
                    match event {
                        Some(ListingEvent::Page { page, items, duplicates }) => {
                            tracing::info!(
                                "Listing page {}: {} new item(s), {} duplicate(s)",
                                page,
                                items.len(),
                                duplicates
                            );
                            self.accept_page(items, duplicates);
                        }
                        Some(ListingEvent::Finished(reason)) => {
                            listing_open = false;
                            tracing::info!("Listing complete: {}", reason);
                            stop_reason = Some(reason);
                        }
                        Some(ListingEvent::Failed { page, error }) => {
                            listing_open = false;
                            if error.is_cancelled() {
                                stop_reason = Some(StopReason::Cancelled);
                            } else {
                                tracing::warn!("Listing page {} failed, no further pages: {}", page, error);
                                stop_reason = Some(StopReason::ListingFailed {
                                    page,
                                    reason: error.to_string(),
                                });
                                if page == 1 {
                                    terminal_error = Some(ScoutError::ListingUnreachable {
                                        page,
                                        source: error,
                                    });
                                }
                            }
                        }
                        None => {
                            listing_open = false;
                            if stop_reason.is_none() {
                                stop_reason = Some(StopReason::ListingFailed {
                                    page: 0,
                                    reason: "listing task ended unexpectedly".to_string(),
                                });
                            }
                        }
                    }
                }
            }
        };

        if cancelled {
            stop_reason = Some(StopReason::Cancelled);
            self.wind_down(&mut events).await;
            listing.abort();
        }
        let _ = listing.await;

        if let Some(error) = terminal_error {
            if !self.consumer_gone {
                let _ = self.records.send(Err(error)).await;
            }
        }

        let progress = self.progress.snapshot();
        let stop_reason = stop_reason.unwrap_or(StopReason::Exhausted);
        if !progress.is_reconciled() {
            tracing::warn!(
                "Item accounting is off: {} seen, {} resolved",
                progress.items_seen,
                progress.resolved()
            );
        }
        tracing::info!(
            "Crawl finished ({}): {} complete, {} partial, {} rejected, {} failed, {} dropped",
            stop_reason,
            progress.items_complete,
            progress.items_partial,
            progress.items_rejected,
            progress.items_failed,
            progress.items_dropped
        );

        CrawlReport {
            progress,
            stop_reason,
        }
    }

    /// Counts a listing page and buffers its items for dispatch
    fn accept_page(&mut self, items: Vec<ItemRef>, duplicates: usize) {
        self.progress.record_page();
        self.progress.record_duplicates(duplicates as u64);
        for item in items {
            self.progress.record_item_seen();
            self.pending.push_back(item);
        }
    }

    /// Starts workers for buffered items up to the concurrency limit
    fn fill(&mut self) {
        while self.workers.len() < self.config.concurrency {
            match self.pending.pop_front() {
                Some(item) => self.dispatch(item),
                None => break,
            }
        }
    }

    /// Hands one item to a new worker
    fn dispatch(&mut self, item: ItemRef) {
        let extractor = Arc::clone(&self.extractor);
        let cancel = self.cancel.clone();
        let sku = item.sku.clone();

        let handle = self.workers.spawn(async move {
            if cancel.is_cancelled() {
                return WorkerOutcome::Skipped(item);
            }
            WorkerOutcome::Resolved(extractor.extract(&item).await)
        });
        self.in_flight.insert(handle.id(), sku);
    }

    /// Accounts for one finished worker
    async fn settle(&mut self, joined: Result<(Id, WorkerOutcome), JoinError>) {
        match joined {
            Ok((id, WorkerOutcome::Resolved(record))) => {
                self.in_flight.remove(&id);
                if record.is_rejected_for(RejectionKind::Cancelled) {
                    self.drop_item(&record.sku, "stopped while fetching");
                } else {
                    self.progress.record_outcome(&record);
                    self.emit(record).await;
                }
            }
            Ok((id, WorkerOutcome::Skipped(item))) => {
                self.in_flight.remove(&id);
                self.drop_item(&item.sku, "stopped before start");
            }
            Err(e) => {
                let sku = self
                    .in_flight
                    .remove(&e.id())
                    .unwrap_or_else(|| "<unknown>".to_string());
                if e.is_cancelled() {
                    self.drop_item(&sku, "aborted after drain grace");
                } else {
                    tracing::warn!("Worker for {} panicked: {}", sku, e);
                    self.drop_item(&sku, "worker panicked");
                }
            }
        }
    }

    fn drop_item(&self, sku: &str, reason: &str) {
        self.progress.record_drop();
        tracing::info!("Dropped {}: {}", sku, reason);
    }

    async fn emit(&mut self, record: ProductRecord) {
        let snapshot = self.progress.snapshot();
        if crossed_interval(&mut self.logged_interval, snapshot.resolved()) {
            tracing::info!(
                "Progress: {} of {} item(s) resolved, {} page(s) fetched",
                snapshot.resolved(),
                snapshot.items_seen,
                snapshot.pages_fetched
            );
        }

        if self.consumer_gone {
            return;
        }
        if self.records.send(Ok(record)).await.is_err() {
            tracing::warn!("Record consumer went away, stopping crawl");
            self.consumer_gone = true;
            self.cancel.cancel();
        }
    }

    /// Drops undispatched items and drains in-flight workers
    async fn wind_down(&mut self, events: &mut mpsc::Receiver<ListingEvent>) {
        events.close();
        while let Some(event) = events.recv().await {
            if let ListingEvent::Page {
                items, duplicates, ..
            } = event
            {
                self.accept_page(items, duplicates);
            }
        }
        while let Some(item) = self.pending.pop_front() {
            self.drop_item(&item.sku, "stopped before dispatch");
        }

        let grace = self.config.request_timeout + self.config.min_interval + self.config.jitter;
        let deadline = Instant::now() + grace;
        if !self.workers.is_empty() {
            tracing::info!(
                "Waiting up to {:?} for {} in-flight item(s)",
                grace,
                self.workers.len()
            );
        }

        while !self.workers.is_empty() {
            match tokio::time::timeout_at(deadline, self.workers.join_next_with_id()).await {
                Ok(Some(joined)) => self.settle(joined).await,
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        "Aborting {} in-flight item(s) after drain grace",
                        self.workers.len()
                    );
                    self.workers.abort_all();
                    while let Some(joined) = self.workers.join_next_with_id().await {
                        self.settle(joined).await;
                    }
                }
            }
        }
    }
}

/// Whether `resolved` reached a progress interval not yet logged
///
/// Drops are counted without an emit, so `resolved` can step over a
/// multiple of the interval between two calls.
fn crossed_interval(logged: &mut u64, resolved: u64) -> bool {
    let interval = resolved / PROGRESS_LOG_INTERVAL;
    if interval > *logged {
        *logged = interval;
        true
    } else {
        false
    }
}

/// Walks the listing and forwards each page to the main loop
async fn paginate(mut pager: ListingPaginator, events: mpsc::Sender<ListingEvent>) {
    loop {
        let page_number = pager.current_page();
        let last = match pager.next_page().await {
            Ok(Some(page)) => {
                let event = ListingEvent::Page {
                    page: page.page,
                    items: page.items,
                    duplicates: page.duplicates,
                };
                if events.send(event).await.is_err() {
                    return;
                }
                continue;
            }
            Ok(None) => ListingEvent::Finished(
                pager
                    .stop_reason()
                    .cloned()
                    .unwrap_or(StopReason::PageBudget),
            ),
            Err(error) => ListingEvent::Failed {
                page: page_number,
                error,
            },
        };

        let _ = events.send(last).await;
        return;
    }
}
