//! Listing pagination
//!
//! Walks the search listing one page at a time, strictly in order, and turns
//! each page into [`ItemRef`]s. The walk ends on an empty page, on a short
//! page (when short-circuiting), at the page budget, or on a failed fetch.

use crate::config::SearchConfig;
use crate::crawler::fetcher::{FetchError, PageFetcher, RequestSpec};
use crate::crawler::parser::parse_listing;
use crate::state::ItemRef;
use futures::stream::{self, Stream};
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

/// Why the listing walk ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StopReason {
    /// A page came back with no items
    Exhausted,
    /// A page came back shorter than the page size
    ShortPage,
    /// The configured number of pages was walked
    PageBudget,
    /// The crawl was stopped by the caller
    Cancelled,
    /// A listing page could not be fetched
    ListingFailed { page: u32, reason: String },
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted => write!(f, "listing exhausted"),
            Self::ShortPage => write!(f, "short listing page"),
            Self::PageBudget => write!(f, "page budget reached"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::ListingFailed { page, reason } => {
                write!(f, "listing page {} failed: {}", page, reason)
            }
        }
    }
}

/// One fetched listing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingPage {
    /// 1-based page number
    pub page: u32,
    /// Items not seen on an earlier page, in listing order
    pub items: Vec<ItemRef>,
    /// Identifiers found on the page, including ones seen on earlier pages
    pub raw_count: usize,
    /// Identifiers already yielded by an earlier page
    pub duplicates: usize,
}

/// Builds the listing request for a page
///
/// The endpoint serves half-pages, so page `p` is requested as `page=2p-1`
/// with `s` pointing at its first item.
pub fn listing_request(config: &SearchConfig, page: u32) -> RequestSpec {
    let page = page.max(1);
    let start = u64::from(page - 1) * u64::from(config.page_size) + 1;

    RequestSpec::get(config.endpoints.listing_url.clone())
        .with_query("keyword", config.keyword.clone())
        .with_query("enc", "utf-8")
        .with_query("page", (2 * u64::from(page) - 1).to_string())
        .with_query("s", start.to_string())
        .with_query("scrolling", "y")
}

/// Lazily walks the listing pages of one search
pub struct ListingPaginator {
    fetcher: Arc<PageFetcher>,
    config: SearchConfig,
    next_page: u32,
    seen: HashSet<String>,
    stop: Option<StopReason>,
}

impl ListingPaginator {
    pub fn new(fetcher: Arc<PageFetcher>, config: &SearchConfig) -> Self {
        Self {
            fetcher,
            config: config.clone(),
            next_page: 1,
            seen: HashSet::new(),
            stop: None,
        }
    }

    /// Page number the next call to [`next_page`](Self::next_page) will fetch
    pub fn current_page(&self) -> u32 {
        self.next_page
    }

    /// Why the walk ended, once it has
    pub fn stop_reason(&self) -> Option<&StopReason> {
        self.stop.as_ref()
    }

    /// Fetches the next listing page
    ///
    /// # Returns
    ///
    /// * `Ok(Some(page))` - The next page (possibly empty, which ends the walk)
    /// * `Ok(None)` - The walk has ended; see [`stop_reason`](Self::stop_reason)
    /// * `Err(FetchError)` - The page could not be fetched; the walk ends
    pub async fn next_page(&mut self) -> Result<Option<ListingPage>, FetchError> {
        if self.stop.is_some() {
            return Ok(None);
        }
        if self.next_page > self.config.max_pages {
            self.stop = Some(StopReason::PageBudget);
            return Ok(None);
        }

        let page = self.next_page;
        let request = listing_request(&self.config, page);
        tracing::debug!("Fetching listing page {}: {}", page, request);

        let payload = match self.fetcher.fetch(&request).await {
            Ok(payload) => payload,
            Err(e) => {
                self.stop = Some(if e.is_cancelled() {
                    StopReason::Cancelled
                } else {
                    StopReason::ListingFailed {
                        page,
                        reason: e.to_string(),
                    }
                });
                return Err(e);
            }
        };
        self.next_page += 1;

        let skus = parse_listing(&payload.body);
        let raw_count = skus.len();

        let mut items = Vec::with_capacity(raw_count);
        for sku in skus {
            if self.seen.insert(sku.clone()) {
                items.push(ItemRef::new(sku, page));
            }
        }
        let duplicates = raw_count - items.len();

        if raw_count == 0 {
            self.stop = Some(StopReason::Exhausted);
        } else if self.config.short_circuit && raw_count < self.config.page_size as usize {
            self.stop = Some(StopReason::ShortPage);
        } else if page >= self.config.max_pages {
            self.stop = Some(StopReason::PageBudget);
        }

        if let Some(reason) = &self.stop {
            tracing::debug!("Listing ends after page {}: {}", page, reason);
        }

        Ok(Some(ListingPage {
            page,
            items,
            raw_count,
            duplicates,
        }))
    }

    /// Flattens the remaining pages into a stream of items
    ///
    /// A fetch failure is yielded once, after which the stream ends.
    pub fn into_stream(self) -> impl Stream<Item = Result<ItemRef, FetchError>> {
        stream::unfold(
            (self, VecDeque::new()),
            |(mut pager, mut buffer)| async move {
                loop {
                    if let Some(item) = buffer.pop_front() {
                        return Some((Ok(item), (pager, buffer)));
                    }
                    match pager.next_page().await {
                        Ok(Some(page)) => buffer.extend(page.items),
                        Ok(None) => return None,
                        Err(e) => return Some((Err(e), (pager, buffer))),
                    }
                }
            },
        )
    }
}
