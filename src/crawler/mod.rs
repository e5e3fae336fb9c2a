//! Crawler module for listing walks and detail enrichment
//!
//! This module contains the core crawling logic, including:
//! - Rate limiting, retry backoff and identity rotation
//! - HTTP fetching through a pluggable [`Transport`]
//! - Listing pagination and detail page extraction
//! - Overall crawl coordination
//!
//! # Example
//!
//! ```no_run
//! use futures::StreamExt;
//! use shelf_scout::{Orchestrator, SearchConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let orchestrator = Orchestrator::with_reqwest(SearchConfig::new("冰箱"))?;
//! let mut records = orchestrator.run();
//! while let Some(record) = records.next().await {
//!     println!("{:?}", record?);
//! }
//! let report = records.finish().await?;
//! println!("stopped: {}", report.stop_reason);
//! # Ok(())
//! # }
//! ```

mod coordinator;
mod extractor;
mod fetcher;
mod identity;
mod paginator;
mod parser;
mod rate_limiter;
mod retry;

#[cfg(test)]
mod test_support;

pub use coordinator::{CrawlHandle, CrawlReport, Orchestrator, RecordStream};
pub use extractor::{DetailExtractor, ExtractionStrategy, MobileStrategy, PcStrategy};
pub use fetcher::{
    build_http_client, AttemptOutcome, FailureKind, FetchAttempt, FetchError, PageFetcher,
    RawPayload, RequestSpec, ReqwestTransport, Transport,
};
pub use identity::{Identity, IdentityRotator};
pub use paginator::{listing_request, ListingPage, ListingPaginator, StopReason};
pub use parser::{parse_listing, parse_mobile_detail, parse_pc_detail, ExtractError, ExtractedFields};
pub use rate_limiter::RateLimiter;
pub use retry::{Disposition, RetryPolicy, RetryState};
