//! State module for crawl data and progress
//!
//! # Components
//!
//! - `ItemRef`: An item identifier produced by the listing
//! - `ProductRecord`: The resolved, immutable result for one item
//! - `CrawlProgress`: Lock-free counters observable while a crawl runs

mod progress;
mod record;

// Re-export main types
pub use progress::{CrawlProgress, ProgressSnapshot};
pub use record::{
    Completeness, ExtractionSource, ItemRef, ProductRecord, Rejection, RejectionKind,
};
