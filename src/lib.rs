//! Shelf-Scout: A polite product listing crawler
//!
//! This crate discovers product records from a paginated search endpoint,
//! enriches every listed item by fetching its desktop and mobile detail pages
//! concurrently, and streams the resulting records to the caller while
//! honouring rate limits, retry budgets and proxy rotation.

pub mod config;
pub mod crawler;
pub mod matching;
pub mod output;
pub mod state;

use thiserror::Error;

/// Main error type for Shelf-Scout operations
#[derive(Debug, Error)]
pub enum ScoutError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Listing endpoint unreachable at page {page}: {source}")]
    ListingUnreachable {
        page: u32,
        #[source]
        source: crawler::FetchError,
    },

    #[error("Fetch error: {0}")]
    Fetch(#[from] crawler::FetchError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Known-set error: {0}")]
    Match(#[from] matching::MatchError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Crawl task failed: {0}")]
    Task(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Shelf-Scout operations
pub type Result<T> = std::result::Result<T, ScoutError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::{Config, SearchConfig};
pub use crawler::{CrawlHandle, Orchestrator, RecordStream};
pub use state::{Completeness, CrawlProgress, ExtractionSource, ItemRef, ProductRecord};
