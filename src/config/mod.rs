//! Configuration module for Shelf-Scout
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files, and turning them into the immutable [`SearchConfig`] a crawl runs on.
//!
//! # Example
//!
//! ```no_run
//! use shelf_scout::config::{load_config, SearchConfig};
//! use std::path::Path;
//!
//! let config = load_config(Path::new("scout.toml")).unwrap();
//! let search = SearchConfig::from_config(&config);
//! println!("Crawling up to {} pages for {}", search.max_pages, search.keyword);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    CategoryEntry, Config, EndpointConfig, HeaderTemplate, IdentityConfig, NetworkConfig,
    RotationPolicy, SearchConfig, SearchTargetConfig, SKU_PLACEHOLDER,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
