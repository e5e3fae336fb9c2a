//! Output module for crawl summaries and reports
//!
//! This module handles:
//! - Writing crawl records as JSON lines
//! - Printing crawl statistics once a crawl ends
//! - Printing the models missing from a known-set

mod missing;
pub mod stats;

pub use missing::{print_missing_report, write_missing_report};
pub use stats::{print_statistics, write_statistics};

use crate::state::ProductRecord;
use std::io::Write;

/// Writes one record as a single JSON line
///
/// # Arguments
///
/// * `out` - Destination writer
/// * `record` - The record to serialize
///
/// # Returns
///
/// * `Ok(())` - Record written
/// * `Err(ScoutError)` - Serialization or write failed
pub fn write_record<W: Write>(out: &mut W, record: &ProductRecord) -> crate::Result<()> {
    serde_json::to_writer(&mut *out, record)?;
    writeln!(out)?;
    Ok(())
}
