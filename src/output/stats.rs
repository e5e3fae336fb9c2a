//! Crawl statistics display
//!
//! Renders a [`ProgressSnapshot`] and the listing's stop reason as a
//! human-readable summary. Summaries go to stderr so stdout stays free for
//! records.

use crate::crawler::StopReason;
use crate::state::ProgressSnapshot;
use std::io::{self, Write};

/// Writes the crawl summary to `out`
///
/// # Arguments
///
/// * `out` - Destination writer
/// * `snapshot` - Final progress counters
/// * `stop_reason` - Why the listing walk ended
pub fn write_statistics<W: Write>(
    out: &mut W,
    snapshot: &ProgressSnapshot,
    stop_reason: &StopReason,
) -> io::Result<()> {
    writeln!(out, "=== Crawl Statistics ===\n")?;

    writeln!(out, "Overview:")?;
    writeln!(out, "  Listing pages fetched: {}", snapshot.pages_fetched)?;
    writeln!(out, "  Items seen: {}", snapshot.items_seen)?;
    writeln!(out, "  Duplicates skipped: {}", snapshot.duplicates_skipped)?;
    writeln!(out, "  Stopped: {}", stop_reason)?;
    writeln!(out, "  Elapsed: {}s", snapshot.elapsed_secs())?;
    writeln!(out)?;

    writeln!(out, "Items by Outcome:")?;
    let outcomes = [
        ("Complete", snapshot.items_complete),
        ("Missing model", snapshot.items_partial),
        ("No brand", snapshot.items_rejected),
        ("Failed", snapshot.items_failed),
        ("Dropped", snapshot.items_dropped),
    ];
    for (label, count) in outcomes {
        if count == 0 {
            continue;
        }
        writeln!(
            out,
            "  {}: {} ({:.1}%)",
            label,
            count,
            percentage(count, snapshot.items_seen)
        )?;
    }
    writeln!(out)?;

    if !snapshot.is_reconciled() {
        writeln!(
            out,
            "Warning: {} of {} items unaccounted for",
            snapshot.items_seen.saturating_sub(snapshot.resolved()),
            snapshot.items_seen
        )?;
    }

    writeln!(
        out,
        "Success Rate: {:.1}% ({} / {} items with a model)",
        percentage(snapshot.items_complete, snapshot.items_seen),
        snapshot.items_complete,
        snapshot.items_seen
    )
}

/// Prints the crawl summary to stderr
pub fn print_statistics(snapshot: &ProgressSnapshot, stop_reason: &StopReason) {
    let stderr = io::stderr();
    if let Err(e) = write_statistics(&mut stderr.lock(), snapshot, stop_reason) {
        tracing::warn!("Failed to print statistics: {}", e);
    }
}

fn percentage(count: u64, total: u64) -> f64 {
    if total > 0 {
        (count as f64 / total as f64) * 100.0
    } else {
        0.0
    }
}
