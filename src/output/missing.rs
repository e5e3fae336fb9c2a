//! Missing-model report

use crate::matching::MissingModel;
use std::collections::BTreeMap;
use std::io::{self, Write};

/// Writes the models absent from the known-set, grouped by category
pub fn write_missing_report<W: Write>(
    out: &mut W,
    missing: &BTreeMap<String, Vec<MissingModel>>,
) -> io::Result<()> {
    writeln!(out, "=== Models Not On Record ===\n")?;

    if missing.is_empty() {
        return writeln!(out, "Every crawled model is already on record.");
    }

    for (category, models) in missing {
        writeln!(out, "{} ({}):", category, models.len())?;
        for entry in models {
            writeln!(out, "  - {}  {}", entry.model, entry.url)?;
        }
        writeln!(out)?;
    }

    let total: usize = missing.values().map(Vec::len).sum();
    writeln!(out, "Total: {} models in {} categories", total, missing.len())
}

/// Prints the missing-model report to stderr
pub fn print_missing_report(missing: &BTreeMap<String, Vec<MissingModel>>) {
    let stderr = io::stderr();
    if let Err(e) = write_missing_report(&mut stderr.lock(), missing) {
        tracing::warn!("Failed to print missing-model report: {}", e);
    }
}
