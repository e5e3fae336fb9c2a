use crate::state::record::{Completeness, ProductRecord, RejectionKind};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live crawl counters
///
/// Written only by the orchestrator loop; any number of observers may call
/// [`CrawlProgress::snapshot`] concurrently without blocking it. Every counter
/// is monotonically non-decreasing.
#[derive(Debug)]
pub struct CrawlProgress {
    pages_fetched: AtomicU64,
    items_seen: AtomicU64,
    items_complete: AtomicU64,
    items_partial: AtomicU64,
    items_rejected: AtomicU64,
    items_failed: AtomicU64,
    items_dropped: AtomicU64,
    duplicates_skipped: AtomicU64,
    started_at: DateTime<Utc>,
}

/// Point-in-time copy of [`CrawlProgress`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub pages_fetched: u64,
    pub items_seen: u64,
    pub items_complete: u64,
    pub items_partial: u64,
    pub items_rejected: u64,
    pub items_failed: u64,
    pub items_dropped: u64,
    pub duplicates_skipped: u64,
    pub started_at: DateTime<Utc>,
}

impl CrawlProgress {
    pub fn new() -> Self {
        Self {
            pages_fetched: AtomicU64::new(0),
            items_seen: AtomicU64::new(0),
            items_complete: AtomicU64::new(0),
            items_partial: AtomicU64::new(0),
            items_rejected: AtomicU64::new(0),
            items_failed: AtomicU64::new(0),
            items_dropped: AtomicU64::new(0),
            duplicates_skipped: AtomicU64::new(0),
            started_at: Utc::now(),
        }
    }

    pub(crate) fn record_page(&self) {
        self.pages_fetched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_item_seen(&self) {
        self.items_seen.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_duplicates(&self, count: u64) {
        self.duplicates_skipped.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn record_drop(&self) {
        self.items_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts an emitted record under its outcome
    pub(crate) fn record_outcome(&self, record: &ProductRecord) {
        let counter = match record.completeness {
            Completeness::Complete => &self.items_complete,
            Completeness::PartialMissingModel => &self.items_partial,
            Completeness::Rejected if record.is_rejected_for(RejectionKind::NoBrand) => {
                &self.items_rejected
            }
            Completeness::Rejected => &self.items_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            pages_fetched: self.pages_fetched.load(Ordering::Relaxed),
            items_seen: self.items_seen.load(Ordering::Relaxed),
            items_complete: self.items_complete.load(Ordering::Relaxed),
            items_partial: self.items_partial.load(Ordering::Relaxed),
            items_rejected: self.items_rejected.load(Ordering::Relaxed),
            items_failed: self.items_failed.load(Ordering::Relaxed),
            items_dropped: self.items_dropped.load(Ordering::Relaxed),
            duplicates_skipped: self.duplicates_skipped.load(Ordering::Relaxed),
            started_at: self.started_at,
        }
    }
}

impl Default for CrawlProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSnapshot {
    /// Number of seen items that reached a final outcome
    pub fn resolved(&self) -> u64 {
        self.items_complete
            + self.items_partial
            + self.items_rejected
            + self.items_failed
            + self.items_dropped
    }

    /// Returns true once every seen item has been accounted for
    pub fn is_reconciled(&self) -> bool {
        self.resolved() == self.items_seen
    }

    /// Seconds since the crawl started
    pub fn elapsed_secs(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::record::{ExtractionSource, Rejection};

    fn record(completeness: Completeness, rejection: Option<RejectionKind>) -> ProductRecord {
        ProductRecord {
            sku: "1".to_string(),
            title: None,
            brand: None,
            model: None,
            store: None,
            source_url: String::new(),
            extraction_source: ExtractionSource::Pc,
            completeness,
            rejection: rejection.map(|kind| Rejection {
                kind,
                reason: String::new(),
            }),
        }
    }

    #[test]
    fn test_new_progress_is_empty_and_reconciled() {
        let snapshot = CrawlProgress::new().snapshot();
        assert_eq!(snapshot.items_seen, 0);
        assert!(snapshot.is_reconciled());
    }

    #[test]
    fn test_outcomes_land_in_their_counters() {
        let progress = CrawlProgress::new();
        for _ in 0..5 {
            progress.record_item_seen();
        }

        progress.record_outcome(&record(Completeness::Complete, None));
        progress.record_outcome(&record(Completeness::PartialMissingModel, None));
        progress.record_outcome(&record(Completeness::Rejected, Some(RejectionKind::NoBrand)));
        progress.record_outcome(&record(
            Completeness::Rejected,
            Some(RejectionKind::FetchFailed),
        ));

        let partial = progress.snapshot();
        assert!(!partial.is_reconciled());

        progress.record_drop();
        let snapshot = progress.snapshot();
        assert_eq!(snapshot.items_complete, 1);
        assert_eq!(snapshot.items_partial, 1);
        assert_eq!(snapshot.items_rejected, 1);
        assert_eq!(snapshot.items_failed, 1);
        assert_eq!(snapshot.items_dropped, 1);
        assert!(snapshot.is_reconciled());
    }

    #[test]
    fn test_snapshot_is_readable_from_other_threads() {
        let progress = std::sync::Arc::new(CrawlProgress::new());
        progress.record_page();

        let reader = std::sync::Arc::clone(&progress);
        let pages = std::thread::spawn(move || reader.snapshot().pages_fetched)
            .join()
            .unwrap();
        assert_eq!(pages, 1);
    }
}
