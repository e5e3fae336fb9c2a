/// Item and product record definitions
///
/// An [`ItemRef`] is what the listing yields; a [`ProductRecord`] is what a
/// crawl ultimately emits for it.
use serde::Serialize;
use std::fmt;

/// A listed item awaiting enrichment
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ItemRef {
    /// Item identifier, unique within one crawl
    pub sku: String,

    /// Listing page the item was first seen on (1-based)
    pub source_page: u32,
}

impl ItemRef {
    pub fn new(sku: impl Into<String>, source_page: u32) -> Self {
        Self {
            sku: sku.into(),
            source_page,
        }
    }
}

/// Detail page variant a record's fields came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionSource {
    /// Desktop detail page
    Pc,
    /// Mobile detail page
    Mobile,
}

impl fmt::Display for ExtractionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pc => write!(f, "pc"),
            Self::Mobile => write!(f, "mobile"),
        }
    }
}

/// How fully a record's fields could be resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Completeness {
    /// A model was found
    Complete,
    /// A brand was found but no variant carried a model
    PartialMissingModel,
    /// Nothing usable was found; see [`ProductRecord::rejection`]
    Rejected,
}

/// Why a record was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    /// Pages were fetched but none named a brand (removed or non-product listing)
    NoBrand,
    /// Every variant failed to fetch or parse
    FetchFailed,
    /// Fetches were abandoned because the crawl was stopped
    Cancelled,
}

/// Diagnostic attached to a rejected record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub kind: RejectionKind,
    pub reason: String,
}

/// A resolved product, emitted at most once per sku
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductRecord {
    pub sku: String,
    pub title: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub store: Option<String>,
    pub source_url: String,
    pub extraction_source: ExtractionSource,
    pub completeness: Completeness,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection: Option<Rejection>,
}

impl ProductRecord {
    /// Returns true if the record carries a model
    pub fn is_complete(&self) -> bool {
        self.completeness == Completeness::Complete
    }

    /// Returns true if the record was rejected for the given reason
    pub fn is_rejected_for(&self, kind: RejectionKind) -> bool {
        self.rejection.as_ref().map(|r| r.kind) == Some(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(kind: RejectionKind) -> ProductRecord {
        ProductRecord {
            sku: "100".to_string(),
            title: None,
            brand: None,
            model: None,
            store: None,
            source_url: "https://item.example.com/100.html".to_string(),
            extraction_source: ExtractionSource::Pc,
            completeness: Completeness::Rejected,
            rejection: Some(Rejection {
                kind,
                reason: "test".to_string(),
            }),
        }
    }

    #[test]
    fn test_rejection_kind_lookup() {
        let record = rejected(RejectionKind::FetchFailed);
        assert!(record.is_rejected_for(RejectionKind::FetchFailed));
        assert!(!record.is_rejected_for(RejectionKind::NoBrand));
        assert!(!record.is_complete());
    }

    #[test]
    fn test_record_serializes_to_json() {
        let json = serde_json::to_value(rejected(RejectionKind::NoBrand)).unwrap();
        assert_eq!(json["extraction_source"], "pc");
        assert_eq!(json["completeness"], "rejected");
        assert_eq!(json["rejection"]["kind"], "no_brand");
    }

    #[test]
    fn test_extraction_source_display() {
        assert_eq!(ExtractionSource::Pc.to_string(), "pc");
        assert_eq!(ExtractionSource::Mobile.to_string(), "mobile");
    }
}
