//! Detail page extraction
//!
//! Every item is looked up through an ordered list of strategies, one per
//! detail page variant. All variants are fetched concurrently, each with its
//! own retry budget, and the results are resolved in strategy order.

use crate::config::EndpointConfig;
use crate::crawler::fetcher::{FetchError, PageFetcher, RequestSpec};
use crate::crawler::parser::{parse_mobile_detail, parse_pc_detail, ExtractError, ExtractedFields};
use crate::state::{Completeness, ExtractionSource, ItemRef, ProductRecord, Rejection, RejectionKind};
use futures::future::join_all;
use std::sync::Arc;

/// One detail page variant: where it lives and how to read it
pub trait ExtractionStrategy: Send + Sync {
    fn source(&self) -> ExtractionSource;

    fn request(&self, sku: &str, endpoints: &EndpointConfig) -> RequestSpec;

    fn parse(&self, body: &str) -> Result<ExtractedFields, ExtractError>;
}

/// Desktop detail page
pub struct PcStrategy;

impl ExtractionStrategy for PcStrategy {
    fn source(&self) -> ExtractionSource {
        ExtractionSource::Pc
    }

    fn request(&self, sku: &str, endpoints: &EndpointConfig) -> RequestSpec {
        RequestSpec::get(endpoints.pc_detail(sku))
    }

    fn parse(&self, body: &str) -> Result<ExtractedFields, ExtractError> {
        parse_pc_detail(body)
    }
}

/// Mobile detail page, which often carries the model when the desktop page
/// lazy-loads it
pub struct MobileStrategy;

impl ExtractionStrategy for MobileStrategy {
    fn source(&self) -> ExtractionSource {
        ExtractionSource::Mobile
    }

    fn request(&self, sku: &str, endpoints: &EndpointConfig) -> RequestSpec {
        RequestSpec::get(endpoints.mobile_detail(sku))
    }

    fn parse(&self, body: &str) -> Result<ExtractedFields, ExtractError> {
        parse_mobile_detail(body)
    }
}

/// How one variant turned out
#[derive(Debug)]
pub(crate) struct VariantOutcome {
    source: ExtractionSource,
    url: String,
    result: Result<ExtractedFields, VariantFailure>,
}

#[derive(Debug)]
enum VariantFailure {
    Fetch(FetchError),
    Parse(ExtractError),
}

impl VariantFailure {
    fn is_cancelled(&self) -> bool {
        matches!(self, Self::Fetch(e) if e.is_cancelled())
    }
}

impl std::fmt::Display for VariantFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fetch(e) => write!(f, "{}", e),
            Self::Parse(e) => write!(f, "unparseable response: {}", e),
        }
    }
}

/// Turns an [`ItemRef`] into a [`ProductRecord`]
pub struct DetailExtractor {
    fetcher: Arc<PageFetcher>,
    strategies: Vec<Box<dyn ExtractionStrategy>>,
    endpoints: EndpointConfig,
}

impl DetailExtractor {
    /// Creates an extractor trying the desktop page first, then mobile
    pub fn new(fetcher: Arc<PageFetcher>, endpoints: EndpointConfig) -> Self {
        Self {
            fetcher,
            strategies: vec![Box::new(PcStrategy), Box::new(MobileStrategy)],
            endpoints,
        }
    }

    /// Resolves one item
    ///
    /// Never fails: fetch and parse failures are folded into a rejected
    /// record with a diagnostic reason.
    pub async fn extract(&self, item: &ItemRef) -> ProductRecord {
        let outcomes = join_all(
            self.strategies
                .iter()
                .map(|strategy| self.fetch_variant(strategy.as_ref(), &item.sku)),
        )
        .await;

        let record = resolve(&item.sku, outcomes);
        tracing::debug!(
            "Resolved {} from page {} as {:?} ({})",
            item.sku,
            item.source_page,
            record.completeness,
            record.extraction_source
        );
        record
    }

    async fn fetch_variant(&self, strategy: &dyn ExtractionStrategy, sku: &str) -> VariantOutcome {
        let request = strategy.request(sku, &self.endpoints);
        let result = match self.fetcher.fetch(&request).await {
            Ok(payload) => strategy.parse(&payload.body).map_err(VariantFailure::Parse),
            Err(e) => Err(VariantFailure::Fetch(e)),
        };

        if let Err(failure) = &result {
            if !failure.is_cancelled() {
                tracing::debug!("{} variant of {} failed: {}", strategy.source(), sku, failure);
            }
        }

        VariantOutcome {
            source: strategy.source(),
            url: request.to_string(),
            result,
        }
    }
}

/// Applies the priority rules to the variant outcomes of one sku
///
/// Outcomes must be in strategy order.
///
/// 1. The first variant with a model wins: `Complete`
/// 2. Otherwise any brand gives `PartialMissingModel`
/// 3. Pages that were read but named no brand: `Rejected` (`NoBrand`),
///    even when one of them named a model
/// 4. No page could be read: `Rejected` (`Cancelled` or `FetchFailed`)
pub(crate) fn resolve(sku: &str, outcomes: Vec<VariantOutcome>) -> ProductRecord {
    let parsed: Vec<(&VariantOutcome, &ExtractedFields)> = outcomes
        .iter()
        .filter_map(|o| o.result.as_ref().ok().map(|fields| (o, fields)))
        .collect();

    let primary = outcomes
        .first()
        .map(|o| (o.source, o.url.clone()))
        .unwrap_or((ExtractionSource::Pc, String::new()));

    let base = |source: ExtractionSource, url: String, completeness: Completeness| ProductRecord {
        sku: sku.to_string(),
        title: first_found(&parsed, |f| f.title.clone()),
        brand: first_found(&parsed, |f| f.brand.clone()),
        model: None,
        store: first_found(&parsed, |f| f.store.clone()),
        source_url: url,
        extraction_source: source,
        completeness,
        rejection: None,
    };

    let winner = parsed.iter().find(|(_, fields)| fields.model.is_some());
    let Some((chosen, _)) = winner.or(parsed.first()) else {
        return rejected_unread(base, primary, &outcomes);
    };

    let mut record = match winner {
        Some((_, fields)) => ProductRecord {
            model: fields.model.clone(),
            ..base(chosen.source, chosen.url.clone(), Completeness::Complete)
        },
        None => base(chosen.source, chosen.url.clone(), Completeness::PartialMissingModel),
    };

    // a model never outranks a missing brand
    if record.brand.is_none() {
        let sources: Vec<String> = parsed.iter().map(|(o, _)| o.source.to_string()).collect();
        record.completeness = Completeness::Rejected;
        record.rejection = Some(Rejection {
            kind: RejectionKind::NoBrand,
            reason: format!("no brand on {} page(s)", sources.join(", ")),
        });
    }
    record
}

/// Rejection for a sku none of whose variant pages could be read
fn rejected_unread(
    base: impl Fn(ExtractionSource, String, Completeness) -> ProductRecord,
    primary: (ExtractionSource, String),
    outcomes: &[VariantOutcome],
) -> ProductRecord {
    let failures: Vec<(ExtractionSource, &VariantFailure)> = outcomes
        .iter()
        .filter_map(|o| o.result.as_ref().err().map(|e| (o.source, e)))
        .collect();

    let kind = if failures.iter().any(|(_, e)| e.is_cancelled()) {
        RejectionKind::Cancelled
    } else {
        RejectionKind::FetchFailed
    };

    let reason = if failures.is_empty() {
        "no detail variants configured".to_string()
    } else {
        failures
            .iter()
            .map(|(source, e)| format!("{}: {}", source, e))
            .collect::<Vec<_>>()
            .join("; ")
    };

    let (source, url) = primary;
    ProductRecord {
        rejection: Some(Rejection { kind, reason }),
        ..base(source, url, Completeness::Rejected)
    }
}

/// First non-empty value of a field across parsed variants, in priority order
fn first_found(
    parsed: &[(&VariantOutcome, &ExtractedFields)],
    pick: impl Fn(&ExtractedFields) -> Option<String>,
) -> Option<String> {
    parsed.iter().find_map(|(_, fields)| pick(fields))
}
