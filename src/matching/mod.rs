//! Model normalization and known-set comparison
//!
//! This module turns crawled records into a per-category list of models that
//! are not yet on record:
//! - Normalizing scraped models so cosmetic differences do not matter
//! - Mapping brands onto configured categories
//! - Diffing the crawl against a known-set file

mod category;
mod normalize;

pub use category::{CategoryMapper, KnownSet};
pub use normalize::{is_valid_model, normalize_model};

use crate::state::ProductRecord;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

/// Known-set loading errors
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("Failed to read known-set {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse known-set: {0}")]
    Parse(toml::de::Error),
}

/// A crawled model absent from the known-set
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingModel {
    /// Normalized model
    pub model: String,
    /// Detail page the model was read from
    pub url: String,
}

/// Collects crawled models that the known-set does not list
///
/// Records without a brand or model, with a brand that maps to no category,
/// or with a model that fails [`is_valid_model`] are skipped. Each category's
/// models are de-duplicated on their normalized form (the first record keeps
/// its URL) and sorted.
///
/// # Arguments
///
/// * `records` - Records emitted by a crawl
/// * `mapper` - Brand to category mapping
/// * `known` - Models already on record
pub fn find_missing(
    records: &[ProductRecord],
    mapper: &CategoryMapper,
    known: &KnownSet,
) -> BTreeMap<String, Vec<MissingModel>> {
    let mut missing: BTreeMap<String, Vec<MissingModel>> = BTreeMap::new();
    let mut seen: HashSet<(String, String)> = HashSet::new();

    for record in records {
        let (Some(brand), Some(model)) = (&record.brand, &record.model) else {
            continue;
        };
        let Some(category) = mapper.category_for(brand) else {
            tracing::trace!("No category for brand {} (sku {})", brand, record.sku);
            continue;
        };
        if !is_valid_model(model, mapper.prefixes(category)) {
            tracing::trace!("Skipping invalid model {:?} (sku {})", model, record.sku);
            continue;
        }

        let normalized = normalize_model(model);
        if known.contains(category, &normalized) {
            continue;
        }
        if !seen.insert((category.to_string(), normalized.clone())) {
            continue;
        }

        missing
            .entry(category.to_string())
            .or_default()
            .push(MissingModel {
                model: normalized,
                url: record.source_url.clone(),
            });
    }

    for models in missing.values_mut() {
        models.sort_by(|a, b| a.model.cmp(&b.model));
    }
    missing
}
