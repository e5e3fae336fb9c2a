use crate::config::{CategoryEntry, Config};
use crate::matching::normalize::normalize_model;
use crate::matching::MatchError;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Maps scraped brand names onto configured categories
#[derive(Debug, Clone, Default)]
pub struct CategoryMapper {
    entries: Vec<CategoryEntry>,
}

impl CategoryMapper {
    pub fn new(entries: Vec<CategoryEntry>) -> Self {
        Self { entries }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.categories.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the category whose alias appears in `brand`
    ///
    /// Matching is case-insensitive containment, so "海尔（Haier）" maps to
    /// a category listing "海尔". The first configured category wins.
    ///
    /// # Examples
    ///
    /// ```
    /// use shelf_scout::config::CategoryEntry;
    /// use shelf_scout::matching::CategoryMapper;
    ///
    /// let mapper = CategoryMapper::new(vec![CategoryEntry {
    ///     name: "BSH".to_string(),
    ///     brands: vec!["西门子".to_string(), "Bosch".to_string()],
    ///     model_prefixes: vec![],
    /// }]);
    ///
    /// assert_eq!(mapper.category_for("博世（BOSCH）"), Some("BSH"));
    /// assert_eq!(mapper.category_for("美的"), None);
    /// ```
    pub fn category_for(&self, brand: &str) -> Option<&str> {
        let brand = brand.to_lowercase();
        self.entries
            .iter()
            .find(|entry| {
                entry
                    .brands
                    .iter()
                    .map(|alias| alias.trim().to_lowercase())
                    .any(|alias| !alias.is_empty() && brand.contains(&alias))
            })
            .map(|entry| entry.name.as_str())
    }

    /// Accepted model prefixes for a category (empty accepts any model)
    pub fn prefixes(&self, category: &str) -> &[String] {
        self.entries
            .iter()
            .find(|entry| entry.name == category)
            .map(|entry| entry.model_prefixes.as_slice())
            .unwrap_or(&[])
    }
}

/// Models already on record, per category
///
/// Loaded from a TOML file with one array per category:
///
/// ```toml
/// Haier = ["BCD-470WGHTD", "BCD-501WLHTS"]
/// Midea = ["BCD-606WKPZM(E)"]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownSet {
    models: BTreeMap<String, BTreeSet<String>>,
}

impl KnownSet {
    /// Parses a known-set document
    pub fn from_toml_str(content: &str) -> Result<Self, MatchError> {
        let raw: BTreeMap<String, Vec<String>> =
            toml::from_str(content).map_err(MatchError::Parse)?;

        let models = raw
            .into_iter()
            .map(|(category, models)| {
                let normalized = models
                    .iter()
                    .map(|m| normalize_model(m))
                    .filter(|m| !m.is_empty())
                    .collect();
                (category, normalized)
            })
            .collect();

        Ok(Self { models })
    }

    /// Loads a known-set file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the TOML file
    ///
    /// # Returns
    ///
    /// * `Ok(KnownSet)` - Successfully loaded
    /// * `Err(MatchError)` - Failed to read or parse the file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, MatchError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| MatchError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;
        Self::from_toml_str(&content)
    }

    /// Returns true if the normalized model is on record for the category
    pub fn contains(&self, category: &str, model: &str) -> bool {
        self.models
            .get(category)
            .is_some_and(|models| models.contains(&normalize_model(model)))
    }

    /// Number of known models per category
    pub fn counts(&self) -> BTreeMap<&str, usize> {
        self.models
            .iter()
            .map(|(category, models)| (category.as_str(), models.len()))
            .collect()
    }
}
