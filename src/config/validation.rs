use crate::config::types::{
    CategoryEntry, Config, EndpointConfig, IdentityConfig, NetworkConfig, SearchTargetConfig,
    SKU_PLACEHOLDER,
};
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_search_config(&config.search)?;
    validate_network_config(&config.network)?;
    validate_identity_config(&config.identity)?;
    validate_endpoint_config(&config.endpoints)?;
    validate_categories(&config.categories)?;
    Ok(())
}

/// Validates the search target
fn validate_search_config(config: &SearchTargetConfig) -> Result<(), ConfigError> {
    if config.keyword.trim().is_empty() {
        return Err(ConfigError::Validation(
            "keyword cannot be empty".to_string(),
        ));
    }

    if config.page_size < 1 {
        return Err(ConfigError::Validation(format!(
            "page_size must be >= 1, got {}",
            config.page_size
        )));
    }

    if config.concurrency < 1 || config.concurrency > 100 {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and 100, got {}",
            config.concurrency
        )));
    }

    Ok(())
}

/// Validates politeness and retry settings
fn validate_network_config(config: &NetworkConfig) -> Result<(), ConfigError> {
    if config.request_timeout < 100 {
        return Err(ConfigError::Validation(format!(
            "request_timeout must be >= 100ms, got {}ms",
            config.request_timeout
        )));
    }

    if config.backoff_cap < config.backoff_base {
        return Err(ConfigError::Validation(format!(
            "backoff_cap ({}ms) must not be smaller than backoff_base ({}ms)",
            config.backoff_cap, config.backoff_base
        )));
    }

    for proxy in &config.proxy_pool {
        validate_proxy(proxy)?;
    }

    Ok(())
}

/// Validates a proxy descriptor
fn validate_proxy(proxy: &str) -> Result<(), ConfigError> {
    let url = Url::parse(proxy)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid proxy '{}': {}", proxy, e)))?;

    if !matches!(url.scheme(), "http" | "https" | "socks5" | "socks5h") {
        return Err(ConfigError::Validation(format!(
            "Proxy '{}' must use http, https or socks5",
            proxy
        )));
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "Proxy '{}' has no host",
            proxy
        )));
    }

    Ok(())
}

/// Validates header identity templates
fn validate_identity_config(config: &IdentityConfig) -> Result<(), ConfigError> {
    if config.user_agents.is_empty() {
        return Err(ConfigError::Validation(
            "at least one user agent is required".to_string(),
        ));
    }

    if config.user_agents.iter().any(|ua| ua.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "user agents cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates endpoint URLs and detail templates
fn validate_endpoint_config(config: &EndpointConfig) -> Result<(), ConfigError> {
    Url::parse(&config.listing_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid listing_url: {}", e)))?;

    for (name, template) in [
        ("pc_detail_url", &config.pc_detail_url),
        ("mobile_detail_url", &config.mobile_detail_url),
    ] {
        if !template.contains(SKU_PLACEHOLDER) {
            return Err(ConfigError::Validation(format!(
                "{} must contain the {} placeholder",
                name, SKU_PLACEHOLDER
            )));
        }

        Url::parse(&template.replace(SKU_PLACEHOLDER, "0"))
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {}: {}", name, e)))?;
    }

    Ok(())
}

/// Validates the brand to category mapping
fn validate_categories(categories: &[CategoryEntry]) -> Result<(), ConfigError> {
    let mut names = HashSet::new();

    for entry in categories {
        if entry.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "category name cannot be empty".to_string(),
            ));
        }

        if !names.insert(entry.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "category '{}' is defined more than once",
                entry.name
            )));
        }

        if entry.brands.iter().all(|b| b.trim().is_empty()) {
            return Err(ConfigError::Validation(format!(
                "category '{}' must list at least one brand",
                entry.name
            )));
        }
    }

    Ok(())
}
