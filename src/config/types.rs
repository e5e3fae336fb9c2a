use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

const DEFAULT_LISTING_URL: &str = "https://search.jd.com/s_new.php";
const DEFAULT_PC_DETAIL_URL: &str = "https://item.jd.com/{sku}.html";
const DEFAULT_MOBILE_DETAIL_URL: &str = "https://item.m.jd.com/product/{sku}.html";

/// Placeholder substituted with the item identifier in detail URL templates
pub const SKU_PLACEHOLDER: &str = "{sku}";

const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Safari/605.1.15",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_2 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) CriOS/124.0.0.0 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (Linux; Android 14; Pixel 8 Pro) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.6422.0 Mobile Safari/537.36",
];

const DEFAULT_REFERERS: &[&str] = &["https://search.jd.com/"];

/// Main configuration structure for Shelf-Scout
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub search: SearchTargetConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub endpoints: EndpointConfig,
    #[serde(default, rename = "category")]
    pub categories: Vec<CategoryEntry>,
}

/// What to search for and how much of the listing to walk
#[derive(Debug, Clone, Deserialize)]
pub struct SearchTargetConfig {
    /// Search keyword sent to the listing endpoint
    pub keyword: String,

    /// Maximum number of listing pages to request
    #[serde(rename = "max-pages", default = "default_max_pages")]
    pub max_pages: u32,

    /// Number of items the listing endpoint returns per page
    #[serde(rename = "page-size", default = "default_page_size")]
    pub page_size: u32,

    /// Number of items enriched concurrently
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,

    /// Stop paginating as soon as a page comes back shorter than `page-size`
    #[serde(rename = "short-circuit", default = "default_true")]
    pub short_circuit: bool,
}

/// Politeness, retry and egress settings
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    /// Minimum time between two requests of one rate-limit partition (milliseconds)
    #[serde(rename = "min-interval", default = "default_min_interval")]
    pub min_interval: u64,

    /// Upper bound of the random delay added to every wait (milliseconds)
    #[serde(default = "default_jitter")]
    pub jitter: u64,

    /// Hard wall-clock bound for a single request attempt (milliseconds)
    #[serde(rename = "request-timeout", default = "default_request_timeout")]
    pub request_timeout: u64,

    /// Number of retries after the first attempt
    #[serde(rename = "retry-ceiling", default = "default_retry_ceiling")]
    pub retry_ceiling: u32,

    /// First backoff delay (milliseconds)
    #[serde(rename = "backoff-base", default = "default_backoff_base")]
    pub backoff_base: u64,

    /// Largest backoff delay before jitter (milliseconds)
    #[serde(rename = "backoff-cap", default = "default_backoff_cap")]
    pub backoff_cap: u64,

    /// Outbound proxies, e.g. "http://10.0.0.1:8080"
    #[serde(rename = "proxy-pool", default)]
    pub proxy_pool: Vec<String>,

    /// How identities are drawn from the pool
    #[serde(default)]
    pub rotation: RotationPolicy,

    /// Seed for jitter and random rotation; random when unset
    #[serde(default)]
    pub seed: Option<u64>,

    /// Space requests per proxy instead of globally
    #[serde(rename = "partition-by-proxy", default)]
    pub partition_by_proxy: bool,

    /// Headers sent with every request
    #[serde(default = "default_headers")]
    pub headers: BTreeMap<String, String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            min_interval: default_min_interval(),
            jitter: default_jitter(),
            request_timeout: default_request_timeout(),
            retry_ceiling: default_retry_ceiling(),
            backoff_base: default_backoff_base(),
            backoff_cap: default_backoff_cap(),
            proxy_pool: Vec::new(),
            rotation: RotationPolicy::default(),
            seed: None,
            partition_by_proxy: false,
            headers: default_headers(),
        }
    }
}

/// Identity selection strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RotationPolicy {
    /// Walk the pool in order
    #[default]
    RoundRobin,
    /// Sample the pool, never repeating the previous pairing
    Random,
}

/// Header identity templates
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    #[serde(rename = "user-agents", default = "default_user_agents")]
    pub user_agents: Vec<String>,

    #[serde(default = "default_referers")]
    pub referers: Vec<String>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            user_agents: default_user_agents(),
            referers: default_referers(),
        }
    }
}

/// Remote endpoint locations
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    /// Paginated search endpoint
    #[serde(rename = "listing-url", default = "default_listing_url")]
    pub listing_url: String,

    /// Desktop detail page, must contain `{sku}`
    #[serde(rename = "pc-detail-url", default = "default_pc_detail_url")]
    pub pc_detail_url: String,

    /// Mobile detail page, must contain `{sku}`
    #[serde(rename = "mobile-detail-url", default = "default_mobile_detail_url")]
    pub mobile_detail_url: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            listing_url: default_listing_url(),
            pc_detail_url: default_pc_detail_url(),
            mobile_detail_url: default_mobile_detail_url(),
        }
    }
}

impl EndpointConfig {
    /// Desktop detail URL for a sku
    pub fn pc_detail(&self, sku: &str) -> String {
        self.pc_detail_url.replace(SKU_PLACEHOLDER, sku)
    }

    /// Mobile detail URL for a sku
    pub fn mobile_detail(&self, sku: &str) -> String {
        self.mobile_detail_url.replace(SKU_PLACEHOLDER, sku)
    }
}

/// Brand to category mapping entry
#[derive(Debug, Clone, Deserialize)]
pub struct CategoryEntry {
    /// Category name used by the known-set (e.g. "Haier")
    pub name: String,

    /// Brand aliases as they appear on detail pages (e.g. "海尔")
    pub brands: Vec<String>,

    /// Accepted model prefixes; any model is accepted when empty
    #[serde(rename = "model-prefixes", default)]
    pub model_prefixes: Vec<String>,
}

/// One user-agent/referer pairing presented to the remote site
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderTemplate {
    pub user_agent: String,
    pub referer: Option<String>,
}

/// Immutable runtime settings for one crawl
///
/// Built from a [`Config`] with [`SearchConfig::from_config`], or directly by
/// library callers starting from [`SearchConfig::new`].
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub keyword: String,
    pub max_pages: u32,
    pub page_size: u32,
    pub concurrency: usize,
    pub short_circuit: bool,
    pub proxy_pool: Vec<String>,
    pub request_headers_base: BTreeMap<String, String>,
    pub header_templates: Vec<HeaderTemplate>,
    pub rotation: RotationPolicy,
    pub seed: Option<u64>,
    pub partition_by_proxy: bool,
    pub min_interval: Duration,
    pub jitter: Duration,
    pub request_timeout: Duration,
    pub retry_ceiling: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    pub endpoints: EndpointConfig,
}

impl SearchConfig {
    /// Creates settings for `keyword` with the default network profile
    pub fn new(keyword: impl Into<String>) -> Self {
        let network = NetworkConfig::default();
        let mut config = Self::assemble(
            &SearchTargetConfig {
                keyword: String::new(),
                max_pages: default_max_pages(),
                page_size: default_page_size(),
                concurrency: default_concurrency(),
                short_circuit: true,
            },
            &network,
            &IdentityConfig::default(),
            &EndpointConfig::default(),
        );
        config.keyword = keyword.into();
        config
    }

    /// Builds runtime settings from a validated configuration file
    pub fn from_config(config: &Config) -> Self {
        Self::assemble(
            &config.search,
            &config.network,
            &config.identity,
            &config.endpoints,
        )
    }

    fn assemble(
        search: &SearchTargetConfig,
        network: &NetworkConfig,
        identity: &IdentityConfig,
        endpoints: &EndpointConfig,
    ) -> Self {
        Self {
            keyword: search.keyword.clone(),
            max_pages: search.max_pages,
            page_size: search.page_size,
            concurrency: search.concurrency.max(1) as usize,
            short_circuit: search.short_circuit,
            proxy_pool: network.proxy_pool.clone(),
            request_headers_base: network.headers.clone(),
            header_templates: build_templates(&identity.user_agents, &identity.referers),
            rotation: network.rotation,
            seed: network.seed,
            partition_by_proxy: network.partition_by_proxy,
            min_interval: Duration::from_millis(network.min_interval),
            jitter: Duration::from_millis(network.jitter),
            request_timeout: Duration::from_millis(network.request_timeout),
            retry_ceiling: network.retry_ceiling,
            backoff_base: Duration::from_millis(network.backoff_base),
            backoff_cap: Duration::from_millis(network.backoff_cap),
            endpoints: endpoints.clone(),
        }
    }
}

/// Pairs every user agent with a referer, cycling through the referers
fn build_templates(user_agents: &[String], referers: &[String]) -> Vec<HeaderTemplate> {
    user_agents
        .iter()
        .enumerate()
        .map(|(i, user_agent)| HeaderTemplate {
            user_agent: user_agent.clone(),
            referer: if referers.is_empty() {
                None
            } else {
                Some(referers[i % referers.len()].clone())
            },
        })
        .collect()
}

fn default_max_pages() -> u32 {
    10
}

fn default_page_size() -> u32 {
    30
}

fn default_concurrency() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

fn default_min_interval() -> u64 {
    1000
}

fn default_jitter() -> u64 {
    300
}

fn default_request_timeout() -> u64 {
    15_000
}

fn default_retry_ceiling() -> u32 {
    2
}

fn default_backoff_base() -> u64 {
    1000
}

fn default_backoff_cap() -> u64 {
    30_000
}

fn default_headers() -> BTreeMap<String, String> {
    [
        (
            "accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        ),
        ("accept-language", "zh-CN,zh;q=0.9,en;q=0.8"),
        ("cache-control", "no-cache"),
        ("pragma", "no-cache"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn default_user_agents() -> Vec<String> {
    DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect()
}

fn default_referers() -> Vec<String> {
    DEFAULT_REFERERS.iter().map(|s| s.to_string()).collect()
}

fn default_listing_url() -> String {
    DEFAULT_LISTING_URL.to_string()
}

fn default_pc_detail_url() -> String {
    DEFAULT_PC_DETAIL_URL.to_string()
}

fn default_mobile_detail_url() -> String {
    DEFAULT_MOBILE_DETAIL_URL.to_string()
}
