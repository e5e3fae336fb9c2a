//! Scripted transport and fast settings for crawler unit tests

use crate::config::{EndpointConfig, SearchConfig};
use crate::crawler::fetcher::{FailureKind, RawPayload, RequestSpec, Transport};
use crate::crawler::identity::Identity;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

pub(crate) const LISTING_URL: &str = "https://search.test/s";

/// Settings with millisecond spacing and a fixed seed
pub(crate) fn fast_config() -> SearchConfig {
    let mut config = SearchConfig::new("refrigerator");
    config.min_interval = Duration::from_millis(10);
    config.jitter = Duration::from_millis(5);
    config.request_timeout = Duration::from_secs(1);
    config.backoff_base = Duration::from_millis(20);
    config.backoff_cap = Duration::from_millis(100);
    config.seed = Some(42);
    config.endpoints = EndpointConfig {
        listing_url: LISTING_URL.to_string(),
        pc_detail_url: "https://item.test/{sku}.html".to_string(),
        mobile_detail_url: "https://m.item.test/{sku}.html".to_string(),
    };
    config
}

/// Replays canned responses per URL
///
/// Each URL answers from its queue in order; the last response repeats once
/// the queue is down to one entry. Unknown URLs answer 404.
pub(crate) struct ScriptedTransport {
    routes: Mutex<HashMap<String, VecDeque<Result<String, FailureKind>>>>,
    calls: Mutex<Vec<(String, Identity)>>,
    latency: Option<Duration>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self {
            routes: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            latency: None,
        }
    }

    pub(crate) fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub(crate) fn route(&self, url: &str, responses: Vec<Result<&str, FailureKind>>) {
        let queue = responses
            .into_iter()
            .map(|r| r.map(str::to_string))
            .collect();
        self.routes.lock().unwrap().insert(url.to_string(), queue);
    }

    pub(crate) fn calls_to(&self, url: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(called, _)| called == url)
            .count()
    }

    pub(crate) fn requested_urls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(url, _)| url.clone())
            .collect()
    }

    pub(crate) fn identities(&self) -> Vec<Identity> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, identity)| identity.clone())
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(
        &self,
        request: &RequestSpec,
        identity: &Identity,
    ) -> Result<RawPayload, FailureKind> {
        let url = request.to_string();
        self.calls
            .lock()
            .unwrap()
            .push((url.clone(), identity.clone()));

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let response = {
            let mut routes = self.routes.lock().unwrap();
            match routes.get_mut(&url) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        match response {
            Some(Ok(body)) => Ok(RawPayload {
                url,
                status: 200,
                body,
            }),
            Some(Err(kind)) => Err(kind),
            None => Err(FailureKind::Status(404)),
        }
    }
}

/// Minimal desktop detail page
pub(crate) fn pc_page(brand: Option<&str>, model: Option<&str>) -> String {
    let brand = brand
        .map(|b| format!(r#"<ul id="parameter-brand"><li>品牌：<a href="//shop.example.com/1">{}</a></li></ul>"#, b))
        .unwrap_or_default();
    let model = model
        .map(|m| {
            format!(
                r#"<ul class="parameter2 p-parameter-list"><li title="{0}">规格型号：{0}</li></ul>"#,
                m
            )
        })
        .unwrap_or_default();
    format!(
        "<html><head><title>PC item</title></head><body>{}{}</body></html>",
        brand, model
    )
}

/// Minimal mobile detail page
pub(crate) fn mobile_page(brand: Option<&str>, model: Option<&str>) -> String {
    let config = serde_json::json!({
        "product": {
            "brand": brand,
            "extend": { "model": model },
        }
    });
    format!(
        "<html><head><title>Mobile item</title></head><body><script>window.pageConfig = {};</script></body></html>",
        config
    )
}

/// Listing fragment carrying the given skus
pub(crate) fn listing_page(skus: &[&str]) -> String {
    skus.iter()
        .map(|sku| format!(r#"<li class="gl-item" data-sku="{}"></li>"#, sku))
        .collect()
}
