//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock listing and detail endpoints and
//! run full crawls end-to-end over real HTTP.

use futures::StreamExt;
use shelf_scout::config::{parse_config, EndpointConfig, SearchConfig};
use shelf_scout::crawler::{CrawlReport, StopReason};
use shelf_scout::matching::{find_missing, CategoryMapper, KnownSet};
use shelf_scout::state::RejectionKind;
use shelf_scout::{Completeness, ExtractionSource, Orchestrator, ProductRecord, ScoutError};
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates fast crawl settings pointed at the mock server
fn create_test_config(base_url: &str) -> SearchConfig {
    let mut config = SearchConfig::new("refrigerator");
    config.page_size = 2;
    config.max_pages = 5;
    config.concurrency = 2;
    config.min_interval = Duration::from_millis(5);
    config.jitter = Duration::ZERO;
    config.request_timeout = Duration::from_secs(2);
    config.backoff_base = Duration::from_millis(10);
    config.backoff_cap = Duration::from_millis(20);
    config.seed = Some(1);
    config.endpoints = EndpointConfig {
        listing_url: format!("{}/s", base_url),
        pc_detail_url: format!("{}/item/{{sku}}.html", base_url),
        mobile_detail_url: format!("{}/m/{{sku}}.html", base_url),
    };
    config
}

fn listing_body(skus: &[&str]) -> String {
    let items: String = skus
        .iter()
        .map(|sku| format!(r#"<li class="gl-item" data-sku="{}"><div class="p-name">item</div></li>"#, sku))
        .collect();
    format!("<ul class=\"gl-warp\">{}</ul>", items)
}

fn pc_body(brand: &str, model: Option<&str>) -> String {
    let model = model
        .map(|m| format!(r#"<li title="{0}">规格型号：{0}</li>"#, m))
        .unwrap_or_default();
    format!(
        r#"<html><head><title>{0} 冰箱</title></head><body>
        <ul id="parameter-brand" class="p-parameter-list"><li title="{0}">品牌：<a href="/brand">{0}</a></li></ul>
        <ul class="parameter2 p-parameter-list"><li title="100">商品编号：100</li>{1}</ul>
        <script>var pageConfig = {{ "shopName":"{0}官方旗舰店" }};</script>
        </body></html>"#,
        brand, model
    )
}

fn mobile_body(brand: &str, model: &str) -> String {
    format!(
        r#"<html><head><title>{0}</title></head><body>
        <script>window.pageConfig = {{"product":{{"brand":"{0}","extend":{{"model":"{1}"}}}}}};</script>
        </body></html>"#,
        brand, model
    )
}

async fn mount_listing(server: &MockServer, page: u32, skus: &[&str]) {
    Mock::given(method("GET"))
        .and(path("/s"))
        .and(query_param("keyword", "refrigerator"))
        .and(query_param("page", (2 * page - 1).to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing_body(skus)))
        .mount(server)
        .await;
}

async fn mount_page(server: &MockServer, page_path: String, body: String) {
    Mock::given(method("GET"))
        .and(path(page_path))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "text/html; charset=utf-8"),
        )
        .mount(server)
        .await;
}

async fn listing_requests(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == "/s")
        .count()
}

async fn collect(orchestrator: Orchestrator) -> (Vec<ProductRecord>, Vec<ScoutError>, CrawlReport) {
    let mut stream = orchestrator.run();
    let mut records = Vec::new();
    let mut errors = Vec::new();
    while let Some(item) = stream.next().await {
        match item {
            Ok(record) => records.push(record),
            Err(e) => errors.push(e),
        }
    }
    let report = stream.finish().await.expect("crawl task failed");
    records.sort_by(|a, b| a.sku.cmp(&b.sku));
    (records, errors, report)
}

#[tokio::test]
async fn test_full_crawl_two_pages() {
    let server = MockServer::start().await;
    let base_url = server.uri();

    mount_listing(&server, 1, &["1001", "1002"]).await;
    mount_listing(&server, 2, &["1003"]).await;

    // Desktop page has everything
    mount_page(&server, "/item/1001.html".into(), pc_body("海尔（Haier）", Some("BCD-470WGHTD"))).await;
    mount_page(&server, "/m/1001.html".into(), mobile_body("海尔（Haier）", "BCD-470WGHTD")).await;

    // Only the mobile page carries the model
    mount_page(&server, "/item/1002.html".into(), pc_body("美的（Midea）", None)).await;
    mount_page(&server, "/m/1002.html".into(), mobile_body("美的（Midea）", "BCD-606WKPZM(E)")).await;

    // 1003 has no detail pages at all (404)

    let orchestrator = Orchestrator::with_reqwest(create_test_config(&base_url))
        .expect("Failed to create orchestrator");
    let (records, errors, report) = collect(orchestrator).await;

    assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
    assert_eq!(records.len(), 3);
    assert_eq!(listing_requests(&server).await, 2);

    let first = &records[0];
    assert_eq!(first.sku, "1001");
    assert_eq!(first.completeness, Completeness::Complete);
    assert_eq!(first.extraction_source, ExtractionSource::Pc);
    assert_eq!(first.model.as_deref(), Some("BCD-470WGHTD"));
    assert_eq!(first.brand.as_deref(), Some("海尔（Haier）"));
    assert_eq!(first.store.as_deref(), Some("海尔（Haier）官方旗舰店"));

    let second = &records[1];
    assert_eq!(second.completeness, Completeness::Complete);
    assert_eq!(second.extraction_source, ExtractionSource::Mobile);
    assert_eq!(second.model.as_deref(), Some("BCD-606WKPZM(E)"));
    assert_eq!(second.source_url, format!("{}/m/1002.html", base_url));

    let third = &records[2];
    assert_eq!(third.completeness, Completeness::Rejected);
    assert!(third.is_rejected_for(RejectionKind::FetchFailed));

    assert_eq!(report.stop_reason, StopReason::ShortPage);
    assert_eq!(report.progress.pages_fetched, 2);
    assert_eq!(report.progress.items_seen, 3);
    assert_eq!(report.progress.items_complete, 2);
    assert_eq!(report.progress.items_failed, 1);
    assert!(report.progress.is_reconciled());
}

#[tokio::test]
async fn test_partial_record_without_model() {
    let server = MockServer::start().await;
    let base_url = server.uri();

    mount_listing(&server, 1, &["2001"]).await;
    mount_page(&server, "/item/2001.html".into(), pc_body("容声（Ronshen）", None)).await;
    mount_page(&server, "/m/2001.html".into(), mobile_body("容声（Ronshen）", "")).await;

    let orchestrator = Orchestrator::with_reqwest(create_test_config(&base_url)).unwrap();
    let (records, _, report) = collect(orchestrator).await;

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].completeness, Completeness::PartialMissingModel);
    assert_eq!(records[0].brand.as_deref(), Some("容声（Ronshen）"));
    assert_eq!(records[0].model, None);
    assert_eq!(report.progress.items_partial, 1);
}

#[tokio::test]
async fn test_unreachable_listing_is_terminal() {
    let server = MockServer::start().await;
    let base_url = server.uri();

    Mock::given(method("GET"))
        .and(path("/s"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let config = create_test_config(&base_url);
    let attempts = config.retry_ceiling as usize + 1;
    let orchestrator = Orchestrator::with_reqwest(config).unwrap();
    let (records, errors, report) = collect(orchestrator).await;

    assert!(records.is_empty());
    assert_eq!(errors.len(), 1);
    assert!(matches!(
        errors[0],
        ScoutError::ListingUnreachable { page: 1, .. }
    ));
    assert_eq!(listing_requests(&server).await, attempts);
    assert!(matches!(
        report.stop_reason,
        StopReason::ListingFailed { page: 1, .. }
    ));
    assert_eq!(report.progress.pages_fetched, 0);
}

#[tokio::test]
async fn test_duplicates_across_pages() {
    let server = MockServer::start().await;
    let base_url = server.uri();

    mount_listing(&server, 1, &["3001", "3002"]).await;
    mount_listing(&server, 2, &["3002", "3003"]).await;
    mount_listing(&server, 3, &[]).await;
    for sku in ["3001", "3002", "3003"] {
        mount_page(&server, format!("/item/{}.html", sku), pc_body("海信", Some("BCD-501"))).await;
        mount_page(&server, format!("/m/{}.html", sku), mobile_body("海信", "BCD-501")).await;
    }

    let orchestrator = Orchestrator::with_reqwest(create_test_config(&base_url)).unwrap();
    let (records, _, report) = collect(orchestrator).await;

    let skus: Vec<&str> = records.iter().map(|r| r.sku.as_str()).collect();
    assert_eq!(skus, vec!["3001", "3002", "3003"]);
    assert_eq!(report.progress.duplicates_skipped, 1);
    assert_eq!(report.progress.pages_fetched, 3);
    assert_eq!(report.stop_reason, StopReason::Exhausted);
}

#[tokio::test]
async fn test_cancel_before_start() {
    let server = MockServer::start().await;
    let base_url = server.uri();
    mount_listing(&server, 1, &["4001", "4002"]).await;

    let orchestrator = Orchestrator::with_reqwest(create_test_config(&base_url)).unwrap();
    orchestrator.handle().cancel();
    let (records, errors, report) = collect(orchestrator).await;

    assert!(records.is_empty());
    assert!(errors.is_empty());
    assert_eq!(report.stop_reason, StopReason::Cancelled);
    assert!(report.progress.is_reconciled());
}

#[tokio::test]
async fn test_cancel_mid_crawl_accounts_for_every_item() {
    let server = MockServer::start().await;
    let base_url = server.uri();

    let skus = ["5001", "5002", "5003", "5004"];
    let mut config = create_test_config(&base_url);
    config.page_size = 4;
    config.concurrency = 1;

    mount_listing(&server, 1, &skus).await;
    for sku in skus {
        Mock::given(method("GET"))
            .and(path(format!("/item/{}.html", sku)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(pc_body("海尔", Some("BCD-470")))
                    .set_delay(Duration::from_millis(100)),
            )
            .mount(&server)
            .await;
    }

    let orchestrator = Orchestrator::with_reqwest(config).unwrap();
    let handle = orchestrator.handle();
    let mut stream = orchestrator.run();

    let first = stream.next().await.expect("stream ended early");
    assert!(first.is_ok());
    handle.cancel();

    let mut received = 1;
    while let Some(item) = stream.next().await {
        assert!(item.is_ok());
        received += 1;
    }
    let report = stream.finish().await.unwrap();

    assert!(received < skus.len());
    assert_eq!(report.stop_reason, StopReason::Cancelled);
    assert_eq!(report.progress.items_seen, skus.len() as u64);
    assert!(report.progress.items_dropped > 0);
    assert!(report.progress.is_reconciled());
}

#[tokio::test]
async fn test_missing_models_from_crawl() {
    let server = MockServer::start().await;
    let base_url = server.uri();

    mount_listing(&server, 1, &["6001", "6002"]).await;
    mount_listing(&server, 2, &[]).await;
    mount_page(&server, "/item/6001.html".into(), pc_body("海尔（Haier）", Some("BCD-470WGHTD"))).await;
    mount_page(&server, "/item/6002.html".into(), pc_body("海尔（Haier）", Some("bcd 218stps"))).await;

    let config = parse_config(
        r#"
[search]
keyword = "refrigerator"

[[category]]
name = "Haier"
brands = ["海尔", "Haier"]
model-prefixes = ["BCD"]
"#,
    )
    .unwrap();
    let known = KnownSet::from_toml_str(r#"Haier = ["BCD-470WGHTD"]"#).unwrap();

    let orchestrator = Orchestrator::with_reqwest(create_test_config(&base_url)).unwrap();
    let (records, _, _) = collect(orchestrator).await;

    let missing = find_missing(&records, &CategoryMapper::from_config(&config), &known);
    assert_eq!(missing.len(), 1);
    assert_eq!(missing["Haier"].len(), 1);
    assert_eq!(missing["Haier"][0].model, "BCD218STPS");
    assert_eq!(missing["Haier"][0].url, format!("{}/item/6002.html", base_url));
}
