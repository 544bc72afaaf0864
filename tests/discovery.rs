mod common;

use std::time::{Duration, Instant};

use common::stream_server;
use fastspeed::speedtest::build_client;
use fastspeed::speedtest::discovery::{Endpoints, FastComProvider, UrlProvider};
use fastspeed::{measure_with, DiscoveryError, MeasureOptions, ResolutionError, SamplerConfig};

fn provider(base: &str, api_prefix: &str) -> FastComProvider {
    FastComProvider::new(build_client().unwrap()).with_endpoints(Endpoints {
        landing: base.to_string(),
        script_base: base.trim_end_matches('/').to_string(),
        api_base: format!("{}{}", base, api_prefix),
    })
}

#[tokio::test]
async fn scrape_token_and_api_yield_urls() {
    let base = stream_server::start();
    let opts = MeasureOptions {
        url_count: 2,
        ..Default::default()
    };

    let urls = provider(&base, "").resolve_test_urls(&opts).await.unwrap();
    assert_eq!(urls.len(), 2);
    assert!(urls[0].as_str().starts_with(&format!("{}small", base)));
}

#[tokio::test]
async fn forced_ipv4_reaches_literal_api() {
    let base = stream_server::start();
    let opts = MeasureOptions {
        force_ipv4: true,
        ..Default::default()
    };

    let urls = provider(&base, "").resolve_test_urls(&opts).await.unwrap();
    assert_eq!(urls.len(), 3);
}

#[tokio::test]
async fn forced_ipv6_rejects_ipv4_api_host() {
    let base = stream_server::start();
    let opts = MeasureOptions {
        force_ipv6: true,
        ..Default::default()
    };

    let err = provider(&base, "").resolve_test_urls(&opts).await.unwrap_err();
    assert!(matches!(
        err,
        DiscoveryError::Resolution(ResolutionError::WrongFamily { .. })
    ));
}

#[tokio::test]
async fn api_error_status_is_reported() {
    let base = stream_server::start();

    let err = provider(&base, "broken/")
        .resolve_test_urls(&MeasureOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DiscoveryError::Status { status: 500, .. }));
}

#[tokio::test]
async fn stalled_api_times_out() {
    let base = stream_server::start();

    let started = Instant::now();
    let err = provider(&base, "slow/")
        .resolve_test_urls(&MeasureOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DiscoveryError::Request { .. }));
    assert!(
        started.elapsed() < Duration::from_secs(10),
        "API request ran {:?}",
        started.elapsed()
    );
}

#[tokio::test]
async fn unreachable_landing_page_is_a_request_error() {
    let refused = stream_server::refused_url();
    let provider = FastComProvider::new(build_client().unwrap()).with_endpoints(Endpoints {
        landing: refused.clone(),
        script_base: refused.clone(),
        api_base: refused,
    });

    let err = provider
        .resolve_test_urls(&MeasureOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DiscoveryError::Request { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn discovered_urls_feed_a_measurement() {
    let base = stream_server::start();
    let sampler = SamplerConfig {
        warmup: Duration::from_millis(200),
        interval: Duration::from_millis(250),
        max_time: Duration::from_millis(500),
    };
    let opts = MeasureOptions {
        max_time_secs: 1,
        ..Default::default()
    };

    let mbps = measure_with(&provider(&base, ""), opts, sampler).await;
    assert!(mbps > 0.0, "expected positive estimate, got {}", mbps);
}
