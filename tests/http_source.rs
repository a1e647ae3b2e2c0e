//! HTTP-numeric source against an in-process server.

mod common;

use std::time::Duration;

use common::{Canned, CannedServer};
use live_metric_feed::source::retry::is_permanent;
use live_metric_feed::{HttpNumericSource, MetricSource, RetryPolicy};

fn fast_retry() -> RetryPolicy {
    RetryPolicy::default()
        .with_backoff_step(Duration::from_millis(5))
        .with_timeout(Duration::from_secs(2))
}

#[tokio::test]
async fn text_body_with_grouping() {
    let srv = CannedServer::start(vec![Canned::text("Total: 2,901,442.5 tokens")]).await;
    let src = HttpNumericSource::new(&srv.url, fast_retry()).unwrap().with_decimals(1);
    assert_eq!(src.fetch().await.unwrap(), 2_901_442.5);

    let reqs = srv.requests();
    assert_eq!(reqs.len(), 1);
    assert!(reqs[0].request_line.starts_with("GET / "));
}

#[tokio::test]
async fn json_body_rounds_to_whole_units() {
    let srv = CannedServer::start(vec![Canned::json(r#"{"result":"2876179.4"}"#)]).await;
    let src = HttpNumericSource::new(&srv.url, fast_retry()).unwrap();
    assert_eq!(src.fetch().await.unwrap(), 2_876_179.0);
}

#[tokio::test]
async fn server_error_is_retried() {
    let srv = CannedServer::start(vec![
        Canned::status(500),
        Canned::status(503),
        Canned::json(r#"{"total": 42}"#),
    ])
    .await;
    let src = HttpNumericSource::new(&srv.url, fast_retry()).unwrap();
    assert_eq!(src.fetch().await.unwrap(), 42.0);
    assert_eq!(srv.hits(), 3);
}

#[tokio::test]
async fn not_found_is_not_retried() {
    let srv = CannedServer::start(vec![Canned::status(404)]).await;
    let src = HttpNumericSource::new(&srv.url, fast_retry()).unwrap();
    let err = src.fetch().await.unwrap_err();
    assert!(is_permanent(&err), "{err:#}");
    assert_eq!(srv.hits(), 1);
}

#[tokio::test]
async fn body_without_number_fails_without_retry() {
    let srv = CannedServer::start(vec![Canned::text("maintenance")]).await;
    let src = HttpNumericSource::new(&srv.url, fast_retry()).unwrap();
    assert!(src.fetch().await.is_err());
    assert_eq!(srv.hits(), 1);
}
