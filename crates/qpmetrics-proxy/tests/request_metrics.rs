#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

mod common;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::http::StatusCode;
use futures_util::FutureExt;

use common::{assert_single_series, identity, post, want_tags};
use qpmetrics_core::tags::{DEFAULT_ROUTE_HEADER, PROBE_HEADER, TAG_HEADER};
use qpmetrics_proxy::handler::{handler_fn, Handler, RequestMetricsHandler, ResponseRecorder};
use qpmetrics_proxy::obs::metrics::{MetricRegistry, REQUEST_COUNT, REQUEST_LATENCIES};

fn noop_handler(
    registry: &Arc<MetricRegistry>,
) -> RequestMetricsHandler<impl Handler> {
    RequestMetricsHandler::new(handler_fn(|_w, _req| {}), registry.clone(), &identity())
        .expect("handler must build")
}

async fn route_tag_for(headers: &[(&str, &str)]) -> String {
    let registry = Arc::new(MetricRegistry::new());
    let handler = noop_handler(&registry);
    handler.serve(&mut ResponseRecorder::new(), &post(headers)).await;

    let series = registry.series(REQUEST_COUNT.name);
    assert_eq!(series.len(), 1);
    series[0].1.get("route_tag").unwrap().to_string()
}

#[test]
fn non_ascii_identity_fails_construction() {
    let registry = Arc::new(MetricRegistry::new());
    let mut id = identity();
    id.pod = "shøüld fail".into();

    let err = RequestMetricsHandler::new(handler_fn(|_w, _req| {}), registry, &id)
        .err()
        .expect("non-ascii pod must fail");
    assert_eq!(err.code().as_str(), "INVALID_TAG_VALUE");
}

#[test]
fn every_identity_field_is_validated() {
    for field in 0..5 {
        let mut id = identity();
        let slot = match field {
            0 => &mut id.namespace,
            1 => &mut id.service,
            2 => &mut id.configuration,
            3 => &mut id.revision,
            _ => &mut id.pod,
        };
        *slot = "ünïcode".into();
        let res = RequestMetricsHandler::new(
            handler_fn(|_w, _req| {}),
            Arc::new(MetricRegistry::new()),
            &id,
        );
        assert!(res.is_err(), "field {field} accepted non-ascii");
    }
}

#[tokio::test]
async fn records_count_and_latency() {
    let registry = Arc::new(MetricRegistry::new());
    let handler = noop_handler(&registry);

    let mut rec = ResponseRecorder::new();
    handler.serve(&mut rec, &post(&[])).await;

    let tags = want_tags("200", "2xx", Some("disabled"));
    let res = assert_single_series(&registry, REQUEST_COUNT.name, &tags);
    assert_eq!(registry.counter_value(REQUEST_COUNT.name, &tags, &res), Some(1));
    assert_single_series(&registry, REQUEST_LATENCIES.name, &tags);
    let dist = registry.distribution(REQUEST_LATENCIES.name, &tags, &res).unwrap();
    assert_eq!(dist.count, 1);
    assert!(Arc::ptr_eq(&res, handler.resource()));
    assert_eq!(res.label("testann"), Some("testval"));
    assert_eq!(res.label("testlab"), Some("testval"));

    // A probe request should not be recorded.
    handler
        .serve(&mut ResponseRecorder::new(), &post(&[(PROBE_HEADER, "activator")]))
        .await;
    assert_eq!(registry.counter_value(REQUEST_COUNT.name, &tags, &res), Some(1));
    assert_eq!(registry.counter_total(REQUEST_COUNT.name), 1);
    let dist = registry.distribution(REQUEST_LATENCIES.name, &tags, &res).unwrap();
    assert_eq!(dist.count, 1);
}

#[tokio::test]
async fn probe_still_reaches_base_handler() {
    let registry = Arc::new(MetricRegistry::new());
    let handler = RequestMetricsHandler::new(
        handler_fn(|w, _req| {
            w.write_header(StatusCode::ACCEPTED);
            w.write(b"probed");
        }),
        registry.clone(),
        &identity(),
    )
    .unwrap();

    let mut rec = ResponseRecorder::new();
    handler.serve(&mut rec, &post(&[(PROBE_HEADER, "queue")])).await;

    assert_eq!(rec.status(), StatusCode::ACCEPTED);
    assert_eq!(rec.body(), b"probed");
    assert!(registry.series(REQUEST_COUNT.name).is_empty());
    assert!(registry.series(REQUEST_LATENCIES.name).is_empty());
}

#[tokio::test]
async fn ok_body_scenario() {
    let registry = Arc::new(MetricRegistry::new());
    let handler = RequestMetricsHandler::new(
        handler_fn(|w, _req| {
            w.write_header(StatusCode::OK);
            w.write(b"ok");
        }),
        registry.clone(),
        &identity(),
    )
    .unwrap();

    let mut rec = ResponseRecorder::new();
    handler.serve(&mut rec, &post(&[])).await;

    assert_eq!(rec.body(), b"ok");
    let tags = want_tags("200", "2xx", Some("disabled"));
    let res = assert_single_series(&registry, REQUEST_COUNT.name, &tags);
    assert_eq!(registry.counter_value(REQUEST_COUNT.name, &tags, &res), Some(1));
}

#[tokio::test]
async fn first_written_status_is_recorded() {
    let registry = Arc::new(MetricRegistry::new());
    let handler = RequestMetricsHandler::new(
        handler_fn(|w, _req| {
            w.write_header(StatusCode::NOT_FOUND);
            w.write_header(StatusCode::OK);
        }),
        registry.clone(),
        &identity(),
    )
    .unwrap();

    let mut rec = ResponseRecorder::new();
    handler.serve(&mut rec, &post(&[])).await;

    assert_eq!(rec.status(), StatusCode::NOT_FOUND);
    assert_single_series(
        &registry,
        REQUEST_COUNT.name,
        &want_tags("404", "4xx", Some("disabled")),
    );
}

#[tokio::test]
async fn route_tag_from_headers() {
    assert_eq!(route_tag_for(&[]).await, "disabled");
    assert_eq!(route_tag_for(&[(TAG_HEADER, "test-tag")]).await, "test-tag");
    assert_eq!(route_tag_for(&[(DEFAULT_ROUTE_HEADER, "true")]).await, "default");
    assert_eq!(
        route_tag_for(&[(TAG_HEADER, "test-tag"), (DEFAULT_ROUTE_HEADER, "true")]).await,
        "undefined"
    );
    assert_eq!(
        route_tag_for(&[(TAG_HEADER, "test-tag"), (DEFAULT_ROUTE_HEADER, "false")]).await,
        "test-tag"
    );
}

#[tokio::test]
async fn panicking_handler_records_500_and_repanics() {
    let registry = Arc::new(MetricRegistry::new());
    let handler = RequestMetricsHandler::new(
        handler_fn(|w, _req| {
            w.write_header(StatusCode::OK);
            panic!("no!");
        }),
        registry.clone(),
        &identity(),
    )
    .unwrap();

    let mut rec = ResponseRecorder::new();
    let req = post(&[]);
    let result = AssertUnwindSafe(handler.serve(&mut rec, &req))
        .catch_unwind()
        .await;

    let payload = result.expect_err("want serve to panic");
    assert_eq!(payload.downcast_ref::<&str>(), Some(&"no!"));

    let tags = want_tags("500", "5xx", Some("disabled"));
    let res = assert_single_series(&registry, REQUEST_COUNT.name, &tags);
    assert_eq!(registry.counter_value(REQUEST_COUNT.name, &tags, &res), Some(1));
    assert_single_series(&registry, REQUEST_LATENCIES.name, &tags);
    assert_eq!(
        registry
            .distribution(REQUEST_LATENCIES.name, &tags, &res)
            .unwrap()
            .count,
        1
    );
}

#[tokio::test]
async fn reset_then_rebuild_starts_clean() {
    let registry = Arc::new(MetricRegistry::new());
    let handler = noop_handler(&registry);
    handler.serve(&mut ResponseRecorder::new(), &post(&[])).await;
    assert_eq!(registry.counter_total(REQUEST_COUNT.name), 1);

    registry.reset(&[REQUEST_COUNT.name, REQUEST_LATENCIES.name]);
    assert!(!registry.is_registered(REQUEST_COUNT.name));

    let handler = noop_handler(&registry);
    handler.serve(&mut ResponseRecorder::new(), &post(&[])).await;
    assert_eq!(registry.counter_total(REQUEST_COUNT.name), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_requests_are_all_counted() {
    const N: u64 = 500;

    let registry = Arc::new(MetricRegistry::new());
    let handler = Arc::new(
        RequestMetricsHandler::new(
            handler_fn(|w, _req| w.write_header(StatusCode::OK)),
            registry.clone(),
            &identity(),
        )
        .unwrap(),
    );

    let mut tasks = Vec::new();
    for i in 0..N {
        let handler = handler.clone();
        tasks.push(tokio::spawn(async move {
            let tag = format!("tag-{}", i % 4);
            let req = post(&[(TAG_HEADER, tag.as_str())]);
            let mut rec = ResponseRecorder::new();
            handler.serve(&mut rec, &req).await;
        }));
    }
    for t in tasks {
        t.await.unwrap();
    }

    assert_eq!(registry.counter_total(REQUEST_COUNT.name), N);
    assert_eq!(registry.series(REQUEST_COUNT.name).len(), 4);
    let observed: u64 = registry
        .series(REQUEST_LATENCIES.name)
        .iter()
        .map(|(res, tags)| {
            registry
                .distribution(REQUEST_LATENCIES.name, tags, res)
                .unwrap()
                .count
        })
        .sum();
    assert_eq!(observed, N);
}
