//! Shared fixtures for handler tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::Request;
use bytes::Bytes;

use qpmetrics_core::resource::{
    RevisionIdentity, LABEL_CONFIGURATION_NAME, LABEL_NAMESPACE_NAME, LABEL_REVISION_NAME,
    LABEL_SERVICE_NAME, REVISION_RESOURCE_TYPE,
};
use qpmetrics_core::tags::{
    LABEL_CONTAINER_NAME, LABEL_POD_NAME, LABEL_RESPONSE_CODE, LABEL_RESPONSE_CODE_CLASS,
    LABEL_ROUTE_TAG,
};
use qpmetrics_core::{ResourceDescriptor, TagSet};
use qpmetrics_proxy::obs::metrics::MetricRegistry;

pub const TARGET_URI: &str = "http://example.com";

pub fn identity() -> RevisionIdentity {
    let mut ann = HashMap::new();
    ann.insert("testann".to_string(), "testval".to_string());
    let mut lab = HashMap::new();
    lab.insert("testlab".to_string(), "testval".to_string());
    RevisionIdentity::new("ns", "svc", "cfg", "rev", "pod")
        .with_annotations(ann)
        .with_labels(lab)
}

pub fn post(headers: &[(&str, &str)]) -> Request<Bytes> {
    let mut req = Request::builder().method("POST").uri(TARGET_URI);
    for (k, v) in headers {
        req = req.header(*k, *v);
    }
    req.body(Bytes::from_static(b"test")).unwrap()
}

pub fn want_tags(code: &str, class: &str, route_tag: Option<&str>) -> TagSet {
    let tags = TagSet::new()
        .with(LABEL_POD_NAME, "pod")
        .with(LABEL_CONTAINER_NAME, "queue-proxy")
        .with(LABEL_RESPONSE_CODE, code)
        .with(LABEL_RESPONSE_CODE_CLASS, class);
    match route_tag {
        Some(tag) => tags.with(LABEL_ROUTE_TAG, tag),
        None => tags,
    }
}

/// Assert the resource carries the four revision labels with the expected values.
pub fn assert_revision_resource(res: &ResourceDescriptor) {
    assert_eq!(res.kind(), REVISION_RESOURCE_TYPE);
    assert_eq!(res.label(LABEL_NAMESPACE_NAME), Some("ns"));
    assert_eq!(res.label(LABEL_SERVICE_NAME), Some("svc"));
    assert_eq!(res.label(LABEL_CONFIGURATION_NAME), Some("cfg"));
    assert_eq!(res.label(LABEL_REVISION_NAME), Some("rev"));
}

/// The instrument has exactly one series, with exactly `tags`, on the revision resource.
pub fn assert_single_series(registry: &MetricRegistry, name: &str, tags: &TagSet) -> Arc<ResourceDescriptor> {
    let series = registry.series(name);
    assert_eq!(series.len(), 1, "{name}: {series:?}");
    let (res, got) = &series[0];
    assert_eq!(got, tags, "{name}");
    assert_revision_resource(res);
    Arc::clone(res)
}
