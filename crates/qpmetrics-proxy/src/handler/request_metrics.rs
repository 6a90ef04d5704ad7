//! Request metrics as seen by the sidecar: `request_count` and
//! `request_latencies`, labeled with the response outcome and route tag.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::Request;
use bytes::Bytes;

use qpmetrics_core::error::Result;
use qpmetrics_core::resource::RevisionIdentity;
use qpmetrics_core::tags::LABEL_ROUTE_TAG;
use qpmetrics_core::{ResourceDescriptor, TagSet};

use super::{
    emit, is_probe, route_tag_from_headers, run_metered, Handler, RequestInstruments, ResponseWriter,
};
use crate::obs::metrics::{MetricRegistry, REQUEST_COUNT, REQUEST_LATENCIES};

const INSTRUMENTS: RequestInstruments = RequestInstruments {
    count: REQUEST_COUNT.name,
    latencies: REQUEST_LATENCIES.name,
};

/// Meters every non-probe request passing through to `next`.
pub struct RequestMetricsHandler<H> {
    next: H,
    registry: Arc<MetricRegistry>,
    resource: Arc<ResourceDescriptor>,
    pod_tags: TagSet,
}

impl<H: Handler> RequestMetricsHandler<H> {
    /// Fails when any identity string is not ASCII.
    pub fn new(next: H, registry: Arc<MetricRegistry>, identity: &RevisionIdentity) -> Result<Self> {
        identity.validate()?;
        registry.register(&[&REQUEST_COUNT, &REQUEST_LATENCIES])?;

        let resource = Arc::new(ResourceDescriptor::for_revision(identity));
        tracing::debug!(
            namespace = %identity.namespace,
            revision = %identity.revision,
            pod = %identity.pod,
            "request metrics handler ready"
        );

        Ok(Self {
            next,
            registry,
            resource,
            pod_tags: identity.pod_tags(),
        })
    }

    pub fn resource(&self) -> &Arc<ResourceDescriptor> {
        &self.resource
    }
}

#[async_trait]
impl<H: Handler> Handler for RequestMetricsHandler<H> {
    async fn serve(&self, w: &mut dyn ResponseWriter, req: &Request<Bytes>) {
        if is_probe(req.headers()) {
            self.next.serve(w, req).await;
            return;
        }

        let outcome = run_metered(&self.next, w, req).await;

        let route_tag = route_tag_from_headers(req.headers());
        let tags = self
            .pod_tags
            .with_response(outcome.status.as_u16())
            .with(LABEL_ROUTE_TAG, route_tag.as_str());

        emit(&self.registry, &INSTRUMENTS, &tags, &self.resource, &outcome);

        outcome.finish();
    }
}
