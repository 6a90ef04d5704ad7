//! Metrics for requests forwarded to the user container:
//! `app_request_count`, `app_request_latencies`, and the `queue_depth` gauge.
//!
//! Same status and panic rules as [`super::RequestMetricsHandler`], without
//! the route tag dimension.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::Request;
use bytes::Bytes;

use qpmetrics_core::error::Result;
use qpmetrics_core::resource::RevisionIdentity;
use qpmetrics_core::{ResourceDescriptor, TagSet};

use super::{emit, is_probe, run_metered, Handler, RequestInstruments, ResponseWriter};
use crate::limiter::{ConcurrencyLimiter, ConcurrencySampler};
use crate::obs::metrics::{MetricRegistry, APP_REQUEST_COUNT, APP_REQUEST_LATENCIES, QUEUE_DEPTH};

const INSTRUMENTS: RequestInstruments = RequestInstruments {
    count: APP_REQUEST_COUNT.name,
    latencies: APP_REQUEST_LATENCIES.name,
};

pub struct AppRequestMetricsHandler<H> {
    next: H,
    sampler: ConcurrencySampler,
    registry: Arc<MetricRegistry>,
    resource: Arc<ResourceDescriptor>,
    pod_tags: TagSet,
}

impl<H: Handler> AppRequestMetricsHandler<H> {
    pub fn new(
        next: H,
        limiter: Arc<dyn ConcurrencyLimiter>,
        registry: Arc<MetricRegistry>,
        identity: &RevisionIdentity,
    ) -> Result<Self> {
        identity.validate()?;
        registry.register(&[&APP_REQUEST_COUNT, &APP_REQUEST_LATENCIES, &QUEUE_DEPTH])?;

        tracing::debug!(
            namespace = %identity.namespace,
            revision = %identity.revision,
            pod = %identity.pod,
            "app request metrics handler ready"
        );

        Ok(Self {
            next,
            sampler: ConcurrencySampler::new(limiter),
            registry,
            resource: Arc::new(ResourceDescriptor::for_revision(identity)),
            pod_tags: identity.pod_tags(),
        })
    }

    pub fn resource(&self) -> &Arc<ResourceDescriptor> {
        &self.resource
    }
}

#[async_trait]
impl<H: Handler> Handler for AppRequestMetricsHandler<H> {
    async fn serve(&self, w: &mut dyn ResponseWriter, req: &Request<Bytes>) {
        if is_probe(req.headers()) {
            self.next.serve(w, req).await;
            return;
        }

        let outcome = run_metered(&self.next, w, req).await;
        let tags = self.pod_tags.with_response(outcome.status.as_u16());

        emit(&self.registry, &INSTRUMENTS, &tags, &self.resource, &outcome);

        let depth = self.sampler.sample();
        if let Err(e) = self
            .registry
            .set_gauge(QUEUE_DEPTH.name, depth, &self.pod_tags, &self.resource)
        {
            tracing::warn!(error = %e, "queue_depth not recorded");
        }

        outcome.finish();
    }
}
