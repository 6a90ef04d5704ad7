//! Request handlers and the decorators that meter them.
//!
//! A `Handler` writes its response into a `ResponseWriter` instead of
//! returning one, so decorators can observe the status as it is written and
//! still see a sensible outcome when the wrapped handler panics half way.

pub mod app_metrics;
pub mod capture;
pub mod request_metrics;

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::http::{HeaderMap, Request, StatusCode};
use bytes::Bytes;
use futures_util::FutureExt;

use qpmetrics_core::tags::{DEFAULT_ROUTE_HEADER, PROBE_HEADER, TAG_HEADER};
use qpmetrics_core::{ResourceDescriptor, RouteTag, TagSet};

use crate::obs::metrics::MetricRegistry;

pub use app_metrics::AppRequestMetricsHandler;
pub use capture::{ResponseCapture, ResponseRecorder};
pub use request_metrics::RequestMetricsHandler;

/// Response sink handed to a `Handler`.
pub trait ResponseWriter: Send {
    fn headers_mut(&mut self) -> &mut HeaderMap;
    /// Set the status. Only the first call has an effect.
    fn write_header(&mut self, status: StatusCode);
    /// Append to the body. Implies `200 OK` if no status was written yet.
    fn write(&mut self, chunk: &[u8]);
}

#[async_trait]
pub trait Handler: Send + Sync {
    async fn serve(&self, w: &mut dyn ResponseWriter, req: &Request<Bytes>);
}

#[async_trait]
impl<H: Handler + ?Sized> Handler for Arc<H> {
    async fn serve(&self, w: &mut dyn ResponseWriter, req: &Request<Bytes>) {
        (**self).serve(w, req).await
    }
}

/// Adapter turning a synchronous closure into a `Handler`.
pub struct FnHandler<F>(F);

pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(&mut dyn ResponseWriter, &Request<Bytes>) + Send + Sync,
{
    FnHandler(f)
}

#[async_trait]
impl<F> Handler for FnHandler<F>
where
    F: Fn(&mut dyn ResponseWriter, &Request<Bytes>) + Send + Sync,
{
    async fn serve(&self, w: &mut dyn ResponseWriter, req: &Request<Bytes>) {
        (self.0)(w, req)
    }
}

/// Liveness/readiness probes are never metered.
pub fn is_probe(headers: &HeaderMap) -> bool {
    headers
        .get(PROBE_HEADER)
        .is_some_and(|v| !v.as_bytes().is_empty())
}

/// Classify the request's route from the tag headers.
pub fn route_tag_from_headers(headers: &HeaderMap) -> RouteTag {
    let tag = headers
        .get(TAG_HEADER)
        .map(|v| String::from_utf8_lossy(v.as_bytes()));
    let default_route = headers
        .get(DEFAULT_ROUTE_HEADER)
        .map(|v| String::from_utf8_lossy(v.as_bytes()));
    RouteTag::resolve(tag.as_deref(), default_route.as_deref())
}

/// Result of one metered call into a wrapped handler.
///
/// Must be finished with [`Outcome::finish`] once metrics are recorded so a
/// caught panic keeps propagating.
pub(crate) struct Outcome {
    pub status: StatusCode,
    pub latency: Duration,
    panic: Option<Box<dyn Any + Send>>,
}

impl Outcome {
    pub fn latency_ms(&self) -> f64 {
        self.latency.as_secs_f64() * 1000.0
    }

    /// Re-raise the wrapped handler's panic, payload unchanged.
    pub fn finish(self) {
        if let Some(payload) = self.panic {
            std::panic::resume_unwind(payload);
        }
    }
}

/// Count instrument and latency distribution written together per request.
pub(crate) struct RequestInstruments {
    pub count: &'static str,
    pub latencies: &'static str,
}

/// Record one finished request; registry failures are logged, never raised.
pub(crate) fn emit(
    registry: &MetricRegistry,
    instruments: &RequestInstruments,
    tags: &TagSet,
    resource: &Arc<ResourceDescriptor>,
    outcome: &Outcome,
) {
    if let Err(e) = registry.record(instruments.count, tags, resource) {
        tracing::warn!(error = %e, instrument = instruments.count, "count not recorded");
    }
    if let Err(e) = registry.observe(instruments.latencies, outcome.latency_ms(), tags, resource) {
        tracing::warn!(error = %e, instrument = instruments.latencies, "latency not recorded");
    }
}

/// Run `next` behind a `ResponseCapture`, timing it and catching a panic.
///
/// A panicking call reports `500` regardless of what was written before.
pub(crate) async fn run_metered<H: Handler + ?Sized>(
    next: &H,
    w: &mut dyn ResponseWriter,
    req: &Request<Bytes>,
) -> Outcome {
    let start = Instant::now();
    let mut capture = ResponseCapture::new(w);
    let result = AssertUnwindSafe(next.serve(&mut capture, req))
        .catch_unwind()
        .await;
    let latency = start.elapsed();

    match result {
        Ok(()) => Outcome {
            status: capture.written_status(),
            latency,
            panic: None,
        },
        Err(payload) => {
            tracing::error!(
                panic = %panic_message(&*payload),
                uri = %req.uri(),
                "wrapped handler panicked; recording 500"
            );
            Outcome {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                latency,
                panic: Some(payload),
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}
