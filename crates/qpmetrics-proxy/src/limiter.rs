//! Read-only view of the admission-control component.
//!
//! The metrics layer only ever asks how many requests are pending; how the
//! limiter admits or queues them is its own business.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::Request;
use bytes::Bytes;

use crate::handler::{is_probe, Handler, ResponseWriter};

/// Anything that can report its current pending/in-flight request count.
///
/// Implementations must answer without blocking and without side effects.
pub trait ConcurrencyLimiter: Send + Sync {
    fn pending_count(&self) -> usize;
}

/// Samples a limiter's pending count for the `queue_depth` gauge.
#[derive(Clone)]
pub struct ConcurrencySampler {
    limiter: Arc<dyn ConcurrencyLimiter>,
}

impl ConcurrencySampler {
    pub fn new(limiter: Arc<dyn ConcurrencyLimiter>) -> Self {
        Self { limiter }
    }

    pub fn sample(&self) -> i64 {
        i64::try_from(self.limiter.pending_count()).unwrap_or(i64::MAX)
    }
}

/// Counts requests currently inside an [`InFlightHandler`].
///
/// No admission control; it only counts.
#[derive(Debug, Default)]
pub struct InFlightTracker {
    in_flight: AtomicUsize,
}

impl InFlightTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one request until the returned guard drops.
    pub fn enter(&self) -> InFlightGuard<'_> {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        InFlightGuard { tracker: self }
    }
}

impl ConcurrencyLimiter for InFlightTracker {
    fn pending_count(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }
}

pub struct InFlightGuard<'a> {
    tracker: &'a InFlightTracker,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.tracker.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Keeps an [`InFlightTracker`] current for every non-probe request reaching
/// `next`. Probes pass through uncounted so they never show up in
/// `queue_depth`.
pub struct InFlightHandler<H> {
    next: H,
    tracker: Arc<InFlightTracker>,
}

impl<H: Handler> InFlightHandler<H> {
    pub fn new(next: H, tracker: Arc<InFlightTracker>) -> Self {
        Self { next, tracker }
    }
}

#[async_trait]
impl<H: Handler> Handler for InFlightHandler<H> {
    async fn serve(&self, w: &mut dyn ResponseWriter, req: &Request<Bytes>) {
        if is_probe(req.headers()) {
            self.next.serve(w, req).await;
            return;
        }
        let _guard = self.tracker.enter();
        self.next.serve(w, req).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use axum::http::{HeaderValue, StatusCode};
    use qpmetrics_core::tags::PROBE_HEADER;

    use super::*;
    use crate::handler::ResponseRecorder;

    /// Notes the tracker's count while it is inside the chain.
    struct SeenCount {
        tracker: Arc<InFlightTracker>,
        seen: Arc<Mutex<Vec<usize>>>,
    }

    #[async_trait]
    impl Handler for SeenCount {
        async fn serve(&self, w: &mut dyn ResponseWriter, _req: &Request<Bytes>) {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(self.tracker.pending_count());
            }
            w.write_header(StatusCode::OK);
        }
    }

    #[test]
    fn guard_tracks_in_flight() {
        let tracker = InFlightTracker::new();
        assert_eq!(tracker.pending_count(), 0);
        let a = tracker.enter();
        let b = tracker.enter();
        assert_eq!(tracker.pending_count(), 2);
        drop(a);
        assert_eq!(tracker.pending_count(), 1);
        drop(b);
        assert_eq!(tracker.pending_count(), 0);
    }

    #[test]
    fn guard_released_on_panic() {
        let tracker = InFlightTracker::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _g = tracker.enter();
            panic!("no!");
        }));
        assert!(result.is_err());
        assert_eq!(tracker.pending_count(), 0);
    }

    #[test]
    fn sampler_reads_without_mutating() {
        let tracker = Arc::new(InFlightTracker::new());
        let _g = tracker.enter();
        let sampler = ConcurrencySampler::new(tracker.clone());
        assert_eq!(sampler.sample(), 1);
        assert_eq!(sampler.sample(), 1);
        assert_eq!(tracker.pending_count(), 1);
    }

    #[tokio::test]
    async fn health_checks_are_not_counted_in_flight() {
        let tracker = Arc::new(InFlightTracker::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let inner = SeenCount {
            tracker: tracker.clone(),
            seen: seen.clone(),
        };
        let handler = InFlightHandler::new(inner, tracker.clone());

        let mut checked = Request::new(Bytes::new());
        checked
            .headers_mut()
            .insert(PROBE_HEADER, HeaderValue::from_static("queue"));
        let plain = Request::new(Bytes::new());

        let mut w = ResponseRecorder::new();
        handler.serve(&mut w, &checked).await;
        let mut w = ResponseRecorder::new();
        handler.serve(&mut w, &plain).await;

        assert_eq!(*seen.lock().unwrap(), vec![0, 1]);
        assert_eq!(tracker.pending_count(), 0);
    }
}
