//! Shared application state for the qpmetrics sidecar.
//!
//! Builds the instrumented handler chain once at startup. Startup errors are
//! returned, never panicked on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use qpmetrics_core::error::Result;

use crate::config::ProxyConfig;
use crate::handler::{AppRequestMetricsHandler, Handler, RequestMetricsHandler};
use crate::limiter::{InFlightHandler, InFlightTracker};
use crate::obs::metrics::MetricRegistry;
use crate::services::EchoHandler;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
    handler: Arc<dyn Handler>,
}

struct AppStateInner {
    cfg: ProxyConfig,
    registry: Arc<MetricRegistry>,
    in_flight: Arc<InFlightTracker>,
    draining: AtomicBool,
}

impl AppState {
    /// Build application state with a fresh registry.
    pub fn new(cfg: ProxyConfig) -> Result<Self> {
        Self::with_registry(cfg, Arc::new(MetricRegistry::new()))
    }

    /// Build application state around an existing registry.
    ///
    /// Chain: request metrics -> in-flight tracking -> [app metrics] -> upstream.
    pub fn with_registry(cfg: ProxyConfig, registry: Arc<MetricRegistry>) -> Result<Self> {
        let identity = cfg.identity.to_identity();
        let in_flight = Arc::new(InFlightTracker::new());

        let upstream: Arc<dyn Handler> = if cfg.metrics.app_metrics {
            Arc::new(AppRequestMetricsHandler::new(
                EchoHandler::new(),
                in_flight.clone(),
                registry.clone(),
                &identity,
            )?)
        } else {
            Arc::new(EchoHandler::new())
        };

        let handler = RequestMetricsHandler::new(
            InFlightHandler::new(upstream, in_flight.clone()),
            registry.clone(),
            &identity,
        )?;

        tracing::info!(
            revision = %identity.revision,
            app_metrics = cfg.metrics.app_metrics,
            "handler chain built"
        );

        Ok(Self {
            inner: Arc::new(AppStateInner {
                cfg,
                registry,
                in_flight,
                draining: AtomicBool::new(false),
            }),
            handler: Arc::new(handler),
        })
    }

    pub fn cfg(&self) -> &ProxyConfig {
        &self.inner.cfg
    }

    pub fn registry(&self) -> Arc<MetricRegistry> {
        Arc::clone(&self.inner.registry)
    }

    pub fn in_flight(&self) -> Arc<InFlightTracker> {
        Arc::clone(&self.inner.in_flight)
    }

    pub fn handler(&self) -> Arc<dyn Handler> {
        Arc::clone(&self.handler)
    }

    /// Mark draining state (readiness starts failing).
    pub fn set_draining(&self) {
        self.inner.draining.store(true, Ordering::Relaxed);
    }

    pub fn is_draining(&self) -> bool {
        self.inner.draining.load(Ordering::Relaxed)
    }
}
