//! Process-wide metric registry for the request metrics handlers.
//!
//! Instruments are registered by name and hold labeled series keyed by
//! `(resource, tags)`. Series values live in atomics inside `DashMap`s so any
//! number of requests can record concurrently without losing updates.
//! Registration and reset are explicit; tests call `reset` between cases
//! instead of relying on process-global state.

use std::collections::HashSet;
use std::fmt::Write;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use qpmetrics_core::error::{QueueProxyError, Result};
use qpmetrics_core::{ResourceDescriptor, TagSet};

/// Helper to escape label values.
fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

type SeriesKey = (Arc<ResourceDescriptor>, TagSet);

fn series_key(resource: &Arc<ResourceDescriptor>, tags: &TagSet) -> SeriesKey {
    (Arc::clone(resource), tags.clone())
}

/// Map a label name onto `[a-zA-Z_][a-zA-Z0-9_]*`.
fn sanitize_label_name(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// Resource labels followed by tag labels, in Prometheus label syntax.
///
/// Resource labels (annotation keys included) are sanitized; one whose name
/// collides with a tag label, `le`, or an earlier resource label is dropped.
fn label_str(key: &SeriesKey) -> String {
    let (resource, tags) = key;
    let mut taken: HashSet<String> = tags.iter().map(|(k, _)| sanitize_label_name(k)).collect();
    taken.insert("le".to_string());

    let mut pairs = Vec::with_capacity(tags.len() + 4);
    for (k, v) in resource.labels() {
        let name = sanitize_label_name(k);
        if taken.insert(name.clone()) {
            pairs.push((name, v));
        }
    }
    for (k, v) in tags.iter() {
        pairs.push((sanitize_label_name(k), v));
    }

    pairs
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label(v)))
        .collect::<Vec<_>>()
        .join(",")
}

fn sorted_labels<V>(map: &DashMap<SeriesKey, V>) -> Vec<(SeriesKey, String)> {
    let mut keys: Vec<_> = map
        .iter()
        .map(|r| {
            let key = r.key().clone();
            let labels = label_str(&key);
            (key, labels)
        })
        .collect();
    keys.sort_by(|a, b| a.1.cmp(&b.1));
    keys
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentKind {
    /// Monotonic count.
    Counter,
    /// Bucketed sample of millisecond values.
    Distribution,
    /// Last value wins.
    Gauge,
}

impl InstrumentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            InstrumentKind::Counter => "counter",
            InstrumentKind::Distribution => "distribution",
            InstrumentKind::Gauge => "gauge",
        }
    }

    fn prometheus_type(self) -> &'static str {
        match self {
            InstrumentKind::Counter => "counter",
            InstrumentKind::Distribution => "histogram",
            InstrumentKind::Gauge => "gauge",
        }
    }
}

/// Static description of a named instrument.
#[derive(Debug, Clone, Copy)]
pub struct InstrumentDesc {
    pub name: &'static str,
    pub kind: InstrumentKind,
    pub help: &'static str,
}

pub const REQUEST_COUNT: InstrumentDesc = InstrumentDesc {
    name: "request_count",
    kind: InstrumentKind::Counter,
    help: "The number of requests that are routed to queue-proxy",
};

pub const REQUEST_LATENCIES: InstrumentDesc = InstrumentDesc {
    name: "request_latencies",
    kind: InstrumentKind::Distribution,
    help: "The response time in millisecond",
};

pub const APP_REQUEST_COUNT: InstrumentDesc = InstrumentDesc {
    name: "app_request_count",
    kind: InstrumentKind::Counter,
    help: "The number of requests that are routed to user-container",
};

pub const APP_REQUEST_LATENCIES: InstrumentDesc = InstrumentDesc {
    name: "app_request_latencies",
    kind: InstrumentKind::Distribution,
    help: "The response time in millisecond",
};

pub const QUEUE_DEPTH: InstrumentDesc = InstrumentDesc {
    name: "queue_depth",
    kind: InstrumentKind::Gauge,
    help: "The current number of items in the serving and waiting queue, or not reported if unlimited concurrency",
};

#[derive(Default)]
pub struct CounterVec {
    map: DashMap<SeriesKey, AtomicU64>,
}

impl CounterVec {
    /// Increment by an arbitrary value.
    pub fn add(&self, resource: &Arc<ResourceDescriptor>, tags: &TagSet, v: u64) {
        let counter = self
            .map
            .entry(series_key(resource, tags))
            .or_insert_with(|| AtomicU64::new(0));
        counter.fetch_add(v, Ordering::Relaxed);
    }

    pub fn get(&self, resource: &Arc<ResourceDescriptor>, tags: &TagSet) -> Option<u64> {
        self.map
            .get(&series_key(resource, tags))
            .map(|c| c.load(Ordering::Relaxed))
    }

    /// Sum over every series.
    pub fn total(&self) -> u64 {
        self.map.iter().map(|r| r.value().load(Ordering::Relaxed)).sum()
    }

    fn render(&self, name: &str, out: &mut String) {
        for (key, labels) in sorted_labels(&self.map) {
            let val = self.map.get(&key).map_or(0, |c| c.load(Ordering::Relaxed));
            let _ = writeln!(out, "{}{{{}}} {}", name, labels, val);
        }
    }
}

#[derive(Default)]
pub struct GaugeVec {
    map: DashMap<SeriesKey, AtomicI64>,
}

impl GaugeVec {
    pub fn set(&self, resource: &Arc<ResourceDescriptor>, tags: &TagSet, v: i64) {
        let gauge = self
            .map
            .entry(series_key(resource, tags))
            .or_insert_with(|| AtomicI64::new(0));
        gauge.store(v, Ordering::Relaxed);
    }

    pub fn get(&self, resource: &Arc<ResourceDescriptor>, tags: &TagSet) -> Option<i64> {
        self.map
            .get(&series_key(resource, tags))
            .map(|g| g.load(Ordering::Relaxed))
    }

    fn render(&self, name: &str, out: &mut String) {
        for (key, labels) in sorted_labels(&self.map) {
            let val = self.map.get(&key).map_or(0, |g| g.load(Ordering::Relaxed));
            let _ = writeln!(out, "{}{{{}}} {}", name, labels, val);
        }
    }
}

/// Upper bounds (milliseconds) of the latency buckets.
pub const LATENCY_BUCKETS_MS: [f64; 26] = [
    5.0, 10.0, 20.0, 40.0, 60.0, 80.0, 100.0, 150.0, 200.0, 250.0, 300.0, 350.0, 400.0, 450.0,
    500.0, 600.0, 700.0, 800.0, 900.0, 1000.0, 2000.0, 5000.0, 10000.0, 20000.0, 50000.0,
    100000.0,
];

struct AtomicDistribution {
    count: AtomicU64,
    sum_bits: AtomicU64,
    buckets: [AtomicU64; LATENCY_BUCKETS_MS.len()],
}

impl Default for AtomicDistribution {
    fn default() -> Self {
        Self {
            count: AtomicU64::new(0),
            sum_bits: AtomicU64::new(0f64.to_bits()),
            buckets: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }
}

impl AtomicDistribution {
    fn observe(&self, value: f64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        // The closure always returns Some, so this never fails.
        let _ = self
            .sum_bits
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                Some((f64::from_bits(bits) + value).to_bits())
            });

        // Cumulative buckets: every bound >= value.
        for (i, &le) in LATENCY_BUCKETS_MS.iter().enumerate() {
            if value <= le {
                self.buckets[i].fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn snapshot(&self) -> DistributionSnapshot {
        DistributionSnapshot {
            count: self.count.load(Ordering::Relaxed),
            sum: f64::from_bits(self.sum_bits.load(Ordering::Relaxed)),
            buckets: LATENCY_BUCKETS_MS
                .iter()
                .zip(self.buckets.iter())
                .map(|(&le, b)| (le, b.load(Ordering::Relaxed)))
                .collect(),
        }
    }
}

/// Point-in-time view of one distribution series.
#[derive(Debug, Clone, PartialEq)]
pub struct DistributionSnapshot {
    pub count: u64,
    /// Sum of observed values, in milliseconds.
    pub sum: f64,
    /// `(upper bound, cumulative count)` pairs.
    pub buckets: Vec<(f64, u64)>,
}

#[derive(Default)]
pub struct DistributionVec {
    map: DashMap<SeriesKey, AtomicDistribution>,
}

impl DistributionVec {
    pub fn observe(&self, resource: &Arc<ResourceDescriptor>, tags: &TagSet, value_ms: f64) {
        let dist = self
            .map
            .entry(series_key(resource, tags))
            .or_insert_with(AtomicDistribution::default);
        dist.observe(value_ms);
    }

    pub fn get(
        &self,
        resource: &Arc<ResourceDescriptor>,
        tags: &TagSet,
    ) -> Option<DistributionSnapshot> {
        self.map.get(&series_key(resource, tags)).map(|d| d.snapshot())
    }

    fn render(&self, name: &str, out: &mut String) {
        for (key, labels) in sorted_labels(&self.map) {
            let Some(snap) = self.map.get(&key).map(|d| d.snapshot()) else {
                continue;
            };
            let prefix = if labels.is_empty() {
                String::new()
            } else {
                format!("{},", labels)
            };
            for (le, count) in &snap.buckets {
                let _ = writeln!(out, "{}_bucket{{{}le=\"{}\"}} {}", name, prefix, le, count);
            }
            let _ = writeln!(out, "{}_bucket{{{}le=\"+Inf\"}} {}", name, prefix, snap.count);
            let _ = writeln!(out, "{}_sum{{{}}} {}", name, labels, snap.sum);
            let _ = writeln!(out, "{}_count{{{}}} {}", name, labels, snap.count);
        }
    }
}

enum Instrument {
    Counter(CounterVec),
    Distribution(DistributionVec),
    Gauge(GaugeVec),
}

impl Instrument {
    fn new(kind: InstrumentKind) -> Self {
        match kind {
            InstrumentKind::Counter => Instrument::Counter(CounterVec::default()),
            InstrumentKind::Distribution => Instrument::Distribution(DistributionVec::default()),
            InstrumentKind::Gauge => Instrument::Gauge(GaugeVec::default()),
        }
    }

    fn kind(&self) -> InstrumentKind {
        match self {
            Instrument::Counter(_) => InstrumentKind::Counter,
            Instrument::Distribution(_) => InstrumentKind::Distribution,
            Instrument::Gauge(_) => InstrumentKind::Gauge,
        }
    }
}

struct Registered {
    desc: InstrumentDesc,
    instrument: Instrument,
}

fn mismatch(name: &str, expected: InstrumentKind, actual: InstrumentKind) -> QueueProxyError {
    QueueProxyError::InstrumentKindMismatch {
        name: name.to_string(),
        expected: expected.as_str(),
        actual: actual.as_str(),
    }
}

/// Named set of counters, distributions, and gauges.
///
/// Share one registry per process (or per test) behind an `Arc`.
#[derive(Default)]
pub struct MetricRegistry {
    instruments: DashMap<String, Registered>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register instruments. Re-registering an existing name with the same
    /// kind is a no-op and keeps accumulated state.
    pub fn register(&self, descs: &[&InstrumentDesc]) -> Result<()> {
        for desc in descs {
            let entry = self
                .instruments
                .entry(desc.name.to_string())
                .or_insert_with(|| Registered {
                    desc: **desc,
                    instrument: Instrument::new(desc.kind),
                });
            let actual = entry.instrument.kind();
            if actual != desc.kind {
                return Err(mismatch(desc.name, desc.kind, actual));
            }
        }
        Ok(())
    }

    /// Drop the named instruments and everything they accumulated.
    /// Unknown names are ignored.
    pub fn reset(&self, names: &[&str]) {
        for name in names {
            if self.instruments.remove(*name).is_some() {
                tracing::debug!(instrument = %name, "metric instrument reset");
            }
        }
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.instruments.contains_key(name)
    }

    /// Increment a counter by one.
    pub fn record(&self, name: &str, tags: &TagSet, resource: &Arc<ResourceDescriptor>) -> Result<()> {
        let reg = self
            .instruments
            .get(name)
            .ok_or_else(|| QueueProxyError::UnknownInstrument(name.to_string()))?;
        match &reg.instrument {
            Instrument::Counter(c) => {
                c.add(resource, tags, 1);
                Ok(())
            }
            other => Err(mismatch(name, InstrumentKind::Counter, other.kind())),
        }
    }

    /// Add a millisecond sample to a distribution.
    pub fn observe(
        &self,
        name: &str,
        value_ms: f64,
        tags: &TagSet,
        resource: &Arc<ResourceDescriptor>,
    ) -> Result<()> {
        let reg = self
            .instruments
            .get(name)
            .ok_or_else(|| QueueProxyError::UnknownInstrument(name.to_string()))?;
        match &reg.instrument {
            Instrument::Distribution(d) => {
                d.observe(resource, tags, value_ms);
                Ok(())
            }
            other => Err(mismatch(name, InstrumentKind::Distribution, other.kind())),
        }
    }

    pub fn set_gauge(
        &self,
        name: &str,
        value: i64,
        tags: &TagSet,
        resource: &Arc<ResourceDescriptor>,
    ) -> Result<()> {
        let reg = self
            .instruments
            .get(name)
            .ok_or_else(|| QueueProxyError::UnknownInstrument(name.to_string()))?;
        match &reg.instrument {
            Instrument::Gauge(g) => {
                g.set(resource, tags, value);
                Ok(())
            }
            other => Err(mismatch(name, InstrumentKind::Gauge, other.kind())),
        }
    }

    pub fn counter_value(
        &self,
        name: &str,
        tags: &TagSet,
        resource: &Arc<ResourceDescriptor>,
    ) -> Option<u64> {
        match &self.instruments.get(name)?.instrument {
            Instrument::Counter(c) => c.get(resource, tags),
            _ => None,
        }
    }

    /// Sum of a counter across all of its series (0 when unregistered).
    pub fn counter_total(&self, name: &str) -> u64 {
        match self.instruments.get(name) {
            Some(reg) => match &reg.instrument {
                Instrument::Counter(c) => c.total(),
                _ => 0,
            },
            None => 0,
        }
    }

    pub fn distribution(
        &self,
        name: &str,
        tags: &TagSet,
        resource: &Arc<ResourceDescriptor>,
    ) -> Option<DistributionSnapshot> {
        match &self.instruments.get(name)?.instrument {
            Instrument::Distribution(d) => d.get(resource, tags),
            _ => None,
        }
    }

    pub fn gauge_value(
        &self,
        name: &str,
        tags: &TagSet,
        resource: &Arc<ResourceDescriptor>,
    ) -> Option<i64> {
        match &self.instruments.get(name)?.instrument {
            Instrument::Gauge(g) => g.get(resource, tags),
            _ => None,
        }
    }

    /// Every `(resource, tags)` pair recorded for an instrument.
    pub fn series(&self, name: &str) -> Vec<(Arc<ResourceDescriptor>, TagSet)> {
        let Some(reg) = self.instruments.get(name) else {
            return Vec::new();
        };
        let mut keys: Vec<SeriesKey> = match &reg.instrument {
            Instrument::Counter(c) => c.map.iter().map(|r| r.key().clone()).collect(),
            Instrument::Distribution(d) => d.map.iter().map(|r| r.key().clone()).collect(),
            Instrument::Gauge(g) => g.map.iter().map(|r| r.key().clone()).collect(),
        };
        keys.sort();
        keys
    }

    /// Render all registered instruments in Prometheus text exposition format.
    pub fn render_prometheus(&self) -> String {
        let mut names: Vec<String> = self.instruments.iter().map(|r| r.key().clone()).collect();
        names.sort();

        let mut out = String::new();
        for name in names {
            let Some(reg) = self.instruments.get(&name) else {
                continue;
            };
            let _ = writeln!(out, "# HELP {} {}", name, reg.desc.help);
            let _ = writeln!(out, "# TYPE {} {}", name, reg.desc.kind.prometheus_type());
            match &reg.instrument {
                Instrument::Counter(c) => c.render(&name, &mut out),
                Instrument::Distribution(d) => d.render(&name, &mut out),
                Instrument::Gauge(g) => g.render(&name, &mut out),
            }
        }
        out
    }
}
