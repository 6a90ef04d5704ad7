//! Label names, request header names, and per-request tag derivation.

use std::collections::BTreeMap;
use std::fmt;

/// Label carrying the pod name.
pub const LABEL_POD_NAME: &str = "pod_name";
/// Label carrying the container name.
pub const LABEL_CONTAINER_NAME: &str = "container_name";
/// Label carrying the decimal response code.
pub const LABEL_RESPONSE_CODE: &str = "response_code";
/// Label carrying the response code class (`2xx`, `5xx`, ...).
pub const LABEL_RESPONSE_CODE_CLASS: &str = "response_code_class";
/// Label carrying the route tag.
pub const LABEL_ROUTE_TAG: &str = "route_tag";

/// Container name reported on every series.
pub const QUEUE_PROXY_CONTAINER: &str = "queue-proxy";

/// Liveness/readiness probes carry this header; probed requests are never metered.
pub const PROBE_HEADER: &str = "K-Network-Probe";
/// Name of the traffic split that routed the request.
pub const TAG_HEADER: &str = "Knative-Serving-Tag";
/// `"true"` when the request arrived through the default route.
pub const DEFAULT_ROUTE_HEADER: &str = "Knative-Serving-Default-Route";

const DISABLED_TAG: &str = "disabled";
const DEFAULT_TAG: &str = "default";
const UNDEFINED_TAG: &str = "undefined";

/// Route classification of a single request.
///
/// The named variant passes the tag header through unmodified, so its
/// cardinality is bounded only by the tags operators configure.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RouteTag {
    /// Tag-header routing is not engaged for this request.
    Disabled,
    /// Routed through the default route without a tag.
    Default,
    /// Tagged, but also flagged as default-routed.
    Undefined,
    /// Literal tag header value.
    Named(String),
}

impl RouteTag {
    /// Classify a request from its tag and default-route header values.
    ///
    /// Empty header values count as absent.
    pub fn resolve(tag: Option<&str>, default_route: Option<&str>) -> Self {
        let tag = tag.filter(|t| !t.is_empty());
        let is_default = default_route == Some("true");

        match (tag, is_default) {
            (Some(_), true) => RouteTag::Undefined,
            (Some(name), false) => RouteTag::Named(name.to_string()),
            (None, true) => RouteTag::Default,
            (None, false) => RouteTag::Disabled,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RouteTag::Disabled => DISABLED_TAG,
            RouteTag::Default => DEFAULT_TAG,
            RouteTag::Undefined => UNDEFINED_TAG,
            RouteTag::Named(name) => name,
        }
    }
}

impl fmt::Display for RouteTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `"{status / 100}xx"`, e.g. `503 -> "5xx"`.
pub fn response_code_class(status: u16) -> String {
    format!("{}xx", status / 100)
}

/// Ordered label set attached to a metric series.
///
/// Ordering is by label name, which keeps series keys and rendered output
/// deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TagSet(BTreeMap<String, String>);

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Handler-level tags augmented with the response outcome.
    pub fn with_response(&self, status: u16) -> Self {
        self.clone()
            .with(LABEL_RESPONSE_CODE, status.to_string())
            .with(LABEL_RESPONSE_CODE_CLASS, response_code_class(status))
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for TagSet {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        let mut set = TagSet::new();
        for (k, v) in iter {
            set.insert(k, v);
        }
        set
    }
}
