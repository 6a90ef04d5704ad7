//! Revision identity and the resource descriptor attached to every series.

use std::collections::{BTreeMap, HashMap};

use crate::error::{QueueProxyError, Result};
use crate::tags::{TagSet, LABEL_CONTAINER_NAME, LABEL_POD_NAME, QUEUE_PROXY_CONTAINER};

/// Resource type of every descriptor built here.
pub const REVISION_RESOURCE_TYPE: &str = "knative_revision";

pub const LABEL_NAMESPACE_NAME: &str = "namespace_name";
pub const LABEL_SERVICE_NAME: &str = "service_name";
pub const LABEL_CONFIGURATION_NAME: &str = "configuration_name";
pub const LABEL_REVISION_NAME: &str = "revision_name";

/// Who this sidecar reports as.
#[derive(Debug, Clone, Default)]
pub struct RevisionIdentity {
    pub namespace: String,
    pub service: String,
    pub configuration: String,
    pub revision: String,
    pub pod: String,
    /// Extra resource labels sourced from revision annotations.
    pub annotations: HashMap<String, String>,
    /// Extra resource labels sourced from revision labels.
    pub labels: HashMap<String, String>,
}

impl RevisionIdentity {
    pub fn new(
        namespace: impl Into<String>,
        service: impl Into<String>,
        configuration: impl Into<String>,
        revision: impl Into<String>,
        pod: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            service: service.into(),
            configuration: configuration.into(),
            revision: revision.into(),
            pod: pod.into(),
            annotations: HashMap::new(),
            labels: HashMap::new(),
        }
    }

    pub fn with_annotations(mut self, annotations: HashMap<String, String>) -> Self {
        self.annotations = annotations;
        self
    }

    pub fn with_labels(mut self, labels: HashMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    /// Every identity string becomes a label value and must be ASCII.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            (LABEL_NAMESPACE_NAME, &self.namespace),
            (LABEL_SERVICE_NAME, &self.service),
            (LABEL_CONFIGURATION_NAME, &self.configuration),
            (LABEL_REVISION_NAME, &self.revision),
            (LABEL_POD_NAME, &self.pod),
        ];
        for (label, value) in fields {
            if !value.is_ascii() {
                return Err(QueueProxyError::InvalidTagValue {
                    label,
                    value: value.clone(),
                });
            }
        }
        Ok(())
    }

    /// Tags shared by every request served by one handler instance.
    pub fn pod_tags(&self) -> TagSet {
        TagSet::new()
            .with(LABEL_POD_NAME, self.pod.as_str())
            .with(LABEL_CONTAINER_NAME, QUEUE_PROXY_CONTAINER)
    }
}

/// Immutable `{type, labels}` record identifying the reporting revision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceDescriptor {
    kind: String,
    labels: BTreeMap<String, String>,
}

impl ResourceDescriptor {
    pub fn new(kind: impl Into<String>, labels: BTreeMap<String, String>) -> Self {
        Self {
            kind: kind.into(),
            labels,
        }
    }

    /// Build the `knative_revision` descriptor for a validated identity.
    ///
    /// Annotations are merged first, then labels, then the four identity
    /// labels, so identity always wins on key collisions.
    pub fn for_revision(identity: &RevisionIdentity) -> Self {
        let mut labels = BTreeMap::new();
        for (k, v) in identity.annotations.iter().chain(identity.labels.iter()) {
            labels.insert(k.clone(), v.clone());
        }
        labels.insert(LABEL_NAMESPACE_NAME.into(), identity.namespace.clone());
        labels.insert(LABEL_SERVICE_NAME.into(), identity.service.clone());
        labels.insert(LABEL_CONFIGURATION_NAME.into(), identity.configuration.clone());
        labels.insert(LABEL_REVISION_NAME.into(), identity.revision.clone());
        Self::new(REVISION_RESOURCE_TYPE, labels)
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    pub fn labels(&self) -> impl Iterator<Item = (&str, &str)> {
        self.labels.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
