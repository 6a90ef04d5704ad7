use std::collections::HashMap;
use std::net::SocketAddr;

use serde::Deserialize;

use qpmetrics_core::error::{QueueProxyError, Result};
use qpmetrics_core::resource::RevisionIdentity;

const MAX_BODY_BYTES_LIMIT: usize = 64 * 1024 * 1024;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProxyConfig {
    pub version: u32,

    #[serde(default)]
    pub proxy: ProxySection,

    pub identity: IdentitySection,

    #[serde(default)]
    pub metrics: MetricsSection,
}

impl ProxyConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(QueueProxyError::UnsupportedVersion);
        }
        self.proxy.validate()?;
        self.identity.validate()?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProxySection {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ProxySection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl ProxySection {
    pub fn validate(&self) -> Result<()> {
        self.listen_addr()?;
        if !(1..=MAX_BODY_BYTES_LIMIT).contains(&self.max_body_bytes) {
            return Err(QueueProxyError::BadConfig(format!(
                "proxy.max_body_bytes must be between 1 and {MAX_BODY_BYTES_LIMIT}"
            )));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen.parse().map_err(|e| {
            QueueProxyError::BadConfig(format!("proxy.listen must be a valid SocketAddr: {e}"))
        })
    }
}

fn default_listen() -> String {
    "0.0.0.0:8012".into()
}
fn default_max_body_bytes() -> usize {
    4 * 1024 * 1024
}

/// Revision identity reported on every metric.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdentitySection {
    pub namespace: String,
    pub service: String,
    pub configuration: String,
    pub revision: String,
    pub pod: String,

    #[serde(default)]
    pub annotations: HashMap<String, String>,

    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl IdentitySection {
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("namespace", &self.namespace),
            ("service", &self.service),
            ("configuration", &self.configuration),
            ("revision", &self.revision),
            ("pod", &self.pod),
        ];
        for (name, value) in fields {
            if value.is_empty() {
                return Err(QueueProxyError::BadConfig(format!(
                    "identity.{name} must not be empty"
                )));
            }
        }
        Ok(())
    }

    pub fn to_identity(&self) -> RevisionIdentity {
        RevisionIdentity::new(
            self.namespace.as_str(),
            self.service.as_str(),
            self.configuration.as_str(),
            self.revision.as_str(),
            self.pod.as_str(),
        )
        .with_annotations(self.annotations.clone())
        .with_labels(self.labels.clone())
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct MetricsSection {
    /// Also meter the user-container hop (`app_*` metrics and `queue_depth`).
    #[serde(default)]
    pub app_metrics: bool,
}
