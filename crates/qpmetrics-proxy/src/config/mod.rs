//! Sidecar config loader (strict parsing).

pub mod schema;

use std::fs;

use qpmetrics_core::error::{QueueProxyError, Result};

pub use schema::{IdentitySection, MetricsSection, ProxyConfig, ProxySection};

pub fn load_from_file(path: &str) -> Result<ProxyConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| QueueProxyError::Internal(format!("read config failed ({path}): {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<ProxyConfig> {
    let cfg: ProxyConfig = serde_yaml::from_str(s)
        .map_err(|e| QueueProxyError::BadConfig(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
