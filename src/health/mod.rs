//! Health probes gating the heartbeat status.
//!
//! A probe answers one question, "is the service healthy right now?", and
//! never fails: anything that prevents an answer counts as unhealthy.

mod http;

pub use http::HttpProbe;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// HTTP verb used by the health probe.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

/// Health endpoint settings, as read from the config file or the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    pub url: String,
    #[serde(default)]
    pub method: HttpMethod,
    /// Defaults to `Content-Type: application/json`.
    #[serde(default = "default_headers")]
    pub headers: BTreeMap<String, String>,
    /// Request body, sent with POST only.
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,
    /// Non-2xx status codes that still count as healthy.
    #[serde(default)]
    pub acceptable_status_codes: Vec<u16>,
}

impl HealthCheckConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: HttpMethod::default(),
            headers: default_headers(),
            body: None,
            timeout_secs: default_timeout_secs(),
            acceptable_status_codes: Vec::new(),
        }
    }
}

pub(crate) fn default_headers() -> BTreeMap<String, String> {
    BTreeMap::from([("Content-Type".to_string(), "application/json".to_string())])
}

pub(crate) fn default_timeout_secs() -> f64 {
    1.0
}

/// Health probe selected by configuration.
#[derive(Debug, Clone, Default)]
pub enum HealthProbe {
    /// No endpoint configured: always healthy.
    #[default]
    NoOp,
    Http(HttpProbe),
}

impl HealthProbe {
    pub fn from_config(config: Option<HealthCheckConfig>) -> Self {
        match config {
            Some(config) => HealthProbe::Http(HttpProbe::new(config)),
            None => HealthProbe::NoOp,
        }
    }

    pub async fn is_healthy(&self) -> bool {
        match self {
            HealthProbe::NoOp => true,
            HealthProbe::Http(probe) => probe.is_healthy().await,
        }
    }
}

#[cfg(test)]
#[path = "tests/http_tests.rs"]
mod tests;
