//! Daemon configuration: YAML file plus command-line overrides.
//!
//! Both sources produce a [`FileConfig`] with every field optional. The CLI
//! layer is overlaid on the file layer and the result is resolved into
//! validated [`Settings`]; anything still missing is a startup error.

use crate::health::{default_headers, default_timeout_secs, HealthCheckConfig, HttpMethod};
use crate::registry::{ClusterDetails, Environment, ServiceDetails, DEFAULT_NAMESPACE};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

const DEFAULT_INTERVAL_SECS: u64 = 1;

/// One layer of configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub zk_connection_string: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub environment: Option<Environment>,
    /// Update interval in whole seconds.
    #[serde(default)]
    pub interval: Option<u64>,
    #[serde(default)]
    pub health: HealthSection,
}

/// Health endpoint settings; the probe is enabled by `url`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HealthSection {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub method: Option<HttpMethod>,
    #[serde(default)]
    pub headers: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<f64>,
    #[serde(default)]
    pub acceptable_status_codes: Option<Vec<u16>>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file as YAML: {}", path.display()))
    }

    /// Fields set in `top` win over fields set in `self`.
    pub fn overlay(self, top: FileConfig) -> FileConfig {
        FileConfig {
            zk_connection_string: top.zk_connection_string.or(self.zk_connection_string),
            namespace: top.namespace.or(self.namespace),
            service: top.service.or(self.service),
            host: top.host.or(self.host),
            port: top.port.or(self.port),
            environment: top.environment.or(self.environment),
            interval: top.interval.or(self.interval),
            health: self.health.overlay(top.health),
        }
    }
}

impl HealthSection {
    fn overlay(self, top: HealthSection) -> HealthSection {
        HealthSection {
            url: top.url.or(self.url),
            method: top.method.or(self.method),
            headers: top.headers.or(self.headers),
            body: top.body.or(self.body),
            timeout_secs: top.timeout_secs.or(self.timeout_secs),
            acceptable_status_codes: top.acceptable_status_codes.or(self.acceptable_status_codes),
        }
    }

    fn is_empty(&self) -> bool {
        *self == HealthSection::default()
    }

    fn resolve(mut self) -> Result<Option<HealthCheckConfig>> {
        let Some(url) = self.url.take() else {
            if !self.is_empty() {
                bail!("Health check settings given without a health url");
            }
            return Ok(None);
        };
        if url.trim().is_empty() {
            bail!("Health url must not be empty");
        }

        let timeout_secs = self.timeout_secs.unwrap_or_else(default_timeout_secs);
        if !timeout_secs.is_finite() || timeout_secs <= 0.0 {
            bail!("Health timeout must be a positive number of seconds, got {}", timeout_secs);
        }
        if let Some(code) = self
            .acceptable_status_codes
            .iter()
            .flatten()
            .find(|code| !(100..=599).contains(*code))
        {
            bail!("Acceptable status code out of range: {}", code);
        }

        Ok(Some(HealthCheckConfig {
            url,
            method: self.method.unwrap_or_default(),
            headers: self.headers.unwrap_or_else(default_headers),
            body: self.body,
            timeout_secs,
            acceptable_status_codes: self.acceptable_status_codes.unwrap_or_default(),
        }))
    }
}

/// Fully resolved daemon settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub cluster: ClusterDetails,
    pub service: ServiceDetails,
    pub health: Option<HealthCheckConfig>,
}

impl Settings {
    /// Reads the optional config file and overlays the CLI layer on it.
    pub fn load(config_path: Option<&Path>, cli: FileConfig) -> Result<Self> {
        let file = match config_path {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::resolve(file.overlay(cli))
    }

    pub fn resolve(config: FileConfig) -> Result<Self> {
        let connection_string = config.zk_connection_string.context(
            "Missing ZooKeeper connection string (--zk-connection-string or zk_connection_string)",
        )?;
        let cluster = ClusterDetails::new(
            connection_string,
            config.interval.unwrap_or(DEFAULT_INTERVAL_SECS),
        )?;

        let service = ServiceDetails::new(
            config.host.context("Missing host (--host or host)")?,
            config.port.context("Missing port (--port or port)")?,
            config
                .environment
                .context("Missing environment (--environment or environment)")?,
            config
                .namespace
                .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            config.service.context("Missing service name (--service or service)")?,
        )?;

        let health = config.health.resolve().context("Invalid health check settings")?;

        Ok(Self {
            cluster,
            service,
            health,
        })
    }
}

/// Parses a `Name: value` header argument.
pub fn parse_header(raw: &str) -> Result<(String, String)> {
    let Some((name, value)) = raw.split_once(':') else {
        bail!("Header must look like 'Name: value', got '{}'", raw);
    };
    let name = name.trim();
    if name.is_empty() {
        bail!("Header name must not be empty in '{}'", raw);
    }
    Ok((name.to_string(), value.trim().to_string()))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
