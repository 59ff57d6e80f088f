//! Registration data model: what gets written to the tree, and where.

use crate::coordination::BackoffPolicy;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Default namespace for discovery paths.
pub const DEFAULT_NAMESPACE: &str = "org";

/// Default timeout for a single coordination request.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Deployment environment advertised in the node payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Stage,
    Prod,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Stage => "stage",
            Environment::Prod => "prod",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Health state reported in each heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthcheckStatus {
    Healthy,
    Unhealthy,
}

impl From<bool> for HealthcheckStatus {
    fn from(healthy: bool) -> Self {
        if healthy {
            HealthcheckStatus::Healthy
        } else {
            HealthcheckStatus::Unhealthy
        }
    }
}

/// Identity of the registered service instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceDetails {
    host: String,
    port: u16,
    environment: Environment,
    namespace: String,
    service: String,
}

impl ServiceDetails {
    /// Validates and builds service details.
    ///
    /// Host, namespace and service must be non-empty single path segments and
    /// the port must be in `1..=65535`.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        environment: Environment,
        namespace: impl Into<String>,
        service: impl Into<String>,
    ) -> Result<Self> {
        let details = Self {
            host: host.into(),
            port,
            environment,
            namespace: namespace.into(),
            service: service.into(),
        };
        details.validate()?;
        Ok(details)
    }

    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            bail!("Port must be in 1..=65535, got 0");
        }
        for (field, value) in [
            ("host", &self.host),
            ("namespace", &self.namespace),
            ("service", &self.service),
        ] {
            if value.trim().is_empty() {
                bail!("Service {} must not be empty", field);
            }
            if value.contains('/') {
                bail!("Service {} must not contain '/': {}", field, value);
            }
        }
        Ok(())
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// `/{namespace}/{service}`
    pub fn root_path(&self) -> String {
        format!("/{}/{}", self.namespace, self.service)
    }

    /// `/{namespace}/{service}/{host}:{port}`
    pub fn node_path(&self) -> String {
        format!("{}/{}:{}", self.root_path(), self.host, self.port)
    }

    /// Builds the payload for one heartbeat.
    pub fn to_node(&self, status: HealthcheckStatus, timestamp_ms: i64) -> ServiceNode {
        ServiceNode {
            host: self.host.clone(),
            port: self.port,
            node_data: NodeData {
                environment: self.environment,
            },
            healthcheck_status: status,
            last_updated_time_stamp: timestamp_ms,
        }
    }
}

/// Where and how often to publish.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterDetails {
    connection_string: String,
    update_interval_secs: u64,
    request_timeout: Duration,
    backoff: BackoffPolicy,
}

impl ClusterDetails {
    pub fn new(connection_string: impl Into<String>, update_interval_secs: u64) -> Result<Self> {
        let connection_string = connection_string.into();
        if connection_string.trim().is_empty() {
            bail!("Coordination connection string must not be empty");
        }
        if update_interval_secs == 0 {
            bail!("Update interval must be at least 1 second");
        }
        Ok(Self {
            connection_string,
            update_interval_secs,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            backoff: BackoffPolicy::default(),
        })
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn backoff(&self) -> BackoffPolicy {
        self.backoff
    }
}

/// Extra node attributes read by Ranger consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeData {
    pub environment: Environment,
}

/// The JSON payload stored at the node path.
///
/// Built fresh on every tick; field names match the Ranger data model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceNode {
    pub host: String,
    pub port: u16,
    pub node_data: NodeData,
    pub healthcheck_status: HealthcheckStatus,
    /// Epoch milliseconds.
    pub last_updated_time_stamp: i64,
}

impl ServiceNode {
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
