//! HTTP health probe (GET or POST) with fail-closed error handling.

use super::{HealthCheckConfig, HttpMethod};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const FALLBACK_TIMEOUT: Duration = Duration::from_secs(1);

/// Calls a health endpoint and maps the response status to healthy/unhealthy.
///
/// Healthy iff the status is 2xx or in the acceptable-status whitelist.
/// Connection failures and timeouts count as unhealthy.
#[derive(Clone)]
pub struct HttpProbe {
    config: Arc<HealthCheckConfig>,
    agent: ureq::Agent,
}

impl fmt::Debug for HttpProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpProbe")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl HttpProbe {
    pub fn new(config: HealthCheckConfig) -> Self {
        let timeout = Duration::try_from_secs_f64(config.timeout_secs)
            .ok()
            .filter(|timeout| !timeout.is_zero())
            .unwrap_or(FALLBACK_TIMEOUT);

        // Status codes are evaluated here, not turned into errors by ureq.
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();

        Self {
            config: Arc::new(config),
            agent,
        }
    }

    /// Runs the blocking request on tokio's blocking pool.
    pub async fn is_healthy(&self) -> bool {
        let probe = self.clone();
        match tokio::task::spawn_blocking(move || probe.check()).await {
            Ok(healthy) => healthy,
            Err(e) => {
                error!("Health check task failed: {}", e);
                false
            }
        }
    }

    pub fn accepts(&self, status: u16) -> bool {
        status / 100 == 2 || self.config.acceptable_status_codes.contains(&status)
    }

    fn check(&self) -> bool {
        let url = self.config.url.as_str();
        match self.send() {
            Ok(status) => {
                let healthy = self.accepts(status);
                info!(url, status, healthy, "Checked health");
                healthy
            }
            Err(ureq::Error::Timeout(kind)) => {
                warn!(url, "Health check timed out ({:?})", kind);
                false
            }
            Err(
                e @ (ureq::Error::Io(_)
                | ureq::Error::ConnectionFailed
                | ureq::Error::HostNotFound),
            ) => {
                warn!(url, "Unable to connect to health check url: {}", e);
                false
            }
            Err(e) => {
                error!(url, "Error while performing health check: {}", e);
                false
            }
        }
    }

    fn send(&self) -> Result<u16, ureq::Error> {
        let url = self.config.url.as_str();
        let response = match self.config.method {
            HttpMethod::Get => {
                let mut request = self.agent.get(url);
                for (name, value) in &self.config.headers {
                    request = request.header(name.as_str(), value.as_str());
                }
                request.call()?
            }
            HttpMethod::Post => {
                let mut request = self.agent.post(url);
                for (name, value) in &self.config.headers {
                    request = request.header(name.as_str(), value.as_str());
                }
                let body = self.config.body.as_deref().unwrap_or_default();
                request.send(body.as_bytes())?
            }
        };
        Ok(response.status().as_u16())
    }
}
