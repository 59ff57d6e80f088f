use anyhow::Result;
use clap::Parser;
use ranger_provider::config::{parse_header, FileConfig, HealthSection, Settings};
use ranger_provider::{logging, Environment, HealthProbe, HttpMethod, ServiceProvider};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("RANGER_PROVIDER_GIT_SHA"),
    ")"
);

#[derive(Parser)]
#[command(name = "ranger-daemon")]
#[command(about = "Registers this service instance in ZooKeeper for Ranger discovery")]
#[command(version = VERSION)]
struct Cli {
    /// ZooKeeper connection string, e.g. zk1:2181,zk2:2181
    #[arg(short = 'z', long)]
    zk_connection_string: Option<String>,

    /// Namespace under the tree root [default: org]
    #[arg(short, long)]
    namespace: Option<String>,

    /// Service name
    #[arg(short, long)]
    service: Option<String>,

    /// Host advertised to consumers
    #[arg(long)]
    host: Option<String>,

    /// Port advertised to consumers
    #[arg(short, long)]
    port: Option<u16>,

    /// Deployment environment advertised in the node payload
    #[arg(short, long, value_enum)]
    environment: Option<Environment>,

    /// Seconds between heartbeats [default: 1]
    #[arg(short, long)]
    interval: Option<u64>,

    /// Health endpoint; enables the HTTP probe
    #[arg(long)]
    health_url: Option<String>,

    /// [default: get]
    #[arg(long, value_enum)]
    health_method: Option<HttpMethod>,

    /// Request header as 'Name: value' (repeatable) [default: Content-Type: application/json]
    #[arg(long = "health-header", value_parser = parse_header)]
    health_headers: Vec<(String, String)>,

    /// Request body for POST probes
    #[arg(long)]
    health_body: Option<String>,

    /// Probe timeout in seconds [default: 1.0]
    #[arg(long)]
    health_timeout: Option<f64>,

    /// Non-2xx status codes that still count as healthy (repeatable or comma-separated)
    #[arg(long = "acceptable-status", value_delimiter = ',')]
    acceptable_statuses: Vec<u16>,

    /// YAML file with the same settings; flags take precedence
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Append logs to this file instead of stdout
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn overrides(&self) -> FileConfig {
        FileConfig {
            zk_connection_string: self.zk_connection_string.clone(),
            namespace: self.namespace.clone(),
            service: self.service.clone(),
            host: self.host.clone(),
            port: self.port,
            environment: self.environment,
            interval: self.interval,
            health: HealthSection {
                url: self.health_url.clone(),
                method: self.health_method,
                headers: (!self.health_headers.is_empty())
                    .then(|| self.health_headers.iter().cloned().collect::<BTreeMap<_, _>>()),
                body: self.health_body.clone(),
                timeout_secs: self.health_timeout,
                acceptable_status_codes: (!self.acceptable_statuses.is_empty())
                    .then(|| self.acceptable_statuses.clone()),
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level, cli.log_file.as_deref())?;

    let settings = Settings::load(cli.config.as_deref(), cli.overrides())?;
    let provider = ServiceProvider::new(
        settings.cluster,
        settings.service,
        HealthProbe::from_config(settings.health),
    );
    info!(
        version = VERSION,
        node = %provider.service_details().node_path(),
        ensemble = provider.cluster_details().connection_string(),
        "Starting ranger-daemon"
    );
    provider.start(true).await;

    info!("Shutdown complete");
    Ok(())
}
