//! Ranger service provider for ZooKeeper.
//!
//! Registers a running service instance as an ephemeral node under
//! `/{namespace}/{service}/{host}:{port}` and keeps its payload fresh with
//! periodic, optionally health-gated heartbeats.
//!
//! ## Architecture
//!
//! - **Registry (`registry.rs`)**: service/cluster details, the node payload
//!   and path derivation.
//! - **Coordination (`coordination/`)**: session lifecycle with infinite
//!   capped-backoff reconnection and the idempotent upsert primitive.
//! - **Health (`health/`)**: no-op and HTTP health probes.
//! - **Scheduler (`scheduler.rs`)**: fixed-delay periodic task runner.
//! - **Provider (`provider/`)**: the orchestrator tying them together.
//! - **Config (`config.rs`)** and **Logging (`logging.rs`)**: startup
//!   plumbing for the `ranger-daemon` binary.

pub mod config;
pub mod coordination;
pub mod error;
pub mod health;
pub mod logging;
pub mod provider;
pub mod registry;
pub mod scheduler;

pub use coordination::{CoordinationSession, ZookeeperCoordinator};
pub use error::{SessionError, TickError};
pub use health::{HealthCheckConfig, HealthProbe, HttpMethod};
pub use provider::{ServiceProvider, ShutdownHandle};
pub use registry::{ClusterDetails, Environment, HealthcheckStatus, ServiceDetails, ServiceNode};
pub use scheduler::PeriodicScheduler;
