//! Container engine seam.
//!
//! The local backend drives containers through [`ContainerEngine`]. The
//! engine is an opaque RPC surface: it knows nothing about projects or
//! dependency order, only about individual containers, images, networks and
//! volumes selected by label.

pub mod docker;

pub use docker::DockerCli;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use compose_api::labels::{CONTAINER_NUMBER_LABEL, PROJECT_LABEL, SERVICE_LABEL};
use compose_api::{BuildConfig, LabelFilter, PortPublisher, Result};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Lines of container output
pub type LogStream = BoxStream<'static, Result<String>>;

/// Engine events
pub type EngineEventStream = BoxStream<'static, Result<EngineEvent>>;

/// A container as listed by the engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineContainer {
    /// Container id
    pub id: String,
    /// Container name
    pub name: String,
    /// Image reference
    pub image: String,
    /// Short state, such as `running` or `exited`
    pub state: String,
    /// Human readable status, such as `Up 3 minutes (healthy)`
    pub status: String,
    /// Container labels
    pub labels: HashMap<String, String>,
    /// Published ports
    pub ports: Vec<PortPublisher>,
}

impl EngineContainer {
    /// Owning project
    pub fn project(&self) -> &str {
        self.label(PROJECT_LABEL)
    }

    /// Owning service
    pub fn service(&self) -> &str {
        self.label(SERVICE_LABEL)
    }

    /// Index of the container within its service, 0 when unlabelled
    pub fn number(&self) -> usize {
        self.label(CONTAINER_NUMBER_LABEL).parse().unwrap_or(0)
    }

    /// Whether the container is running
    pub fn is_running(&self) -> bool {
        self.state == "running"
    }

    fn label(&self, key: &str) -> &str {
        self.labels.get(key).map(String::as_str).unwrap_or("")
    }
}

/// Runtime state of a container
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerState {
    /// Short state, such as `running` or `exited`
    pub status: String,
    /// Process is running
    pub running: bool,
    /// Engine is restarting the container
    pub restarting: bool,
    /// Exit code of the last run
    pub exit_code: i32,
    /// Health status, `None` when no health check is configured
    pub health: Option<String>,
}

/// Everything needed to create a container
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerSpec {
    /// Container name
    pub name: String,
    /// Image reference
    pub image: String,
    /// Command override
    pub command: Vec<String>,
    /// Environment as KEY=VALUE, or KEY alone to pass through
    pub environment: Vec<String>,
    /// Labels, including the project vocabulary
    pub labels: Vec<(String, String)>,
    /// Networks to join; the first is used at creation, the others are
    /// connected afterwards
    pub networks: Vec<NetworkAttachment>,
    /// Mounts as engine volume specs, e.g. `/host:/container:ro`
    pub volumes: Vec<String>,
    /// In-memory mounts
    pub tmpfs: Vec<String>,
    /// Published ports as engine port specs, e.g. `8080:80/tcp`
    pub ports: Vec<String>,
    /// Remove the container when it exits
    pub auto_remove: bool,
}

/// A network attachment for a new container
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkAttachment {
    /// Engine-level network name
    pub network: String,
    /// Fixed IPv4 address
    pub ipv4_address: Option<String>,
    /// Network aliases
    pub aliases: Vec<String>,
}

/// Everything needed to create a network
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkSpec {
    /// Engine-level name
    pub name: String,
    /// Driver, engine default when unset
    pub driver: Option<String>,
    /// Subnet in CIDR notation
    pub subnet: Option<String>,
    /// Gateway address
    pub gateway: Option<String>,
    /// Labels, including the project vocabulary
    pub labels: Vec<(String, String)>,
}

/// Everything needed to create a volume
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VolumeSpec {
    /// Engine-level name
    pub name: String,
    /// Driver, engine default when unset
    pub driver: Option<String>,
    /// Labels, including the project vocabulary
    pub labels: Vec<(String, String)>,
}

/// Command execution inside a running container
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecSpec {
    /// Command and arguments
    pub command: Vec<String>,
    /// Extra environment as KEY=VALUE
    pub environment: Vec<String>,
    /// User to run as
    pub user: Option<String>,
    /// Working directory
    pub workdir: Option<String>,
    /// Allocate a TTY
    pub tty: bool,
}

/// Image details
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineImage {
    /// Image id
    pub id: String,
    /// Repository tags
    pub repo_tags: Vec<String>,
    /// Size in bytes
    pub size: u64,
}

/// A container event reported by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineEvent {
    /// When the engine emitted it
    pub timestamp: DateTime<Utc>,
    /// Container id
    pub id: String,
    /// Action, such as `start` or `die`
    pub action: String,
    /// Actor attributes, including container labels and `name`
    pub attributes: HashMap<String, String>,
}

/// Processes running in a container
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessTable {
    /// Column titles
    pub titles: Vec<String>,
    /// One row per process
    pub processes: Vec<Vec<String>>,
}

/// Operations the local backend needs from a container engine
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// List containers matching every filter; `all` includes stopped ones
    async fn list_containers(
        &self,
        filters: &[LabelFilter],
        all: bool,
    ) -> Result<Vec<EngineContainer>>;

    /// Create a container, returning its id
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String>;

    /// Start a created or stopped container
    async fn start_container(&self, id: &str) -> Result<()>;

    /// Stop a container, killing it after `timeout`
    async fn stop_container(&self, id: &str, timeout: Option<Duration>) -> Result<()>;

    /// Restart a container
    async fn restart_container(&self, id: &str, timeout: Option<Duration>) -> Result<()>;

    /// Send a signal to a container
    async fn kill_container(&self, id: &str, signal: Option<&str>) -> Result<()>;

    /// Remove a container
    async fn remove_container(&self, id: &str, force: bool, volumes: bool) -> Result<()>;

    /// Pause a container
    async fn pause_container(&self, id: &str) -> Result<()>;

    /// Unpause a container
    async fn unpause_container(&self, id: &str) -> Result<()>;

    /// Current state of a container
    async fn inspect_container(&self, id: &str) -> Result<ContainerState>;

    /// Wait until a container stops, returning its exit code
    async fn wait_container(&self, id: &str) -> Result<i32>;

    /// Container output, stdout and stderr merged
    async fn container_logs(&self, id: &str, follow: bool, tail: Option<usize>)
    -> Result<LogStream>;

    /// Run a command in a running container, returning its exit code
    async fn exec(&self, id: &str, spec: &ExecSpec) -> Result<i32>;

    /// Copy between the local filesystem and a container; either side may be
    /// `container:path`
    async fn copy(&self, source: &str, destination: &str) -> Result<()>;

    /// Processes running in a container
    async fn top(&self, id: &str) -> Result<ProcessTable>;

    /// Host address and port published for a container port
    async fn port(&self, id: &str, port: u16, protocol: &str) -> Result<(String, u16)>;

    /// Build an image
    async fn build_image(
        &self,
        tag: &str,
        build: &BuildConfig,
        pull: bool,
        no_cache: bool,
    ) -> Result<()>;

    /// Pull an image
    async fn pull_image(&self, image: &str) -> Result<()>;

    /// Push an image
    async fn push_image(&self, image: &str) -> Result<()>;

    /// Image details
    async fn inspect_image(&self, image: &str) -> Result<EngineImage>;

    /// Create a network
    async fn create_network(&self, spec: &NetworkSpec) -> Result<()>;

    /// Names of networks matching every filter
    async fn list_networks(&self, filters: &[LabelFilter]) -> Result<Vec<String>>;

    /// Remove a network
    async fn remove_network(&self, name: &str) -> Result<()>;

    /// Create a volume
    async fn create_volume(&self, spec: &VolumeSpec) -> Result<()>;

    /// Names of volumes matching every filter
    async fn list_volumes(&self, filters: &[LabelFilter]) -> Result<Vec<String>>;

    /// Remove a volume
    async fn remove_volume(&self, name: &str) -> Result<()>;

    /// Container events matching every filter, until the stream is dropped
    async fn events(&self, filters: &[LabelFilter]) -> Result<EngineEventStream>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_label_accessors() {
        let container = EngineContainer {
            state: "running".to_string(),
            labels: HashMap::from([
                (PROJECT_LABEL.to_string(), "shop".to_string()),
                (SERVICE_LABEL.to_string(), "db".to_string()),
                (CONTAINER_NUMBER_LABEL.to_string(), "2".to_string()),
            ]),
            ..Default::default()
        };
        assert_eq!(container.project(), "shop");
        assert_eq!(container.service(), "db");
        assert_eq!(container.number(), 2);
        assert!(container.is_running());
        assert_eq!(EngineContainer::default().number(), 0);
    }
}
