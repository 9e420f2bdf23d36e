//! The backend capability interface.
//!
//! Every execution substrate implements [`ComposeBackend`]. Operations a
//! backend cannot carry return [`Error::NotImplemented`]; the trait's
//! default methods do exactly that, so a partial backend only writes the
//! operations it supports.

use crate::error::{Error, Result};
use crate::options::*;
use crate::project::Project;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Container state reported for a running container
pub const RUNNING: &str = "Running";
/// Container state while the scheduler replaces containers
pub const UPDATING: &str = "Updating";
/// Container state while a container is being deleted
pub const REMOVING: &str = "Removing";

/// Operations of the capability interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Build images
    Build,
    /// Push images
    Push,
    /// Pull images
    Pull,
    /// Create containers
    Create,
    /// Start containers
    Start,
    /// Restart containers
    Restart,
    /// Stop containers
    Stop,
    /// Create and start, optionally attached
    Up,
    /// Kill containers
    Kill,
    /// Stop and remove everything
    Down,
    /// Remove stopped containers
    Remove,
    /// Render the effective project
    Convert,
    /// Read container logs
    Logs,
    /// List project containers
    Ps,
    /// List projects
    List,
    /// Run a one-off container
    #[serde(rename = "run")]
    RunOneOff,
    /// Execute in a running container
    Exec,
    /// Copy files to or from containers
    Copy,
    /// Pause containers
    Pause,
    /// Unpause containers
    UnPause,
    /// List container processes
    Top,
    /// Stream engine events
    Events,
    /// Resolve a published port
    Port,
    /// List images used by containers
    Images,
}

impl Operation {
    /// Command-style name of the operation
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Build => "build",
            Operation::Push => "push",
            Operation::Pull => "pull",
            Operation::Create => "create",
            Operation::Start => "start",
            Operation::Restart => "restart",
            Operation::Stop => "stop",
            Operation::Up => "up",
            Operation::Kill => "kill",
            Operation::Down => "down",
            Operation::Remove => "rm",
            Operation::Convert => "convert",
            Operation::Logs => "logs",
            Operation::Ps => "ps",
            Operation::List => "ls",
            Operation::RunOneOff => "run",
            Operation::Exec => "exec",
            Operation::Copy => "cp",
            Operation::Pause => "pause",
            Operation::UnPause => "unpause",
            Operation::Top => "top",
            Operation::Events => "events",
            Operation::Port => "port",
            Operation::Images => "images",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives attached container output
///
/// Called from a single coordinator task; implementations must not block.
pub trait LogConsumer: Send + Sync {
    /// A container joined the output
    fn register(&self, container: &str);
    /// A status line for a container, such as its exit code
    fn status(&self, container: &str, message: &str);
    /// A log line produced by a container
    fn log(&self, container: &str, service: &str, line: &str);
}

/// A port published by a container
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PortPublisher {
    /// Host address
    pub url: String,
    /// Container port
    pub target_port: u16,
    /// Host port
    pub published_port: u16,
    /// tcp or udp
    pub protocol: String,
}

/// Summary of a container belonging to a project
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContainerSummary {
    /// Container id
    pub id: String,
    /// Container name
    pub name: String,
    /// Owning project
    pub project: String,
    /// Owning service
    pub service: String,
    /// Lifecycle state
    pub state: String,
    /// Health status, empty when no health check is defined
    pub health: String,
    /// Exit code of a stopped container
    pub exit_code: i32,
    /// Published ports
    pub publishers: Vec<PortPublisher>,
}

/// A deployed project
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Stack {
    /// Backend-specific identifier
    pub id: String,
    /// Project name
    pub name: String,
    /// Human readable status, such as `running(3)`
    pub status: String,
}

/// Processes running in a container
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContainerProcSummary {
    /// Container id
    pub id: String,
    /// Container name
    pub name: String,
    /// Column titles
    pub titles: Vec<String>,
    /// One row per process
    pub processes: Vec<Vec<String>>,
}

/// An image used by a project container
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ImageSummary {
    /// Image id
    pub id: String,
    /// Container using the image
    pub container_name: String,
    /// Repository
    pub repository: String,
    /// Tag
    pub tag: String,
    /// Size in bytes
    pub size: u64,
}

/// An engine event concerning a project container
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    /// When the engine emitted the event
    pub timestamp: DateTime<Utc>,
    /// Container name
    pub container: String,
    /// Owning service
    pub service: String,
    /// Event action, such as `start` or `die`
    pub status: String,
    /// Additional attributes
    pub attributes: HashMap<String, String>,
}

/// Shared handle to a backend
pub type SharedBackend = Arc<dyn ComposeBackend>;

/// The lifecycle contract every backend variant implements
#[async_trait]
pub trait ComposeBackend: Send + Sync {
    /// Build service images
    async fn build(&self, _project: &Project, _options: BuildOptions) -> Result<()> {
        Err(Error::not_implemented(Operation::Build))
    }

    /// Push service images
    async fn push(&self, _project: &Project, _options: PushOptions) -> Result<()> {
        Err(Error::not_implemented(Operation::Push))
    }

    /// Pull service images
    async fn pull(&self, _project: &Project, _options: PullOptions) -> Result<()> {
        Err(Error::not_implemented(Operation::Pull))
    }

    /// Create containers without starting them
    async fn create(&self, _project: &Project, _options: CreateOptions) -> Result<()> {
        Err(Error::not_implemented(Operation::Create))
    }

    /// Start created containers
    async fn start(&self, _project: &Project, _options: StartOptions) -> Result<()> {
        Err(Error::not_implemented(Operation::Start))
    }

    /// Restart containers
    async fn restart(&self, _project: &Project, _options: RestartOptions) -> Result<()> {
        Err(Error::not_implemented(Operation::Restart))
    }

    /// Stop containers
    async fn stop(&self, _project: &Project, _options: StopOptions) -> Result<()> {
        Err(Error::not_implemented(Operation::Stop))
    }

    /// Create and start the project; returns the run's exit code when attached
    async fn up(&self, _project: &Project, _options: UpOptions) -> Result<i32> {
        Err(Error::not_implemented(Operation::Up))
    }

    /// Kill containers
    async fn kill(&self, _project: &Project, _options: KillOptions) -> Result<()> {
        Err(Error::not_implemented(Operation::Kill))
    }

    /// Stop and remove everything belonging to a project
    async fn down(&self, _project_name: &str, _options: DownOptions) -> Result<()> {
        Err(Error::not_implemented(Operation::Down))
    }

    /// Remove stopped containers
    async fn remove(&self, _project: &Project, _options: RemoveOptions) -> Result<()> {
        Err(Error::not_implemented(Operation::Remove))
    }

    /// Render the effective project
    async fn convert(&self, _project: &Project, _options: ConvertOptions) -> Result<Vec<u8>> {
        Err(Error::not_implemented(Operation::Convert))
    }

    /// Send container logs to a consumer
    async fn logs(
        &self,
        _project_name: &str,
        _consumer: Arc<dyn LogConsumer>,
        _options: LogOptions,
    ) -> Result<()> {
        Err(Error::not_implemented(Operation::Logs))
    }

    /// List project containers
    async fn ps(&self, _project_name: &str, _options: PsOptions) -> Result<Vec<ContainerSummary>> {
        Err(Error::not_implemented(Operation::Ps))
    }

    /// List projects
    async fn list(&self, _options: ListOptions) -> Result<Vec<Stack>> {
        Err(Error::not_implemented(Operation::List))
    }

    /// Run a one-off container; returns its exit code
    async fn run_one_off(&self, _project: &Project, _options: RunOptions) -> Result<i32> {
        Err(Error::not_implemented(Operation::RunOneOff))
    }

    /// Execute a command in a running container; returns its exit code
    async fn exec(&self, _project: &Project, _options: ExecOptions) -> Result<i32> {
        Err(Error::not_implemented(Operation::Exec))
    }

    /// Copy files between a service container and the local filesystem
    async fn copy(&self, _project: &Project, _options: CopyOptions) -> Result<()> {
        Err(Error::not_implemented(Operation::Copy))
    }

    /// Pause containers
    async fn pause(&self, _project_name: &str, _options: PauseOptions) -> Result<()> {
        Err(Error::not_implemented(Operation::Pause))
    }

    /// Unpause containers
    async fn unpause(&self, _project_name: &str, _options: PauseOptions) -> Result<()> {
        Err(Error::not_implemented(Operation::UnPause))
    }

    /// List processes in project containers
    async fn top(
        &self,
        _project_name: &str,
        _services: &[String],
    ) -> Result<Vec<ContainerProcSummary>> {
        Err(Error::not_implemented(Operation::Top))
    }

    /// Stream engine events to a callback until the stream ends
    async fn events(&self, _project_name: &str, _options: EventsOptions) -> Result<()> {
        Err(Error::not_implemented(Operation::Events))
    }

    /// Resolve the host address and port published for a service port
    async fn port(
        &self,
        _project_name: &str,
        _service: &str,
        _port: u16,
        _options: PortOptions,
    ) -> Result<(String, u16)> {
        Err(Error::not_implemented(Operation::Port))
    }

    /// List images used by project containers
    async fn images(
        &self,
        _project_name: &str,
        _options: ImagesOptions,
    ) -> Result<Vec<ImageSummary>> {
        Err(Error::not_implemented(Operation::Images))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Bare;

    #[async_trait]
    impl ComposeBackend for Bare {}

    #[smol_potat::test]
    async fn test_default_operations_return_sentinel() {
        let backend = Bare;
        let project = Project::new("p");

        let err = backend.up(&project, UpOptions::default()).await.unwrap_err();
        assert!(err.is_not_implemented());

        let err = backend.ps("p", PsOptions::default()).await.unwrap_err();
        match err {
            Error::NotImplemented { operation, hint } => {
                assert_eq!(operation, Operation::Ps);
                assert!(hint.is_none());
            }
            other => panic!("expected sentinel, got {other:?}"),
        }
    }

    #[test]
    fn test_operation_names() {
        assert_eq!(Operation::RunOneOff.to_string(), "run");
        assert_eq!(Operation::UnPause.to_string(), "unpause");
        assert_eq!(
            serde_json::to_string(&Operation::RunOneOff).unwrap(),
            "\"run\""
        );
    }
}
