//! Per-operation option structures.
//!
//! An empty `services` list always means "every service of the project".

use crate::backend::{Event, LogConsumer};
use crate::error::Result;
use crate::project::Project;
use std::sync::Arc;
use std::time::Duration;

/// Receiver notified when the user interrupts an attached run
pub type CancelSignal = async_channel::Receiver<()>;

/// Callback receiving engine events
pub type EventCallback = Arc<dyn Fn(Event) -> Result<()> + Send + Sync>;

/// Options for Build
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Services to build
    pub services: Vec<String>,
    /// Always attempt to pull a newer base image
    pub pull: bool,
    /// Do not use the build cache
    pub no_cache: bool,
}

/// Options for Push
#[derive(Debug, Clone, Default)]
pub struct PushOptions {
    /// Keep pushing remaining images when one fails
    pub ignore_failures: bool,
}

/// Options for Pull
#[derive(Debug, Clone, Default)]
pub struct PullOptions {
    /// Services to pull
    pub services: Vec<String>,
    /// Keep pulling remaining images when one fails
    pub ignore_failures: bool,
}

/// Options for Create
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    /// Services to create
    pub services: Vec<String>,
    /// Remove containers of services no longer in the project
    pub remove_orphans: bool,
}

/// Options for Start
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    /// Services to start
    pub services: Vec<String>,
}

/// Options for Restart
#[derive(Debug, Clone, Default)]
pub struct RestartOptions {
    /// Services to restart
    pub services: Vec<String>,
    /// Grace period before the engine kills a container
    pub timeout: Option<Duration>,
}

/// Options for Stop
#[derive(Debug, Clone, Default)]
pub struct StopOptions {
    /// Services to stop
    pub services: Vec<String>,
    /// Grace period before the engine kills a container
    pub timeout: Option<Duration>,
}

/// Options for Up
#[derive(Clone, Default)]
pub struct UpOptions {
    /// Options for the create phase
    pub create: CreateOptions,
    /// Return once containers are started instead of attaching
    pub detach: bool,
    /// Stop every container when any container exits
    pub cascade_stop: bool,
    /// Service whose exit code becomes the result of the run
    pub exit_code_from: Option<String>,
    /// Receives attached output; required unless detached
    pub consumer: Option<Arc<dyn LogConsumer>>,
    /// Interrupt signal for the attached run
    pub cancel: Option<CancelSignal>,
    /// Grace period used when stopping on cascade or cancel
    pub timeout: Option<Duration>,
}

/// Options for Kill
#[derive(Debug, Clone, Default)]
pub struct KillOptions {
    /// Services to kill
    pub services: Vec<String>,
    /// Signal to send, engine default when unset
    pub signal: Option<String>,
}

/// Options for Down
#[derive(Debug, Clone, Default)]
pub struct DownOptions {
    /// Also remove containers of services not in the project
    pub remove_orphans: bool,
    /// Project model, when known, to locate declared networks and volumes
    pub project: Option<Project>,
    /// Remove project volumes
    pub volumes: bool,
    /// Grace period before the engine kills a container
    pub timeout: Option<Duration>,
}

/// Options for Remove
#[derive(Debug, Clone, Default)]
pub struct RemoveOptions {
    /// Services whose stopped containers are removed
    pub services: Vec<String>,
    /// Remove without confirmation
    pub force: bool,
    /// Stop running containers first
    pub stop: bool,
    /// Remove anonymous volumes attached to the containers
    pub volumes: bool,
}

/// Options for Convert
#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    /// Output encoding: "json" or "yaml"
    pub format: String,
}

/// Options for Logs
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    /// Services to read logs from
    pub services: Vec<String>,
    /// Keep streaming new lines
    pub follow: bool,
    /// Number of lines from the end of the logs
    pub tail: Option<usize>,
}

/// Options for Ps
#[derive(Debug, Clone, Default)]
pub struct PsOptions {
    /// Include stopped containers
    pub all: bool,
    /// Services to list
    pub services: Vec<String>,
}

/// Options for List
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Include stacks with no running container
    pub all: bool,
}

/// Options for RunOneOff
#[derive(Clone, Default)]
pub struct RunOptions {
    /// Service to run
    pub service: String,
    /// Command override
    pub command: Vec<String>,
    /// Extra environment as KEY=VALUE
    pub environment: Vec<String>,
    /// Return the container id once started
    pub detach: bool,
    /// Remove the container when it exits
    pub auto_remove: bool,
    /// Do not start dependencies
    pub no_deps: bool,
    /// Receives container output when attached
    pub consumer: Option<Arc<dyn LogConsumer>>,
}

/// Options for Exec
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    /// Target service
    pub service: String,
    /// Container index within the service, 1-based
    pub index: usize,
    /// Command to execute
    pub command: Vec<String>,
    /// Extra environment as KEY=VALUE
    pub environment: Vec<String>,
    /// User to run as
    pub user: Option<String>,
    /// Working directory inside the container
    pub workdir: Option<String>,
    /// Allocate a TTY
    pub tty: bool,
}

/// Options for Copy
///
/// Either side may address a service as `service:path`.
#[derive(Debug, Clone, Default)]
pub struct CopyOptions {
    /// Source path
    pub source: String,
    /// Destination path
    pub destination: String,
    /// Copy to or from every container of the service
    pub all: bool,
    /// Container index when not copying to all, 1-based
    pub index: usize,
}

/// Options for Pause and UnPause
#[derive(Debug, Clone, Default)]
pub struct PauseOptions {
    /// Services to pause
    pub services: Vec<String>,
}

/// Options for Events
#[derive(Clone)]
pub struct EventsOptions {
    /// Services to observe
    pub services: Vec<String>,
    /// Invoked for every event; returning an error stops the stream
    pub consumer: EventCallback,
}

/// Options for Port
#[derive(Debug, Clone)]
pub struct PortOptions {
    /// tcp or udp
    pub protocol: String,
    /// Container index within the service, 1-based
    pub index: usize,
}

impl Default for PortOptions {
    fn default() -> Self {
        Self {
            protocol: "tcp".to_string(),
            index: 1,
        }
    }
}

/// Options for Images
#[derive(Debug, Clone, Default)]
pub struct ImagesOptions {
    /// Services whose images are listed
    pub services: Vec<String>,
}
