//! Container lifecycle events

use serde::{Deserialize, Serialize};

/// A lifecycle signal emitted by a container watcher
///
/// Events are consumed exactly once by the coordinator and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ContainerEvent {
    /// Output of a container became available
    Attach {
        /// Container name
        container: String,
        /// Owning service
        service: String,
    },
    /// A line of container output
    Log {
        /// Container name
        container: String,
        /// Owning service
        service: String,
        /// The log line, without trailing newline
        line: String,
    },
    /// A container exited
    Exit {
        /// Container name
        container: String,
        /// Owning service
        service: String,
        /// Process exit code
        exit_code: i32,
        /// The engine is restarting the container
        restarting: bool,
    },
    /// The user interrupted the run
    UserCancel,
}

impl ContainerEvent {
    /// Create an attach event
    pub fn attach(container: impl Into<String>, service: impl Into<String>) -> Self {
        Self::Attach {
            container: container.into(),
            service: service.into(),
        }
    }

    /// Create a log event
    pub fn log(
        container: impl Into<String>,
        service: impl Into<String>,
        line: impl Into<String>,
    ) -> Self {
        Self::Log {
            container: container.into(),
            service: service.into(),
            line: line.into(),
        }
    }

    /// Create an exit event
    pub fn exit(
        container: impl Into<String>,
        service: impl Into<String>,
        exit_code: i32,
        restarting: bool,
    ) -> Self {
        Self::Exit {
            container: container.into(),
            service: service.into(),
            exit_code,
            restarting,
        }
    }
}
