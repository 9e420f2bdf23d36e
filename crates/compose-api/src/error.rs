//! Error types for compose operations
//!
//! Every backend operation fails with one [`Error`]. The not-implemented
//! variant is a sentinel: callers branch on [`Error::is_not_implemented`]
//! to offer a fallback instead of treating it as a crash.

use crate::backend::Operation;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for compose operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the capability interface and the orchestration engine
#[derive(Error, Debug)]
pub enum Error {
    /// The backend intentionally lacks this capability
    #[error("{operation}: not implemented{}", hint_suffix(.hint))]
    NotImplemented {
        /// The operation that was refused
        operation: Operation,
        /// An alternative the caller can suggest to the user
        hint: Option<String>,
    },

    /// Configuration error, raised before any side effect
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The underlying engine or control plane rejected an operation
    #[error("{operation} failed for {target}: {message}")]
    Backend {
        /// Operation being performed
        operation: Operation,
        /// Service, container or project the operation addressed
        target: String,
        /// Message reported by the engine
        message: String,
    },

    /// Dependency-ordered execution or readiness polling was aborted
    #[error(transparent)]
    Orchestration(#[from] OrchestrationError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML encoding or decoding error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

fn hint_suffix(hint: &Option<String>) -> String {
    match hint {
        Some(hint) => format!(" ({hint})"),
        None => String::new(),
    }
}

/// Configuration errors detected before execution
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The depends_on relation contains a cycle
    #[error("cyclic dependency detected: {}", .cycle.join(" -> "))]
    CyclicDependency {
        /// Services forming the cycle, first service repeated at the end
        cycle: Vec<String>,
    },

    /// A service depends on a service missing from the project
    #[error("service {service} depends on undefined service {dependency}")]
    UnknownDependency {
        /// The dependent service
        service: String,
        /// The missing dependency
        dependency: String,
    },

    /// A service name is not part of the project
    #[error("no such service: {0}")]
    ServiceNotFound(String),

    /// Convert was asked for an encoding it does not know
    #[error("unsupported format {0:?}, expected \"json\" or \"yaml\"")]
    UnsupportedFormat(String),

    /// A required filesystem location could not be resolved
    #[error("cannot resolve {0}")]
    PathResolution(String),

    /// The project does not fit a fixed address range
    #[error("network {network} cannot address {services} services")]
    AddressExhausted {
        /// Network being populated
        network: String,
        /// Number of services requesting an address
        services: usize,
    },

    /// Any other invalid option or model value
    #[error("{0}")]
    Invalid(String),
}

/// Failures of the orchestration engine itself
#[derive(Error, Debug)]
pub enum OrchestrationError {
    /// A service action failed, its dependents were not started
    #[error("service {service} failed: {source}")]
    DependencyFailed {
        /// Service whose action failed
        service: String,
        /// The underlying failure
        #[source]
        source: Box<Error>,
    },

    /// A required dependency condition can never be reached
    #[error("dependency {service} did not reach condition {condition}: {reason}")]
    ConditionFailed {
        /// The dependency being observed
        service: String,
        /// The condition that was required
        condition: String,
        /// Why the condition failed
        reason: String,
    },

    /// A pod reported a failed phase while polling
    #[error("pod {pod} failed: {reason}")]
    PodFailed {
        /// Name of the failed pod
        pod: String,
        /// Failure reason reported by the scheduler
        reason: String,
    },

    /// The target state was not reached within the timeout
    #[error("timed out after {waited:?} waiting for status {status}")]
    Timeout {
        /// The awaited status
        status: String,
        /// How long the caller waited
        waited: Duration,
    },
}

/// Failure categories used to classify errors without string parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureCategory {
    /// A backend refused an unsupported operation
    NotImplemented,
    /// A file or path could not be found or resolved
    FileNotFound,
    /// The project model could not be decoded
    ComposeParse,
    /// Invalid configuration
    Config,
    /// The engine or control plane failed an operation
    Backend,
    /// Orchestration aborted
    Orchestration,
    /// Anything that cannot be classified
    Other,
}

impl FailureCategory {
    /// Stable status name for reporting
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCategory::NotImplemented => "failure-not-implemented",
            FailureCategory::FileNotFound => "failure-file-not-found",
            FailureCategory::ComposeParse => "failure-compose-parse",
            FailureCategory::Config => "failure-config",
            FailureCategory::Backend => "failure-backend",
            FailureCategory::Orchestration => "failure-orchestration",
            FailureCategory::Other => "failure",
        }
    }

    /// Process exit code for this category
    pub fn exit_code(&self) -> i32 {
        match self {
            FailureCategory::FileNotFound => 14,
            FailureCategory::ComposeParse => 15,
            _ => 1,
        }
    }
}

impl Error {
    /// Create a not-implemented sentinel for an operation
    pub fn not_implemented(operation: Operation) -> Self {
        Self::NotImplemented {
            operation,
            hint: None,
        }
    }

    /// Create a not-implemented sentinel carrying an alternative for the user
    pub fn not_implemented_with_hint(operation: Operation, hint: impl Into<String>) -> Self {
        Self::NotImplemented {
            operation,
            hint: Some(hint.into()),
        }
    }

    /// Create a backend failure
    pub fn backend(
        operation: Operation,
        target: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Backend {
            operation,
            target: target.into(),
            message: message.into(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Config(ConfigError::Invalid(message.into()))
    }

    /// Whether this is the not-implemented sentinel, possibly wrapped by orchestration
    pub fn is_not_implemented(&self) -> bool {
        match self {
            Error::NotImplemented { .. } => true,
            Error::Orchestration(OrchestrationError::DependencyFailed { source, .. }) => {
                source.is_not_implemented()
            }
            _ => false,
        }
    }

    /// Classify the error
    pub fn category(&self) -> FailureCategory {
        match self {
            Error::NotImplemented { .. } => FailureCategory::NotImplemented,
            Error::Config(ConfigError::PathResolution(_)) => FailureCategory::FileNotFound,
            Error::Config(_) => FailureCategory::Config,
            Error::Backend { .. } => FailureCategory::Backend,
            Error::Orchestration(OrchestrationError::DependencyFailed { source, .. }) => {
                match source.category() {
                    FailureCategory::Other => FailureCategory::Orchestration,
                    category => category,
                }
            }
            Error::Orchestration(_) => FailureCategory::Orchestration,
            Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound => {
                FailureCategory::FileNotFound
            }
            Error::Json(_) | Error::Yaml(_) => FailureCategory::ComposeParse,
            Error::Io(_) => FailureCategory::Other,
        }
    }
}
