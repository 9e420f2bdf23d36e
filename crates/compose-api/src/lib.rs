//! # Compose API
//!
//! The contract shared by every compose backend: the parsed [`Project`]
//! model, per-operation options, the [`ComposeBackend`] capability trait,
//! container lifecycle events, the label vocabulary used to find project
//! containers, and the error kinds operations fail with.
//!
//! Backends that cannot carry an operation return the
//! [`Error::NotImplemented`] sentinel:
//!
//! ```rust
//! use compose_api::{ComposeBackend, Error, Project, UpOptions};
//!
//! # async fn example(backend: &dyn ComposeBackend, project: &Project) -> compose_api::Result<()> {
//! match backend.up(project, UpOptions::default()).await {
//!     Ok(code) => println!("exited with {code}"),
//!     Err(e) if e.is_not_implemented() => println!("not supported here: {e}"),
//!     Err(e) => return Err(e),
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unsafe_code)]

pub mod backend;
pub mod convert;
pub mod error;
pub mod event;
pub mod labels;
pub mod options;
pub mod project;

pub use backend::{
    ComposeBackend, ContainerProcSummary, ContainerSummary, Event, ImageSummary, LogConsumer,
    Operation, PortPublisher, SharedBackend, Stack, REMOVING, RUNNING, UPDATING,
};
pub use error::{ConfigError, Error, FailureCategory, OrchestrationError, Result};
pub use event::ContainerEvent;
pub use labels::LabelFilter;
pub use options::*;
pub use project::{
    BuildConfig, Condition, FileObjectConfig, IpamConfig, IpamPool, NetworkConfig, Project,
    ServiceConfig, ServiceDependency, ServiceNetworkConfig, ServicePortConfig,
    ServiceVolumeConfig, VolumeConfig, VolumeType,
};
