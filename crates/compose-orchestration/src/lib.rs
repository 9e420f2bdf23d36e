//! # Compose Orchestration
//!
//! The engine behind every compose backend: dependency-ordered execution,
//! the lifecycle event coordinator that merges container output into one
//! stream, readiness polling for scheduler-managed pods, and the backend
//! variants themselves.
//!
//! ## Example
//!
//! ```rust,no_run
//! use compose_api::{ComposeBackend, CreateOptions, Project, ServiceConfig, StartOptions};
//! use compose_orchestration::LocalBackend;
//!
//! # async fn example() -> compose_api::Result<()> {
//! let project = Project::new("shop")
//!     .with_service("db", ServiceConfig::new("postgres:16"))
//!     .with_service("web", ServiceConfig::new("nginx"));
//!
//! let backend = LocalBackend::docker();
//! backend.create(&project, CreateOptions::default()).await?;
//! backend.start(&project, StartOptions::default()).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unsafe_code)]

pub mod backends;
pub mod engine;
pub mod graph;
pub mod printer;
pub mod readiness;

pub use backends::{
    CloudBackend, CloudClient, ClusterBackend, ClusterClient, LocalBackend, LocalSimulation,
    enhance_for_local_simulation,
};
pub use engine::{ContainerEngine, DockerCli};
pub use graph::{
    ActionCompletion, ConditionCheck, DependencyGraph, DependencyOrchestrator, Direction,
    in_dependency_order, in_dependency_order_with, in_reverse_dependency_order,
};
pub use printer::{EventQueue, LogPrinter};
pub use readiness::{
    FailedPod, PodSource, PodStatusSnapshot, PodsState, TargetStatus, WaitForStatusOptions,
    check_pods_state, pod_to_container_summary, wait_for_status,
};
