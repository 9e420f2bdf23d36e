//! Backend variants.
//!
//! Each variant implements [`compose_api::ComposeBackend`] for one execution
//! substrate. Operations a variant does not carry return the
//! not-implemented sentinel, so callers branch on the error rather than on
//! the variant.

pub mod cloud;
pub mod cluster;
pub mod local;
pub mod simulation;

pub use cloud::{CloudBackend, CloudClient};
pub use cluster::{ClusterBackend, ClusterClient};
pub use local::LocalBackend;
pub use simulation::{LocalSimulation, enhance_for_local_simulation};
