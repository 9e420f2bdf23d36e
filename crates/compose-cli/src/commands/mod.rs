//! Subcommand implementations, grouped by command family.

pub mod build;
pub mod down;
pub mod exec;
pub mod inspect;
pub mod lifecycle;
pub mod logs;
pub mod up;

use crate::config;
use anyhow::{Context, Result};
use compose_api::{Project, SharedBackend};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// What every command needs: the backend and where the project comes from
pub struct Compose {
    /// Backend the command runs against
    pub backend: SharedBackend,
    file: PathBuf,
    project_name: Option<String>,
}

impl Compose {
    /// Bind a backend to a project file and an optional name override
    pub fn new(backend: SharedBackend, file: PathBuf, project_name: Option<String>) -> Self {
        Self {
            backend,
            file,
            project_name,
        }
    }

    /// Load and validate the project
    pub fn project(&self) -> Result<Project> {
        config::load_project(&self.file, self.project_name.as_deref())
            .with_context(|| format!("Failed to load project from {}", self.file.display()))
    }

    /// The project if its file loads, otherwise just the name given with -p
    ///
    /// Commands that only address existing containers work without a file.
    pub fn project_or_name(&self) -> Result<(String, Option<Project>)> {
        match (self.project(), &self.project_name) {
            (Ok(project), _) => Ok((project.name.clone(), Some(project))),
            (Err(e), Some(name)) => {
                debug!("Using project name {} without a project file: {:#}", name, e);
                Ok((config::normalize_project_name(name), None))
            }
            (Err(e), None) => Err(e),
        }
    }

    /// The project name, from -p or from the project file
    pub fn project_name(&self) -> Result<String> {
        Ok(self.project_or_name()?.0)
    }
}

/// Convert a `--timeout` in seconds
pub(crate) fn seconds(timeout: Option<u64>) -> Option<Duration> {
    timeout.map(Duration::from_secs)
}
