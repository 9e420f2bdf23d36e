//! Project file loading and backend selection.

use clap::ValueEnum;
use compose_api::{ConfigError, Project, Result, SharedBackend};
use compose_orchestration::{LocalBackend, LocalSimulation};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Backend variants reachable from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// Containers on the local engine
    Local,
    /// Local containers plus a credential endpoint sidecar
    LocalSimulation,
}

/// Build the backend for a variant
pub fn backend(kind: BackendKind) -> SharedBackend {
    let local: SharedBackend = Arc::new(LocalBackend::docker());
    match kind {
        BackendKind::Local => local,
        BackendKind::LocalSimulation => Arc::new(LocalSimulation::new(local)),
    }
}

/// Parse a project file
///
/// An explicit `name` wins over the name in the file; without either the
/// project is named after the directory holding the file.
pub fn load_project(file: &Path, name: Option<&str>) -> Result<Project> {
    debug!("Loading project from {}", file.display());
    let contents = std::fs::read_to_string(file)?;
    parse_project(&contents, file, name)
}

fn parse_project(contents: &str, file: &Path, name: Option<&str>) -> Result<Project> {
    let mut project: Project = serde_yaml::from_str(contents)?;
    match name {
        Some(name) => project.name = normalize_project_name(name),
        None if project.name.is_empty() => project.name = default_project_name(file)?,
        None => project.name = normalize_project_name(&project.name),
    }
    if project.name.is_empty() {
        return Err(ConfigError::Invalid(format!(
            "project name derived from {} is empty",
            file.display()
        ))
        .into());
    }
    project.validate()?;
    Ok(project)
}

/// Project name derived from the directory holding `file`
pub fn default_project_name(file: &Path) -> Result<String> {
    let dir = match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir()?,
    };
    let dir = dir.canonicalize()?;
    let base = dir.file_name().and_then(|n| n.to_str()).ok_or_else(|| {
        ConfigError::PathResolution(format!("project directory {}", dir.display()))
    })?;
    Ok(normalize_project_name(base))
}

/// Lowercase `name` and drop characters not allowed in a project name
pub fn normalize_project_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .skip_while(|c| !c.is_ascii_alphanumeric())
        .collect()
}
