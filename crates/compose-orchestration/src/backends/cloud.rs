//! Cloud container scheduler backend.
//!
//! The scheduler owns placement and restarts, so only whole-stack
//! operations make sense here. One-off containers and removal of stopped
//! containers have no counterpart and are refused with the sentinel.

use crate::graph::DependencyGraph;
use async_trait::async_trait;
use compose_api::{
    ComposeBackend, ContainerSummary, ConvertOptions, DownOptions, Error, ListOptions,
    LogConsumer, LogOptions, Operation, Project, PsOptions, RemoveOptions, Result, RunOptions,
    Stack, UpOptions,
};
use std::sync::Arc;
use tracing::info;

/// Control plane of a cloud container scheduler
#[async_trait]
pub trait CloudClient: Send + Sync {
    /// Deploy or update the stack for a project
    async fn deploy(&self, project: &Project) -> Result<()>;

    /// Delete the stack of a project
    async fn delete(&self, project_name: &str) -> Result<()>;

    /// Tasks of a project as container summaries
    async fn tasks(&self, project_name: &str, all: bool) -> Result<Vec<ContainerSummary>>;

    /// Every stack known to the scheduler
    async fn stacks(&self) -> Result<Vec<Stack>>;

    /// Stream task logs to a consumer
    async fn logs(
        &self,
        project_name: &str,
        consumer: Arc<dyn LogConsumer>,
        options: &LogOptions,
    ) -> Result<()>;

    /// The scheduler-native rendering of a project
    async fn render(&self, project: &Project, format: &str) -> Result<Vec<u8>>;
}

/// Backend deploying projects to a cloud container scheduler
pub struct CloudBackend {
    client: Arc<dyn CloudClient>,
}

impl CloudBackend {
    /// Create a backend over a control-plane client
    pub fn new(client: Arc<dyn CloudClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ComposeBackend for CloudBackend {
    async fn up(&self, project: &Project, _options: UpOptions) -> Result<i32> {
        DependencyGraph::from_project(project)?;
        info!("Deploying stack {}", project.name);
        self.client.deploy(project).await?;
        Ok(0)
    }

    async fn down(&self, project_name: &str, _options: DownOptions) -> Result<()> {
        info!("Deleting stack {}", project_name);
        self.client.delete(project_name).await
    }

    async fn remove(&self, _project: &Project, _options: RemoveOptions) -> Result<()> {
        Err(Error::not_implemented(Operation::Remove))
    }

    async fn convert(&self, project: &Project, options: ConvertOptions) -> Result<Vec<u8>> {
        self.client.render(project, &options.format).await
    }

    async fn logs(
        &self,
        project_name: &str,
        consumer: Arc<dyn LogConsumer>,
        options: LogOptions,
    ) -> Result<()> {
        self.client.logs(project_name, consumer, &options).await
    }

    async fn ps(&self, project_name: &str, options: PsOptions) -> Result<Vec<ContainerSummary>> {
        let tasks = self.client.tasks(project_name, options.all).await?;
        if options.services.is_empty() {
            return Ok(tasks);
        }
        Ok(tasks
            .into_iter()
            .filter(|t| options.services.contains(&t.service))
            .collect())
    }

    async fn list(&self, _options: ListOptions) -> Result<Vec<Stack>> {
        self.client.stacks().await
    }

    async fn run_one_off(&self, _project: &Project, _options: RunOptions) -> Result<i32> {
        Err(Error::not_implemented(Operation::RunOneOff))
    }
}
