//! Cluster orchestrator backend.
//!
//! The cluster reconciles pods on its own, so this backend never inspects
//! containers directly. Up and Down submit the desired state and then poll
//! pod status until every pod runs or is gone.

use crate::graph::DependencyGraph;
use crate::readiness::{
    PodSource, PodStatusSnapshot, ProgressFn, TargetStatus, WaitForStatusOptions,
    pod_to_container_summary, wait_for_status,
};
use async_trait::async_trait;
use compose_api::{
    ComposeBackend, ContainerSummary, ConvertOptions, DownOptions, ListOptions, LogConsumer,
    LogOptions, Project, PsOptions, Result, Stack, UpOptions,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Control plane of a cluster orchestrator
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Submit the desired state of a project
    async fn apply(&self, project: &Project) -> Result<()>;

    /// Delete every resource of a project
    async fn delete(&self, project_name: &str) -> Result<()>;

    /// Current pods of a project
    async fn list_pods(&self, project_name: &str) -> Result<Vec<PodStatusSnapshot>>;

    /// Every deployed project
    async fn stacks(&self) -> Result<Vec<Stack>>;

    /// Stream pod logs to a consumer
    async fn logs(
        &self,
        project_name: &str,
        consumer: Arc<dyn LogConsumer>,
        options: &LogOptions,
    ) -> Result<()>;
}

/// Backend deploying projects to a cluster orchestrator
pub struct ClusterBackend {
    client: Arc<dyn ClusterClient>,
    interval: Duration,
    timeout: Option<Duration>,
    progress: Option<ProgressFn>,
}

impl ClusterBackend {
    /// Create a backend polling every second without a deadline
    pub fn new(client: Arc<dyn ClusterClient>) -> Self {
        Self {
            client,
            interval: Duration::from_secs(1),
            timeout: None,
            progress: None,
        }
    }

    /// Set the delay between status polls
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Give up waiting for a status after `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Report per-service progress while waiting
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    async fn wait_for(
        &self,
        project_name: &str,
        services: Vec<String>,
        status: TargetStatus,
    ) -> Result<()> {
        let options = WaitForStatusOptions {
            services,
            timeout: self.timeout,
            interval: self.interval,
            log: self.progress.clone(),
            ..WaitForStatusOptions::new(project_name, status)
        };
        wait_for_status(self, &options).await
    }
}

#[async_trait]
impl PodSource for ClusterBackend {
    async fn list_pods(&self, project_name: &str) -> Result<Vec<PodStatusSnapshot>> {
        self.client.list_pods(project_name).await
    }
}

#[async_trait]
impl ComposeBackend for ClusterBackend {
    async fn up(&self, project: &Project, options: UpOptions) -> Result<i32> {
        DependencyGraph::from_project(project)?;
        let services = project.selected_services(&options.create.services)?;
        info!("Applying project {}", project.name);
        self.client.apply(project).await?;
        self.wait_for(&project.name, services, TargetStatus::Running)
            .await?;
        Ok(0)
    }

    async fn down(&self, project_name: &str, _options: DownOptions) -> Result<()> {
        info!("Deleting project {}", project_name);
        self.client.delete(project_name).await?;
        self.wait_for(project_name, Vec::new(), TargetStatus::Removed)
            .await
    }

    async fn convert(&self, project: &Project, options: ConvertOptions) -> Result<Vec<u8>> {
        compose_api::convert::render(project, &options.format)
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
        let pods = self.client.list_pods(project_name).await?;
        Ok(pods
            .iter()
            .filter(|pod| {
                options.services.is_empty() || options.services.iter().any(|s| s == pod.service())
            })
            .map(pod_to_container_summary)
            .collect())
    }

    async fn list(&self, _options: ListOptions) -> Result<Vec<Stack>> {
        self.client.stacks().await
    }
}

