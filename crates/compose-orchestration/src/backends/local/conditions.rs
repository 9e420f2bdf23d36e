//! Dependency condition observation against the container engine

use crate::engine::ContainerEngine;
use crate::graph::ConditionCheck;
use async_trait::async_trait;
use compose_api::labels::{one_off_filter, project_filter, service_filter};
use compose_api::{Condition, OrchestrationError, Result, ServiceConfig};
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;

/// Observes conditions by inspecting the dependency's containers
pub(crate) struct EngineConditions<'a> {
    engine: &'a dyn ContainerEngine,
    project: &'a str,
    selected: HashSet<String>,
    interval: Duration,
}

impl<'a> EngineConditions<'a> {
    /// Observe `selected` services; any other dependency counts as satisfied
    pub(crate) fn new(
        engine: &'a dyn ContainerEngine,
        project: &'a str,
        selected: &[String],
        interval: Duration,
    ) -> Self {
        Self {
            engine,
            project,
            selected: selected.iter().cloned().collect(),
            interval,
        }
    }

    fn failed(
        service: &ServiceConfig,
        condition: Condition,
        reason: impl Into<String>,
    ) -> OrchestrationError {
        OrchestrationError::ConditionFailed {
            service: service.name.clone(),
            condition: condition.to_string(),
            reason: reason.into(),
        }
    }

    async fn container_ids(
        &self,
        service: &ServiceConfig,
        condition: Condition,
    ) -> Result<Vec<String>> {
        let filters = [
            project_filter(self.project),
            service_filter(&service.name),
            one_off_filter(false),
        ];
        let containers = self.engine.list_containers(&filters, true).await?;
        if containers.is_empty() {
            return Err(Self::failed(service, condition, "no container").into());
        }
        Ok(containers.into_iter().map(|c| c.id).collect())
    }

    async fn wait_healthy(&self, service: &ServiceConfig) -> Result<()> {
        let condition = Condition::Healthy;
        loop {
            let mut healthy = true;
            for id in self.container_ids(service, condition).await? {
                let state = self.engine.inspect_container(&id).await?;
                match state.health.as_deref() {
                    None => {
                        return Err(
                            Self::failed(service, condition, "no health check configured").into(),
                        );
                    }
                    Some("unhealthy") => {
                        return Err(
                            Self::failed(service, condition, "container is unhealthy").into(),
                        );
                    }
                    Some("healthy") => {}
                    Some(_) => healthy = false,
                }
                if !state.running && !state.restarting {
                    return Err(Self::failed(
                        service,
                        condition,
                        format!("container exited with code {}", state.exit_code),
                    )
                    .into());
                }
            }
            if healthy {
                return Ok(());
            }
            debug!("Waiting for {} to become healthy", service.name);
            smol::Timer::after(self.interval).await;
        }
    }

    async fn wait_completed(&self, service: &ServiceConfig) -> Result<()> {
        let condition = Condition::CompletedSuccessfully;
        for id in self.container_ids(service, condition).await? {
            let code = self.engine.wait_container(&id).await?;
            if code != 0 {
                let reason = format!("exited with code {}", code);
                return Err(Self::failed(service, condition, reason).into());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ConditionCheck for EngineConditions<'_> {
    async fn wait_for(&self, service: &ServiceConfig, condition: Condition) -> Result<()> {
        if !self.selected.contains(&service.name) {
            return Ok(());
        }
        match condition {
            Condition::Started => Ok(()),
            Condition::Healthy => self.wait_healthy(service).await,
            Condition::CompletedSuccessfully => self.wait_completed(service).await,
        }
    }
}
