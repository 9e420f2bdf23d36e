//! Readiness polling for scheduler-managed pods.
//!
//! [`check_pods_state`] performs one evaluation pass over a pod snapshot.
//! [`wait_for_status`] repeats it at an interval until the target state is
//! reached, a pod fails, or the timeout elapses.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use compose_api::labels::{PROJECT_LABEL, SERVICE_LABEL};
use compose_api::{ContainerSummary, Error, OrchestrationError, REMOVING, RUNNING, Result, UPDATING};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Pod lifecycle phase reported by the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PodPhase {
    /// Accepted, containers not yet running
    Pending,
    /// Bound to a node with at least one container running
    Running,
    /// All containers terminated successfully
    Succeeded,
    /// All containers terminated, at least one in failure
    Failed,
    /// State could not be obtained
    Unknown,
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self {
            PodPhase::Pending => "Pending",
            PodPhase::Running => "Running",
            PodPhase::Succeeded => "Succeeded",
            PodPhase::Failed => "Failed",
            PodPhase::Unknown => "Unknown",
        };
        f.write_str(phase)
    }
}

/// Sub-state of one container in a pod
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PodContainerState {
    /// The container is running
    Running,
    /// The container is waiting to start
    Waiting {
        /// Why it is waiting
        reason: String,
    },
    /// The container terminated
    Terminated {
        /// Exit code of the container process
        exit_code: i32,
        /// Why it terminated
        reason: String,
    },
}

/// Read-only snapshot of a pod as reported by the scheduler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodStatusSnapshot {
    /// Pod name
    pub name: String,
    /// Pod labels, carrying the project and service labels
    pub labels: HashMap<String, String>,
    /// Pod phase
    pub phase: PodPhase,
    /// Human readable status message
    pub message: String,
    /// Machine readable reason, set for failed pods
    pub reason: String,
    /// Present once the pod is being deleted
    pub deletion_timestamp: Option<DateTime<Utc>>,
    /// Container sub-states
    pub containers: Vec<PodContainerState>,
}

impl PodStatusSnapshot {
    /// Service the pod belongs to
    pub fn service(&self) -> &str {
        self.labels.get(SERVICE_LABEL).map(String::as_str).unwrap_or("")
    }

    /// Project the pod belongs to
    pub fn project(&self) -> &str {
        self.labels.get(PROJECT_LABEL).map(String::as_str).unwrap_or("")
    }
}

/// State the caller waits for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetStatus {
    /// Every pod and container is running
    Running,
    /// No pod remains
    Removed,
}

impl fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetStatus::Running => f.write_str(RUNNING),
            TargetStatus::Removed => f.write_str(REMOVING),
        }
    }
}

/// A pod the scheduler reported as failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedPod {
    /// Pod name
    pub pod: String,
    /// Failure reason reported by the scheduler
    pub reason: String,
}

/// Outcome of one evaluation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodsState {
    /// The target state was reached
    pub reached: bool,
    /// Latest status message per service, recorded even when a pod failed
    pub messages: BTreeMap<String, String>,
    /// First failed pod seen in this pass
    pub failed: Option<FailedPod>,
}

impl PodsState {
    /// The pass outcome as an error, if a pod failed
    pub fn error(&self) -> Option<Error> {
        self.failed.as_ref().map(|failed| {
            OrchestrationError::PodFailed {
                pod: failed.pod.clone(),
                reason: failed.reason.clone(),
            }
            .into()
        })
    }
}

/// Evaluate a pod snapshot against a target state
///
/// `services` restricts the evaluation; empty means every pod. A failed pod
/// is recorded in [`PodsState::failed`] unless the target is
/// [`TargetStatus::Removed`]; messages are kept for every pod either way.
pub fn check_pods_state(
    services: &[String],
    pods: &[PodStatusSnapshot],
    status: TargetStatus,
) -> PodsState {
    let mut state = PodsState {
        reached: true,
        ..Default::default()
    };

    for pod in pods {
        let service = pod.service();
        if !services.is_empty() && !services.iter().any(|s| s == service) {
            continue;
        }
        let containers_running = pod
            .containers
            .iter()
            .all(|c| matches!(c, PodContainerState::Running));
        state
            .messages
            .insert(service.to_string(), pod.message.clone());

        if status == TargetStatus::Removed {
            continue;
        }
        if pod.phase == PodPhase::Failed {
            state.reached = false;
            state.failed.get_or_insert_with(|| FailedPod {
                pod: pod.name.clone(),
                reason: pod.reason.clone(),
            });
            continue;
        }
        if pod.phase != PodPhase::Running || !containers_running {
            state.reached = false;
        }
    }

    if status == TargetStatus::Removed && !state.messages.is_empty() {
        state.reached = false;
    }
    state
}

/// Derive a container summary from a pod
pub fn pod_to_container_summary(pod: &PodStatusSnapshot) -> ContainerSummary {
    let state = if pod.deletion_timestamp.is_some() {
        REMOVING.to_string()
    } else if pod
        .containers
        .iter()
        .any(|c| !matches!(c, PodContainerState::Running))
    {
        UPDATING.to_string()
    } else if pod.phase != PodPhase::Running {
        pod.phase.to_string()
    } else {
        RUNNING.to_string()
    };

    ContainerSummary {
        id: pod.name.clone(),
        name: pod.name.clone(),
        project: pod.project().to_string(),
        service: pod.service().to_string(),
        state,
        ..Default::default()
    }
}

/// Source of pod snapshots for a project
#[async_trait]
pub trait PodSource: Send + Sync {
    /// Current pods of a project
    async fn list_pods(&self, project_name: &str) -> Result<Vec<PodStatusSnapshot>>;
}

/// Progress callback: service, whether the target was reached, latest message
pub type ProgressFn = Arc<dyn Fn(&str, bool, &str) + Send + Sync>;

/// What to wait for
#[derive(Clone)]
pub struct WaitForStatusOptions {
    /// Project whose pods are polled
    pub project_name: String,
    /// Services to consider, empty for all
    pub services: Vec<String>,
    /// Target state
    pub status: TargetStatus,
    /// Give up after this long; wait indefinitely when unset
    pub timeout: Option<Duration>,
    /// Delay between evaluation passes
    pub interval: Duration,
    /// Progress reporting
    pub log: Option<ProgressFn>,
}

impl WaitForStatusOptions {
    /// Wait for `status` on every pod of a project, polling every second
    pub fn new(project_name: impl Into<String>, status: TargetStatus) -> Self {
        Self {
            project_name: project_name.into(),
            services: Vec::new(),
            status,
            timeout: None,
            interval: Duration::from_secs(1),
            log: None,
        }
    }
}

/// Poll `source` until the target state is reached
pub async fn wait_for_status(
    source: &dyn PodSource,
    options: &WaitForStatusOptions,
) -> Result<()> {
    let started = Instant::now();
    loop {
        let pods = source.list_pods(&options.project_name).await?;
        let state = check_pods_state(&options.services, &pods, options.status);
        if let Some(log) = &options.log {
            for (service, message) in &state.messages {
                log(service, state.reached, message);
            }
        }
        if let Some(err) = state.error() {
            return Err(err);
        }
        if state.reached {
            debug!(
                "Project {} reached status {}",
                options.project_name, options.status
            );
            return Ok(());
        }
        if let Some(timeout) = options.timeout {
            if started.elapsed() >= timeout {
                return Err(OrchestrationError::Timeout {
                    status: options.status.to_string(),
                    waited: started.elapsed(),
                }
                .into());
            }
        }
        smol::Timer::after(options.interval).await;
    }
}
