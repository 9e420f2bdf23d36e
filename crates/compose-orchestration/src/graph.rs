//! Dependency-driven execution engine
//!
//! Builds a directed graph from the services' `depends_on` declarations and
//! runs a caller-supplied action per service. A service becomes eligible
//! once every incoming edge's condition has been observed for its
//! dependency; eligible services run concurrently.

use async_trait::async_trait;
use compose_api::{
    Condition, ConfigError, Error, OrchestrationError, Project, Result, ServiceConfig,
};
use futures::future::{self, BoxFuture, Either};
use futures::stream::{FuturesUnordered, StreamExt};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use tracing::{debug, info, warn};

/// A dependency edge as seen from one end
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    /// Service at the other end of the edge
    pub service: String,
    /// Condition the dependency must reach
    pub condition: Condition,
}

/// Dependency graph over the services of one project
#[derive(Debug)]
pub struct DependencyGraph {
    /// Services in project order
    services: IndexMap<String, ServiceConfig>,
    /// dependency -> dependents
    edges: HashMap<String, Vec<Edge>>,
    /// dependent -> dependencies
    reverse_edges: HashMap<String, Vec<Edge>>,
}

impl DependencyGraph {
    /// Build the graph, rejecting unknown dependencies and cycles
    pub fn from_project(project: &Project) -> Result<Self> {
        project.validate()?;

        let mut edges: HashMap<String, Vec<Edge>> = HashMap::new();
        let mut reverse_edges: HashMap<String, Vec<Edge>> = HashMap::new();
        let mut services = IndexMap::new();

        for service in &project.services {
            services.insert(service.name.clone(), service.clone());
            for (dependency, config) in &service.depends_on {
                // dependency -> service (dependency must come first)
                edges.entry(dependency.clone()).or_default().push(Edge {
                    service: service.name.clone(),
                    condition: config.condition,
                });
                reverse_edges
                    .entry(service.name.clone())
                    .or_default()
                    .push(Edge {
                        service: dependency.clone(),
                        condition: config.condition,
                    });
            }
        }

        let graph = Self {
            services,
            edges,
            reverse_edges,
        };
        graph.topological_sort()?;
        Ok(graph)
    }

    /// Number of services in the graph
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Whether the graph has no services
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Services that depend on `service`
    pub fn dependents(&self, service: &str) -> &[Edge] {
        self.edges.get(service).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Services `service` depends on
    pub fn dependencies(&self, service: &str) -> &[Edge] {
        self.reverse_edges
            .get(service)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Order services so that dependencies come before dependents
    pub fn topological_sort(&self) -> Result<Vec<String>> {
        let mut in_degree: HashMap<&str, usize> = self
            .services
            .keys()
            .map(|name| (name.as_str(), self.dependencies(name).len()))
            .collect();
        let mut queue: VecDeque<&str> = self
            .services
            .keys()
            .map(String::as_str)
            .filter(|name| in_degree[name] == 0)
            .collect();
        let mut result = Vec::with_capacity(self.services.len());

        while let Some(node) = queue.pop_front() {
            result.push(node.to_string());
            for dependent in self.dependents(node) {
                if let Some(degree) = in_degree.get_mut(dependent.service.as_str()) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(&dependent.service);
                    }
                }
            }
        }

        if result.len() != self.services.len() {
            let sorted: HashSet<&str> = result.iter().map(String::as_str).collect();
            let remaining: Vec<&str> = self
                .services
                .keys()
                .map(String::as_str)
                .filter(|name| !sorted.contains(name))
                .collect();
            return Err(ConfigError::CyclicDependency {
                cycle: self.find_cycle(&remaining),
            }
            .into());
        }

        Ok(result)
    }

    /// Walk dependencies from an unsorted node until a service repeats
    fn find_cycle(&self, remaining: &[&str]) -> Vec<String> {
        let remaining_set: HashSet<&str> = remaining.iter().copied().collect();
        let Some(&start) = remaining.first() else {
            return Vec::new();
        };

        let mut path: Vec<&str> = vec![start];
        let mut current = start;
        loop {
            // Every node left after Kahn's pass has a dependency that is also left.
            let Some(next) = self
                .dependencies(current)
                .iter()
                .map(|edge| edge.service.as_str())
                .find(|dep| remaining_set.contains(dep))
            else {
                return path.iter().map(|s| s.to_string()).collect();
            };
            if let Some(position) = path.iter().position(|s| *s == next) {
                let mut cycle: Vec<String> =
                    path[position..].iter().map(|s| s.to_string()).collect();
                cycle.push(next.to_string());
                return cycle;
            }
            path.push(next);
            current = next;
        }
    }
}

/// Observes whether a dependency reached the condition its dependents need
#[async_trait]
pub trait ConditionCheck: Send + Sync {
    /// Resolve once `service` satisfies `condition`, or fail if it never will
    async fn wait_for(&self, service: &ServiceConfig, condition: Condition) -> Result<()>;
}

/// Treats every condition as satisfied once the dependency's action completed
#[derive(Debug, Clone, Copy, Default)]
pub struct ActionCompletion;

#[async_trait]
impl ConditionCheck for ActionCompletion {
    async fn wait_for(&self, _service: &ServiceConfig, _condition: Condition) -> Result<()> {
        Ok(())
    }
}

/// Walk direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Dependencies before dependents, observing conditions
    Forward,
    /// Dependents before dependencies, conditions are not observed
    Reverse,
}

enum Step {
    Action {
        service: String,
        result: Result<()>,
    },
    Condition {
        service: String,
        condition: Condition,
        result: Result<()>,
    },
}

/// Executes per-service actions in dependency order
pub struct DependencyOrchestrator {
    graph: DependencyGraph,
}

impl DependencyOrchestrator {
    /// Build the orchestrator; cycles are rejected here, before any action runs
    pub fn new(project: &Project) -> Result<Self> {
        Ok(Self {
            graph: DependencyGraph::from_project(project)?,
        })
    }

    /// The underlying graph
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Run `action` once per service
    ///
    /// When an action fails, no further action is launched and pending
    /// condition waits are dropped. Actions already in flight run to
    /// completion and the first failure is returned.
    pub async fn execute<'a, F, Fut>(
        &'a self,
        direction: Direction,
        check: &'a dyn ConditionCheck,
        action: F,
    ) -> Result<()>
    where
        F: Fn(ServiceConfig) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'a,
    {
        if self.graph.is_empty() {
            return Ok(());
        }

        let incoming = |name: &str| match direction {
            Direction::Forward => self.graph.dependencies(name),
            Direction::Reverse => self.graph.dependents(name),
        };
        let outgoing = |name: &str| match direction {
            Direction::Forward => self.graph.dependents(name),
            Direction::Reverse => self.graph.dependencies(name),
        };

        let mut pending: HashMap<&str, usize> = self
            .graph
            .services
            .keys()
            .map(|name| (name.as_str(), incoming(name).len()))
            .collect();
        let mut in_flight: FuturesUnordered<BoxFuture<'a, Step>> = FuturesUnordered::new();
        let mut waits: FuturesUnordered<BoxFuture<'a, Step>> = FuturesUnordered::new();
        let mut first_error: Option<Error> = None;

        let launch = |service: &ServiceConfig| -> BoxFuture<'a, Step> {
            let name = service.name.clone();
            let fut = action(service.clone());
            Box::pin(async move {
                let result = fut.await;
                Step::Action {
                    service: name,
                    result,
                }
            })
        };

        let ready: Vec<&ServiceConfig> = self
            .graph
            .services
            .values()
            .filter(|s| pending[s.name.as_str()] == 0)
            .collect();
        info!(
            "Executing {} services in parallel: {:?}",
            ready.len(),
            ready.iter().map(|s| s.name.as_str()).collect::<Vec<_>>()
        );
        for service in ready {
            in_flight.push(launch(service));
        }

        while let Some(step) = next_step(&mut in_flight, &mut waits).await {
            let (service, satisfied) = match step {
                Step::Action {
                    service,
                    result: Ok(()),
                } => {
                    debug!("Completed: {}", service);
                    if first_error.is_some() {
                        continue;
                    }
                    match direction {
                        Direction::Forward => {
                            let config = &self.graph.services[service.as_str()];
                            let conditions: HashSet<Condition> = outgoing(&service)
                                .iter()
                                .map(|edge| edge.condition)
                                .collect();
                            for condition in conditions {
                                let name = service.clone();
                                waits.push(Box::pin(async move {
                                    let result = check.wait_for(config, condition).await;
                                    Step::Condition {
                                        service: name,
                                        condition,
                                        result,
                                    }
                                }));
                            }
                            continue;
                        }
                        Direction::Reverse => (service, None),
                    }
                }
                Step::Action {
                    service,
                    result: Err(e),
                } => {
                    warn!("Failed to execute {}: {}", service, e);
                    if first_error.is_none() {
                        first_error = Some(wrap_failure(service, e));
                        waits.clear();
                    }
                    continue;
                }
                Step::Condition {
                    service,
                    condition,
                    result: Ok(()),
                } => {
                    debug!("Service {} reached {}", service, condition);
                    (service, Some(condition))
                }
                Step::Condition {
                    service,
                    condition,
                    result: Err(e),
                } => {
                    warn!("Service {} did not reach {}: {}", service, condition, e);
                    if first_error.is_none() {
                        first_error = Some(wrap_failure(service, e));
                        waits.clear();
                    }
                    continue;
                }
            };

            if first_error.is_some() {
                continue;
            }
            for edge in outgoing(&service) {
                if satisfied.is_some_and(|condition| condition != edge.condition) {
                    continue;
                }
                let Some(degree) = pending.get_mut(edge.service.as_str()) else {
                    continue;
                };
                *degree -= 1;
                if *degree == 0 {
                    in_flight.push(launch(&self.graph.services[edge.service.as_str()]));
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Next finished action or condition wait, `None` once both sets are drained
async fn next_step<'a>(
    actions: &mut FuturesUnordered<BoxFuture<'a, Step>>,
    waits: &mut FuturesUnordered<BoxFuture<'a, Step>>,
) -> Option<Step> {
    match (actions.is_empty(), waits.is_empty()) {
        (true, true) => None,
        (false, true) => actions.next().await,
        (true, false) => waits.next().await,
        (false, false) => match future::select(actions.next(), waits.next()).await {
            Either::Left((step, _)) | Either::Right((step, _)) => step,
        },
    }
}

fn wrap_failure(service: String, error: Error) -> Error {
    if error.is_not_implemented() {
        return error;
    }
    OrchestrationError::DependencyFailed {
        service,
        source: Box::new(error),
    }
    .into()
}

/// Run `action` for every service, dependencies first
///
/// Every condition is considered reached when the dependency's action
/// completes. Use [`in_dependency_order_with`] to observe conditions.
pub async fn in_dependency_order<F, Fut>(project: &Project, action: F) -> Result<()>
where
    F: Fn(ServiceConfig) -> Fut,
    Fut: Future<Output = Result<()>> + Send,
{
    in_dependency_order_with(project, &ActionCompletion, action).await
}

/// Run `action` for every service, waiting on `check` for each dependency edge
pub async fn in_dependency_order_with<F, Fut>(
    project: &Project,
    check: &dyn ConditionCheck,
    action: F,
) -> Result<()>
where
    F: Fn(ServiceConfig) -> Fut,
    Fut: Future<Output = Result<()>> + Send,
{
    let orchestrator = DependencyOrchestrator::new(project)?;
    orchestrator
        .execute(Direction::Forward, check, action)
        .await
}

/// Run `action` for every service, dependents first
pub async fn in_reverse_dependency_order<F, Fut>(project: &Project, action: F) -> Result<()>
where
    F: Fn(ServiceConfig) -> Fut,
    Fut: Future<Output = Result<()>> + Send,
{
    let orchestrator = DependencyOrchestrator::new(project)?;
    orchestrator
        .execute(Direction::Reverse, &ActionCompletion, action)
        .await
}
