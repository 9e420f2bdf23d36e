//! Common test utilities: an in-memory container engine, a scripted cluster
//! and a consumer that records what it is told.

#![allow(dead_code)]

use async_trait::async_trait;
use compose_api::{
    BuildConfig, Error, LabelFilter, LogConsumer, LogOptions, Operation, Project, Result, Stack,
    labels,
};
use compose_orchestration::ClusterClient;
use compose_orchestration::engine::{
    ContainerEngine, ContainerSpec, ContainerState, EngineContainer, EngineEvent,
    EngineEventStream, EngineImage, ExecSpec, LogStream, NetworkSpec, ProcessTable, VolumeSpec,
};
use compose_orchestration::readiness::PodStatusSnapshot;
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How containers of a service behave once started
#[derive(Debug, Clone, Default)]
pub struct Script {
    /// Output produced after start
    pub lines: Vec<String>,
    /// Exit on its own with this code; run until stopped when unset
    pub exit_code: Option<i32>,
    /// Reported health
    pub health: Option<String>,
}

#[derive(Debug, Clone)]
struct FakeContainer {
    container: EngineContainer,
    script: Script,
    exit_code: i32,
}

#[derive(Default)]
struct State {
    next_id: usize,
    containers: Vec<FakeContainer>,
    networks: Vec<(String, HashMap<String, String>)>,
    volumes: Vec<(String, HashMap<String, String>)>,
    scripts: HashMap<String, Script>,
    failing: HashSet<String>,
    events: Vec<EngineEvent>,
    calls: Vec<String>,
}

/// Container engine keeping everything in memory
#[derive(Default)]
pub struct FakeEngine {
    state: Mutex<State>,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Containers of `service` created from now on follow `script`
    pub fn script(&self, service: &str, script: Script) {
        self.state
            .lock()
            .unwrap()
            .scripts
            .insert(service.to_string(), script);
    }

    /// Starting containers of `service` fails
    pub fn fail_start(&self, service: &str) {
        self.state
            .lock()
            .unwrap()
            .failing
            .insert(service.to_string());
    }

    /// Events replayed by the next `events` call
    pub fn push_event(&self, event: EngineEvent) {
        self.state.lock().unwrap().events.push(event);
    }

    /// Calls made so far, such as `start shop-db-1`
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Calls starting with `verb`, without the verb
    pub fn calls_of(&self, verb: &str) -> Vec<String> {
        let prefix = format!("{} ", verb);
        self.calls()
            .into_iter()
            .filter_map(|c| c.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }

    /// Names and states of every container
    pub fn containers(&self) -> Vec<(String, String)> {
        self.state
            .lock()
            .unwrap()
            .containers
            .iter()
            .map(|c| (c.container.name.clone(), c.container.state.clone()))
            .collect()
    }

    pub fn networks(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.networks.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn volumes(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.volumes.iter().map(|(n, _)| n.clone()).collect()
    }

    /// Add a container as if another tool had created it
    pub fn adopt(&self, project: &str, service: &str, number: usize, state: &str) {
        let mut guard = self.state.lock().unwrap();
        guard.next_id += 1;
        let id = format!("c{}", guard.next_id);
        guard.containers.push(FakeContainer {
            container: EngineContainer {
                id,
                name: format!("{project}-{service}-{number}"),
                image: "busybox".to_string(),
                state: state.to_string(),
                status: String::new(),
                labels: HashMap::from([
                    (labels::PROJECT_LABEL.to_string(), project.to_string()),
                    (labels::SERVICE_LABEL.to_string(), service.to_string()),
                    (labels::ONEOFF_LABEL.to_string(), "False".to_string()),
                    (labels::CONTAINER_NUMBER_LABEL.to_string(), number.to_string()),
                ]),
                ports: Vec::new(),
            },
            script: Script::default(),
            exit_code: 0,
        });
    }

    fn with_container<T>(
        &self,
        operation: Operation,
        id: &str,
        f: impl FnOnce(&mut FakeContainer, &mut Vec<String>) -> T,
    ) -> Result<T> {
        let mut guard = self.state.lock().unwrap();
        let State {
            containers, calls, ..
        } = &mut *guard;
        let container = containers
            .iter_mut()
            .find(|c| c.container.id == id)
            .ok_or_else(|| Error::backend(operation, id, "no such container"))?;
        Ok(f(container, calls))
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn list_containers(
        &self,
        filters: &[LabelFilter],
        all: bool,
    ) -> Result<Vec<EngineContainer>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .containers
            .iter()
            .map(|c| &c.container)
            .filter(|c| all || c.is_running())
            .filter(|c| labels::matches_all(filters, &c.labels))
            .cloned()
            .collect())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("c{}", state.next_id);
        let container_labels: HashMap<String, String> = spec.labels.iter().cloned().collect();
        let service = container_labels
            .get(labels::SERVICE_LABEL)
            .cloned()
            .unwrap_or_default();
        let script = state.scripts.get(&service).cloned().unwrap_or_default();
        state.calls.push(format!("create {}", spec.name));
        state.containers.push(FakeContainer {
            container: EngineContainer {
                id: id.clone(),
                name: spec.name.clone(),
                image: spec.image.clone(),
                state: "created".to_string(),
                status: "Created".to_string(),
                labels: container_labels,
                ports: Vec::new(),
            },
            script,
            exit_code: 0,
        });
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        let failing = self.state.lock().unwrap().failing.clone();
        self.with_container(Operation::Start, id, |c, calls| {
            calls.push(format!("start {}", c.container.name));
            if failing.contains(c.container.service()) {
                return Err(Error::backend(
                    Operation::Start,
                    &c.container.name,
                    "container failed to start",
                ));
            }
            c.container.state = "running".to_string();
            Ok(())
        })?
    }

    async fn stop_container(&self, id: &str, _timeout: Option<Duration>) -> Result<()> {
        self.with_container(Operation::Stop, id, |c, calls| {
            calls.push(format!("stop {}", c.container.name));
            c.container.state = "exited".to_string();
        })
    }

    async fn restart_container(&self, id: &str, _timeout: Option<Duration>) -> Result<()> {
        self.with_container(Operation::Restart, id, |c, calls| {
            calls.push(format!("restart {}", c.container.name));
            c.container.state = "running".to_string();
        })
    }

    async fn kill_container(&self, id: &str, signal: Option<&str>) -> Result<()> {
        self.with_container(Operation::Kill, id, |c, calls| {
            calls.push(format!(
                "kill {} {}",
                c.container.name,
                signal.unwrap_or("SIGKILL")
            ));
            c.container.state = "exited".to_string();
            c.exit_code = 137;
        })
    }

    async fn remove_container(&self, id: &str, _force: bool, _volumes: bool) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let index = state
            .containers
            .iter()
            .position(|c| c.container.id == id)
            .ok_or_else(|| Error::backend(Operation::Remove, id, "no such container"))?;
        let removed = state.containers.remove(index);
        state.calls.push(format!("remove {}", removed.container.name));
        Ok(())
    }

    async fn pause_container(&self, id: &str) -> Result<()> {
        self.with_container(Operation::Pause, id, |c, calls| {
            calls.push(format!("pause {}", c.container.name));
            c.container.state = "paused".to_string();
        })
    }

    async fn unpause_container(&self, id: &str) -> Result<()> {
        self.with_container(Operation::UnPause, id, |c, calls| {
            calls.push(format!("unpause {}", c.container.name));
            c.container.state = "running".to_string();
        })
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerState> {
        self.with_container(Operation::Ps, id, |c, _| ContainerState {
            status: c.container.state.clone(),
            running: c.container.is_running(),
            restarting: false,
            exit_code: c.exit_code,
            health: c.script.health.clone(),
        })
    }

    async fn wait_container(&self, id: &str) -> Result<i32> {
        loop {
            let (state, scripted) = self.with_container(Operation::Up, id, |c, _| {
                (c.container.state.clone(), c.script.exit_code)
            })?;
            match (state.as_str(), scripted) {
                ("running", Some(code)) => {
                    return self.with_container(Operation::Up, id, |c, _| {
                        c.container.state = "exited".to_string();
                        c.exit_code = code;
                        code
                    });
                }
                ("running", None) | ("paused", _) | ("created", _) => {
                    smol::Timer::after(Duration::from_millis(5)).await;
                }
                _ => return self.with_container(Operation::Up, id, |c, _| c.exit_code),
            }
        }
    }

    async fn container_logs(
        &self,
        id: &str,
        _follow: bool,
        _tail: Option<usize>,
    ) -> Result<LogStream> {
        let lines = self.with_container(Operation::Logs, id, |c, _| c.script.lines.clone())?;
        Ok(stream::iter(lines.into_iter().map(Ok)).boxed())
    }

    async fn exec(&self, id: &str, spec: &ExecSpec) -> Result<i32> {
        self.with_container(Operation::Exec, id, |c, calls| {
            calls.push(format!(
                "exec {} {}",
                c.container.name,
                spec.command.join(" ")
            ));
            0
        })
    }

    async fn copy(&self, source: &str, destination: &str) -> Result<()> {
        self.record(format!("copy {} {}", source, destination));
        Ok(())
    }

    async fn top(&self, id: &str) -> Result<ProcessTable> {
        self.with_container(Operation::Top, id, |_, _| ProcessTable {
            titles: vec!["PID".to_string(), "CMD".to_string()],
            processes: vec![vec!["1".to_string(), "sleep infinity".to_string()]],
        })
    }

    async fn port(&self, id: &str, port: u16, protocol: &str) -> Result<(String, u16)> {
        self.with_container(Operation::Port, id, |c, calls| {
            calls.push(format!("port {} {}/{}", c.container.name, port, protocol));
            ("0.0.0.0".to_string(), port + 30000)
        })
    }

    async fn build_image(
        &self,
        tag: &str,
        _build: &BuildConfig,
        _pull: bool,
        _no_cache: bool,
    ) -> Result<()> {
        self.record(format!("build {}", tag));
        Ok(())
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        self.record(format!("pull {}", image));
        if image.contains("missing") {
            return Err(Error::backend(Operation::Pull, image, "manifest unknown"));
        }
        Ok(())
    }

    async fn push_image(&self, image: &str) -> Result<()> {
        self.record(format!("push {}", image));
        Ok(())
    }

    async fn inspect_image(&self, image: &str) -> Result<EngineImage> {
        Ok(EngineImage {
            id: format!("sha256:{}", image.len()),
            repo_tags: vec![image.to_string()],
            size: 1024,
        })
    }

    async fn create_network(&self, spec: &NetworkSpec) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("network {}", spec.name));
        state
            .networks
            .push((spec.name.clone(), spec.labels.iter().cloned().collect()));
        Ok(())
    }

    async fn list_networks(&self, filters: &[LabelFilter]) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .networks
            .iter()
            .filter(|(_, attached)| labels::matches_all(filters, attached))
            .map(|(name, _)| name.clone())
            .collect())
    }

    async fn remove_network(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.networks.retain(|(n, _)| n != name);
        state.calls.push(format!("rmnetwork {}", name));
        Ok(())
    }

    async fn create_volume(&self, spec: &VolumeSpec) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("volume {}", spec.name));
        state
            .volumes
            .push((spec.name.clone(), spec.labels.iter().cloned().collect()));
        Ok(())
    }

    async fn list_volumes(&self, filters: &[LabelFilter]) -> Result<Vec<String>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .volumes
            .iter()
            .filter(|(_, attached)| labels::matches_all(filters, attached))
            .map(|(name, _)| name.clone())
            .collect())
    }

    async fn remove_volume(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.volumes.retain(|(n, _)| n != name);
        state.calls.push(format!("rmvolume {}", name));
        Ok(())
    }

    async fn events(&self, _filters: &[LabelFilter]) -> Result<EngineEventStream> {
        let events = std::mem::take(&mut self.state.lock().unwrap().events);
        Ok(stream::iter(events.into_iter().map(Ok)).boxed())
    }
}

/// Log consumer writing every call to a list
#[derive(Default)]
pub struct RecordingConsumer {
    entries: Mutex<Vec<String>>,
}

impl RecordingConsumer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    pub fn registered(&self) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter_map(|e| e.strip_prefix("register ").map(str::to_string))
            .collect()
    }
}

impl LogConsumer for RecordingConsumer {
    fn register(&self, container: &str) {
        self.entries
            .lock()
            .unwrap()
            .push(format!("register {}", container));
    }

    fn status(&self, container: &str, message: &str) {
        self.entries
            .lock()
            .unwrap()
            .push(format!("status {}: {}", container, message));
    }

    fn log(&self, container: &str, _service: &str, line: &str) {
        self.entries
            .lock()
            .unwrap()
            .push(format!("log {}: {}", container, line));
    }
}

/// Cluster replaying pod snapshots; the last one repeats forever
#[derive(Default)]
pub struct FakeCluster {
    snapshots: Mutex<VecDeque<Vec<PodStatusSnapshot>>>,
    calls: Mutex<Vec<String>>,
}

impl FakeCluster {
    pub fn new(snapshots: Vec<Vec<PodStatusSnapshot>>) -> Arc<Self> {
        Arc::new(Self {
            snapshots: Mutex::new(snapshots.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn apply(&self, project: &Project) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("apply {}", project.name));
        Ok(())
    }

    async fn delete(&self, project_name: &str) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("delete {}", project_name));
        Ok(())
    }

    async fn list_pods(&self, _project_name: &str) -> Result<Vec<PodStatusSnapshot>> {
        let mut snapshots = self.snapshots.lock().unwrap();
        if snapshots.len() > 1 {
            return Ok(snapshots.pop_front().unwrap_or_default());
        }
        Ok(snapshots.front().cloned().unwrap_or_default())
    }

    async fn stacks(&self) -> Result<Vec<Stack>> {
        Ok(Vec::new())
    }

    async fn logs(
        &self,
        _project_name: &str,
        consumer: Arc<dyn LogConsumer>,
        _options: &LogOptions,
    ) -> Result<()> {
        consumer.register("pod");
        Ok(())
    }
}
