//! Container engine backed by the `docker` command line client.

use super::{
    ContainerEngine, ContainerSpec, ContainerState, EngineContainer, EngineEvent,
    EngineEventStream, EngineImage, ExecSpec, LogStream, NetworkAttachment, NetworkSpec,
    ProcessTable, VolumeSpec,
};
use async_process::{Command, Stdio};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use compose_api::{BuildConfig, Error, LabelFilter, Operation, PortPublisher, Result};
use futures::stream::{self, StreamExt};
use futures_lite::io::{AsyncBufReadExt, BufReader};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

const JSON_FORMAT: &str = "{{json .}}";

/// Drives the engine by running `docker` subcommands
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
}

impl DockerCli {
    /// Use `docker` from the search path
    pub fn new() -> Self {
        Self::with_binary("docker")
    }

    /// Use a specific client binary
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Run a subcommand to completion and return its stdout
    async fn run(&self, operation: Operation, target: &str, args: Vec<String>) -> Result<String> {
        debug!("Running {} {}", self.binary, args.join(" "));
        let output = Command::new(&self.binary).args(&args).output().await?;
        if !output.status.success() {
            return Err(Error::backend(
                operation,
                target,
                String::from_utf8_lossy(&output.stderr).trim(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Spawn a long-running subcommand and stream its output lines
    fn spawn_lines(
        &self,
        operation: Operation,
        target: &str,
        args: Vec<String>,
    ) -> Result<stream::BoxStream<'static, Result<String>>> {
        debug!("Streaming {} {}", self.binary, args.join(" "));
        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::backend(operation, target, "stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::backend(operation, target, "stderr not captured"))?;

        let lines = stream::select(
            BufReader::new(stdout).lines(),
            BufReader::new(stderr).lines(),
        );
        // The child lives as long as the stream and is killed when it is dropped.
        Ok(lines
            .map(move |line| {
                let _child = &child;
                line.map_err(Error::from)
            })
            .boxed())
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

fn strings<const N: usize>(args: [&str; N]) -> Vec<String> {
    args.iter().map(|a| a.to_string()).collect()
}

fn push_filters(args: &mut Vec<String>, filters: &[LabelFilter]) {
    for filter in filters {
        args.push("--filter".to_string());
        args.push(format!("label={}", filter));
    }
}

fn push_labels(args: &mut Vec<String>, labels: &[(String, String)]) {
    for (key, value) in labels {
        args.push("--label".to_string());
        args.push(format!("{}={}", key, value));
    }
}

fn names(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

fn timeout_args(args: &mut Vec<String>, timeout: Option<Duration>) {
    if let Some(timeout) = timeout {
        args.push("--time".to_string());
        args.push(timeout.as_secs().to_string());
    }
}

/// Arguments listing containers by label
pub fn ps_args(filters: &[LabelFilter], all: bool) -> Vec<String> {
    let mut args = strings(["ps", "--no-trunc", "--format", JSON_FORMAT]);
    if all {
        args.push("--all".to_string());
    }
    push_filters(&mut args, filters);
    args
}

/// Arguments creating a container
pub fn create_args(spec: &ContainerSpec) -> Vec<String> {
    let mut args = strings(["create", "--name"]);
    args.push(spec.name.clone());
    push_labels(&mut args, &spec.labels);
    for variable in &spec.environment {
        args.push("--env".to_string());
        args.push(variable.clone());
    }
    if let Some(network) = spec.networks.first() {
        args.push("--network".to_string());
        args.push(network.network.clone());
        if let Some(address) = &network.ipv4_address {
            args.push("--ip".to_string());
            args.push(address.clone());
        }
        for alias in &network.aliases {
            args.push("--network-alias".to_string());
            args.push(alias.clone());
        }
    }
    for volume in &spec.volumes {
        args.push("--volume".to_string());
        args.push(volume.clone());
    }
    for target in &spec.tmpfs {
        args.push("--tmpfs".to_string());
        args.push(target.clone());
    }
    for port in &spec.ports {
        args.push("--publish".to_string());
        args.push(port.clone());
    }
    if spec.auto_remove {
        args.push("--rm".to_string());
    }
    args.push(spec.image.clone());
    args.extend(spec.command.iter().cloned());
    args
}

/// Arguments connecting a created container to an additional network
pub fn connect_args(id: &str, attachment: &NetworkAttachment) -> Vec<String> {
    let mut args = strings(["network", "connect"]);
    if let Some(address) = &attachment.ipv4_address {
        args.push("--ip".to_string());
        args.push(address.clone());
    }
    for alias in &attachment.aliases {
        args.push("--alias".to_string());
        args.push(alias.clone());
    }
    args.push(attachment.network.clone());
    args.push(id.to_string());
    args
}

/// Arguments running a command in a container
pub fn exec_args(id: &str, spec: &ExecSpec) -> Vec<String> {
    let mut args = vec!["exec".to_string()];
    if spec.tty {
        args.push("--interactive".to_string());
        args.push("--tty".to_string());
    }
    for variable in &spec.environment {
        args.push("--env".to_string());
        args.push(variable.clone());
    }
    if let Some(user) = &spec.user {
        args.push("--user".to_string());
        args.push(user.clone());
    }
    if let Some(workdir) = &spec.workdir {
        args.push("--workdir".to_string());
        args.push(workdir.clone());
    }
    args.push(id.to_string());
    args.extend(spec.command.iter().cloned());
    args
}

/// Arguments building an image
pub fn build_args(tag: &str, build: &BuildConfig, pull: bool, no_cache: bool) -> Vec<String> {
    let mut args = strings(["build", "--tag", tag]);
    if let Some(dockerfile) = &build.dockerfile {
        args.push("--file".to_string());
        args.push(format!("{}/{}", build.context.trim_end_matches('/'), dockerfile));
    }
    for (key, value) in &build.args {
        args.push("--build-arg".to_string());
        match value {
            Some(value) => args.push(format!("{}={}", key, value)),
            None => args.push(key.clone()),
        }
    }
    if pull {
        args.push("--pull".to_string());
    }
    if no_cache {
        args.push("--no-cache".to_string());
    }
    args.push(build.context.clone());
    args
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PsLine {
    #[serde(rename = "ID")]
    id: String,
    names: String,
    image: String,
    state: String,
    status: String,
    #[serde(default)]
    labels: String,
    #[serde(default)]
    ports: String,
}

/// Parse one line of `docker ps --format '{{json .}}'`
pub fn parse_ps_line(line: &str) -> Result<EngineContainer> {
    let ps: PsLine = serde_json::from_str(line)?;
    Ok(EngineContainer {
        id: ps.id,
        name: ps.names,
        image: ps.image,
        state: ps.state,
        status: ps.status,
        labels: parse_labels(&ps.labels),
        ports: parse_ports(&ps.ports),
    })
}

/// Parse the `k=v,k=v` label rendering of `docker ps`
///
/// Docker does not escape commas inside values, so a segment without `=`
/// is folded back into the previous value. A value holding `,k=v` is still
/// read as two labels; the `com.docker.compose.*` labels never do.
pub fn parse_labels(labels: &str) -> HashMap<String, String> {
    let mut parsed: Vec<(String, String)> = Vec::new();
    for segment in labels.split(',') {
        match segment.split_once('=') {
            Some((key, value)) => parsed.push((key.to_string(), value.to_string())),
            None => {
                if let Some((_, value)) = parsed.last_mut() {
                    value.push(',');
                    value.push_str(segment);
                }
            }
        }
    }
    parsed.into_iter().collect()
}

/// Parse the port rendering of `docker ps`, e.g. `0.0.0.0:8080->80/tcp, 443/tcp`
pub fn parse_ports(ports: &str) -> Vec<PortPublisher> {
    ports
        .split(", ")
        .filter(|p| !p.is_empty())
        .filter_map(|entry| {
            let (host, container) = match entry.split_once("->") {
                Some((host, container)) => (Some(host), container),
                None => (None, entry),
            };
            let (target, protocol) = container.split_once('/')?;
            let target_port = target.parse().ok()?;
            let (url, published_port) = match host.and_then(|h| h.rsplit_once(':')) {
                Some((url, port)) => (url.to_string(), port.parse().ok()?),
                None => (String::new(), 0),
            };
            Some(PortPublisher {
                url,
                target_port,
                published_port,
                protocol: protocol.to_string(),
            })
        })
        .collect()
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectState {
    status: String,
    running: bool,
    restarting: bool,
    exit_code: i32,
    #[serde(default)]
    health: Option<InspectHealth>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectHealth {
    status: String,
}

/// Parse `docker inspect --format '{{json .State}}'`
pub fn parse_state(output: &str) -> Result<ContainerState> {
    let state: InspectState = serde_json::from_str(output.trim())?;
    Ok(ContainerState {
        status: state.status,
        running: state.running,
        restarting: state.restarting,
        exit_code: state.exit_code,
        health: state.health.map(|h| h.status),
    })
}

/// Parse the table printed by `docker top`
///
/// The last column is the command line and may contain spaces.
pub fn parse_top(output: &str) -> ProcessTable {
    let mut lines = output.lines().filter(|l| !l.trim().is_empty());
    let titles: Vec<String> = match lines.next() {
        Some(header) => header.split_whitespace().map(str::to_string).collect(),
        None => return ProcessTable::default(),
    };
    let columns = titles.len();
    let processes = lines
        .map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if columns == 0 || fields.len() < columns {
                return fields.iter().map(|f| f.to_string()).collect();
            }
            let mut row: Vec<String> = fields[..columns - 1]
                .iter()
                .map(|f| f.to_string())
                .collect();
            row.push(fields[columns - 1..].join(" "));
            row
        })
        .collect();
    ProcessTable { titles, processes }
}

/// Parse the first binding printed by `docker port`, e.g. `0.0.0.0:8080`
pub fn parse_port_binding(output: &str) -> Option<(String, u16)> {
    let line = output.lines().next()?.trim();
    let (host, port) = line.rsplit_once(':')?;
    Some((host.to_string(), port.parse().ok()?))
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ImageLine {
    id: String,
    #[serde(default)]
    repo_tags: Vec<String>,
    #[serde(default)]
    size: u64,
}

#[derive(Deserialize)]
struct EventLine {
    #[serde(rename = "Action")]
    action: String,
    #[serde(rename = "Actor")]
    actor: EventActor,
    time: i64,
}

#[derive(Deserialize)]
struct EventActor {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Attributes", default)]
    attributes: HashMap<String, String>,
}

/// Parse one line of `docker events --format '{{json .}}'`
pub fn parse_event(line: &str) -> Result<EngineEvent> {
    let event: EventLine = serde_json::from_str(line)?;
    Ok(EngineEvent {
        timestamp: DateTime::<Utc>::from_timestamp(event.time, 0).unwrap_or_default(),
        id: event.actor.id,
        action: event.action,
        attributes: event.actor.attributes,
    })
}

#[async_trait]
impl ContainerEngine for DockerCli {
    async fn list_containers(
        &self,
        filters: &[LabelFilter],
        all: bool,
    ) -> Result<Vec<EngineContainer>> {
        let output = self.run(Operation::Ps, "containers", ps_args(filters, all)).await?;
        output
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(parse_ps_line)
            .collect()
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        let output = self
            .run(Operation::Create, &spec.name, create_args(spec))
            .await?;
        let id = output.trim().to_string();
        for attachment in spec.networks.iter().skip(1) {
            self.run(Operation::Create, &spec.name, connect_args(&id, attachment))
                .await?;
        }
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        self.run(Operation::Start, id, strings(["start", id])).await?;
        Ok(())
    }

    async fn stop_container(&self, id: &str, timeout: Option<Duration>) -> Result<()> {
        let mut args = vec!["stop".to_string()];
        timeout_args(&mut args, timeout);
        args.push(id.to_string());
        self.run(Operation::Stop, id, args).await?;
        Ok(())
    }

    async fn restart_container(&self, id: &str, timeout: Option<Duration>) -> Result<()> {
        let mut args = vec!["restart".to_string()];
        timeout_args(&mut args, timeout);
        args.push(id.to_string());
        self.run(Operation::Restart, id, args).await?;
        Ok(())
    }

    async fn kill_container(&self, id: &str, signal: Option<&str>) -> Result<()> {
        let mut args = vec!["kill".to_string()];
        if let Some(signal) = signal {
            args.push("--signal".to_string());
            args.push(signal.to_string());
        }
        args.push(id.to_string());
        self.run(Operation::Kill, id, args).await?;
        Ok(())
    }

    async fn remove_container(&self, id: &str, force: bool, volumes: bool) -> Result<()> {
        let mut args = vec!["rm".to_string()];
        if force {
            args.push("--force".to_string());
        }
        if volumes {
            args.push("--volumes".to_string());
        }
        args.push(id.to_string());
        self.run(Operation::Remove, id, args).await?;
        Ok(())
    }

    async fn pause_container(&self, id: &str) -> Result<()> {
        self.run(Operation::Pause, id, strings(["pause", id])).await?;
        Ok(())
    }

    async fn unpause_container(&self, id: &str) -> Result<()> {
        self.run(Operation::UnPause, id, strings(["unpause", id]))
            .await?;
        Ok(())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerState> {
        let output = self
            .run(
                Operation::Ps,
                id,
                strings(["inspect", "--format", "{{json .State}}", id]),
            )
            .await?;
        parse_state(&output)
    }

    async fn wait_container(&self, id: &str) -> Result<i32> {
        let output = self.run(Operation::Up, id, strings(["wait", id])).await?;
        let code = output.trim();
        code.parse().map_err(|_| {
            Error::backend(Operation::Up, id, format!("unexpected exit code {:?}", code))
        })
    }

    async fn container_logs(
        &self,
        id: &str,
        follow: bool,
        tail: Option<usize>,
    ) -> Result<LogStream> {
        let mut args = vec!["logs".to_string()];
        if follow {
            args.push("--follow".to_string());
        }
        if let Some(tail) = tail {
            args.push("--tail".to_string());
            args.push(tail.to_string());
        }
        args.push(id.to_string());
        self.spawn_lines(Operation::Logs, id, args)
    }

    async fn exec(&self, id: &str, spec: &ExecSpec) -> Result<i32> {
        let args = exec_args(id, spec);
        debug!("Running {} {}", self.binary, args.join(" "));
        let status = Command::new(&self.binary).args(&args).status().await?;
        Ok(status.code().unwrap_or(-1))
    }

    async fn copy(&self, source: &str, destination: &str) -> Result<()> {
        self.run(Operation::Copy, source, strings(["cp", source, destination]))
            .await?;
        Ok(())
    }

    async fn top(&self, id: &str) -> Result<ProcessTable> {
        let output = self.run(Operation::Top, id, strings(["top", id])).await?;
        Ok(parse_top(&output))
    }

    async fn port(&self, id: &str, port: u16, protocol: &str) -> Result<(String, u16)> {
        let binding = format!("{}/{}", port, protocol);
        let output = self
            .run(Operation::Port, id, strings(["port", id, &binding]))
            .await?;
        parse_port_binding(&output).ok_or_else(|| {
            Error::backend(Operation::Port, id, format!("no public port for {}", binding))
        })
    }

    async fn build_image(
        &self,
        tag: &str,
        build: &BuildConfig,
        pull: bool,
        no_cache: bool,
    ) -> Result<()> {
        self.run(Operation::Build, tag, build_args(tag, build, pull, no_cache))
            .await?;
        Ok(())
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        self.run(Operation::Pull, image, strings(["pull", image]))
            .await?;
        Ok(())
    }

    async fn push_image(&self, image: &str) -> Result<()> {
        self.run(Operation::Push, image, strings(["push", image]))
            .await?;
        Ok(())
    }

    async fn inspect_image(&self, image: &str) -> Result<EngineImage> {
        let output = self
            .run(
                Operation::Images,
                image,
                strings(["image", "inspect", "--format", JSON_FORMAT, image]),
            )
            .await?;
        let line: ImageLine = serde_json::from_str(output.trim())?;
        Ok(EngineImage {
            id: line.id,
            repo_tags: line.repo_tags,
            size: line.size,
        })
    }

    async fn create_network(&self, spec: &NetworkSpec) -> Result<()> {
        let mut args = strings(["network", "create"]);
        if let Some(driver) = &spec.driver {
            args.push("--driver".to_string());
            args.push(driver.clone());
        }
        if let Some(subnet) = &spec.subnet {
            args.push("--subnet".to_string());
            args.push(subnet.clone());
        }
        if let Some(gateway) = &spec.gateway {
            args.push("--gateway".to_string());
            args.push(gateway.clone());
        }
        push_labels(&mut args, &spec.labels);
        args.push(spec.name.clone());
        self.run(Operation::Create, &spec.name, args).await?;
        Ok(())
    }

    async fn list_networks(&self, filters: &[LabelFilter]) -> Result<Vec<String>> {
        let mut args = strings(["network", "ls", "--format", "{{.Name}}"]);
        push_filters(&mut args, filters);
        let output = self.run(Operation::Down, "networks", args).await?;
        Ok(names(&output))
    }

    async fn remove_network(&self, name: &str) -> Result<()> {
        self.run(Operation::Down, name, strings(["network", "rm", name]))
            .await?;
        Ok(())
    }

    async fn create_volume(&self, spec: &VolumeSpec) -> Result<()> {
        let mut args = strings(["volume", "create"]);
        if let Some(driver) = &spec.driver {
            args.push("--driver".to_string());
            args.push(driver.clone());
        }
        push_labels(&mut args, &spec.labels);
        args.push(spec.name.clone());
        self.run(Operation::Create, &spec.name, args).await?;
        Ok(())
    }

    async fn list_volumes(&self, filters: &[LabelFilter]) -> Result<Vec<String>> {
        let mut args = strings(["volume", "ls", "--format", "{{.Name}}"]);
        push_filters(&mut args, filters);
        let output = self.run(Operation::Down, "volumes", args).await?;
        Ok(names(&output))
    }

    async fn remove_volume(&self, name: &str) -> Result<()> {
        self.run(Operation::Down, name, strings(["volume", "rm", name]))
            .await?;
        Ok(())
    }

    async fn events(&self, filters: &[LabelFilter]) -> Result<EngineEventStream> {
        let mut args = strings([
            "events",
            "--format",
            JSON_FORMAT,
            "--filter",
            "type=container",
        ]);
        push_filters(&mut args, filters);
        let lines = self.spawn_lines(Operation::Events, "events", args)?;
        Ok(lines
            .map(|line| line.and_then(|line| parse_event(&line)))
            .boxed())
    }
}
