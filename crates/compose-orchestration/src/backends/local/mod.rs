//! Full lifecycle backend over a local container engine.
//!
//! Containers are found by label, never by name, so state created by other
//! tools that use the same label vocabulary is picked up as well.

mod attach;
mod conditions;

use crate::engine::{
    ContainerEngine, ContainerSpec, DockerCli, EngineContainer, ExecSpec, NetworkAttachment,
    NetworkSpec, VolumeSpec,
};
use crate::graph::{ActionCompletion, DependencyOrchestrator, Direction, in_dependency_order};
use crate::printer::LogPrinter;
use async_trait::async_trait;
use compose_api::labels::{
    self, CONTAINER_NUMBER_LABEL, NETWORK_LABEL, ONEOFF_LABEL, PROJECT_LABEL, SERVICE_LABEL,
    SLUG_LABEL, VOLUME_LABEL,
};
use compose_api::{
    BuildOptions, ComposeBackend, ContainerProcSummary, ContainerSummary, ConvertOptions,
    CopyOptions, CreateOptions, DownOptions, Error, Event, EventsOptions, ExecOptions,
    ImageSummary, ImagesOptions, KillOptions, ListOptions, LogConsumer, LogOptions,
    NetworkConfig, Operation, PauseOptions, PortOptions, Project, PsOptions, PullOptions,
    PushOptions, RemoveOptions, RestartOptions, Result, RunOptions, ServiceConfig,
    ServiceNetworkConfig, Stack, StartOptions, StopOptions, UpOptions, VolumeType,
};
use conditions::EngineConditions;
use futures::StreamExt;
use futures::future::{self, Either, join_all, try_join_all};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

const DEFAULT_NETWORK: &str = "default";

/// Backend running projects on a local container engine
pub struct LocalBackend {
    engine: Arc<dyn ContainerEngine>,
    poll_interval: Duration,
}

impl LocalBackend {
    /// Create a backend over an engine
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self {
            engine,
            poll_interval: Duration::from_secs(1),
        }
    }

    /// Create a backend driving the `docker` client
    pub fn docker() -> Self {
        Self::new(Arc::new(DockerCli::new()))
    }

    /// Set how often health conditions are polled
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Regular containers of a project, restricted to `services` when not empty
    async fn containers(
        &self,
        project: &str,
        services: &[String],
        all: bool,
    ) -> Result<Vec<EngineContainer>> {
        let filters = [labels::project_filter(project), labels::one_off_filter(false)];
        let containers = self.engine.list_containers(&filters, all).await?;
        Ok(filter_services(containers, services))
    }

    /// The running container with the given index
    async fn indexed_container(
        &self,
        operation: Operation,
        project: &str,
        service: &str,
        index: usize,
    ) -> Result<EngineContainer> {
        let index = index.max(1);
        let filters = [
            labels::project_filter(project),
            labels::service_filter(service),
            labels::container_number_filter(index),
            labels::one_off_filter(false),
        ];
        self.engine
            .list_containers(&filters, false)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                Error::backend(
                    operation,
                    service,
                    format!("service {} has no running container #{}", service, index),
                )
            })
    }

    async fn ensure_networks(&self, project: &Project) -> Result<()> {
        let networks = networks_in_use(project)?;
        let existing: HashSet<String> = self
            .engine
            .list_networks(&[labels::project_filter(&project.name)])
            .await?
            .into_iter()
            .collect();

        for (key, config) in networks {
            if config.external {
                continue;
            }
            let name = network_name(&project.name, &key, &config);
            if existing.contains(&name) {
                debug!("Network {} exists", name);
                continue;
            }
            let pool = config.ipam.as_ref().and_then(|ipam| ipam.config.first());
            info!("Creating network {}", name);
            self.engine
                .create_network(&NetworkSpec {
                    name,
                    driver: config.driver.clone(),
                    subnet: pool.map(|p| p.subnet.clone()),
                    gateway: pool.and_then(|p| p.gateway.clone()),
                    labels: vec![
                        (PROJECT_LABEL.to_string(), project.name.clone()),
                        (NETWORK_LABEL.to_string(), key.clone()),
                    ],
                })
                .await?;
        }
        Ok(())
    }

    async fn ensure_volumes(&self, project: &Project) -> Result<()> {
        let existing: HashSet<String> = self
            .engine
            .list_volumes(&[labels::project_filter(&project.name)])
            .await?
            .into_iter()
            .collect();

        for (key, config) in &project.volumes {
            if config.external {
                continue;
            }
            let name = volume_name(&project.name, key, config.name.as_deref());
            if existing.contains(&name) {
                continue;
            }
            info!("Creating volume {}", name);
            self.engine
                .create_volume(&VolumeSpec {
                    name,
                    driver: config.driver.clone(),
                    labels: vec![
                        (PROJECT_LABEL.to_string(), project.name.clone()),
                        (VOLUME_LABEL.to_string(), key.clone()),
                    ],
                })
                .await?;
        }
        Ok(())
    }

    /// Create missing containers of a service and drop surplus ones
    async fn ensure_service(
        &self,
        project: &Project,
        service: &ServiceConfig,
        observed: &[EngineContainer],
    ) -> Result<()> {
        let replicas = service.replicas() as usize;
        let existing: Vec<&EngineContainer> = observed
            .iter()
            .filter(|c| c.service() == service.name)
            .collect();

        for number in 1..=replicas {
            if let Some(container) = existing.iter().find(|c| c.number() == number) {
                debug!("Container {} exists", container.name);
                continue;
            }
            let spec = container_spec(project, service, number, None)?;
            info!("Creating container {}", spec.name);
            self.engine.create_container(&spec).await?;
        }

        let surplus: Vec<&EngineContainer> = existing
            .into_iter()
            .filter(|c| c.number() > replicas)
            .collect();
        self.remove_containers(surplus, None).await
    }

    async fn stop_containers(
        &self,
        containers: Vec<&EngineContainer>,
        timeout: Option<Duration>,
    ) -> Result<()> {
        try_join_all(containers.into_iter().map(|c| async move {
            info!("Stopping {}", c.name);
            self.engine.stop_container(&c.id, timeout).await
        }))
        .await?;
        Ok(())
    }

    /// Stop running containers, then remove them
    async fn remove_containers(
        &self,
        containers: Vec<&EngineContainer>,
        timeout: Option<Duration>,
    ) -> Result<()> {
        try_join_all(containers.into_iter().map(|c| async move {
            if c.is_running() {
                info!("Stopping {}", c.name);
                self.engine.stop_container(&c.id, timeout).await?;
            }
            info!("Removing {}", c.name);
            self.engine.remove_container(&c.id, true, false).await
        }))
        .await?;
        Ok(())
    }

    async fn stream_logs(
        &self,
        container: &EngineContainer,
        consumer: &dyn LogConsumer,
        follow: bool,
        tail: Option<usize>,
    ) -> Result<()> {
        let mut lines = self
            .engine
            .container_logs(&container.id, follow, tail)
            .await?;
        while let Some(line) = lines.next().await {
            consumer.log(&container.name, container.service(), &line?);
        }
        Ok(())
    }
}

#[async_trait]
impl ComposeBackend for LocalBackend {
    async fn build(&self, project: &Project, options: BuildOptions) -> Result<()> {
        let selected = project.selected_services(&options.services)?;
        let builds = project
            .services
            .iter()
            .filter(|s| selected.contains(&s.name))
            .filter_map(|s| s.build.as_ref().map(|build| (s, build)));

        try_join_all(builds.map(|(service, build)| async move {
            let tag = service.image_name(&project.name);
            info!("Building {}", tag);
            self.engine
                .build_image(&tag, build, options.pull, options.no_cache)
                .await
        }))
        .await?;
        Ok(())
    }

    async fn push(&self, project: &Project, options: PushOptions) -> Result<()> {
        let images: Vec<&str> = project
            .services
            .iter()
            .filter(|s| s.build.is_some())
            .filter_map(|s| s.image.as_deref())
            .collect();

        let results = join_all(images.iter().map(|image| async move {
            info!("Pushing {}", image);
            self.engine.push_image(image).await
        }))
        .await;
        settle(results, options.ignore_failures, "push")
    }

    async fn pull(&self, project: &Project, options: PullOptions) -> Result<()> {
        let selected = project.selected_services(&options.services)?;
        let images: Vec<&str> = project
            .services
            .iter()
            .filter(|s| selected.contains(&s.name) && s.build.is_none())
            .filter_map(|s| s.image.as_deref())
            .collect();

        let results = join_all(images.iter().map(|image| async move {
            info!("Pulling {}", image);
            self.engine.pull_image(image).await
        }))
        .await;
        settle(results, options.ignore_failures, "pull")
    }

    async fn create(&self, project: &Project, options: CreateOptions) -> Result<()> {
        let orchestrator = DependencyOrchestrator::new(project)?;
        let selected = project.selected_services(&options.services)?;
        self.ensure_networks(project).await?;
        self.ensure_volumes(project).await?;

        let observed = self.containers(&project.name, &[], true).await?;
        if options.remove_orphans {
            let declared: HashSet<&str> = project.services.iter().map(|s| s.name.as_str()).collect();
            let orphans: Vec<&EngineContainer> = observed
                .iter()
                .filter(|c| !declared.contains(c.service()))
                .collect();
            self.remove_containers(orphans, None).await?;
        }

        let selected = &selected;
        let observed = &observed;
        orchestrator
            .execute(Direction::Forward, &ActionCompletion, |service| async move {
                if !selected.contains(&service.name) {
                    return Ok(());
                }
                self.ensure_service(project, &service, observed).await
            })
            .await
    }

    async fn start(&self, project: &Project, options: StartOptions) -> Result<()> {
        let orchestrator = DependencyOrchestrator::new(project)?;
        let selected = project.selected_services(&options.services)?;
        let observed = self.containers(&project.name, &selected, true).await?;
        let check = EngineConditions::new(
            self.engine.as_ref(),
            &project.name,
            &selected,
            self.poll_interval,
        );

        let observed = &observed;
        orchestrator
            .execute(Direction::Forward, &check, |service| async move {
                let stopped = observed
                    .iter()
                    .filter(|c| c.service() == service.name && !c.is_running());
                try_join_all(stopped.map(|c| async move {
                    info!("Starting {}", c.name);
                    self.engine.start_container(&c.id).await
                }))
                .await?;
                Ok(())
            })
            .await
    }

    async fn restart(&self, project: &Project, options: RestartOptions) -> Result<()> {
        let selected = project.selected_services(&options.services)?;
        let observed = self.containers(&project.name, &[], true).await?;
        let timeout = options.timeout;

        let selected = &selected;
        let observed = &observed;
        in_dependency_order(project, |service| async move {
            if !selected.contains(&service.name) {
                return Ok(());
            }
            let containers = observed.iter().filter(|c| c.service() == service.name);
            try_join_all(containers.map(|c| async move {
                info!("Restarting {}", c.name);
                self.engine.restart_container(&c.id, timeout).await
            }))
            .await?;
            Ok(())
        })
        .await
    }

    async fn stop(&self, project: &Project, options: StopOptions) -> Result<()> {
        let orchestrator = DependencyOrchestrator::new(project)?;
        let selected = project.selected_services(&options.services)?;
        let running = self.containers(&project.name, &selected, false).await?;
        let timeout = options.timeout;

        let running = &running;
        orchestrator
            .execute(Direction::Reverse, &ActionCompletion, |service| async move {
                let containers = running
                    .iter()
                    .filter(|c| c.service() == service.name)
                    .collect();
                self.stop_containers(containers, timeout).await
            })
            .await
    }

    async fn up(&self, project: &Project, options: UpOptions) -> Result<i32> {
        let selected = project.selected_services(&options.create.services)?;
        if let Some(source) = &options.exit_code_from {
            project.service(source)?;
        }
        let consumer = match (&options.consumer, options.detach) {
            (_, true) => None,
            (Some(consumer), false) => Some(consumer.clone()),
            (None, false) => return Err(Error::invalid("attached up requires a log consumer")),
        };

        self.create(project, options.create.clone()).await?;
        self.start(
            project,
            StartOptions {
                services: options.create.services.clone(),
            },
        )
        .await?;
        let Some(consumer) = consumer else {
            return Ok(0);
        };

        let containers = self.containers(&project.name, &selected, true).await?;
        if containers.is_empty() {
            return Ok(0);
        }
        let (printer, queue) = LogPrinter::new(consumer);
        let _watchers = attach::watch_containers(&self.engine, containers, &queue);

        let stop_options = StopOptions {
            services: Vec::new(),
            timeout: options.timeout,
        };
        let run = printer.run(options.cascade_stop, options.exit_code_from.clone(), || {
            self.stop(project, stop_options.clone())
        });
        let cancelled = async {
            let Some(cancel) = &options.cancel else {
                return future::pending().await;
            };
            if cancel.recv().await.is_err() {
                return future::pending().await;
            }
            queue.cancel();
            info!("Gracefully stopping...");
            self.stop(project, stop_options.clone()).await
        };
        futures::pin_mut!(run, cancelled);

        match future::select(run, cancelled).await {
            Either::Left((result, _)) => result,
            Either::Right((stopped, run)) => {
                stopped?;
                run.await
            }
        }
    }

    async fn kill(&self, project: &Project, options: KillOptions) -> Result<()> {
        let selected = project.selected_services(&options.services)?;
        let running = self.containers(&project.name, &selected, false).await?;
        let signal = options.signal.as_deref();

        try_join_all(running.iter().map(|c| async move {
            info!("Killing {}", c.name);
            self.engine.kill_container(&c.id, signal).await
        }))
        .await?;
        Ok(())
    }

    async fn down(&self, project_name: &str, options: DownOptions) -> Result<()> {
        let observed = self
            .engine
            .list_containers(&[labels::project_filter(project_name)], true)
            .await?;
        let timeout = options.timeout;

        let orphans: Vec<&EngineContainer> = match &options.project {
            Some(project) => {
                let orchestrator = DependencyOrchestrator::new(project)?;
                let observed = &observed;
                orchestrator
                    .execute(Direction::Reverse, &ActionCompletion, |service| async move {
                        let containers = observed
                            .iter()
                            .filter(|c| c.service() == service.name)
                            .collect();
                        self.remove_containers(containers, timeout).await
                    })
                    .await?;
                let declared: HashSet<&str> =
                    project.services.iter().map(|s| s.name.as_str()).collect();
                observed
                    .iter()
                    .filter(|c| !declared.contains(c.service()))
                    .collect()
            }
            None => observed.iter().collect(),
        };

        if options.remove_orphans || options.project.is_none() {
            self.remove_containers(orphans, timeout).await?;
        } else if !orphans.is_empty() {
            let names: Vec<&str> = orphans.iter().map(|c| c.name.as_str()).collect();
            warn!(
                "Found orphan containers ({}) for project {}, remove them with --remove-orphans",
                names.join(", "),
                project_name
            );
        }

        for network in self
            .engine
            .list_networks(&[labels::project_filter(project_name)])
            .await?
        {
            info!("Removing network {}", network);
            self.engine.remove_network(&network).await?;
        }
        if options.volumes {
            for volume in self
                .engine
                .list_volumes(&[labels::project_filter(project_name)])
                .await?
            {
                info!("Removing volume {}", volume);
                self.engine.remove_volume(&volume).await?;
            }
        }
        Ok(())
    }

    async fn remove(&self, project: &Project, options: RemoveOptions) -> Result<()> {
        let selected = project.selected_services(&options.services)?;
        if options.stop {
            self.stop(
                project,
                StopOptions {
                    services: options.services.clone(),
                    timeout: None,
                },
            )
            .await?;
        }

        let stopped: Vec<EngineContainer> = self
            .containers(&project.name, &selected, true)
            .await?
            .into_iter()
            .filter(|c| !c.is_running())
            .collect();
        if stopped.is_empty() {
            info!("No stopped containers");
            return Ok(());
        }

        let (force, volumes) = (options.force, options.volumes);
        try_join_all(stopped.iter().map(|c| async move {
            info!("Removing {}", c.name);
            self.engine.remove_container(&c.id, force, volumes).await
        }))
        .await?;
        Ok(())
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
        let containers = self
            .containers(project_name, &options.services, true)
            .await?;
        for container in &containers {
            consumer.register(&container.name);
        }

        let consumer = consumer.as_ref();
        try_join_all(
            containers
                .iter()
                .map(|c| self.stream_logs(c, consumer, options.follow, options.tail)),
        )
        .await?;
        Ok(())
    }

    async fn ps(&self, project_name: &str, options: PsOptions) -> Result<Vec<ContainerSummary>> {
        let containers = self
            .containers(project_name, &options.services, options.all)
            .await?;
        Ok(containers.iter().map(container_summary).collect())
    }

    async fn list(&self, options: ListOptions) -> Result<Vec<Stack>> {
        let containers = self
            .engine
            .list_containers(&[labels::has_project_label_filter()], options.all)
            .await?;
        Ok(stacks(&containers))
    }

    async fn run_one_off(&self, project: &Project, options: RunOptions) -> Result<i32> {
        project.validate()?;
        let service = project.service(&options.service)?.clone();

        self.ensure_networks(project).await?;
        self.ensure_volumes(project).await?;
        if !options.no_deps {
            let dependencies = dependency_closure(project, &service.name);
            if !dependencies.is_empty() {
                info!("Starting dependencies: {:?}", dependencies);
                self.create(
                    project,
                    CreateOptions {
                        services: dependencies.clone(),
                        remove_orphans: false,
                    },
                )
                .await?;
                self.start(
                    project,
                    StartOptions {
                        services: dependencies,
                    },
                )
                .await?;
            }
        }

        let slug = Uuid::new_v4().simple().to_string();
        let mut spec = container_spec(project, &service, 1, Some(&slug))?;
        if !options.command.is_empty() {
            spec.command = options.command.clone();
        }
        spec.environment.extend(options.environment.iter().cloned());
        spec.auto_remove = options.detach && options.auto_remove;

        info!("Creating one-off container {}", spec.name);
        let id = self.engine.create_container(&spec).await?;
        self.engine.start_container(&id).await?;
        if options.detach {
            return Ok(0);
        }

        if let Some(consumer) = &options.consumer {
            consumer.register(&spec.name);
            let mut lines = self.engine.container_logs(&id, true, None).await?;
            while let Some(line) = lines.next().await {
                consumer.log(&spec.name, &service.name, &line?);
            }
        }
        let exit_code = self.engine.wait_container(&id).await?;
        if options.auto_remove {
            self.engine.remove_container(&id, true, false).await?;
        }
        Ok(exit_code)
    }

    async fn exec(&self, project: &Project, options: ExecOptions) -> Result<i32> {
        project.service(&options.service)?;
        let container = self
            .indexed_container(Operation::Exec, &project.name, &options.service, options.index)
            .await?;
        let spec = ExecSpec {
            command: options.command,
            environment: options.environment,
            user: options.user,
            workdir: options.workdir,
            tty: options.tty,
        };
        self.engine.exec(&container.id, &spec).await
    }

    async fn copy(&self, project: &Project, options: CopyOptions) -> Result<()> {
        match (
            split_service_path(&options.source),
            split_service_path(&options.destination),
        ) {
            (Some((service, path)), None) => {
                if options.all {
                    return Err(Error::invalid(
                        "copying from every container of a service is not supported",
                    ));
                }
                project.service(service)?;
                let container = self
                    .indexed_container(Operation::Copy, &project.name, service, options.index)
                    .await?;
                self.engine
                    .copy(&format!("{}:{}", container.id, path), &options.destination)
                    .await
            }
            (None, Some((service, path))) => {
                project.service(service)?;
                let containers = if options.all {
                    self.containers(&project.name, &[service.to_string()], false)
                        .await?
                } else {
                    vec![
                        self.indexed_container(
                            Operation::Copy,
                            &project.name,
                            service,
                            options.index,
                        )
                        .await?,
                    ]
                };
                for container in containers {
                    self.engine
                        .copy(&options.source, &format!("{}:{}", container.id, path))
                        .await?;
                }
                Ok(())
            }
            _ => Err(Error::invalid(
                "exactly one of source and destination must be SERVICE:PATH",
            )),
        }
    }

    async fn pause(&self, project_name: &str, options: PauseOptions) -> Result<()> {
        let running = self
            .containers(project_name, &options.services, false)
            .await?;
        try_join_all(running.iter().map(|c| async move {
            info!("Pausing {}", c.name);
            self.engine.pause_container(&c.id).await
        }))
        .await?;
        Ok(())
    }

    async fn unpause(&self, project_name: &str, options: PauseOptions) -> Result<()> {
        let paused: Vec<EngineContainer> = self
            .containers(project_name, &options.services, true)
            .await?
            .into_iter()
            .filter(|c| c.state == "paused")
            .collect();
        try_join_all(paused.iter().map(|c| async move {
            info!("Unpausing {}", c.name);
            self.engine.unpause_container(&c.id).await
        }))
        .await?;
        Ok(())
    }

    async fn top(
        &self,
        project_name: &str,
        services: &[String],
    ) -> Result<Vec<ContainerProcSummary>> {
        let running = self.containers(project_name, services, false).await?;
        let tables = try_join_all(running.iter().map(|c| self.engine.top(&c.id))).await?;
        Ok(running
            .into_iter()
            .zip(tables)
            .map(|(container, table)| ContainerProcSummary {
                id: container.id,
                name: container.name,
                titles: table.titles,
                processes: table.processes,
            })
            .collect())
    }

    async fn events(&self, project_name: &str, options: EventsOptions) -> Result<()> {
        let mut events = self
            .engine
            .events(&[labels::project_filter(project_name)])
            .await?;
        while let Some(event) = events.next().await {
            let event = event?;
            let service = event
                .attributes
                .get(SERVICE_LABEL)
                .cloned()
                .unwrap_or_default();
            if !options.services.is_empty() && !options.services.contains(&service) {
                continue;
            }
            let container = event
                .attributes
                .get("name")
                .cloned()
                .unwrap_or_else(|| event.id.clone());
            let attributes = event
                .attributes
                .into_iter()
                .filter(|(key, _)| key != "name" && !key.starts_with("com.docker.compose."))
                .collect();
            (options.consumer)(Event {
                timestamp: event.timestamp,
                container,
                service,
                status: event.action,
                attributes,
            })?;
        }
        Ok(())
    }

    async fn port(
        &self,
        project_name: &str,
        service: &str,
        port: u16,
        options: PortOptions,
    ) -> Result<(String, u16)> {
        let container = self
            .indexed_container(Operation::Port, project_name, service, options.index)
            .await?;
        self.engine
            .port(&container.id, port, &options.protocol)
            .await
    }

    async fn images(
        &self,
        project_name: &str,
        options: ImagesOptions,
    ) -> Result<Vec<ImageSummary>> {
        let containers = self
            .containers(project_name, &options.services, true)
            .await?;
        let images = try_join_all(containers.iter().map(|c| self.engine.inspect_image(&c.image)))
            .await?;
        Ok(containers
            .into_iter()
            .zip(images)
            .map(|(container, image)| {
                let reference = image.repo_tags.first().unwrap_or(&container.image);
                let (repository, tag) = split_reference(reference);
                ImageSummary {
                    id: image.id,
                    container_name: container.name,
                    repository,
                    tag,
                    size: image.size,
                }
            })
            .collect())
    }
}

fn filter_services(containers: Vec<EngineContainer>, services: &[String]) -> Vec<EngineContainer> {
    if services.is_empty() {
        return containers;
    }
    containers
        .into_iter()
        .filter(|c| services.iter().any(|s| s == c.service()))
        .collect()
}

fn settle(results: Vec<Result<()>>, ignore_failures: bool, action: &str) -> Result<()> {
    for result in results {
        match result {
            Ok(()) => {}
            Err(e) if ignore_failures => warn!("Failed to {}: {}", action, e),
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Name of the container with the given index
pub fn container_name(project: &str, service: &str, number: usize) -> String {
    format!("{}-{}-{}", project, service, number)
}

fn network_name(project: &str, key: &str, config: &NetworkConfig) -> String {
    match &config.name {
        Some(name) => name.clone(),
        None => format!("{}_{}", project, key),
    }
}

fn volume_name(project: &str, key: &str, name: Option<&str>) -> String {
    match name {
        Some(name) => name.to_string(),
        None => format!("{}_{}", project, key),
    }
}

/// Networks used by the project, with the implicit default network when a
/// service joins it
fn networks_in_use(project: &Project) -> Result<Vec<(String, NetworkConfig)>> {
    let mut networks: Vec<(String, NetworkConfig)> = project
        .networks
        .iter()
        .map(|(key, config)| (key.clone(), config.clone()))
        .collect();
    let mut implicit_default = false;
    for service in &project.services {
        if service.networks.is_empty() {
            implicit_default = true;
        }
        for key in service.networks.keys() {
            if key == DEFAULT_NETWORK {
                implicit_default = true;
            } else if !project.networks.contains_key(key) {
                return Err(Error::invalid(format!(
                    "service {} refers to undefined network {}",
                    service.name, key
                )));
            }
        }
    }
    if implicit_default && !project.networks.contains_key(DEFAULT_NETWORK) {
        networks.push((DEFAULT_NETWORK.to_string(), NetworkConfig::default()));
    }
    Ok(networks)
}

/// Engine-level description of one container of a service
pub(crate) fn container_spec(
    project: &Project,
    service: &ServiceConfig,
    number: usize,
    slug: Option<&str>,
) -> Result<ContainerSpec> {
    let mut container_labels = vec![
        (PROJECT_LABEL.to_string(), project.name.clone()),
        (SERVICE_LABEL.to_string(), service.name.clone()),
        (
            ONEOFF_LABEL.to_string(),
            labels::one_off_value(slug.is_some()).to_string(),
        ),
        (CONTAINER_NUMBER_LABEL.to_string(), number.to_string()),
    ];
    if let Some(slug) = slug {
        container_labels.push((SLUG_LABEL.to_string(), slug.to_string()));
    }
    container_labels.extend(service.labels.iter().map(|(k, v)| (k.clone(), v.clone())));

    let environment = service
        .environment
        .iter()
        .map(|(key, value)| match value {
            Some(value) => format!("{}={}", key, value),
            None => key.clone(),
        })
        .collect();

    let attachments: Vec<(String, Option<&ServiceNetworkConfig>)> =
        if service.networks.is_empty() {
            vec![(DEFAULT_NETWORK.to_string(), None)]
        } else {
            service
                .networks
                .iter()
                .map(|(key, config)| (key.clone(), config.as_ref()))
                .collect()
        };
    let mut networks = Vec::with_capacity(attachments.len());
    for (key, config) in attachments {
        let network = match project.networks.get(&key) {
            Some(declared) if declared.external => {
                declared.name.clone().unwrap_or_else(|| key.clone())
            }
            Some(declared) => network_name(&project.name, &key, declared),
            None if key == DEFAULT_NETWORK => {
                network_name(&project.name, &key, &NetworkConfig::default())
            }
            None => {
                return Err(Error::invalid(format!(
                    "service {} refers to undefined network {}",
                    service.name, key
                )));
            }
        };
        let mut aliases = vec![service.name.clone()];
        if let Some(config) = config {
            aliases.extend(config.aliases.iter().cloned());
        }
        networks.push(NetworkAttachment {
            network,
            ipv4_address: config.and_then(|c| c.ipv4_address.clone()),
            aliases,
        });
    }

    let mut volumes = Vec::new();
    let mut tmpfs = Vec::new();
    for mount in &service.volumes {
        let suffix = if mount.read_only { ":ro" } else { "" };
        match (mount.kind, &mount.source) {
            (VolumeType::Tmpfs, _) => tmpfs.push(mount.target.clone()),
            (VolumeType::Volume, Some(source)) => {
                let name = match project.volumes.get(source) {
                    Some(declared) if declared.external => {
                        declared.name.clone().unwrap_or_else(|| source.clone())
                    }
                    Some(declared) => volume_name(&project.name, source, declared.name.as_deref()),
                    None => source.clone(),
                };
                volumes.push(format!("{}:{}{}", name, mount.target, suffix));
            }
            (_, Some(source)) => volumes.push(format!("{}:{}{}", source, mount.target, suffix)),
            (_, None) => volumes.push(mount.target.clone()),
        }
    }

    let ports = service
        .ports
        .iter()
        .map(|port| {
            let protocol = port.protocol.as_deref().unwrap_or("tcp");
            match port.published {
                Some(published) => format!("{}:{}/{}", published, port.target, protocol),
                None => format!("{}/{}", port.target, protocol),
            }
        })
        .collect();

    let name = match slug {
        Some(slug) => format!(
            "{}-{}-run-{}",
            project.name,
            service.name,
            &slug[..slug.len().min(12)]
        ),
        None => container_name(&project.name, &service.name, number),
    };

    Ok(ContainerSpec {
        name,
        image: service.image_name(&project.name),
        command: service.command.clone().unwrap_or_default(),
        environment,
        labels: container_labels,
        networks,
        volumes,
        tmpfs,
        ports,
        auto_remove: false,
    })
}

/// Every service `service` depends on, directly or not, in project order
fn dependency_closure(project: &Project, service: &str) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::from([service]);
    while let Some(name) = queue.pop_front() {
        let Ok(config) = project.service(name) else {
            continue;
        };
        for dependency in config.depends_on.keys() {
            if seen.insert(dependency.clone()) {
                queue.push_back(dependency);
            }
        }
    }
    project
        .service_names()
        .into_iter()
        .filter(|name| seen.contains(name) && name != service)
        .collect()
}

fn container_summary(container: &EngineContainer) -> ContainerSummary {
    ContainerSummary {
        id: container.id.clone(),
        name: container.name.clone(),
        project: container.project().to_string(),
        service: container.service().to_string(),
        state: container.state.clone(),
        health: health_from_status(&container.status).to_string(),
        exit_code: exit_code_from_status(&container.status),
        publishers: container.ports.clone(),
    }
}

/// Health reported in a status such as `Up 2 minutes (healthy)`
fn health_from_status(status: &str) -> &'static str {
    if status.contains("(healthy)") {
        "healthy"
    } else if status.contains("(unhealthy)") {
        "unhealthy"
    } else if status.contains("(health: starting)") {
        "starting"
    } else {
        ""
    }
}

/// Exit code reported in a status such as `Exited (3) 5 seconds ago`
fn exit_code_from_status(status: &str) -> i32 {
    status
        .strip_prefix("Exited (")
        .and_then(|rest| rest.split_once(')'))
        .and_then(|(code, _)| code.parse().ok())
        .unwrap_or(0)
}

/// Group containers into stacks by project label
fn stacks(containers: &[EngineContainer]) -> Vec<Stack> {
    let mut states: BTreeMap<&str, BTreeMap<&str, usize>> = BTreeMap::new();
    for container in containers {
        *states
            .entry(container.project())
            .or_default()
            .entry(container.state.as_str())
            .or_default() += 1;
    }
    states
        .into_iter()
        .map(|(project, counts)| Stack {
            id: project.to_string(),
            name: project.to_string(),
            status: counts
                .iter()
                .map(|(state, count)| format!("{}({})", state, count))
                .collect::<Vec<_>>()
                .join(", "),
        })
        .collect()
}

/// Split `service:path`; plain local paths yield `None`
fn split_service_path(argument: &str) -> Option<(&str, &str)> {
    let (service, path) = argument.split_once(':')?;
    if service.is_empty() || service.contains('/') || service.contains('\\') {
        return None;
    }
    Some((service, path))
}

/// Split an image reference into repository and tag
fn split_reference(reference: &str) -> (String, String) {
    match reference.rsplit_once(':') {
        Some((repository, tag)) if !tag.contains('/') => (repository.to_string(), tag.to_string()),
        _ => (reference.to_string(), "latest".to_string()),
    }
}
