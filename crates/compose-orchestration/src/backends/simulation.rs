//! Local simulation of a cloud-shaped deployment.
//!
//! [`LocalSimulation`] wraps another backend, normally the local one. Create
//! and Convert run on a derived project carrying a credential relay sidecar
//! and a fixed link-local network; every other lifecycle operation is
//! forwarded untouched. Operations that would pass the simulation off as a
//! real deployment are refused.

use async_trait::async_trait;
use compose_api::{
    BuildOptions, ComposeBackend, Condition, ConfigError, ContainerProcSummary, ContainerSummary,
    ConvertOptions, CopyOptions, CreateOptions, DownOptions, Error, EventsOptions, ExecOptions,
    ImageSummary, ImagesOptions, IpamConfig, IpamPool, KillOptions, ListOptions, LogConsumer,
    LogOptions, NetworkConfig, Operation, PauseOptions, PortOptions, Project, PsOptions,
    PullOptions, PushOptions, RemoveOptions, RestartOptions, Result, RunOptions, ServiceConfig,
    ServiceDependency, ServiceNetworkConfig, ServiceVolumeConfig, SharedBackend, Stack,
    StartOptions, StopOptions, UpOptions,
};
use ipnet::Ipv4Net;
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Network carrying credential traffic
pub const CREDENTIALS_NETWORK: &str = "credentials_network";
/// Sidecar serving credentials and task metadata
pub const ENDPOINTS_SERVICE: &str = "ecs-local-endpoints";
/// Image of the sidecar
pub const ENDPOINTS_IMAGE: &str = "amazon/amazon-ecs-local-container-endpoints";

const CREDENTIALS_SUBNET: &str = "169.254.170.0/24";
const CREDENTIALS_GATEWAY: &str = "169.254.170.1";
const ENDPOINTS_ADDRESS: &str = "169.254.170.2";
// .0 is the network, .1 the gateway and .2 the sidecar
const FIRST_SERVICE_HOST: u32 = 3;

/// Decorator running a project locally as the cloud would see it
pub struct LocalSimulation {
    inner: SharedBackend,
}

impl LocalSimulation {
    /// Wrap a backend
    pub fn new(inner: SharedBackend) -> Self {
        Self { inner }
    }

    fn enhance(&self, project: &Project) -> Result<Project> {
        let home = dirs::home_dir()
            .ok_or_else(|| ConfigError::PathResolution("home directory".to_string()))?;
        enhance_for_local_simulation(project, &home)
    }
}

/// Derive the simulated project from `project`
///
/// Every service joins the credentials network at an address given by its
/// position, learns the relay endpoint through its environment and depends
/// on the sidecar, which mounts the user's credential directory from `home`.
/// The input is left untouched and applying the transform twice yields the
/// same project.
pub fn enhance_for_local_simulation(project: &Project, home: &Path) -> Result<Project> {
    let subnet: Ipv4Net = CREDENTIALS_SUBNET
        .parse()
        .map_err(|_| Error::invalid(format!("invalid subnet {}", CREDENTIALS_SUBNET)))?;
    let credentials_dir = home.join(".aws");
    let credentials_dir = credentials_dir.to_str().ok_or_else(|| {
        ConfigError::PathResolution(format!("{} as UTF-8", credentials_dir.display()))
    })?;

    let mut enhanced = project.clone();
    enhanced.networks.insert(
        CREDENTIALS_NETWORK.to_string(),
        NetworkConfig {
            name: Some(CREDENTIALS_NETWORK.to_string()),
            driver: Some("bridge".to_string()),
            ipam: Some(IpamConfig {
                config: vec![IpamPool {
                    subnet: CREDENTIALS_SUBNET.to_string(),
                    gateway: Some(CREDENTIALS_GATEWAY.to_string()),
                }],
            }),
            external: false,
        },
    );

    enhanced.services.retain(|s| s.name != ENDPOINTS_SERVICE);
    let services = enhanced.services.len();
    for (index, service) in enhanced.services.iter_mut().enumerate() {
        let address = service_address(&subnet, index).ok_or_else(|| {
            ConfigError::AddressExhausted {
                network: CREDENTIALS_NETWORK.to_string(),
                services,
            }
        })?;
        if service.networks.is_empty() {
            service.networks.insert("default".to_string(), None);
        }
        service.networks.insert(
            CREDENTIALS_NETWORK.to_string(),
            Some(ServiceNetworkConfig {
                ipv4_address: Some(address.to_string()),
                aliases: Vec::new(),
            }),
        );
        service.depends_on.insert(
            ENDPOINTS_SERVICE.to_string(),
            ServiceDependency {
                condition: Condition::Started,
            },
        );
        service.environment.insert(
            "AWS_CONTAINER_CREDENTIALS_RELATIVE_URI".to_string(),
            Some("/creds".to_string()),
        );
        service.environment.insert(
            "ECS_CONTAINER_METADATA_URI".to_string(),
            Some(format!("http://{}/v3", ENDPOINTS_ADDRESS)),
        );
    }

    let mut sidecar = ServiceConfig::new(ENDPOINTS_IMAGE);
    sidecar.name = ENDPOINTS_SERVICE.to_string();
    sidecar.volumes = vec![
        ServiceVolumeConfig::bind("/var/run", "/var/run"),
        ServiceVolumeConfig::bind(credentials_dir, "/home/.aws"),
    ];
    sidecar
        .environment
        .insert("HOME".to_string(), Some("/home".to_string()));
    sidecar
        .environment
        .insert("AWS_PROFILE".to_string(), Some("default".to_string()));
    sidecar.networks.insert(
        CREDENTIALS_NETWORK.to_string(),
        Some(ServiceNetworkConfig {
            ipv4_address: Some(ENDPOINTS_ADDRESS.to_string()),
            aliases: Vec::new(),
        }),
    );
    enhanced.services.push(sidecar);

    debug!("Simulating {} services on {}", services, CREDENTIALS_NETWORK);
    Ok(enhanced)
}

/// Address of the service at `index`, `None` past the last host
fn service_address(subnet: &Ipv4Net, index: usize) -> Option<Ipv4Addr> {
    let offset = u32::try_from(index).ok()?.checked_add(FIRST_SERVICE_HOST)?;
    let address = Ipv4Addr::from(u32::from(subnet.network()).checked_add(offset)?);
    (address < subnet.broadcast()).then_some(address)
}

#[async_trait]
impl ComposeBackend for LocalSimulation {
    async fn build(&self, project: &Project, options: BuildOptions) -> Result<()> {
        self.inner.build(project, options).await
    }

    async fn push(&self, project: &Project, options: PushOptions) -> Result<()> {
        self.inner.push(project, options).await
    }

    async fn pull(&self, project: &Project, options: PullOptions) -> Result<()> {
        self.inner.pull(project, options).await
    }

    async fn create(&self, project: &Project, options: CreateOptions) -> Result<()> {
        let enhanced = self.enhance(project)?;
        self.inner.create(&enhanced, options).await
    }

    async fn start(&self, project: &Project, options: StartOptions) -> Result<()> {
        self.inner.start(project, options).await
    }

    async fn restart(&self, project: &Project, options: RestartOptions) -> Result<()> {
        self.inner.restart(project, options).await
    }

    async fn stop(&self, project: &Project, options: StopOptions) -> Result<()> {
        self.inner.stop(project, options).await
    }

    async fn up(&self, _project: &Project, _options: UpOptions) -> Result<i32> {
        Err(Error::not_implemented(Operation::Up))
    }

    async fn kill(&self, project: &Project, options: KillOptions) -> Result<()> {
        self.inner.kill(project, options).await
    }

    async fn down(&self, project_name: &str, mut options: DownOptions) -> Result<()> {
        // The sidecar is not part of the user's project
        options.remove_orphans = true;
        self.inner.down(project_name, options).await
    }

    async fn remove(&self, project: &Project, options: RemoveOptions) -> Result<()> {
        self.inner.remove(project, options).await
    }

    async fn convert(&self, project: &Project, options: ConvertOptions) -> Result<Vec<u8>> {
        let mut enhanced = self.enhance(project)?;
        enhanced.networks.shift_remove("default");
        compose_api::convert::render(&enhanced, &options.format)
    }

    async fn logs(
        &self,
        project_name: &str,
        consumer: Arc<dyn LogConsumer>,
        options: LogOptions,
    ) -> Result<()> {
        self.inner.logs(project_name, consumer, options).await
    }

    async fn ps(&self, project_name: &str, options: PsOptions) -> Result<Vec<ContainerSummary>> {
        self.inner.ps(project_name, options).await
    }

    async fn list(&self, options: ListOptions) -> Result<Vec<Stack>> {
        self.inner.list(options).await
    }

    async fn run_one_off(&self, _project: &Project, _options: RunOptions) -> Result<i32> {
        Err(Error::not_implemented_with_hint(
            Operation::RunOneOff,
            "use docker-compose run",
        ))
    }

    async fn exec(&self, _project: &Project, _options: ExecOptions) -> Result<i32> {
        Err(Error::not_implemented(Operation::Exec))
    }

    async fn copy(&self, project: &Project, options: CopyOptions) -> Result<()> {
        self.inner.copy(project, options).await
    }

    async fn pause(&self, project_name: &str, options: PauseOptions) -> Result<()> {
        self.inner.pause(project_name, options).await
    }

    async fn unpause(&self, project_name: &str, options: PauseOptions) -> Result<()> {
        self.inner.unpause(project_name, options).await
    }

    async fn top(
        &self,
        project_name: &str,
        services: &[String],
    ) -> Result<Vec<ContainerProcSummary>> {
        self.inner.top(project_name, services).await
    }

    async fn events(&self, project_name: &str, options: EventsOptions) -> Result<()> {
        self.inner.events(project_name, options).await
    }

    async fn port(
        &self,
        _project_name: &str,
        _service: &str,
        _port: u16,
        _options: PortOptions,
    ) -> Result<(String, u16)> {
        Err(Error::not_implemented(Operation::Port))
    }

    async fn images(
        &self,
        _project_name: &str,
        _options: ImagesOptions,
    ) -> Result<Vec<ImageSummary>> {
        Err(Error::not_implemented(Operation::Images))
    }
}
