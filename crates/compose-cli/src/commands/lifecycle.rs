//! Commands changing the state of existing or missing containers.

use super::{Compose, seconds};
use anyhow::Result;
use clap::Args;
use compose_api::{
    CreateOptions, KillOptions, PauseOptions, RemoveOptions, RestartOptions, StartOptions,
    StopOptions,
};

/// A service selection
#[derive(Args, Debug)]
pub struct ServiceArgs {
    /// Services to act on (empty means all)
    pub services: Vec<String>,
}

/// Arguments of `compose create`
#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Services to create (empty means all)
    pub services: Vec<String>,

    /// Remove containers of services missing from the project file
    #[arg(long)]
    pub remove_orphans: bool,
}

/// Arguments of `compose stop` and `compose restart`
#[derive(Args, Debug)]
pub struct StopArgs {
    /// Services to act on (empty means all)
    pub services: Vec<String>,

    /// Seconds to wait for containers to stop
    #[arg(short, long)]
    pub timeout: Option<u64>,
}

/// Arguments of `compose kill`
#[derive(Args, Debug)]
pub struct KillArgs {
    /// Services to kill (empty means all)
    pub services: Vec<String>,

    /// Signal sent to the containers
    #[arg(short, long, default_value = "SIGKILL")]
    pub signal: String,
}

/// Arguments of `compose rm`
#[derive(Args, Debug)]
pub struct RmArgs {
    /// Services whose stopped containers are removed (empty means all)
    pub services: Vec<String>,

    /// Do not ask for confirmation
    #[arg(long)]
    pub force: bool,

    /// Stop running containers before removing them
    #[arg(short, long)]
    pub stop: bool,

    /// Remove anonymous volumes attached to the containers
    #[arg(short, long)]
    pub volumes: bool,
}

pub async fn create(compose: &Compose, args: CreateArgs) -> Result<()> {
    let project = compose.project()?;
    let options = CreateOptions {
        services: args.services,
        remove_orphans: args.remove_orphans,
    };
    compose.backend.create(&project, options).await?;
    Ok(())
}

pub async fn start(compose: &Compose, args: ServiceArgs) -> Result<()> {
    let project = compose.project()?;
    let options = StartOptions {
        services: args.services,
    };
    compose.backend.start(&project, options).await?;
    Ok(())
}

pub async fn stop(compose: &Compose, args: StopArgs) -> Result<()> {
    let project = compose.project()?;
    let options = StopOptions {
        services: args.services,
        timeout: seconds(args.timeout),
    };
    compose.backend.stop(&project, options).await?;
    Ok(())
}

pub async fn restart(compose: &Compose, args: StopArgs) -> Result<()> {
    let project = compose.project()?;
    let options = RestartOptions {
        services: args.services,
        timeout: seconds(args.timeout),
    };
    compose.backend.restart(&project, options).await?;
    Ok(())
}

pub async fn kill(compose: &Compose, args: KillArgs) -> Result<()> {
    let project = compose.project()?;
    let options = KillOptions {
        services: args.services,
        signal: Some(args.signal),
    };
    compose.backend.kill(&project, options).await?;
    Ok(())
}

pub async fn pause(compose: &Compose, args: ServiceArgs) -> Result<()> {
    let name = compose.project_name()?;
    let options = PauseOptions {
        services: args.services,
    };
    compose.backend.pause(&name, options).await?;
    Ok(())
}

pub async fn unpause(compose: &Compose, args: ServiceArgs) -> Result<()> {
    let name = compose.project_name()?;
    let options = PauseOptions {
        services: args.services,
    };
    compose.backend.unpause(&name, options).await?;
    Ok(())
}

pub async fn rm(compose: &Compose, args: RmArgs) -> Result<()> {
    let project = compose.project()?;
    let options = RemoveOptions {
        services: args.services,
        force: args.force,
        stop: args.stop,
        volumes: args.volumes,
    };
    compose.backend.remove(&project, options).await?;
    Ok(())
}
