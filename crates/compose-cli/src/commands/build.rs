//! Commands managing service images.

use super::Compose;
use anyhow::Result;
use clap::Args;
use compose_api::{BuildOptions, PullOptions, PushOptions};

/// Arguments of `compose build`
#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Services to build (empty means all)
    pub services: Vec<String>,

    /// Always pull newer versions of base images
    #[arg(long)]
    pub pull: bool,

    /// Do not use the build cache
    #[arg(long)]
    pub no_cache: bool,
}

/// Arguments of `compose pull`
#[derive(Args, Debug)]
pub struct PullArgs {
    /// Services to pull (empty means all)
    pub services: Vec<String>,

    /// Keep going when an image cannot be pulled
    #[arg(long)]
    pub ignore_pull_failures: bool,
}

/// Arguments of `compose push`
#[derive(Args, Debug)]
pub struct PushArgs {
    /// Keep going when an image cannot be pushed
    #[arg(long)]
    pub ignore_push_failures: bool,
}

pub async fn build(compose: &Compose, args: BuildArgs) -> Result<()> {
    let project = compose.project()?;
    let options = BuildOptions {
        services: args.services,
        pull: args.pull,
        no_cache: args.no_cache,
    };
    compose.backend.build(&project, options).await?;
    Ok(())
}

pub async fn pull(compose: &Compose, args: PullArgs) -> Result<()> {
    let project = compose.project()?;
    let options = PullOptions {
        services: args.services,
        ignore_failures: args.ignore_pull_failures,
    };
    compose.backend.pull(&project, options).await?;
    Ok(())
}

pub async fn push(compose: &Compose, args: PushArgs) -> Result<()> {
    let project = compose.project()?;
    let options = PushOptions {
        ignore_failures: args.ignore_push_failures,
    };
    compose.backend.push(&project, options).await?;
    Ok(())
}
