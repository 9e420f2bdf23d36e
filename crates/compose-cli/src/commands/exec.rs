//! Commands running processes inside service containers.

use super::Compose;
use crate::console::ConsoleConsumer;
use anyhow::{Result, bail};
use clap::Args;
use compose_api::{CopyOptions, ExecOptions, LogConsumer, RunOptions};
use std::sync::Arc;

/// Arguments of `compose run`
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Service to run a one-off container for
    pub service: String,

    /// Command overriding the service command
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,

    /// Run the container in the background and print its name
    #[arg(short, long)]
    pub detach: bool,

    /// Remove the container when it exits
    #[arg(long = "rm")]
    pub auto_remove: bool,

    /// Set environment variables (KEY=VALUE)
    #[arg(short, long = "env")]
    pub environment: Vec<String>,

    /// Do not start the services the service depends on
    #[arg(long)]
    pub no_deps: bool,
}

/// Arguments of `compose exec`
#[derive(Args, Debug)]
pub struct ExecArgs {
    /// Service whose container runs the command
    pub service: String,

    /// Command to run
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,

    /// Container index when the service runs several containers
    #[arg(long, default_value_t = 1)]
    pub index: usize,

    /// Set environment variables (KEY=VALUE)
    #[arg(short, long = "env")]
    pub environment: Vec<String>,

    /// Run as this user
    #[arg(short, long)]
    pub user: Option<String>,

    /// Working directory inside the container
    #[arg(short, long)]
    pub workdir: Option<String>,

    /// Disable pseudo-TTY allocation
    #[arg(short = 'T', long)]
    pub no_tty: bool,
}

/// Arguments of `compose cp`
#[derive(Args, Debug)]
pub struct CpArgs {
    /// SERVICE:PATH or a local path
    pub source: String,

    /// SERVICE:PATH or a local path
    pub destination: String,

    /// Copy to every container of the service
    #[arg(short, long)]
    pub all: bool,

    /// Container index when the service runs several containers
    #[arg(long, default_value_t = 1)]
    pub index: usize,
}

pub async fn run(compose: &Compose, args: RunArgs) -> Result<i32> {
    let project = compose.project()?;
    let consumer: Option<Arc<dyn LogConsumer>> = if args.detach {
        None
    } else {
        Some(Arc::new(ConsoleConsumer::new()))
    };
    let options = RunOptions {
        service: args.service,
        command: args.command,
        environment: args.environment,
        detach: args.detach,
        auto_remove: args.auto_remove,
        no_deps: args.no_deps,
        consumer,
    };
    Ok(compose.backend.run_one_off(&project, options).await?)
}

pub async fn exec(compose: &Compose, args: ExecArgs) -> Result<i32> {
    let project = compose.project()?;
    let options = ExecOptions {
        service: args.service,
        index: args.index,
        command: args.command,
        environment: args.environment,
        user: args.user,
        workdir: args.workdir,
        tty: !args.no_tty,
    };
    Ok(compose.backend.exec(&project, options).await?)
}

pub async fn cp(compose: &Compose, args: CpArgs) -> Result<()> {
    if args.source.contains(':') == args.destination.contains(':') {
        bail!("Exactly one of source and destination must be SERVICE:PATH");
    }
    let project = compose.project()?;
    let options = CopyOptions {
        source: args.source,
        destination: args.destination,
        all: args.all,
        index: args.index,
    };
    compose.backend.copy(&project, options).await?;
    Ok(())
}
