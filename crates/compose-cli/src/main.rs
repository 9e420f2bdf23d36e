use anyhow::Result;
use clap::{Parser, Subcommand};
use compose_api::FailureCategory;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod console;

use commands::Compose;
use commands::build::{BuildArgs, PullArgs, PushArgs};
use commands::down::DownArgs;
use commands::exec::{CpArgs, ExecArgs, RunArgs};
use commands::inspect::{ConvertArgs, LsArgs, PortArgs, PsArgs};
use commands::lifecycle::{CreateArgs, KillArgs, RmArgs, ServiceArgs, StopArgs};
use commands::logs::{EventsArgs, LogsArgs};
use commands::up::UpArgs;
use config::BackendKind;

#[derive(Parser)]
#[command(name = "compose")]
#[command(about = "Run multi-service projects on local or simulated backends")]
#[command(version)]
struct Cli {
    /// Project file path
    #[arg(
        short,
        long,
        global = true,
        env = "COMPOSE_FILE",
        default_value = "compose.yaml"
    )]
    file: PathBuf,

    /// Project name, overriding the file and its directory
    #[arg(short, long, global = true, env = "COMPOSE_PROJECT_NAME")]
    project_name: Option<String>,

    /// Backend the project runs on
    #[arg(
        long,
        global = true,
        env = "COMPOSE_BACKEND",
        value_enum,
        default_value = "local"
    )]
    backend: BackendKind,

    /// Log debug output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create and start containers
    Up(UpArgs),
    /// Stop and remove containers and networks
    Down(DownArgs),
    /// Create containers without starting them
    Create(CreateArgs),
    /// Start existing containers
    Start(ServiceArgs),
    /// Stop running containers
    Stop(StopArgs),
    /// Restart containers
    Restart(StopArgs),
    /// Send a signal to containers
    Kill(KillArgs),
    /// Pause containers
    Pause(ServiceArgs),
    /// Unpause containers
    Unpause(ServiceArgs),
    /// Remove stopped containers
    Rm(RmArgs),
    /// List project containers
    Ps(PsArgs),
    /// List running projects
    Ls(LsArgs),
    /// Show container output
    Logs(LogsArgs),
    /// Stream container events
    Events(EventsArgs),
    /// Show processes running in containers
    Top(ServiceArgs),
    /// Render the project in a canonical format
    Convert(ConvertArgs),
    /// Print the public address of a port
    Port(PortArgs),
    /// List images used by containers
    Images(ServiceArgs),
    /// Run a command in a running container
    Exec(ExecArgs),
    /// Run a one-off command
    Run(RunArgs),
    /// Copy files between a container and the local filesystem
    Cp(CpArgs),
    /// Build service images
    Build(BuildArgs),
    /// Pull service images
    Pull(PullArgs),
    /// Push service images
    Push(PushArgs),
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let code = match smol::block_on(run(cli)) {
        Ok(code) => code,
        Err(e) => report(&e),
    };
    std::process::exit(code);
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<i32> {
    let compose = Compose::new(config::backend(cli.backend), cli.file, cli.project_name);
    let c = &compose;

    match cli.command {
        Commands::Up(args) => commands::up::run(c, args).await,
        Commands::Down(args) => commands::down::run(c, args).await.map(|()| 0),
        Commands::Create(args) => commands::lifecycle::create(c, args).await.map(|()| 0),
        Commands::Start(args) => commands::lifecycle::start(c, args).await.map(|()| 0),
        Commands::Stop(args) => commands::lifecycle::stop(c, args).await.map(|()| 0),
        Commands::Restart(args) => commands::lifecycle::restart(c, args).await.map(|()| 0),
        Commands::Kill(args) => commands::lifecycle::kill(c, args).await.map(|()| 0),
        Commands::Pause(args) => commands::lifecycle::pause(c, args).await.map(|()| 0),
        Commands::Unpause(args) => commands::lifecycle::unpause(c, args).await.map(|()| 0),
        Commands::Rm(args) => commands::lifecycle::rm(c, args).await.map(|()| 0),
        Commands::Ps(args) => commands::inspect::ps(c, args).await.map(|()| 0),
        Commands::Ls(args) => commands::inspect::ls(c, args).await.map(|()| 0),
        Commands::Logs(args) => commands::logs::logs(c, args).await.map(|()| 0),
        Commands::Events(args) => commands::logs::events(c, args).await.map(|()| 0),
        Commands::Top(args) => commands::inspect::top(c, args.services).await.map(|()| 0),
        Commands::Convert(args) => commands::inspect::convert(c, args).await.map(|()| 0),
        Commands::Port(args) => commands::inspect::port(c, args).await.map(|()| 0),
        Commands::Images(args) => commands::inspect::images(c, args.services).await.map(|()| 0),
        Commands::Exec(args) => commands::exec::exec(c, args).await,
        Commands::Run(args) => commands::exec::run(c, args).await,
        Commands::Cp(args) => commands::exec::cp(c, args).await.map(|()| 0),
        Commands::Build(args) => commands::build::build(c, args).await.map(|()| 0),
        Commands::Pull(args) => commands::build::pull(c, args).await.map(|()| 0),
        Commands::Push(args) => commands::build::push(c, args).await.map(|()| 0),
    }
}

/// Print a failure and pick the process exit code for it
///
/// Refused operations are expected on some backends, so they print the
/// backend's hint without an error prefix.
fn report(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<compose_api::Error>() {
        Some(e) if e.is_not_implemented() => {
            eprintln!("{}", e);
            FailureCategory::NotImplemented.exit_code()
        }
        Some(e) => {
            eprintln!("Error: {:#}", err);
            e.category().exit_code()
        }
        None => {
            eprintln!("Error: {:#}", err);
            1
        }
    }
}
