use super::{Compose, seconds};
use crate::console::ConsoleConsumer;
use anyhow::{Context, Result, bail};
use clap::Args;
use compose_api::{CancelSignal, CreateOptions, LogConsumer, UpOptions};
use std::sync::Arc;

/// Arguments of `compose up`
#[derive(Args, Debug)]
pub struct UpArgs {
    /// Services to start (empty means all)
    pub services: Vec<String>,

    /// Start containers in the background
    #[arg(short, long)]
    pub detach: bool,

    /// Stop every container once any container exits
    #[arg(long)]
    pub abort_on_container_exit: bool,

    /// Return the exit code of this service; implies --abort-on-container-exit
    #[arg(long, value_name = "SERVICE")]
    pub exit_code_from: Option<String>,

    /// Remove containers of services missing from the project file
    #[arg(long)]
    pub remove_orphans: bool,

    /// Seconds to wait for containers to stop when aborting
    #[arg(short, long)]
    pub timeout: Option<u64>,
}

pub async fn run(compose: &Compose, args: UpArgs) -> Result<i32> {
    let cascade_stop = args.abort_on_container_exit || args.exit_code_from.is_some();
    if args.detach && cascade_stop {
        bail!("--detach cannot be combined with --abort-on-container-exit or --exit-code-from");
    }

    let project = compose.project()?;
    if let Some(service) = &args.exit_code_from {
        project.service(service)?;
    }

    let (consumer, cancel) = if args.detach {
        (None, None)
    } else {
        let consumer: Arc<dyn LogConsumer> = Arc::new(ConsoleConsumer::new());
        (Some(consumer), Some(interrupt_signal()?))
    };

    let options = UpOptions {
        create: CreateOptions {
            services: args.services,
            remove_orphans: args.remove_orphans,
        },
        detach: args.detach,
        cascade_stop,
        exit_code_from: args.exit_code_from,
        consumer,
        cancel,
        timeout: seconds(args.timeout),
    };
    Ok(compose.backend.up(&project, options).await?)
}

/// Receiver that fires when the user presses Ctrl-C
fn interrupt_signal() -> Result<CancelSignal> {
    let (sender, receiver) = async_channel::bounded(1);
    ctrlc::set_handler(move || {
        println!("Gracefully stopping... (press Ctrl+C again to force)");
        if sender.try_send(()).is_err() {
            std::process::exit(130);
        }
    })
    .context("Failed to install Ctrl-C handler")?;
    Ok(receiver)
}
