use super::{Compose, seconds};
use anyhow::Result;
use clap::Args;
use compose_api::DownOptions;

/// Arguments of `compose down`
#[derive(Args, Debug)]
pub struct DownArgs {
    /// Remove containers of services missing from the project file
    #[arg(long)]
    pub remove_orphans: bool,

    /// Remove named volumes declared by the project
    #[arg(short, long)]
    pub volumes: bool,

    /// Seconds to wait for containers to stop
    #[arg(short, long)]
    pub timeout: Option<u64>,
}

pub async fn run(compose: &Compose, args: DownArgs) -> Result<()> {
    let (name, project) = compose.project_or_name()?;
    let options = DownOptions {
        remove_orphans: args.remove_orphans,
        project,
        volumes: args.volumes,
        timeout: seconds(args.timeout),
    };
    compose.backend.down(&name, options).await?;
    Ok(())
}
