use super::Compose;
use crate::console::ConsoleConsumer;
use anyhow::Result;
use clap::Args;
use compose_api::{Event, EventsOptions, LogOptions};
use std::sync::Arc;

/// Arguments of `compose logs`
#[derive(Args, Debug)]
pub struct LogsArgs {
    /// Services whose output is shown (empty means all)
    pub services: Vec<String>,

    /// Keep streaming new output
    #[arg(long)]
    pub follow: bool,

    /// Number of lines to show from the end of each container's output
    #[arg(short = 'n', long)]
    pub tail: Option<usize>,
}

/// Arguments of `compose events`
#[derive(Args, Debug)]
pub struct EventsArgs {
    /// Services to observe (empty means all)
    pub services: Vec<String>,

    /// Print one JSON object per event
    #[arg(long)]
    pub json: bool,
}

pub async fn logs(compose: &Compose, args: LogsArgs) -> Result<()> {
    let name = compose.project_name()?;
    let options = LogOptions {
        services: args.services,
        follow: args.follow,
        tail: args.tail,
    };
    compose
        .backend
        .logs(&name, Arc::new(ConsoleConsumer::new()), options)
        .await?;
    Ok(())
}

pub async fn events(compose: &Compose, args: EventsArgs) -> Result<()> {
    let name = compose.project_name()?;
    let json = args.json;
    let options = EventsOptions {
        services: args.services,
        consumer: Arc::new(move |event: Event| -> compose_api::Result<()> {
            println!("{}", format_event(&event, json)?);
            Ok(())
        }),
    };
    compose.backend.events(&name, options).await?;
    Ok(())
}

fn format_event(event: &Event, json: bool) -> compose_api::Result<String> {
    if json {
        return Ok(serde_json::to_string(event)?);
    }
    let mut attributes: Vec<_> = event
        .attributes
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect();
    attributes.sort();
    Ok(format!(
        "{} container {} {} ({})",
        event.timestamp.format("%Y-%m-%d %H:%M:%S%.6f"),
        event.status,
        event.container,
        attributes.join(", ")
    ))
}
