//! Read-only commands reporting on a project.

use super::Compose;
use crate::console::{human_size, state_cell, table};
use anyhow::{Context, Result, bail};
use clap::Args;
use comfy_table::Cell;
use compose_api::{
    ContainerSummary, ConvertOptions, ImagesOptions, ListOptions, PortOptions, PsOptions,
};
use std::io::Write;
use std::path::PathBuf;

/// Arguments of `compose ps`
#[derive(Args, Debug)]
pub struct PsArgs {
    /// Services to list (empty means all)
    pub services: Vec<String>,

    /// Include stopped containers
    #[arg(short, long)]
    pub all: bool,

    /// Only print container ids
    #[arg(short, long)]
    pub quiet: bool,

    /// Output format: table or json
    #[arg(long, default_value = "table")]
    pub format: String,
}

/// Arguments of `compose ls`
#[derive(Args, Debug)]
pub struct LsArgs {
    /// Include projects without running containers
    #[arg(short, long)]
    pub all: bool,

    /// Output format: table or json
    #[arg(long, default_value = "table")]
    pub format: String,
}

/// Arguments of `compose port`
#[derive(Args, Debug)]
pub struct PortArgs {
    /// Service publishing the port
    pub service: String,

    /// Container port
    pub private_port: u16,

    /// tcp or udp
    #[arg(long, default_value = "tcp")]
    pub protocol: String,

    /// Container index when the service runs several containers
    #[arg(long, default_value_t = 1)]
    pub index: usize,
}

/// Arguments of `compose convert`
#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// Output format: yaml or json
    #[arg(long, default_value = "yaml")]
    pub format: String,

    /// Write to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

fn check_format(format: &str) -> Result<()> {
    if format != "table" && format != "json" {
        bail!("Invalid format: {}. Must be 'table' or 'json'", format);
    }
    Ok(())
}

pub async fn ps(compose: &Compose, args: PsArgs) -> Result<()> {
    check_format(&args.format)?;
    let name = compose.project_name()?;
    let options = PsOptions {
        all: args.all,
        services: args.services,
    };
    let containers = compose.backend.ps(&name, options).await?;

    if args.quiet {
        for container in &containers {
            println!("{}", container.id);
        }
    } else if args.format == "json" {
        println!("{}", serde_json::to_string_pretty(&containers)?);
    } else {
        let mut t = table(&["NAME", "SERVICE", "STATE", "HEALTH", "EXIT CODE", "PORTS"]);
        for container in &containers {
            t.add_row(vec![
                Cell::new(&container.name),
                Cell::new(&container.service),
                state_cell(&container.state),
                Cell::new(&container.health),
                Cell::new(container.exit_code),
                Cell::new(ports(container)),
            ]);
        }
        println!("{}", t);
    }
    Ok(())
}

fn ports(container: &ContainerSummary) -> String {
    container
        .publishers
        .iter()
        .map(|p| {
            if p.published_port == 0 {
                format!("{}/{}", p.target_port, p.protocol)
            } else {
                format!(
                    "{}:{}->{}/{}",
                    p.url, p.published_port, p.target_port, p.protocol
                )
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

pub async fn ls(compose: &Compose, args: LsArgs) -> Result<()> {
    check_format(&args.format)?;
    let stacks = compose.backend.list(ListOptions { all: args.all }).await?;

    if args.format == "json" {
        println!("{}", serde_json::to_string_pretty(&stacks)?);
    } else {
        let mut t = table(&["NAME", "STATUS"]);
        for stack in &stacks {
            t.add_row(vec![Cell::new(&stack.name), Cell::new(&stack.status)]);
        }
        println!("{}", t);
    }
    Ok(())
}

pub async fn top(compose: &Compose, services: Vec<String>) -> Result<()> {
    let name = compose.project_name()?;
    let summaries = compose.backend.top(&name, &services).await?;
    for summary in &summaries {
        println!("{}", summary.name);
        let titles: Vec<&str> = summary.titles.iter().map(String::as_str).collect();
        let mut t = table(&titles);
        for process in &summary.processes {
            t.add_row(process.iter().map(Cell::new).collect::<Vec<_>>());
        }
        println!("{}\n", t);
    }
    Ok(())
}

pub async fn images(compose: &Compose, services: Vec<String>) -> Result<()> {
    let name = compose.project_name()?;
    let images = compose
        .backend
        .images(&name, ImagesOptions { services })
        .await?;

    let mut t = table(&["CONTAINER", "REPOSITORY", "TAG", "IMAGE ID", "SIZE"]);
    for image in &images {
        t.add_row(vec![
            Cell::new(&image.container_name),
            Cell::new(&image.repository),
            Cell::new(&image.tag),
            Cell::new(short_id(&image.id)),
            Cell::new(human_size(image.size)),
        ]);
    }
    println!("{}", t);
    Ok(())
}

fn short_id(id: &str) -> &str {
    let id = id.strip_prefix("sha256:").unwrap_or(id);
    id.get(..12).unwrap_or(id)
}

pub async fn port(compose: &Compose, args: PortArgs) -> Result<()> {
    let name = compose.project_name()?;
    let options = PortOptions {
        protocol: args.protocol,
        index: args.index,
    };
    let (host, port) = compose
        .backend
        .port(&name, &args.service, args.private_port, options)
        .await?;
    println!("{host}:{port}");
    Ok(())
}

pub async fn convert(compose: &Compose, args: ConvertArgs) -> Result<()> {
    let project = compose.project()?;
    let rendered = compose
        .backend
        .convert(
            &project,
            ConvertOptions {
                format: args.format,
            },
        )
        .await?;

    match args.output {
        Some(path) => std::fs::write(&path, &rendered)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => std::io::stdout().write_all(&rendered)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use compose_api::PortPublisher;

    #[test]
    fn test_ports_column() {
        let container = ContainerSummary {
            publishers: vec![
                PortPublisher {
                    url: "0.0.0.0".to_string(),
                    target_port: 80,
                    published_port: 8080,
                    protocol: "tcp".to_string(),
                },
                PortPublisher {
                    url: String::new(),
                    target_port: 5432,
                    published_port: 0,
                    protocol: "tcp".to_string(),
                },
            ],
            ..Default::default()
        };
        assert_eq!(ports(&container), "0.0.0.0:8080->80/tcp, 5432/tcp");
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("sha256:0123456789abcdef0123"), "0123456789ab");
        assert_eq!(short_id("abc"), "abc");
    }

    #[test]
    fn test_format_is_checked() {
        assert!(check_format("table").is_ok());
        assert!(check_format("json").is_ok());
        assert!(check_format("xml").is_err());
    }
}
