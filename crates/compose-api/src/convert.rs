//! Rendering of the effective project document

use crate::error::{ConfigError, Error, Result};
use crate::project::{FileObjectConfig, NetworkConfig, Project, ServiceConfig, VolumeConfig};
use indexmap::IndexMap;
use serde::Serialize;
use std::str::FromStr;

/// Supported output encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvertFormat {
    /// Indented JSON
    Json,
    /// YAML
    Yaml,
}

impl FromStr for ConvertFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(ConvertFormat::Json),
            "yaml" | "" => Ok(ConvertFormat::Yaml),
            other => Err(ConfigError::UnsupportedFormat(other.to_string()).into()),
        }
    }
}

// Field order is the output key order.
#[derive(Serialize)]
struct Document<'a> {
    #[serde(serialize_with = "crate::project::services_map::serialize")]
    services: &'a [ServiceConfig],
    networks: &'a IndexMap<String, NetworkConfig>,
    volumes: &'a IndexMap<String, VolumeConfig>,
    secrets: &'a IndexMap<String, FileObjectConfig>,
    configs: &'a IndexMap<String, FileObjectConfig>,
}

/// Render a project in the named encoding
///
/// The format is checked before anything is serialized.
pub fn render(project: &Project, format: &str) -> Result<Vec<u8>> {
    let format = format.parse::<ConvertFormat>()?;
    let document = Document {
        services: &project.services,
        networks: &project.networks,
        volumes: &project.volumes,
        secrets: &project.secrets,
        configs: &project.configs,
    };
    match format {
        ConvertFormat::Json => Ok(serde_json::to_vec_pretty(&document)?),
        ConvertFormat::Yaml => Ok(serde_yaml::to_string(&document)?.into_bytes()),
    }
}
