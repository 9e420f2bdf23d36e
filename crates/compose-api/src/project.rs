//! Project model types.
//!
//! A [`Project`] is the unit of every lifecycle operation. It is parsed
//! elsewhere and handed to backends by reference; transforms that need to
//! augment it produce a new value instead of mutating the caller's copy.

use crate::error::{ConfigError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A multi-service application stack
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Project {
    /// Project name, used as the value of the project label
    #[serde(default)]
    pub name: String,
    /// Services in declaration order
    #[serde(default, with = "services_map")]
    pub services: Vec<ServiceConfig>,
    /// Named networks
    #[serde(default)]
    pub networks: IndexMap<String, NetworkConfig>,
    /// Named volumes
    #[serde(default)]
    pub volumes: IndexMap<String, VolumeConfig>,
    /// Named secrets
    #[serde(default)]
    pub secrets: IndexMap<String, FileObjectConfig>,
    /// Named configs
    #[serde(default)]
    pub configs: IndexMap<String, FileObjectConfig>,
}

impl Project {
    /// Create an empty project
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add a service, replacing the name with the given one
    pub fn with_service(mut self, name: impl Into<String>, mut service: ServiceConfig) -> Self {
        service.name = name.into();
        self.services.push(service);
        self
    }

    /// Names of all services in declaration order
    pub fn service_names(&self) -> Vec<String> {
        self.services.iter().map(|s| s.name.clone()).collect()
    }

    /// Look up a service by name
    pub fn service(&self, name: &str) -> Result<&ServiceConfig> {
        self.services
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| ConfigError::ServiceNotFound(name.to_string()).into())
    }

    /// Check that service names are unique and every dependency exists
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for service in &self.services {
            if !seen.insert(service.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "service {} is declared more than once",
                    service.name
                ))
                .into());
            }
        }
        for service in &self.services {
            for dependency in service.depends_on.keys() {
                if !seen.contains(dependency.as_str()) {
                    return Err(ConfigError::UnknownDependency {
                        service: service.name.clone(),
                        dependency: dependency.clone(),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    /// Resolve a service selection: empty means every service
    pub fn selected_services(&self, services: &[String]) -> Result<Vec<String>> {
        if services.is_empty() {
            return Ok(self.service_names());
        }
        for name in services {
            self.service(name)?;
        }
        Ok(services.to_vec())
    }
}

/// Configuration for a single service
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServiceConfig {
    /// Service name, taken from the key in the services map
    #[serde(skip)]
    pub name: String,
    /// Container image reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Build instructions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildConfig>,
    /// Command override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    /// Environment; a `None` value passes the variable through unset
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub environment: IndexMap<String, Option<String>>,
    /// Network attachments
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub networks: IndexMap<String, Option<ServiceNetworkConfig>>,
    /// Dependencies and the condition each must reach
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub depends_on: IndexMap<String, ServiceDependency>,
    /// Mounts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<ServiceVolumeConfig>,
    /// Published ports
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<ServicePortConfig>,
    /// Extra container labels
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub labels: IndexMap<String, String>,
    /// Number of containers to run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<u32>,
}

impl ServiceConfig {
    /// Create a service running the given image
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: Some(image.into()),
            ..Default::default()
        }
    }

    /// Add a dependency with a condition
    pub fn depends_on(mut self, service: impl Into<String>, condition: Condition) -> Self {
        self.depends_on
            .insert(service.into(), ServiceDependency { condition });
        self
    }

    /// Number of containers this service runs
    pub fn replicas(&self) -> u32 {
        self.scale.unwrap_or(1)
    }

    /// Image reference used for containers of this service
    pub fn image_name(&self, project: &str) -> String {
        match &self.image {
            Some(image) => image.clone(),
            None => format!("{}_{}", project, self.name),
        }
    }
}

/// A depends_on entry
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServiceDependency {
    /// Required condition
    #[serde(default)]
    pub condition: Condition,
}

/// Readiness condition a dependency must reach before a dependent starts
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Condition {
    /// The dependency's containers were started
    #[default]
    #[serde(rename = "service_started", alias = "started")]
    Started,
    /// The dependency reports a healthy health check
    #[serde(rename = "service_healthy", alias = "healthy")]
    Healthy,
    /// The dependency ran to completion with exit code 0
    #[serde(
        rename = "service_completed_successfully",
        alias = "completed_successfully"
    )]
    CompletedSuccessfully,
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Started => write!(f, "service_started"),
            Condition::Healthy => write!(f, "service_healthy"),
            Condition::CompletedSuccessfully => write!(f, "service_completed_successfully"),
        }
    }
}

/// Build instructions for a service image
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BuildConfig {
    /// Build context directory
    pub context: String,
    /// Dockerfile path relative to the context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dockerfile: Option<String>,
    /// Build arguments
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub args: IndexMap<String, Option<String>>,
}

/// Per-network service settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServiceNetworkConfig {
    /// Fixed IPv4 address on the network
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4_address: Option<String>,
    /// Network aliases
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

/// Mount type
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VolumeType {
    /// Host path bind mount
    Bind,
    /// Named or anonymous volume
    #[default]
    Volume,
    /// In-memory mount
    Tmpfs,
}

/// A service mount
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServiceVolumeConfig {
    /// Mount type
    #[serde(rename = "type", default)]
    pub kind: VolumeType,
    /// Host path or volume name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Path inside the container
    pub target: String,
    /// Mount read-only
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub read_only: bool,
}

impl ServiceVolumeConfig {
    /// A bind mount of a host path
    pub fn bind(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            kind: VolumeType::Bind,
            source: Some(source.into()),
            target: target.into(),
            read_only: false,
        }
    }
}

/// A published port
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServicePortConfig {
    /// Container port
    pub target: u16,
    /// Host port, random when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<u16>,
    /// tcp or udp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

/// A project network
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    /// Engine-level name, defaults to `{project}_{key}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Network driver
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    /// Address management
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipam: Option<IpamConfig>,
    /// Managed outside the project
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub external: bool,
}

/// IP address management settings
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IpamConfig {
    /// Address pools
    #[serde(default)]
    pub config: Vec<IpamPool>,
}

/// A subnet and its gateway
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IpamPool {
    /// Subnet in CIDR notation
    pub subnet: String,
    /// Gateway address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
}

/// A project volume
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VolumeConfig {
    /// Engine-level name, defaults to `{project}_{key}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Volume driver
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    /// Managed outside the project
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub external: bool,
}

/// A secret or config sourced from a file or managed externally
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FileObjectConfig {
    /// Source file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Managed outside the project
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub external: bool,
}

/// Serializes services as a name-keyed map, preserving declaration order
pub(crate) mod services_map {
    use super::ServiceConfig;
    use indexmap::IndexMap;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        services: &[ServiceConfig],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_map(services.iter().map(|s| (s.name.as_str(), s)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<ServiceConfig>, D::Error> {
        let services = IndexMap::<String, ServiceConfig>::deserialize(deserializer)?;
        Ok(services
            .into_iter()
            .map(|(name, mut service)| {
                service.name = name;
                service
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    const PROJECT: &str = r#"
name: shop
services:
  db:
    image: postgres:16
    environment:
      POSTGRES_PASSWORD: secret
      PGDATA:
  api:
    image: shop/api
    depends_on:
      db:
        condition: service_healthy
      migrate:
        condition: completed_successfully
  migrate:
    image: shop/migrate
networks:
  backend:
    driver: bridge
"#;

    #[test]
    fn test_services_keep_declaration_order_and_names() {
        let project: Project = serde_yaml::from_str(PROJECT).unwrap();
        assert_eq!(project.service_names(), vec!["db", "api", "migrate"]);

        let db = project.service("db").unwrap();
        assert_eq!(db.environment["POSTGRES_PASSWORD"], Some("secret".to_string()));
        assert_eq!(db.environment["PGDATA"], None);

        let api = project.service("api").unwrap();
        assert_eq!(api.depends_on["db"].condition, Condition::Healthy);
        assert_eq!(
            api.depends_on["migrate"].condition,
            Condition::CompletedSuccessfully
        );
    }

    #[test]
    fn test_validate_rejects_unknown_dependency() {
        let project = Project::new("p")
            .with_service("web", ServiceConfig::new("nginx").depends_on("db", Condition::Started));

        match project.validate() {
            Err(Error::Config(ConfigError::UnknownDependency {
                service,
                dependency,
            })) => {
                assert_eq!(service, "web");
                assert_eq!(dependency, "db");
            }
            other => panic!("expected unknown dependency, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_duplicate_names() {
        let project = Project::new("p")
            .with_service("web", ServiceConfig::new("nginx"))
            .with_service("web", ServiceConfig::new("httpd"));
        assert!(project.validate().is_err());
    }

    #[test]
    fn test_selected_services() {
        let project = Project::new("p")
            .with_service("a", ServiceConfig::new("x"))
            .with_service("b", ServiceConfig::new("y"));
        assert_eq!(project.selected_services(&[]).unwrap(), vec!["a", "b"]);
        assert_eq!(
            project.selected_services(&["b".to_string()]).unwrap(),
            vec!["b"]
        );
        assert!(project.selected_services(&["c".to_string()]).is_err());
    }

    #[test]
    fn test_image_name_defaults_to_project_and_service() {
        let mut service = ServiceConfig {
            name: "api".to_string(),
            ..Default::default()
        };
        assert_eq!(service.image_name("shop"), "shop_api");
        service.image = Some("shop/api:1".to_string());
        assert_eq!(service.image_name("shop"), "shop/api:1");
    }
}
