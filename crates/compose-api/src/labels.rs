//! Container label vocabulary and label-match filters.
//!
//! Out-of-band tooling queries containers by these labels, so both the keys
//! and the literal `True`/`False` rendering of the one-off flag are fixed.

use std::collections::HashMap;
use std::fmt;

/// Project owning the container
pub const PROJECT_LABEL: &str = "com.docker.compose.project";
/// Service owning the container
pub const SERVICE_LABEL: &str = "com.docker.compose.service";
/// Unique slug of a one-off container
pub const SLUG_LABEL: &str = "com.docker.compose.slug";
/// Whether the container is a one-off run
pub const ONEOFF_LABEL: &str = "com.docker.compose.oneoff";
/// Index of the container within its service
pub const CONTAINER_NUMBER_LABEL: &str = "com.docker.compose.container-number";
/// Project-level network key
pub const NETWORK_LABEL: &str = "com.docker.compose.network";
/// Project-level volume key
pub const VOLUME_LABEL: &str = "com.docker.compose.volume";

/// A label predicate: presence of a key, or an exact key=value match
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LabelFilter {
    key: String,
    value: Option<String>,
}

impl LabelFilter {
    /// Match containers carrying `key=value`
    pub fn equals(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }

    /// Match containers carrying `key` with any value
    pub fn has(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }

    /// Label key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Required value, if any
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Evaluate the predicate against a label set
    pub fn matches(&self, labels: &HashMap<String, String>) -> bool {
        match (labels.get(&self.key), &self.value) {
            (Some(actual), Some(expected)) => actual == expected,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}

impl fmt::Display for LabelFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{}={}", self.key, value),
            None => f.write_str(&self.key),
        }
    }
}

/// Match all containers of a project
pub fn project_filter(project: &str) -> LabelFilter {
    LabelFilter::equals(PROJECT_LABEL, project)
}

/// Match all containers of a service
pub fn service_filter(service: &str) -> LabelFilter {
    LabelFilter::equals(SERVICE_LABEL, service)
}

/// Match a one-off container by slug
pub fn slug_filter(slug: &str) -> LabelFilter {
    LabelFilter::equals(SLUG_LABEL, slug)
}

/// Match one-off or regular containers
pub fn one_off_filter(one_off: bool) -> LabelFilter {
    LabelFilter::equals(ONEOFF_LABEL, one_off_value(one_off))
}

/// Match the container with the given index
pub fn container_number_filter(index: usize) -> LabelFilter {
    LabelFilter::equals(CONTAINER_NUMBER_LABEL, index.to_string())
}

/// Match any container managed by a project
pub fn has_project_label_filter() -> LabelFilter {
    LabelFilter::has(PROJECT_LABEL)
}

/// Literal rendering of the one-off flag
pub fn one_off_value(one_off: bool) -> &'static str {
    if one_off { "True" } else { "False" }
}

/// Whether every filter matches the label set
pub fn matches_all(filters: &[LabelFilter], labels: &HashMap<String, String>) -> bool {
    filters.iter().all(|f| f.matches(labels))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_rendering() {
        assert_eq!(
            project_filter("shop").to_string(),
            "com.docker.compose.project=shop"
        );
        assert_eq!(
            service_filter("db").to_string(),
            "com.docker.compose.service=db"
        );
        assert_eq!(slug_filter("ab12").to_string(), "com.docker.compose.slug=ab12");
        assert_eq!(
            one_off_filter(true).to_string(),
            "com.docker.compose.oneoff=True"
        );
        assert_eq!(
            one_off_filter(false).to_string(),
            "com.docker.compose.oneoff=False"
        );
        assert_eq!(
            container_number_filter(2).to_string(),
            "com.docker.compose.container-number=2"
        );
        assert_eq!(
            has_project_label_filter().to_string(),
            "com.docker.compose.project"
        );
    }

    #[test]
    fn test_matching() {
        let labels = HashMap::from([
            (PROJECT_LABEL.to_string(), "shop".to_string()),
            (SERVICE_LABEL.to_string(), "db".to_string()),
            (ONEOFF_LABEL.to_string(), "False".to_string()),
        ]);

        assert!(matches_all(
            &[project_filter("shop"), service_filter("db"), one_off_filter(false)],
            &labels
        ));
        assert!(!one_off_filter(true).matches(&labels));
        assert!(has_project_label_filter().matches(&labels));
        assert!(!slug_filter("x").matches(&labels));
        assert!(matches_all(&[], &labels));
    }
}
