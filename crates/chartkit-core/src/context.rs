//! Construction of the top-level values a chart is rendered with

use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

use crate::chart::Chart;
use crate::values::Values;

/// Release information made available to templates as `Release`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseOptions {
    pub name: String,
    pub namespace: String,
    pub revision: u32,
    pub is_install: bool,
    pub is_upgrade: bool,
}

impl ReleaseOptions {
    /// Options for a first install
    pub fn for_install(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            revision: 1,
            is_install: true,
            is_upgrade: false,
        }
    }

    /// Options for an upgrade to `revision`
    pub fn for_upgrade(
        name: impl Into<String>,
        namespace: impl Into<String>,
        revision: u32,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            revision,
            is_install: false,
            is_upgrade: true,
        }
    }

    pub fn to_value(&self) -> JsonValue {
        json!({
            "Name": self.name,
            "Namespace": self.namespace,
            "Revision": self.revision,
            "IsInstall": self.is_install,
            "IsUpgrade": self.is_upgrade,
            "Service": "Helm",
        })
    }
}

/// Cluster capabilities
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    #[serde(default)]
    pub kube_version: KubeVersion,

    /// Available API versions (e.g. `apps/v1`)
    #[serde(default)]
    pub api_versions: Vec<String>,
}

impl Capabilities {
    pub fn with_api_versions<I, S>(mut self, versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.api_versions = versions.into_iter().map(Into::into).collect();
        self
    }

    pub fn to_value(&self) -> JsonValue {
        json!({
            "KubeVersion": {
                "Version": self.kube_version.version,
                "Major": self.kube_version.major,
                "Minor": self.kube_version.minor,
            },
            "APIVersions": self.api_versions,
        })
    }
}

/// Kubernetes version info
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubeVersion {
    pub version: String,
    pub major: String,
    pub minor: String,
}

impl Default for KubeVersion {
    fn default() -> Self {
        // A recent stable version, used when no cluster is consulted
        Self {
            version: "v1.28.0".to_string(),
            major: "1".to_string(),
            minor: "28".to_string(),
        }
    }
}

impl KubeVersion {
    pub fn new(version: &str) -> Self {
        let version = version.trim_start_matches('v');
        let parts: Vec<&str> = version.split('.').collect();

        Self {
            version: format!("v{}", version),
            major: parts.first().unwrap_or(&"1").to_string(),
            minor: parts.get(1).unwrap_or(&"28").to_string(),
        }
    }
}

/// Chart default values with the user's values layered on top
///
/// Each dependency's defaults land under the dependency's name, recursively,
/// so a sub-chart sees its own defaults unless the parent or the user
/// overrides them.
pub fn coalesce_values(chart: &Chart, user: &Values) -> Values {
    let mut merged = chart.values.clone();

    for dependency in &chart.dependencies {
        let from_parent = merged.table(dependency.name()).unwrap_or_default();
        let coalesced = coalesce_values(dependency, &from_parent);
        merged.insert(dependency.name(), coalesced.into_json());
    }

    merged.merge(user);
    merged
}

/// Build the caller values a chart is rendered with:
/// `{ Values, Release, Capabilities }`
pub fn to_render_values(
    chart: &Chart,
    user: &Values,
    release: &ReleaseOptions,
    capabilities: &Capabilities,
) -> Values {
    let mut top = Values::new();
    top.insert("Values", coalesce_values(chart, user).into_json());
    top.insert("Release", release.to_value());
    top.insert("Capabilities", capabilities.to_value());
    top
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kube_version_parse() {
        let v = KubeVersion::new("1.30.2");
        assert_eq!(v.version, "v1.30.2");
        assert_eq!(v.major, "1");
        assert_eq!(v.minor, "30");
        assert_eq!(KubeVersion::default().version, "v1.28.0");
    }

    #[test]
    fn test_coalesce_values_layers_dependencies() {
        let db = Chart::named("db").with_values(
            Values::from_yaml("port: 5432\nuser: admin").unwrap(),
        );
        let chart = Chart::named("web")
            .with_values(Values::from_yaml("replicas: 1\ndb:\n  user: web").unwrap())
            .with_dependency(db);

        let user = Values::from_yaml("replicas: 3\ndb:\n  port: 6432").unwrap();
        let merged = coalesce_values(&chart, &user);

        assert_eq!(merged.path_value("replicas").unwrap(), 3);
        assert_eq!(merged.path_value("db.port").unwrap(), 6432);
        assert_eq!(merged.path_value("db.user").unwrap(), "web");
    }

    #[test]
    fn test_to_render_values() {
        let chart = Chart::named("web").with_values(Values::from_yaml("replicas: 2").unwrap());
        let top = to_render_values(
            &chart,
            &Values::new(),
            &ReleaseOptions::for_install("prod", "apps"),
            &Capabilities::default().with_api_versions(["apps/v1"]),
        );

        assert_eq!(top.path_value("Values.replicas").unwrap(), 2);
        assert_eq!(top.path_value("Release.Name").unwrap(), "prod");
        assert_eq!(top.path_value("Release.Service").unwrap(), "Helm");
        assert_eq!(top.path_value("Release.IsInstall").unwrap(), true);
        assert_eq!(
            top.path_value("Capabilities.KubeVersion.Minor").unwrap(),
            "28"
        );
    }
}
