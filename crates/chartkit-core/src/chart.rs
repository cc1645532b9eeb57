//! Chart definition: metadata, templates, files and nested dependencies

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, Result};
use crate::files::Files;
use crate::values::Values;

/// Chart type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum ChartType {
    #[default]
    Application,
    /// Only provides named templates; renders no manifests of its own
    Library,
}

impl FromStr for ChartType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "" | "application" => Ok(Self::Application),
            "library" => Ok(Self::Library),
            _ => Err(CoreError::InvalidChartType {
                value: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for ChartType {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl fmt::Display for ChartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Application => f.write_str("application"),
            Self::Library => f.write_str("library"),
        }
    }
}

/// Chart metadata (the contents of `Chart.yaml`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMetadata {
    #[serde(default)]
    pub api_version: String,

    /// Chart name (required)
    pub name: String,

    #[serde(default)]
    pub version: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Application version
    #[serde(default)]
    pub app_version: Option<String>,

    /// Kubernetes version constraint
    #[serde(default)]
    pub kube_version: Option<String>,

    #[serde(default, rename = "type")]
    pub chart_type: ChartType,

    #[serde(default)]
    pub keywords: Vec<String>,

    #[serde(default)]
    pub home: Option<String>,

    #[serde(default)]
    pub sources: Vec<String>,

    #[serde(default)]
    pub icon: Option<String>,

    #[serde(default)]
    pub deprecated: bool,

    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl ChartMetadata {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            api_version: "v2".to_string(),
            name: name.into(),
            version: version.into(),
            ..Default::default()
        }
    }

    /// Parse metadata from a `Chart.yaml` document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}

/// A raw template file, named relative to its chart (e.g. `templates/svc.yaml`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSource {
    pub name: String,
    pub data: Vec<u8>,
}

impl TemplateSource {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }

    /// Template text, with invalid UTF-8 replaced
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

/// A chart node: its own templates plus the charts it depends on
#[derive(Debug, Clone, Default)]
pub struct Chart {
    pub metadata: ChartMetadata,

    /// Template list; `None` marks an absent entry that is skipped
    pub templates: Vec<Option<TemplateSource>>,

    /// Non-template files bundled with the chart
    pub files: Files,

    /// Chart default values
    pub values: Values,

    /// Sub-charts, in declaration order
    pub dependencies: Vec<Chart>,
}

impl Chart {
    pub fn new(metadata: ChartMetadata) -> Self {
        Self {
            metadata,
            ..Default::default()
        }
    }

    /// Shorthand for an application chart at version `0.1.0`
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(ChartMetadata::new(name, "0.1.0"))
    }

    pub fn with_template(mut self, name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        self.templates.push(Some(TemplateSource::new(name, data)));
        self
    }

    pub fn with_files(mut self, files: Files) -> Self {
        self.files = files;
        self
    }

    pub fn with_values(mut self, values: Values) -> Self {
        self.values = values;
        self
    }

    pub fn with_dependency(mut self, chart: Chart) -> Self {
        self.dependencies.push(chart);
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    #[inline]
    pub fn is_library(&self) -> bool {
        self.metadata.chart_type == ChartType::Library
    }

    /// Full path of this chart inside the tree
    ///
    /// The root chart is addressed by its name; a sub-chart lives under its
    /// parent's `charts/` directory.
    pub fn full_path(&self, parent: Option<&str>) -> String {
        match parent {
            None => self.name().to_string(),
            Some(parent) => format!("{}/charts/{}", parent, self.name()),
        }
    }
}

/// Whether a template path names a partial (final segment starts with `_`)
pub fn is_partial(path: &str) -> bool {
    path.rsplit('/').next().is_some_and(|base| base.starts_with('_'))
}
