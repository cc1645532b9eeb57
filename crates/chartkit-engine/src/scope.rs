//! Per-chart template scope
//!
//! Every template of a chart executes against the same [`Scope`]: the
//! chart's metadata, its bundled files, the release and capabilities handed
//! down from the caller, the chart's own `Values` table, and the resolved
//! scopes of its sub-charts. Templates see it through a [`ScopeObject`],
//! which adds the `Template` entry for the template being executed.

use std::collections::BTreeMap;
use std::sync::Arc;

use chartkit_core::{Chart, ChartMetadata, Files, Native, Values};
use minijinja::value::{Enumerator, Object, ObjectRepr, Value};
use once_cell::sync::OnceCell;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::files_object::create_files_value;

/// Chart metadata as templates see it (`Chart.Name`, `Chart.IsRoot`, ...)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChartInfo {
    #[serde(rename = "APIVersion")]
    pub api_version: String,
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    pub app_version: Option<String>,
    pub kube_version: Option<String>,
    #[serde(rename = "Type")]
    pub chart_type: String,
    pub keywords: Vec<String>,
    pub home: Option<String>,
    pub sources: Vec<String>,
    pub icon: Option<String>,
    pub deprecated: bool,
    pub annotations: BTreeMap<String, String>,
    pub is_root: bool,
}

impl ChartInfo {
    pub fn new(metadata: &ChartMetadata, is_root: bool) -> Self {
        Self {
            api_version: metadata.api_version.clone(),
            name: metadata.name.clone(),
            version: metadata.version.clone(),
            description: metadata.description.clone(),
            app_version: metadata.app_version.clone(),
            kube_version: metadata.kube_version.clone(),
            chart_type: metadata.chart_type.to_string(),
            keywords: metadata.keywords.clone(),
            home: metadata.home.clone(),
            sources: metadata.sources.clone(),
            icon: metadata.icon.clone(),
            deprecated: metadata.deprecated,
            annotations: metadata.annotations.clone(),
            is_root,
        }
    }
}

/// Identity of the template being executed (`Template.Name`, `Template.BasePath`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemplateInfo {
    pub name: String,
    pub base_path: String,
}

/// The resolved values visible to one chart's templates
#[derive(Debug)]
pub struct Scope {
    pub chart: ChartInfo,
    pub files: Arc<Files>,
    pub release: JsonValue,
    pub capabilities: JsonValue,
    pub values: Values,
    pub subcharts: BTreeMap<String, Arc<Scope>>,
    cache: ScopeCache,
}

#[derive(Debug, Default)]
struct ScopeCache {
    chart: OnceCell<Value>,
    files: OnceCell<Value>,
    release: OnceCell<Value>,
    capabilities: OnceCell<Value>,
    values: OnceCell<Value>,
    subcharts: OnceCell<Value>,
}

impl Scope {
    /// Scope for `chart`, inheriting release and capabilities from the caller
    pub fn new(
        chart: &Chart,
        is_root: bool,
        release: JsonValue,
        capabilities: JsonValue,
        values: Values,
    ) -> Self {
        Self {
            chart: ChartInfo::new(&chart.metadata, is_root),
            files: Arc::new(chart.files.clone()),
            release,
            capabilities,
            values,
            subcharts: BTreeMap::new(),
            cache: ScopeCache::default(),
        }
    }

    /// Template value for one top-level key, built once and shared
    pub fn get(&self, key: &str) -> Option<Value> {
        let cache = &self.cache;
        let value = match key {
            "Chart" => cache
                .chart
                .get_or_init(|| Value::from_serialize(&self.chart)),
            "Files" => cache
                .files
                .get_or_init(|| create_files_value(Arc::clone(&self.files))),
            "Release" => cache
                .release
                .get_or_init(|| Value::from_serialize(Native(&self.release))),
            "Capabilities" => cache
                .capabilities
                .get_or_init(|| Value::from_serialize(Native(&self.capabilities))),
            "Values" => cache
                .values
                .get_or_init(|| Value::from_serialize(&self.values)),
            "Subcharts" => cache.subcharts.get_or_init(|| {
                let subcharts: BTreeMap<&str, Value> = self
                    .subcharts
                    .iter()
                    .map(|(name, scope)| {
                        (name.as_str(), ScopeObject::value(Arc::clone(scope), None))
                    })
                    .collect();
                Value::from_serialize(&subcharts)
            }),
            _ => return None,
        };
        Some(value.clone())
    }
}

const SCOPE_KEYS: &[&str] = &[
    "Chart",
    "Files",
    "Release",
    "Capabilities",
    "Values",
    "Subcharts",
];

const TEMPLATE_SCOPE_KEYS: &[&str] = &[
    "Chart",
    "Files",
    "Release",
    "Capabilities",
    "Values",
    "Subcharts",
    "Template",
];

/// A scope as a template value, optionally carrying the executing template
#[derive(Debug)]
pub struct ScopeObject {
    scope: Arc<Scope>,
    template: Option<TemplateInfo>,
}

impl ScopeObject {
    pub fn value(scope: Arc<Scope>, template: Option<TemplateInfo>) -> Value {
        Value::from_object(Self { scope, template })
    }
}

impl Object for ScopeObject {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Map
    }

    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        match key.as_str()? {
            "Template" => self.template.as_ref().map(Value::from_serialize),
            other => self.scope.get(other),
        }
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator {
        if self.template.is_some() {
            Enumerator::Str(TEMPLATE_SCOPE_KEYS)
        } else {
            Enumerator::Str(SCOPE_KEYS)
        }
    }
}

/// Execution context for a template
///
/// Every top-level key of the data is a variable of its own, and the data
/// as a whole is `root`.
#[derive(Debug)]
pub struct Binding {
    data: Value,
}

impl Binding {
    pub fn value(data: Value) -> Value {
        Value::from_object(Self { data })
    }
}

impl Object for Binding {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Map
    }

    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        if key.as_str() == Some("root") {
            return Some(self.data.clone());
        }
        self.data
            .get_item(key)
            .ok()
            .filter(|value| !value.is_undefined())
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator {
        let mut keys = vec![Value::from("root")];
        if matches!(self.data.kind(), minijinja::value::ValueKind::Map) {
            if let Ok(iter) = self.data.try_iter() {
                keys.extend(iter);
            }
        }
        Enumerator::Values(keys)
    }
}
