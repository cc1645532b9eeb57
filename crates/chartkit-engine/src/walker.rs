//! Chart tree walker
//!
//! Flattens a chart tree into a registry of renderable templates, each
//! paired with the scope of the chart that owns it. A sub-chart sees only
//! the section of its parent's `Values` named after it.

use std::collections::BTreeMap;
use std::sync::Arc;

use chartkit_core::{Chart, Values, is_partial};
use serde_json::Value as JsonValue;

use crate::scope::Scope;

/// A template ready to be parsed and executed
#[derive(Debug, Clone)]
pub struct Renderable {
    /// Template text
    pub source: String,
    /// Scope of the chart the template belongs to
    pub scope: Arc<Scope>,
    /// `<chart full path>/templates`
    pub base_path: String,
}

/// What a chart node inherits from its parent (or from the caller, at the root)
struct Inherited<'a> {
    release: &'a JsonValue,
    capabilities: &'a JsonValue,
    values: &'a Values,
    path: Option<&'a str>,
}

/// Collect every template of the tree, keyed by its full path
///
/// `caller` is the top-level table (`Values`, `Release`, `Capabilities`).
/// The root chart's `Values` is the caller's `Values` table as is; a
/// missing or non-table section yields an empty table.
pub fn derive_templates(chart: &Chart, caller: &Values) -> BTreeMap<String, Renderable> {
    let null = JsonValue::Null;
    let root_values = caller.table("Values").unwrap_or_default();
    let inherited = Inherited {
        release: caller.get("Release").unwrap_or(&null),
        capabilities: caller.get("Capabilities").unwrap_or(&null),
        values: &root_values,
        path: None,
    };

    let mut templates = BTreeMap::new();
    walk(chart, &inherited, &mut templates);
    tracing::debug!(
        chart = chart.name(),
        templates = templates.len(),
        "derived templates"
    );
    templates
}

fn walk(
    chart: &Chart,
    parent: &Inherited<'_>,
    templates: &mut BTreeMap<String, Renderable>,
) -> Arc<Scope> {
    let is_root = parent.path.is_none();
    let values = if is_root {
        parent.values.clone()
    } else {
        parent.values.table(chart.name()).unwrap_or_default()
    };

    let full_path = chart.full_path(parent.path);

    let mut scope = Scope::new(
        chart,
        is_root,
        parent.release.clone(),
        parent.capabilities.clone(),
        values,
    );

    let inherited = Inherited {
        release: parent.release,
        capabilities: parent.capabilities,
        values: &scope.values,
        path: Some(&full_path),
    };
    let subcharts: Vec<_> = chart
        .dependencies
        .iter()
        .map(|child| (child.name().to_string(), walk(child, &inherited, templates)))
        .collect();
    scope.subcharts.extend(subcharts);

    let scope = Arc::new(scope);
    let base_path = join(&full_path, "templates");

    for template in chart.templates.iter().flatten() {
        if chart.is_library() && !is_partial(&template.name) {
            tracing::debug!(
                chart = chart.name(),
                template = %template.name,
                "library chart ignores non-partial template"
            );
            continue;
        }
        templates.insert(
            join(&full_path, &template.name),
            Renderable {
                source: template.text(),
                scope: Arc::clone(&scope),
                base_path: base_path.clone(),
            },
        );
    }

    scope
}

fn join(base: &str, name: &str) -> String {
    let name = name.trim_start_matches("./").trim_start_matches('/');
    format!("{}/{}", base.trim_end_matches('/'), name)
}
