//! Template engine based on MiniJinja

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use chartkit_core::{Chart, Values, is_partial};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::diagnostics::panic_error;
use crate::error::{EngineError, RenderReport, Result};
use crate::host::{HostFunctions, NoopHost};
use crate::registry::{Namespace, sort_templates};
use crate::scope::{ScopeObject, TemplateInfo};
use crate::walker::{Renderable, derive_templates};

/// Rendering policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineOptions {
    /// Fail on any reference to a missing key
    pub strict: bool,
    /// `required` and `fail` only log, `lookup` is unavailable
    pub lint_mode: bool,
    /// Let `getHostByName` resolve through the host
    pub enable_dns: bool,
}

/// Result of a render pass
///
/// Templates that rendered are kept even when others failed.
#[derive(Debug, Default)]
pub struct RenderOutput {
    /// Rendered text by template path, in processing order
    pub manifests: IndexMap<String, String>,

    /// Parse failure, or every execution failure of the pass
    pub failure: Option<EngineError>,
}

impl RenderOutput {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    pub fn into_result(self) -> Result<IndexMap<String, String>> {
        match self.failure {
            Some(err) => Err(err),
            None => Ok(self.manifests),
        }
    }
}

/// Template engine builder
pub struct EngineBuilder {
    options: EngineOptions,
    host: Option<Arc<dyn HostFunctions>>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            options: EngineOptions::default(),
            host: None,
        }
    }

    /// Set strict mode (fail on undefined variables)
    pub fn strict(mut self, strict: bool) -> Self {
        self.options.strict = strict;
        self
    }

    pub fn lint_mode(mut self, lint_mode: bool) -> Self {
        self.options.lint_mode = lint_mode;
        self
    }

    /// Allow DNS lookups from templates
    pub fn enable_dns(mut self, enable_dns: bool) -> Self {
        self.options.enable_dns = enable_dns;
        self
    }

    pub fn options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Collaborator answering `lookup` and `getHostByName`
    pub fn host(mut self, host: Arc<dyn HostFunctions>) -> Self {
        self.host = Some(host);
        self
    }

    /// Build the engine
    pub fn build(self) -> Engine {
        Engine {
            options: self.options,
            host: self.host.unwrap_or_else(|| Arc::new(NoopHost)),
        }
    }
}

/// The template engine
///
/// Every render pass starts from an empty namespace, so one engine can
/// render any number of charts.
pub struct Engine {
    options: EngineOptions,
    host: Arc<dyn HostFunctions>,
}

impl Engine {
    /// Create a new engine with default settings
    pub fn new(host: Arc<dyn HostFunctions>) -> Self {
        Self::builder().host(host).build()
    }

    /// Create a builder
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Render every template of a chart tree
    ///
    /// `values` is the top-level table holding `Values`, `Release` and
    /// `Capabilities`, as built by [`chartkit_core::to_render_values`].
    pub fn render(&self, chart: &Chart, values: &Values) -> RenderOutput {
        let templates = derive_templates(chart, values);
        self.render_templates(&templates)
    }

    /// Parse every template, then execute the non-partial ones
    ///
    /// A parse failure aborts the pass before anything executes. Execution
    /// failures are collected and the remaining templates still run.
    pub fn render_templates(&self, templates: &BTreeMap<String, Renderable>) -> RenderOutput {
        let order: Vec<(&str, &Renderable)> = sort_templates(templates.keys().map(String::as_str))
            .into_iter()
            .filter_map(|name| templates.get(name).map(|entry| (name, entry)))
            .collect();

        let mut namespace = Namespace::new(&self.options, Arc::clone(&self.host));
        for (name, entry) in &order {
            tracing::debug!(template = name, "parsing template");
            if let Err(err) = namespace.parse(name, &entry.source) {
                return RenderOutput {
                    manifests: IndexMap::new(),
                    failure: Some(EngineError::Template(err)),
                };
            }
        }

        let mut manifests = IndexMap::new();
        let mut report = RenderReport::new();

        for (name, entry) in order {
            if is_partial(name) {
                tracing::debug!(template = name, "skipping partial");
                continue;
            }

            let data = ScopeObject::value(
                Arc::clone(&entry.scope),
                Some(TemplateInfo {
                    name: name.to_string(),
                    base_path: entry.base_path.clone(),
                }),
            );
            let result = panic::catch_unwind(AssertUnwindSafe(|| namespace.execute(name, data)))
                .unwrap_or_else(|payload| Err(panic_error(name, payload.as_ref())));

            match result {
                Ok(rendered) => {
                    manifests.insert(name.to_string(), rendered);
                    report.add_success(name.to_string());
                }
                Err(err) => {
                    tracing::warn!(template = name, error = %err, "template execution failed");
                    report.add_error(name.to_string(), err);
                }
            }
        }

        if report.has_errors() {
            tracing::debug!(summary = %report.summary(), "render pass finished with errors");
        }

        RenderOutput {
            manifests,
            failure: report.has_errors().then(|| EngineError::Render(report)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chartkit_core::{Capabilities, ReleaseOptions, to_render_values};

    fn render_values(chart: &Chart, user: &str) -> Values {
        to_render_values(
            chart,
            &Values::from_yaml(user).unwrap(),
            &ReleaseOptions::for_install("myapp", "default"),
            &Capabilities::default(),
        )
    }

    fn web_chart() -> Chart {
        Chart::named("web")
            .with_values(Values::from_yaml("replicas: 1\nimage: nginx").unwrap())
            .with_template(
                "templates/_helpers.tpl",
                "{% define \"web.fullname\" %}{{ Release.Name }}-{{ Chart.Name }}{% enddefine %}",
            )
            .with_template(
                "templates/deployment.yaml",
                "name: {{ include(\"web.fullname\", root) }}\nreplicas: {{ Values.replicas }}\nimage: {{ Values.image | quote }}\n",
            )
    }

    #[test]
    fn test_render_simple() {
        let chart = web_chart();
        let engine = Engine::builder().build();
        let manifests = engine
            .render(&chart, &render_values(&chart, "replicas: 3"))
            .into_result()
            .unwrap();

        let keys: Vec<_> = manifests.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["web/templates/deployment.yaml"]);
        assert_eq!(
            manifests["web/templates/deployment.yaml"],
            "name: myapp-web\nreplicas: 3\nimage: \"nginx\"\n"
        );
    }

    #[test]
    fn test_template_identity() {
        let chart = Chart::named("web")
            .with_template("templates/t.yaml", "{{ Template.Name }} {{ Template.BasePath }}");
        let output = Engine::builder().build().render(&chart, &Values::new());
        assert_eq!(
            output.manifests["web/templates/t.yaml"],
            "web/templates/t.yaml web/templates"
        );
    }

    #[test]
    fn test_failures_do_not_abort_siblings() {
        let chart = Chart::named("web")
            .with_template("templates/a.yaml", "{{ fail(\"a is broken\") }}")
            .with_template("templates/b.yaml", "ok")
            .with_template("templates/c.yaml", "{{ required(\"c needs x\", Values.x) }}");
        let output = Engine::builder().build().render(&chart, &Values::new());

        assert!(!output.is_success());
        assert_eq!(output.manifests.len(), 1);
        assert_eq!(output.manifests["web/templates/b.yaml"], "ok");

        let failure = output.failure.unwrap();
        insta::assert_snapshot!(failure.to_string(), @r"
        execution error at (web/templates/a.yaml:1): a is broken
        execution error at (web/templates/c.yaml:1): c needs x
        ");
    }

    #[test]
    fn test_parse_failure_aborts_pass() {
        let chart = Chart::named("web")
            .with_template("templates/a.yaml", "fine")
            .with_template("templates/b.yaml", "line\n{% if %}");
        let output = Engine::builder().build().render(&chart, &Values::new());

        assert!(output.manifests.is_empty());
        let Some(EngineError::Template(err)) = output.failure else {
            panic!("expected a parse failure");
        };
        assert!(err.is_parse());
        assert_eq!(err.location(), Some("web/templates/b.yaml:2"));
    }

    #[test]
    fn test_engine_reusable_across_charts() {
        let engine = Engine::builder().build();
        let first = Chart::named("a").with_template(
            "templates/_h.tpl",
            "{% define \"shared\" %}from a{% enddefine %}",
        );
        engine.render(&first, &Values::new()).into_result().unwrap();

        let second = Chart::named("b").with_template("templates/t.yaml", "{{ include(\"shared\", none) }}");
        let output = engine.render(&second, &Values::new());
        assert!(!output.is_success());
    }

    #[test]
    fn test_options_from_config() {
        let options: EngineOptions =
            serde_yaml::from_str("strict: true\nenableDns: true").unwrap();
        assert!(options.strict);
        assert!(options.enable_dns);
        assert!(!options.lint_mode);

        let engine = Engine::builder().options(options).lint_mode(true).build();
        assert!(engine.options().lint_mode);
        assert!(engine.options().strict);
    }
}
