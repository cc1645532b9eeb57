//! Template registry and parse order
//!
//! A [`Namespace`] is the set of templates one render pass can reach by
//! name: every template file under its full path, and every named block
//! under the name it was defined with. Registering a name twice rebinds it,
//! so each render pass starts from a fresh namespace.

use std::collections::HashMap;
use std::sync::Arc;

use minijinja::value::{Value, ValueKind};
use minijinja::{AutoEscape, Environment, Error, ErrorKind, UndefinedBehavior};

use crate::blocks::split_blocks;
use crate::diagnostics::{NO_VALUE, exec_error, parse_error, strip_no_value};
use crate::engine::EngineOptions;
use crate::error::TemplateError;
use crate::host::HostFunctions;
use crate::scope::Binding;
use crate::{filters, functions};

/// The shared template namespace of a render pass
pub struct Namespace {
    env: Environment<'static>,
    /// Named block → file it was defined in
    origins: HashMap<String, String>,
}

impl Namespace {
    /// An empty namespace with every template function registered
    pub fn new(options: &EngineOptions, host: Arc<dyn HostFunctions>) -> Self {
        let mut env = Environment::new();
        configure(&mut env, options.strict);
        filters::register(&mut env);
        functions::register(&mut env, options, host);
        Self {
            env,
            origins: HashMap::new(),
        }
    }

    /// Parse a template file under `name`, registering its named blocks
    pub fn parse(&mut self, name: &str, source: &str) -> Result<(), TemplateError> {
        let split = split_blocks(source).map_err(|err| TemplateError::Parse {
            template: name.to_string(),
            location: format!("{}:{}", name, err.line),
            message: err.message,
        })?;

        for block in split.blocks {
            self.origins.insert(block.name.clone(), name.to_string());
            self.env
                .add_template_owned(block.name, block.body)
                .map_err(|err| parse_error(name, &err, &self.origins))?;
        }

        self.origins.remove(name);
        self.env
            .add_template_owned(name.to_string(), split.body)
            .map_err(|err| parse_error(name, &err, &self.origins))
    }

    /// Execute a registered template against `data`
    ///
    /// The output never contains the undefined-value placeholder.
    pub fn execute(&self, name: &str, data: Value) -> Result<String, TemplateError> {
        let rendered = self
            .env
            .get_template(name)
            .and_then(|template| template.render(Binding::value(data)))
            .map_err(|err| exec_error(name, &err, &self.origins))?;
        Ok(strip_no_value(&rendered))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.env.get_template(name).is_ok()
    }
}

/// Settings shared by every namespace and every `tpl` fork
pub fn configure(env: &mut Environment<'_>, strict: bool) {
    apply_missing_key_policy(env, strict);
    env.set_keep_trailing_newline(true);
    env.set_auto_escape_callback(|_| AutoEscape::None);
    env.set_formatter(move |out, state, value| {
        if value.is_undefined() && strict {
            return Err(Error::from(ErrorKind::UndefinedError));
        }
        if value.is_undefined() || value.is_none() {
            out.write_str(NO_VALUE)?;
            return Ok(());
        }
        if value.kind() == ValueKind::Bool {
            out.write_str(if value.is_true() { "true" } else { "false" })?;
            return Ok(());
        }
        minijinja::escape_formatter(out, state, value)
    });
}

/// Strict rejects any reference to a missing key; otherwise missing keys
/// chain to undefined and render as nothing
pub fn apply_missing_key_policy(env: &mut Environment<'_>, strict: bool) {
    env.set_undefined_behavior(if strict {
        UndefinedBehavior::Strict
    } else {
        UndefinedBehavior::Chainable
    });
}

/// Parse order: deepest paths first, then by path
pub fn sort_templates<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<&'a str> {
    let mut names: Vec<&str> = names.into_iter().collect();
    names.sort_by(|a, b| {
        depth(b)
            .cmp(&depth(a))
            .then_with(|| a.cmp(b))
    });
    names
}

fn depth(path: &str) -> usize {
    path.matches('/').count()
}
