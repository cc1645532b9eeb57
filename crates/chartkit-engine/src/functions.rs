//! Template functions that reach back into the engine
//!
//! `include` and `tpl` render other templates from inside a template, so
//! they are callable objects with access to the calling [`State`] rather
//! than plain functions. The rest close over the engine options and the
//! host collaborators.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chartkit_core::Native;
use minijinja::value::{Object, ObjectRepr, Value, from_args};
use minijinja::{Environment, Error, ErrorKind, State};

use crate::blocks::split_blocks;
use crate::diagnostics::{detach, detail, strip_no_value, warn_wrap};
use crate::engine::EngineOptions;
use crate::host::HostFunctions;
use crate::registry::apply_missing_key_policy;
use crate::scope::Binding;

/// Deepest nesting of one template name through `include`
pub const MAX_INCLUDE_DEPTH: usize = 1000;

/// Deepest nesting of `tpl` calls
pub const MAX_TPL_DEPTH: usize = 1000;

// Nested renders run on a heap-allocated stack once less than this is left.
const STACK_RED_ZONE: usize = 256 * 1024;
const STACK_GROWTH: usize = 4 * 1024 * 1024;

/// Register the engine functions on a namespace
pub fn register(
    env: &mut Environment<'static>,
    options: &EngineOptions,
    host: Arc<dyn HostFunctions>,
) {
    let depths = Arc::new(RecursionDepths::default());
    env.add_global(
        "include",
        Value::from_object(Include {
            depths: Arc::clone(&depths),
        }),
    );
    env.add_global(
        "tpl",
        Value::from_object(Tpl {
            strict: options.strict,
            depths,
        }),
    );

    let lint_mode = options.lint_mode;
    env.add_function(
        "required",
        move |message: String, value: Option<Value>| -> Result<Value, Error> {
            match value {
                Some(value) if !is_missing(&value) => Ok(value),
                _ if lint_mode => {
                    tracing::info!("Missing required value: {}", message);
                    Ok(Value::from(""))
                }
                _ => Err(Error::new(ErrorKind::InvalidOperation, warn_wrap(&message))),
            }
        },
    );
    env.add_function("fail", move |message: String| -> Result<String, Error> {
        if lint_mode {
            tracing::info!("Fail: {}", message);
            return Ok(String::new());
        }
        Err(Error::new(ErrorKind::InvalidOperation, warn_wrap(&message)))
    });

    if !lint_mode {
        let lookup_host = Arc::clone(&host);
        env.add_function(
            "lookup",
            move |api_version: String,
                  kind: String,
                  namespace: String,
                  name: String|
                  -> Result<Value, Error> {
                lookup_host
                    .lookup_kubernetes_resource(&api_version, &kind, &namespace, &name)
                    .map(|found| Value::from_serialize(Native(&found)))
                    .map_err(|err| Error::new(ErrorKind::InvalidOperation, err.to_string()))
            },
        );
    }

    if options.enable_dns {
        env.add_function("getHostByName", move |hostname: String| {
            host.resolve_hostname(&hostname)
        });
    } else {
        env.add_function("getHostByName", |_hostname: String| String::new());
    }
}

/// Null, undefined, and the empty string count as missing
fn is_missing(value: &Value) -> bool {
    value.is_undefined() || value.is_none() || value.as_str() == Some("")
}

/// Current nesting of the engine's re-entrant functions
///
/// Shared by a namespace and every `tpl` fork of it.
#[derive(Debug, Default)]
struct RecursionDepths {
    includes: Mutex<HashMap<String, usize>>,
    tpl: AtomicUsize,
}

impl RecursionDepths {
    fn includes(&self) -> MutexGuard<'_, HashMap<String, usize>> {
        self.includes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enter_include(&self, name: &str) -> Result<IncludeGuard<'_>, Error> {
        let mut includes = self.includes();
        let depth = includes.entry(name.to_string()).or_insert(0);
        if *depth >= MAX_INCLUDE_DEPTH {
            return Err(Error::new(
                ErrorKind::InvalidOperation,
                format!(
                    "rendering template has a nested reference name: {}: unable to execute template",
                    name
                ),
            ));
        }
        *depth += 1;
        Ok(IncludeGuard {
            depths: self,
            name: name.to_string(),
        })
    }

    fn enter_tpl(&self) -> Result<TplGuard<'_>, Error> {
        let depth = self.tpl.fetch_add(1, Ordering::SeqCst) + 1;
        let guard = TplGuard { depths: self };
        if depth > MAX_TPL_DEPTH {
            return Err(Error::new(
                ErrorKind::InvalidOperation,
                format!(
                    "tpl nesting exceeded {} levels: unable to execute template",
                    MAX_TPL_DEPTH
                ),
            ));
        }
        Ok(guard)
    }
}

struct IncludeGuard<'a> {
    depths: &'a RecursionDepths,
    name: String,
}

impl Drop for IncludeGuard<'_> {
    fn drop(&mut self) {
        let mut includes = self.depths.includes();
        if let Some(depth) = includes.get_mut(&self.name) {
            *depth = depth.saturating_sub(1);
            if *depth == 0 {
                includes.remove(&self.name);
            }
        }
    }
}

struct TplGuard<'a> {
    depths: &'a RecursionDepths,
}

impl Drop for TplGuard<'_> {
    fn drop(&mut self) {
        self.depths.tpl.fetch_sub(1, Ordering::SeqCst);
    }
}

/// `include(name, data)`: render a registered template to a string
///
/// Missing values stay as placeholders in the returned string, so filters
/// applied to it see them. Only `tpl` results and the final output of a
/// template are cleaned.
///
/// Usage: {{ include("web.labels", root) | nindent(4) }}
#[derive(Debug)]
struct Include {
    depths: Arc<RecursionDepths>,
}

impl Object for Include {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn call(self: &Arc<Self>, state: &State<'_, '_>, args: &[Value]) -> Result<Value, Error> {
        let (name, data): (&str, Option<Value>) = from_args(args)?;
        let _guard = self.depths.enter_include(name)?;

        let rendered = stacker::maybe_grow(STACK_RED_ZONE, STACK_GROWTH, || {
            state
                .env()
                .get_template(name)
                .and_then(|template| template.render(Binding::value(data.unwrap_or_default())))
        })
        .map_err(detach)?;
        Ok(Value::from(rendered))
    }
}

/// `tpl(text, data)`: render a string as a template
///
/// The text is compiled in a private copy of the calling namespace: it sees
/// every registered template, and blocks it defines vanish with the copy.
///
/// Usage: {{ tpl(Values.hostTemplate, root) }}
#[derive(Debug)]
struct Tpl {
    strict: bool,
    depths: Arc<RecursionDepths>,
}

impl Object for Tpl {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Plain
    }

    fn call(self: &Arc<Self>, state: &State<'_, '_>, args: &[Value]) -> Result<Value, Error> {
        let (text, data): (String, Option<Value>) = from_args(args)?;
        let _guard = self.depths.enter_tpl()?;

        let mut fork = state.env().clone();
        apply_missing_key_policy(&mut fork, self.strict);

        let name = format!("{} (tpl)", state.name());
        let split = split_blocks(&text).map_err(|err| {
            Error::new(
                ErrorKind::SyntaxError,
                format!("cannot parse template {:?}: {}", text, err),
            )
        })?;
        for block in split.blocks {
            fork.add_template_owned(block.name, block.body)
                .map_err(|err| cannot_parse(&text, err))?;
        }
        fork.add_template_owned(name.clone(), split.body)
            .map_err(|err| cannot_parse(&text, err))?;

        let rendered = stacker::maybe_grow(STACK_RED_ZONE, STACK_GROWTH, || {
            fork.get_template(&name)
                .and_then(|template| template.render(Binding::value(data.unwrap_or_default())))
        })
        .map_err(|err| {
            let inner = detail(&err);
            // a nested tpl already named the innermost text
            if inner.starts_with(TPL_EXEC_ERROR) {
                return detach(err);
            }
            Error::new(
                ErrorKind::InvalidOperation,
                format!("{} {:?}: {}", TPL_EXEC_ERROR, text, inner),
            )
            .with_source(err)
        })?;

        Ok(Value::from(strip_no_value(&rendered)))
    }
}

const TPL_EXEC_ERROR: &str = "error during tpl function execution for";

fn cannot_parse(text: &str, err: Error) -> Error {
    Error::new(
        ErrorKind::SyntaxError,
        format!("cannot parse template {:?}: {}", text, detail(&err)),
    )
    .with_source(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{HostError, NoopHost};
    use crate::registry::configure;
    use serde_json::json;

    struct FixedHost;

    impl HostFunctions for FixedHost {
        fn lookup_kubernetes_resource(
            &self,
            _api_version: &str,
            _kind: &str,
            _namespace: &str,
            _name: &str,
        ) -> Result<serde_json::Value, HostError> {
            Err(HostError::new("secrets are off limits"))
        }

        fn resolve_hostname(&self, _host: &str) -> String {
            "10.0.0.1".to_string()
        }
    }

    fn env_with(options: EngineOptions, host: Arc<dyn HostFunctions>) -> Environment<'static> {
        let mut env = Environment::new();
        configure(&mut env, options.strict);
        register(&mut env, &options, host);
        env
    }

    fn env() -> Environment<'static> {
        env_with(EngineOptions::default(), Arc::new(NoopHost))
    }

    fn lint_env() -> Environment<'static> {
        env_with(
            EngineOptions {
                lint_mode: true,
                ..EngineOptions::default()
            },
            Arc::new(NoopHost),
        )
    }

    #[test]
    fn test_include_renders_to_string() {
        let mut env = env();
        env.add_template_owned("greet", "hi {{ name }}").unwrap();
        let out = env
            .render_str(r#"{{ include("greet", {"name": "web"}) | upper }}"#, ())
            .unwrap();
        assert_eq!(out, "HI WEB");
    }

    #[test]
    fn test_include_bounded_recursion() {
        let mut env = env();
        env.add_template_owned(
            "count",
            "{% if root.n > 0 %}{{ root.n }}{{ include(\"count\", {\"n\": root.n - 1}) }}{% endif %}",
        )
        .unwrap();
        let out = env
            .render_str(r#"{{ include("count", {"n": 5}) }}"#, ())
            .unwrap();
        assert_eq!(out, "54321");
    }

    #[test]
    fn test_include_infinite_recursion_fails() {
        let mut env = env();
        env.add_template_owned("loop", "{{ include(\"loop\", root) }}")
            .unwrap();
        let err = env
            .render_str(r#"{{ include("loop", {}) }}"#, ())
            .unwrap_err();
        assert!(
            detail(&err).contains("nested reference name: loop"),
            "unexpected error: {}",
            err
        );
    }

    #[test]
    fn test_include_depth_released_after_call() {
        let depths = RecursionDepths::default();
        {
            let _a = depths.enter_include("x").unwrap();
            let _b = depths.enter_include("x").unwrap();
            assert_eq!(depths.includes()["x"], 2);
        }
        assert!(depths.includes().is_empty());
    }

    #[test]
    fn test_include_keeps_placeholders() {
        let mut env = env();
        env.add_template_owned("wrapped", "[{{ missing }}]").unwrap();
        let out = env
            .render_str(r#"{{ include("wrapped", {}) | length }}"#, ())
            .unwrap();
        assert_eq!(out, "12");
    }

    #[test]
    fn test_include_unknown_template() {
        let err = env()
            .render_str(r#"{{ include("missing", none) }}"#, ())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TemplateNotFound);
    }

    #[test]
    fn test_tpl_renders_text() {
        let out = env()
            .render_str(r#"{{ tpl("{{ name }}.example.com", {"name": "web"}) }}"#, ())
            .unwrap();
        assert_eq!(out, "web.example.com");
    }

    #[test]
    fn test_tpl_sees_registered_templates() {
        let mut env = env();
        env.add_template_owned("suffix", ".svc").unwrap();
        let out = env
            .render_str(r#"{{ tpl('{{ name }}{{ include("suffix", none) }}', {"name": "db"}) }}"#, ())
            .unwrap();
        assert_eq!(out, "db.svc");
    }

    #[test]
    fn test_tpl_blocks_stay_private() {
        let env = env();
        let out = env
            .render_str(
                r#"{{ tpl('{% define "x" %}X{% enddefine %}{{ include("x", none) }}', none) }}"#,
                (),
            )
            .unwrap();
        assert_eq!(out, "X");

        assert!(env.get_template("x").is_err());
        assert!(env.render_str(r#"{{ include("x", none) }}"#, ()).is_err());
    }

    #[test]
    fn test_tpl_missing_key_policy() {
        let out = env()
            .render_str(r#"[{{ tpl("{{ missing }}", {}) }}]"#, ())
            .unwrap();
        assert_eq!(out, "[]");

        let strict = env_with(
            EngineOptions {
                strict: true,
                ..EngineOptions::default()
            },
            Arc::new(NoopHost),
        );
        let err = strict
            .render_str(r#"{{ tpl("{{ missing }}", {}) }}"#, ())
            .unwrap_err();
        assert!(detail(&err).starts_with("error during tpl function execution for \"{{ missing }}\""));
    }

    #[test]
    fn test_tpl_parse_error() {
        let err = env()
            .render_str(r#"{{ tpl("{{ broken", {}) }}"#, ())
            .unwrap_err();
        assert!(detail(&err).starts_with("cannot parse template \"{{ broken\": "));
    }

    #[test]
    fn test_required() {
        let env = env();
        let out = env
            .render_str(r#"{{ required("need name", name) }}"#, json!({ "name": "web" }))
            .unwrap();
        assert_eq!(out, "web");

        for source in [
            r#"{{ required("msg", none) }}"#,
            r#"{{ required("msg", "") }}"#,
            r#"{{ required("msg", missing) }}"#,
        ] {
            let err = env.render_str(source, ()).unwrap_err();
            assert_eq!(detail(&err), warn_wrap("msg"), "source: {}", source);
        }
    }

    #[test]
    fn test_required_and_fail_in_lint_mode() {
        let env = lint_env();
        let out = env
            .render_str(r#"[{{ required("msg", none) }}][{{ fail("stop") }}]"#, ())
            .unwrap();
        assert_eq!(out, "[][]");
    }

    #[test]
    fn test_fail() {
        let err = env().render_str(r#"{{ fail("stop") }}"#, ()).unwrap_err();
        assert_eq!(detail(&err), warn_wrap("stop"));
    }

    #[test]
    fn test_lookup() {
        let out = env()
            .render_str(r#"{{ lookup("v1", "Secret", "default", "db") | length }}"#, ())
            .unwrap();
        assert_eq!(out, "0");

        let failing = env_with(EngineOptions::default(), Arc::new(FixedHost));
        let err = failing
            .render_str(r#"{{ lookup("v1", "Secret", "default", "db") }}"#, ())
            .unwrap_err();
        assert_eq!(detail(&err), "secrets are off limits");
    }

    #[test]
    fn test_lookup_absent_in_lint_mode() {
        let err = lint_env()
            .render_str(r#"{{ lookup("v1", "Secret", "default", "db") }}"#, ())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownFunction);
    }

    #[test]
    fn test_get_host_by_name() {
        let disabled = env_with(EngineOptions::default(), Arc::new(FixedHost));
        let out = disabled
            .render_str(r#"[{{ getHostByName("example.com") }}]"#, ())
            .unwrap();
        assert_eq!(out, "[]");

        let enabled = env_with(
            EngineOptions {
                enable_dns: true,
                ..EngineOptions::default()
            },
            Arc::new(FixedHost),
        );
        let out = enabled
            .render_str(r#"{{ getHostByName("example.com") }}"#, ())
            .unwrap();
        assert_eq!(out, "10.0.0.1");
    }
}
