//! MiniJinja integration for the chart's bundled files
//!
//! The bundle is exposed unopened as `Files`, with Helm's accessors:
//!
//! ```jinja2
//! {# Read a file as string #}
//! {{ Files.Get("config/nginx.conf") }}
//!
//! {# Iterate over files matching a pattern #}
//! {% for path, content in Files.Glob("config/*.yaml") | items %}
//!   {{ path }}: {{ content | b64enc }}
//! {% endfor %}
//!
//! {# Embed a directory as ConfigMap data #}
//! data:
//!   {{- Files.Glob("config/*").AsConfig() | nindent(2) }}
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use base64::Engine as _;
use chartkit_core::Files;
use chartkit_core::files::base_name;
use minijinja::value::{Enumerator, Object, ObjectRepr, Value};
use minijinja::{Error, ErrorKind, State};

/// MiniJinja object wrapping a [`Files`] bundle
///
/// Behaves as a mapping of path to content for iteration, and answers the
/// Helm accessor methods.
#[derive(Debug)]
pub struct FilesObject {
    files: Arc<Files>,
}

impl FilesObject {
    pub fn new(files: Arc<Files>) -> Self {
        Self { files }
    }

    /// YAML mapping of base name to content, empty for an empty bundle
    pub fn as_config(&self) -> Result<String, Error> {
        self.to_yaml_map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    /// Like [`as_config`](Self::as_config) with base64 encoded content
    pub fn as_secrets(&self) -> Result<String, Error> {
        self.to_yaml_map(|bytes| base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    fn to_yaml_map(&self, encode: impl Fn(&[u8]) -> String) -> Result<String, Error> {
        if self.files.is_empty() {
            return Ok(String::new());
        }
        let map: BTreeMap<&str, String> = self
            .files
            .iter()
            .map(|(path, bytes)| (base_name(path), encode(bytes)))
            .collect();
        let yaml = serde_yaml::to_string(&map)
            .map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))?;
        Ok(yaml.trim_end_matches('\n').to_string())
    }
}

impl Object for FilesObject {
    fn repr(self: &Arc<Self>) -> ObjectRepr {
        ObjectRepr::Map
    }

    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        let path = key.as_str()?;
        self.files.exists(path).then(|| Value::from(self.files.get_string(path)))
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator {
        Enumerator::Values(self.files.iter().map(|(path, _)| Value::from(path)).collect())
    }

    fn call_method(
        self: &Arc<Self>,
        _state: &State,
        method: &str,
        args: &[Value],
    ) -> Result<Value, Error> {
        match method {
            "Get" => {
                let path = get_str_arg(args, method)?;
                Ok(Value::from(self.files.get_string(path)))
            }

            "GetBytes" => {
                let path = get_str_arg(args, method)?;
                let bytes = self.files.get_bytes(path).unwrap_or_default();
                Ok(Value::from_bytes(bytes.to_vec()))
            }

            "Glob" => {
                let pattern = get_str_arg(args, method)?;
                let matched = self
                    .files
                    .glob(pattern)
                    .map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))?;
                Ok(Value::from_object(FilesObject::new(Arc::new(matched))))
            }

            "Lines" => {
                let path = get_str_arg(args, method)?;
                Ok(Value::from(self.files.lines(path)))
            }

            "AsConfig" => self.as_config().map(Value::from),

            "AsSecrets" => self.as_secrets().map(Value::from),

            _ => Err(Error::new(
                ErrorKind::UnknownMethod,
                format!(
                    "Files has no method '{}'. Available methods: Get, GetBytes, Glob, Lines, AsConfig, AsSecrets",
                    method
                ),
            )),
        }
    }
}

/// Helper to extract the string argument of a method call
fn get_str_arg<'a>(args: &'a [Value], method_name: &str) -> Result<&'a str, Error> {
    args.first().and_then(|v| v.as_str()).ok_or_else(|| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("Files.{}() requires a string argument", method_name),
        )
    })
}

/// Wrap a bundle as a template value
pub fn create_files_value(files: Arc<Files>) -> Value {
    Value::from_object(FilesObject::new(files))
}
