//! Helm helper filters
//!
//! These extend MiniJinja with the conversions and string helpers charts
//! rely on. Conversion helpers are registered both as filters
//! (`{{ Values.config | toYaml }}`) and as plain functions
//! (`{{ toYaml(Values.config) }}`).

use base64::Engine as _;
use chartkit_core::{Lossless, Native};
use minijinja::value::{Rest, ValueKind};
use minijinja::{Environment, Error, ErrorKind, Value};
use serde_json::{Map, Value as JsonValue};

/// Register every helper on an environment
pub fn register(env: &mut Environment<'static>) {
    env.add_filter("toYaml", to_yaml);
    env.add_filter("fromYaml", from_yaml);
    env.add_filter("toJson", to_json);
    env.add_filter("fromJson", from_json);
    env.add_function("toYaml", to_yaml);
    env.add_function("fromYaml", from_yaml);
    env.add_function("toJson", to_json);
    env.add_function("fromJson", from_json);

    env.add_filter("quote", quote);
    env.add_filter("squote", squote);
    env.add_filter("indent", indent);
    env.add_filter("nindent", nindent);
    env.add_filter("b64enc", b64enc);
    env.add_filter("b64dec", b64dec);
    env.add_filter("trunc", trunc);
    env.add_filter("trimPrefix", trim_prefix);
    env.add_filter("trimSuffix", trim_suffix);
    env.add_filter("sha256sum", sha256sum);

    env.add_function("list", list);
    env.add_function("printf", printf);
}

fn to_json_value(value: &Value) -> Result<JsonValue, Error> {
    serde_json::to_value(value).map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))
}

/// Mapping carrying a conversion failure under `Error`, as Helm does
fn error_table(message: String) -> Value {
    let mut table = Map::new();
    table.insert("Error".to_string(), JsonValue::String(message));
    Value::from_serialize(Native(&JsonValue::Object(table)))
}

/// Convert a value to YAML, without the trailing newline
///
/// Usage: {{ Values.config | toYaml }}
///
/// A value that cannot be serialized renders as an empty string.
pub fn to_yaml(value: Value) -> String {
    let Ok(json) = to_json_value(&value) else {
        return String::new();
    };
    match serde_yaml::to_string(&Native(&json)) {
        Ok(yaml) => yaml.trim_end_matches('\n').to_string(),
        Err(_) => String::new(),
    }
}

/// Parse a YAML document into a mapping
///
/// Usage: {{ (Files.Get("config.yaml") | fromYaml).port }}
pub fn from_yaml(text: String) -> Value {
    match serde_yaml::from_str::<Lossless>(&text) {
        Ok(Lossless(JsonValue::Null)) => Value::from_serialize(Native(&JsonValue::Object(Map::new()))),
        Ok(Lossless(json)) => Value::from_serialize(Native(&json)),
        Err(e) => error_table(e.to_string()),
    }
}

/// Convert a value to compact JSON
///
/// Usage: {{ Values.config | toJson }}
pub fn to_json(value: Value) -> String {
    to_json_value(&value)
        .and_then(|json| {
            serde_json::to_string(&json)
                .map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))
        })
        .unwrap_or_default()
}

/// Parse a JSON document
pub fn from_json(text: String) -> Value {
    match serde_json::from_str::<JsonValue>(&text) {
        Ok(json) => Value::from_serialize(Native(&json)),
        Err(e) => error_table(e.to_string()),
    }
}

fn plain_string(value: &Value) -> Option<String> {
    if value.is_undefined() || value.is_none() {
        None
    } else {
        Some(text_of(value))
    }
}

/// Display text of a value, with booleans spelled `true`/`false`
fn text_of(value: &Value) -> String {
    match value.kind() {
        ValueKind::Bool => value.is_true().to_string(),
        _ => value
            .as_str()
            .map_or_else(|| value.to_string(), str::to_string),
    }
}

/// Quote a string with double quotes; nothing for a missing value
///
/// Usage: {{ Values.name | quote }}
#[must_use]
pub fn quote(value: Value) -> String {
    match plain_string(&value) {
        Some(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
        None => String::new(),
    }
}

/// Quote a string with single quotes
#[must_use]
pub fn squote(value: Value) -> String {
    match plain_string(&value) {
        Some(s) => format!("'{}'", s),
        None => String::new(),
    }
}

/// Prefix every line with `spaces` spaces
///
/// Usage: {{ include("labels", root) | indent(4) }}
pub fn indent(value: String, spaces: usize) -> String {
    let pad = " ".repeat(spaces);
    let mut result = String::with_capacity(value.len() + pad.len() * (value.matches('\n').count() + 1));
    result.push_str(&pad);
    result.push_str(&value.replace('\n', &format!("\n{}", pad)));
    result
}

/// Like `indent`, starting on a new line
pub fn nindent(value: String, spaces: usize) -> String {
    format!("\n{}", indent(value, spaces))
}

#[must_use]
pub fn b64enc(value: String) -> String {
    base64::engine::general_purpose::STANDARD.encode(value.as_bytes())
}

pub fn b64dec(value: String) -> Result<String, Error> {
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(value.as_bytes())
        .map_err(|e| {
            Error::new(
                ErrorKind::InvalidOperation,
                format!("base64 decode error: {}", e),
            )
        })?;

    String::from_utf8(decoded).map_err(|e| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("UTF-8 decode error: {}", e),
        )
    })
}

/// Truncate to `length` characters; a negative length keeps the tail
///
/// Usage: {{ name | trunc(63) }}
pub fn trunc(value: String, length: i64) -> String {
    let count = value.chars().count();
    let limit = length.unsigned_abs() as usize;
    if count <= limit {
        return value;
    }
    if length >= 0 {
        value.chars().take(limit).collect()
    } else {
        value.chars().skip(count - limit).collect()
    }
}

/// Usage: {{ Chart.Version | trimPrefix("v") }}
pub fn trim_prefix(value: String, prefix: String) -> String {
    value.strip_prefix(&prefix).unwrap_or(&value).to_string()
}

pub fn trim_suffix(value: String, suffix: String) -> String {
    value.strip_suffix(&suffix).unwrap_or(&value).to_string()
}

/// SHA256 hash of a string, hex encoded
///
/// Usage: {{ include("config", root) | sha256sum }}
pub fn sha256sum(value: String) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Build a list from the arguments
///
/// Usage: {{ list("a", "b") }}
pub fn list(args: Rest<Value>) -> Value {
    Value::from(args.0)
}

/// Printf-style formatting
///
/// Usage: {{ printf("%s-%d", name, count) }}
///
/// Supports format specifiers: %s, %d, %v, %q, %%
pub fn printf(format: String, args: Rest<Value>) -> Result<String, Error> {
    let mut result = String::with_capacity(format.len() + args.len() * 10);
    let mut chars = format.chars();
    let mut args = args.iter();

    while let Some(c) = chars.next() {
        if c != '%' {
            result.push(c);
            continue;
        }

        let format_char = match chars.next() {
            Some('%') => {
                result.push('%');
                continue;
            }
            Some(fc) => fc,
            None => {
                result.push('%');
                break;
            }
        };

        let arg = args.next().ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidOperation,
                "not enough arguments for format string",
            )
        })?;

        match format_char {
            'q' => result.push_str(&quote(arg.clone())),
            'd' => match arg.as_i64() {
                Some(n) => result.push_str(&n.to_string()),
                None => result.push_str(&arg.to_string()),
            },
            _ => result.push_str(&text_of(arg)),
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use minijinja::context;

    #[test]
    fn test_to_yaml() {
        let value = Value::from_serialize(Native(&serde_json::json!({
            "name": "web",
            "ports": [80, 443]
        })));
        insta::assert_snapshot!(to_yaml(value), @r"
        name: web
        ports:
        - 80
        - 443
        ");
    }

    #[test]
    fn test_from_yaml_error_key() {
        let parsed = from_yaml("a: [".to_string());
        assert!(parsed.get_attr("Error").unwrap().as_str().is_some());

        let parsed = from_yaml("port: 8080".to_string());
        assert_eq!(parsed.get_attr("port").unwrap().as_i64(), Some(8080));
    }

    #[test]
    fn test_json_round() {
        let value = from_json(r#"{"a": 1}"#.to_string());
        assert_eq!(to_json(value), r#"{"a":1}"#);
        assert!(from_json("{".to_string()).get_attr("Error").unwrap().as_str().is_some());
    }

    #[test]
    fn test_quote() {
        assert_eq!(quote(Value::from("hello")), "\"hello\"");
        assert_eq!(quote(Value::from("say \"hi\"")), "\"say \\\"hi\\\"\"");
        assert_eq!(quote(Value::from(42)), "\"42\"");
        assert_eq!(quote(Value::from(())), "");
        assert_eq!(quote(Value::from(true)), "\"true\"");
        assert_eq!(squote(Value::from("hello")), "'hello'");
    }

    #[test]
    fn test_indent_every_line() {
        assert_eq!(indent("a\nb".to_string(), 2), "  a\n  b");
        assert_eq!(indent("a\n\nb".to_string(), 2), "  a\n  \n  b");
        assert_eq!(nindent("a: 1".to_string(), 4), "\n    a: 1");
    }

    #[test]
    fn test_b64() {
        assert_eq!(b64enc("hello".to_string()), "aGVsbG8=");
        assert_eq!(b64dec("aGVsbG8=".to_string()).unwrap(), "hello");
        assert!(b64dec("!!".to_string()).is_err());
    }

    #[test]
    fn test_trunc() {
        assert_eq!(trunc("hello world".to_string(), 5), "hello");
        assert_eq!(trunc("hello world".to_string(), -5), "world");
        assert_eq!(trunc("hi".to_string(), 10), "hi");
    }

    #[test]
    fn test_trim() {
        assert_eq!(trim_prefix("v1.2.3".to_string(), "v".to_string()), "1.2.3");
        assert_eq!(trim_suffix("app.yaml".to_string(), ".yaml".to_string()), "app");
    }

    #[test]
    fn test_sha256sum() {
        assert_eq!(
            sha256sum("hello".to_string()),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_printf() {
        let result = printf(
            "%s-%d %q 100%%".to_string(),
            Rest(vec![Value::from("web"), Value::from(3), Value::from("x")]),
        )
        .unwrap();
        assert_eq!(result, "web-3 \"x\" 100%");
        let flag = printf("on=%v".to_string(), Rest(vec![Value::from(false)])).unwrap();
        assert_eq!(flag, "on=false");
        assert!(printf("%s".to_string(), Rest(vec![])).is_err());
    }

    #[test]
    fn test_registered_in_environment() {
        let mut env = Environment::new();
        register(&mut env);
        let out = env
            .render_str(
                "{{ cfg | toYaml | nindent(2) }}|{{ toJson(list(1, 2)) }}",
                context! { cfg => context! { a => 1 } },
            )
            .unwrap();
        assert_eq!(out, "\n  a: 1|[1,2]");
    }
}
