//! Output cleanup and error normalization
//!
//! The evaluator reports failures with its own kind prefixes and source
//! chains. Everything leaving the engine goes through here so users only
//! see `file:line` and the final message.

use std::any::Any;
use std::collections::HashMap;
use std::error::Error as _;

use minijinja::Error;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::TemplateError;

/// Text the formatter writes for undefined and null values
pub const NO_VALUE: &str = "<no value>";

const WARN_START: &str = "CHARTKIT_ERR_START";
const WARN_END: &str = "CHARTKIT_ERR_END";

static WARN_MESSAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!("(?s){}(.*){}", WARN_START, WARN_END)).expect("valid regex")
});

/// Remove every placeholder the formatter left behind
pub fn strip_no_value(rendered: &str) -> String {
    rendered.replace(NO_VALUE, "")
}

/// Mark a user message so it survives the evaluator's error wrapping
pub fn warn_wrap(message: &str) -> String {
    format!("{}{}{}", WARN_START, message, WARN_END)
}

/// The delimited user message inside `text`, if any
pub fn unwrap_warning(text: &str) -> Option<&str> {
    WARN_MESSAGE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Error message without kind prefix or location
pub fn detail(err: &Error) -> String {
    err.detail()
        .map(str::to_string)
        .unwrap_or_else(|| err.kind().to_string())
}

/// Copy of `err` without its location
///
/// Errors handed back from a nested render would otherwise keep pointing
/// into the nested template; detached, the evaluator reattaches them to the
/// call site in the calling template.
pub fn detach(err: Error) -> Error {
    let kind = err.kind();
    match err.detail().map(str::to_string) {
        Some(detail) => Error::new(kind, detail).with_source(err),
        None => Error::from(kind).with_source(err),
    }
}

/// `file:line` of an evaluator error
///
/// Named blocks report the file they were defined in.
fn location(err: &Error, origins: &HashMap<String, String>) -> Option<String> {
    let name = err.name()?;
    let line = err.line()?;
    let file = origins.get(name).map(String::as_str).unwrap_or(name);
    Some(format!("{}:{}", file, line))
}

/// Normalize a failure to compile `template`
pub fn parse_error(template: &str, err: &Error, origins: &HashMap<String, String>) -> TemplateError {
    let message = detail(err);
    match location(err, origins) {
        Some(location) => TemplateError::Parse {
            template: template.to_string(),
            location,
            message,
        },
        None => TemplateError::ParseUnlocated {
            template: template.to_string(),
            message,
        },
    }
}

/// Normalize a failure to execute `template`
///
/// A message tunneled through [`warn_wrap`] anywhere in the error chain is
/// surfaced alone.
pub fn exec_error(template: &str, err: &Error, origins: &HashMap<String, String>) -> TemplateError {
    let message = warning_in_chain(err).unwrap_or_else(|| detail(err));
    match location(err, origins) {
        Some(location) => TemplateError::Execution {
            template: template.to_string(),
            location,
            message,
        },
        None => TemplateError::ExecutionUnlocated {
            template: template.to_string(),
            message,
        },
    }
}

fn warning_in_chain(err: &Error) -> Option<String> {
    if let Some(warning) = err.detail().and_then(unwrap_warning) {
        return Some(warning.to_string());
    }
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(warning) = unwrap_warning(&cause.to_string()) {
            return Some(warning.to_string());
        }
        source = cause.source();
    }
    None
}

/// Turn a panic payload caught while executing `template` into a failure
pub fn panic_error(template: &str, payload: &(dyn Any + Send)) -> TemplateError {
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    };
    TemplateError::Panic {
        template: template.to_string(),
        message,
    }
}
