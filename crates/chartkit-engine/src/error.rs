//! Engine error types

use chartkit_core::CoreError;
use indexmap::IndexMap;
use miette::Diagnostic;
use std::fmt;
use thiserror::Error;

/// Main engine error type
#[derive(Error, Debug, Diagnostic)]
pub enum EngineError {
    /// A template failed to parse; nothing was executed
    #[error(transparent)]
    #[diagnostic(transparent)]
    Template(#[from] TemplateError),

    /// One or more templates failed to execute
    #[error("{0}")]
    #[diagnostic(code(chartkit::render))]
    Render(RenderReport),

    #[error(transparent)]
    #[diagnostic(code(chartkit::core))]
    Core(#[from] CoreError),
}

impl EngineError {
    /// Every template failure carried by this error, in processing order
    pub fn template_errors(&self) -> Vec<&TemplateError> {
        match self {
            Self::Template(err) => vec![err],
            Self::Render(report) => report.errors().collect(),
            Self::Core(_) => Vec::new(),
        }
    }
}

/// A normalized, user-facing template failure
///
/// Locations are `file:line`; evaluator-internal prefixes never survive
/// into the message.
#[derive(Error, Debug, Diagnostic, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("parse error at ({location}): {message}")]
    #[diagnostic(code(chartkit::template::parse))]
    Parse {
        template: String,
        location: String,
        message: String,
    },

    #[error("parse error in ({template}): {message}")]
    #[diagnostic(code(chartkit::template::parse))]
    ParseUnlocated { template: String, message: String },

    #[error("execution error at ({location}): {message}")]
    #[diagnostic(code(chartkit::template::execution))]
    Execution {
        template: String,
        location: String,
        message: String,
    },

    #[error("execution error in ({template}): {message}")]
    #[diagnostic(code(chartkit::template::execution))]
    ExecutionUnlocated { template: String, message: String },

    /// A panic caught at the execution boundary
    #[error("rendering template failed: {message}")]
    #[diagnostic(code(chartkit::template::panic))]
    Panic { template: String, message: String },
}

impl TemplateError {
    /// Path of the template being parsed or executed
    pub fn template(&self) -> &str {
        match self {
            Self::Parse { template, .. }
            | Self::ParseUnlocated { template, .. }
            | Self::Execution { template, .. }
            | Self::ExecutionUnlocated { template, .. }
            | Self::Panic { template, .. } => template,
        }
    }

    /// The final message, without location or prefix
    pub fn message(&self) -> &str {
        match self {
            Self::Parse { message, .. }
            | Self::ParseUnlocated { message, .. }
            | Self::Execution { message, .. }
            | Self::ExecutionUnlocated { message, .. }
            | Self::Panic { message, .. } => message,
        }
    }

    /// `file:line` where the failure was detected, if known
    pub fn location(&self) -> Option<&str> {
        match self {
            Self::Parse { location, .. } | Self::Execution { location, .. } => Some(location),
            _ => None,
        }
    }

    pub fn is_parse(&self) -> bool {
        matches!(self, Self::Parse { .. } | Self::ParseUnlocated { .. })
    }
}

/// A collection of errors from rendering multiple templates
#[derive(Debug, Default, Clone)]
pub struct RenderReport {
    /// Errors grouped by template file (IndexMap preserves insertion order)
    pub errors_by_template: IndexMap<String, Vec<TemplateError>>,

    /// Successfully rendered templates
    pub successful_templates: Vec<String>,

    /// Total error count
    pub total_errors: usize,
}

impl RenderReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an error for a specific template
    pub fn add_error(&mut self, template_name: String, error: TemplateError) {
        self.errors_by_template
            .entry(template_name)
            .or_default()
            .push(error);
        self.total_errors += 1;
    }

    /// Mark a template as successfully rendered
    pub fn add_success(&mut self, template_name: String) {
        self.successful_templates.push(template_name);
    }

    pub fn has_errors(&self) -> bool {
        self.total_errors > 0
    }

    /// Get count of templates with errors
    pub fn templates_with_errors(&self) -> usize {
        self.errors_by_template.len()
    }

    /// All errors, in the order they were recorded
    pub fn errors(&self) -> impl Iterator<Item = &TemplateError> {
        self.errors_by_template.values().flatten()
    }

    /// Generate summary message: "5 errors in 3 templates"
    pub fn summary(&self) -> String {
        let template_word = if self.templates_with_errors() == 1 {
            "template"
        } else {
            "templates"
        };
        let error_word = if self.total_errors == 1 {
            "error"
        } else {
            "errors"
        };
        format!(
            "{} {} in {} {}",
            self.total_errors,
            error_word,
            self.templates_with_errors(),
            template_word
        )
    }
}

impl fmt::Display for RenderReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.errors().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{}", error)?;
        }
        Ok(())
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
