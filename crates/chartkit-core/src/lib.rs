//! chartkit core - data model for chart template rendering
//!
//! This crate provides the types the engine walks and renders:
//! - `Values`: value tables with dotted-path lookup and deep merge
//! - `Chart`: a chart node with its templates, files and sub-charts
//! - `Files`: the non-template files bundled with a chart
//! - `context`: construction of the top-level render values
//! - `json`: number-preserving decoding and encoding of value trees

pub mod chart;
pub mod context;
pub mod error;
pub mod files;
pub mod json;
pub mod values;

pub use chart::{Chart, ChartMetadata, ChartType, TemplateSource, is_partial};
pub use context::{Capabilities, KubeVersion, ReleaseOptions, coalesce_values, to_render_values};
pub use error::{CoreError, Result};
pub use files::Files;
pub use json::{Lossless, Native};
pub use values::{Values, is_table, join_path, parse_path};
