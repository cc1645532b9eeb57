//! chartkit engine - chart template scoping and rendering on MiniJinja
//!
//! This crate renders a chart tree into one text document per template:
//! - Per-chart scopes: a sub-chart sees only its section of the values
//! - One shared namespace per render pass, parsed in a fixed order
//! - `include` and `tpl` with bounded recursion, `required`, `fail`,
//!   `lookup` and `getHostByName` backed by host collaborators
//! - Normalized `parse error at (file:line)` / `execution error at
//!   (file:line)` diagnostics, with every failure of a pass collected
//!
//! ```no_run
//! use chartkit_core::{Capabilities, Chart, ReleaseOptions, Values, to_render_values};
//! use chartkit_engine::Engine;
//!
//! let chart = Chart::named("web")
//!     .with_template("templates/service.yaml", "name: {{ Release.Name }}-{{ Chart.Name }}");
//! let values = to_render_values(
//!     &chart,
//!     &Values::new(),
//!     &ReleaseOptions::for_install("prod", "default"),
//!     &Capabilities::default(),
//! );
//! let manifests = Engine::builder().build().render(&chart, &values).into_result()?;
//! # Ok::<(), chartkit_engine::EngineError>(())
//! ```

pub mod blocks;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod files_object;
pub mod filters;
pub mod functions;
pub mod host;
pub mod registry;
pub mod scope;
pub mod walker;

pub use engine::{Engine, EngineBuilder, EngineOptions, RenderOutput};
pub use error::{EngineError, RenderReport, Result, TemplateError};
pub use files_object::FilesObject;
pub use host::{HostError, HostFunctions, NoopHost};
pub use registry::{Namespace, sort_templates};
pub use scope::{Scope, ScopeObject, TemplateInfo};
pub use walker::{Renderable, derive_templates};
