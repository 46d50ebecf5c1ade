//! Helmform Core - the pieces of a Helm release that do not need a cluster
//!
//! This crate provides:
//! - `Values`: the settings tree with deep merge support
//! - `ValueOverride` / `ListOverride`: structured `set`, `set_sensitive` and `set_list` entries
//! - `ValueSources`: layered overlays plus overrides, merged in a fixed order
//! - `cloak`: redaction of sensitive leaves before values are logged or persisted
//! - `ChartReference`: classification of a `chart` + `repository` pair
//! - `LoadedChart`: chart metadata read from a directory or a packaged archive

pub mod archive;
pub mod chart;
pub mod cloak;
pub mod error;
pub mod overrides;
pub mod reference;
pub mod values;

pub use chart::{ChartDependency, ChartFile, ChartMetadata, LoadedChart};
pub use cloak::{SENSITIVE_VALUE, cloak, redact_literals};
pub use error::{CoreError, Result};
pub use overrides::{ListOverride, OverrideKind, PathSegment, ValueOverride, parse_path, typed_value};
pub use reference::{ChartReference, resolve_chart_name};
pub use values::{MergedValues, ValueSources, Values, merge};
