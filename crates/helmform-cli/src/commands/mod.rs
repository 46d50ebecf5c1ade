//! CLI command implementations

pub mod manifest;
pub mod resolve;
pub mod template;
pub mod values;
