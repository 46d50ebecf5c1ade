//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Values error - an overlay or override could not be applied
pub const VALUES_ERROR: i32 = 2;

/// Render error - the chart could not be rendered
pub const RENDER_ERROR: i32 = 3;

/// Chart error - the chart could not be resolved or loaded
pub const CHART_ERROR: i32 = 4;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;

/// Usage error - invalid arguments or options (following sysexits.h convention)
pub const USAGE_ERROR: i32 = 64;
