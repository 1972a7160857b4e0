//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Not found - the extension or version does not exist or is incompatible
pub const NOT_FOUND: i32 = 2;

/// Configuration error - unreadable or invalid configuration file
pub const CONFIG_ERROR: i32 = 3;

/// Network error - registry unreachable or too slow
pub const NETWORK_ERROR: i32 = 4;

/// IO error - file not writable, permission denied, etc.
pub const IO_ERROR: i32 = 5;

/// Usage error - invalid arguments or options (following sysexits.h convention)
pub const USAGE_ERROR: i32 = 64;

/// Interrupted by the user (128 + SIGINT)
pub const CANCELLED: i32 = 130;
