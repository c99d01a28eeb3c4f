//! Stable exit codes for the `mender` binary.

/// The run completed. Failed actions are reported in the summary, not here.
pub const OK: i32 = 0;
/// Backend unavailable, invalid config or another setup error.
pub const FATAL: i32 = 1;
