//! Stable process exit codes.

/// Run finished with a success or warning verdict.
pub const OK: i32 = 0;
/// Run was aborted by the delete threshold or a step failed.
pub const FAILED: i32 = 1;
/// Config file or logging could not be set up; nothing was run.
pub const CONFIG: i32 = 2;
