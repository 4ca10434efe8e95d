//! Process exit codes.

/// Successful operation.
pub const EXIT_SUCCESS: i32 = 0;

/// The daemon refused: its policy denied the request or the operator did
/// not approve it.
pub const EXIT_DENIED: i32 = 1;

/// Any other error (configuration, I/O, bad input, daemon unreachable).
pub const EXIT_ERROR: i32 = 2;
