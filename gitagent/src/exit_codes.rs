//! Stable exit codes for the `gitagent` binary.

/// The workflow ran (whatever its final session status) or the subcommand succeeded.
pub const OK: i32 = 0;
/// Bad input, configuration or an unexpected failure.
pub const INVALID: i32 = 1;
/// Not inside a git repository.
pub const NOT_A_REPOSITORY: i32 = 2;
/// No identity stored; run `gitagent setup`.
pub const NOT_SET_UP: i32 = 3;
/// The identity holds no active key.
pub const ENTITLEMENT_MISSING: i32 = 4;
/// The entitlement service could not be reached.
pub const ENTITLEMENT_UNAVAILABLE: i32 = 5;
