//! Stable exit codes for caseflow CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Command failed due to invalid layout/config/case or other errors.
pub const INVALID: i32 = 1;
/// The proposed update or status transition was rejected; the case is unchanged.
pub const REJECTED: i32 = 2;
/// The turn was applied and an escalation is recommended.
pub const ESCALATION: i32 = 3;
