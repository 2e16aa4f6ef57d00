//! Process exit codes for the warden binary. Coarse on purpose: the audit
//! log carries the fine-grained detail, the exit code only needs to tell a
//! process supervisor whether startup ever completed.

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_CONFIG_ERROR: i32 = 2;
pub const EXIT_INFRA_ERROR: i32 = 3;
