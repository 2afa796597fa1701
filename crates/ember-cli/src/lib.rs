//! Ember command-line front end
//!
//! The binary is a thin shell over these modules so the commands can be
//! driven from integration tests.

pub mod app;
pub mod commands;
pub mod output;

use ember_compiler::RuntimeError;

/// Process exit status for a failed command: 2 when the program itself
/// trapped while running, 1 for everything else
pub fn exit_code(err: &anyhow::Error) -> i32 {
    if err.chain().any(|cause| cause.is::<RuntimeError>()) {
        2
    } else {
        1
    }
}
