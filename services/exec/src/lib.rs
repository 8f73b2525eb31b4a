//! Local command execution service.
//!
//! Serves `POST /execute`: unconfirmed requests are echoed back for
//! confirmation, confirmed ones are run through `sh -c` with a timeout.
//! The `bin/exec.rs` binary is a thin wrapper around this library.

pub mod config;
pub mod handlers;
pub mod router;
pub mod state;
