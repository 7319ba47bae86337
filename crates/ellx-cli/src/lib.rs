//! Ellx CLI - Key management and request signing from the shell
//!
//! Mints keys, signatures and `Authorization` header values accepted by
//! `ellx-daemon`, and checks signatures produced elsewhere.

pub mod commands;

pub use commands::*;
