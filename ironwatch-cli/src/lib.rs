//! Ironwatch operator CLI.
//!
//! Reads the same `ironwatch.toml` as the daemon and works directly on its
//! SQLite database and status snapshot, so every command also works while
//! the daemon is stopped.

pub mod cli;
pub mod commands;
pub mod error;
pub mod output;
