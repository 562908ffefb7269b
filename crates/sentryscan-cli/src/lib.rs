//! SentryScan CLI library — argument parsing and subcommand plumbing;
//! `main.rs` is a thin entry point over this.

pub mod args;
pub mod serve_cmd;
pub mod scan_cmd;

pub use args::{Cli, Command};
