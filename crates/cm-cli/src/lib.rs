//! Classroom monitor CLI library.
//!
//! Exposes the command definitions and configuration so integration tests
//! and the binary share one implementation.

pub mod cli;
pub mod commands;
pub mod config;

pub use cli::{Cli, Commands, ReportAction, RosterAction, SchoolAction};
pub use config::Config;
