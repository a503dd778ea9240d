//! Time-split timer CLI library.
//!
//! This crate provides the CLI interface for the timer.

mod cli;
pub mod commands;
mod config;
pub mod state;

pub use cli::{
    AtArg, Cli, Commands, GroupArgs, SessionAction, SplitsAction, TagAction, TagsAction,
};
pub use config::Config;
