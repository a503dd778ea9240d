//! CLI subcommand implementations.

pub mod report;
pub mod session;
pub mod splits;
pub mod status;
pub mod tag;
pub mod tags;
pub mod util;
