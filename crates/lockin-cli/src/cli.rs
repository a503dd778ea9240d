//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use lockin_core::{GroupId, SplitId, TagId};

/// Work/break interval timer.
///
/// Runs sessions through time splits (ordered cycles of work and break
/// phases) and records every finished phase in a timesheet.
#[derive(Debug, Parser)]
#[command(name = "lockin", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show the database location and active sessions.
    Status,

    /// Manage time split templates.
    #[command(subcommand)]
    Splits(SplitsAction),

    /// Manage tag labels.
    #[command(subcommand)]
    Tags(TagsAction),

    /// Drive a timer session.
    #[command(subcommand)]
    Session(SessionAction),

    /// Link tags to timesheet groups.
    #[command(subcommand)]
    Tag(TagAction),

    /// Show a timesheet group's entries and totals.
    Report {
        /// Timesheet group to report on.
        group: GroupId,

        /// Only entries starting at or after this time.
        #[arg(long)]
        from: Option<String>,

        /// Only entries ending before this time.
        #[arg(long)]
        to: Option<String>,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
}

/// Time split subcommands.
#[derive(Debug, Subcommand)]
pub enum SplitsAction {
    /// List selectable splits.
    List {
        /// Include deleted splits.
        #[arg(long)]
        all: bool,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show one split with its phases.
    Show { id: SplitId },

    /// Create a split.
    Create {
        name: String,

        #[arg(long)]
        description: Option<String>,

        /// A phase as NAME=DURATION[:work|:break], e.g. "Work=25m" or "Rest=5m:break".
        /// Repeat in running order.
        #[arg(long = "phase", required = true)]
        phases: Vec<String>,
    },

    /// Soft-delete a split. Past sessions keep referring to it.
    Delete { id: SplitId },
}

/// Tag catalog subcommands.
#[derive(Debug, Subcommand)]
pub enum TagsAction {
    /// List tags.
    List {
        /// Include deleted tags.
        #[arg(long)]
        all: bool,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Create a tag.
    Create { label: String },

    /// Soft-delete a tag.
    Delete { id: TagId },
}

/// Session subcommands.
#[derive(Debug, Subcommand)]
pub enum SessionAction {
    /// Open a new timesheet group for a split and start its first phase.
    Start {
        split: SplitId,

        #[command(flatten)]
        at: AtArg,
    },

    /// Record every phase that has finished by now.
    Tick(GroupArgs),

    /// Suspend the current phase.
    Pause(GroupArgs),

    /// Continue a paused phase.
    Resume(GroupArgs),

    /// End the current phase early and move to the next one.
    Skip(GroupArgs),

    /// End the session, recording the partial phase.
    Stop(GroupArgs),
}

/// Target group and command time.
#[derive(Debug, Args)]
pub struct GroupArgs {
    pub group: GroupId,

    #[command(flatten)]
    pub at: AtArg,
}

#[derive(Debug, Args)]
pub struct AtArg {
    /// When the command happens: RFC 3339 or relative ("5 minutes ago").
    /// Defaults to now.
    #[arg(long)]
    pub at: Option<String>,
}

/// Tag index subcommands.
#[derive(Debug, Subcommand)]
pub enum TagAction {
    /// Attach a tag to a timesheet group.
    Attach { group: GroupId, tag: TagId },

    /// Detach a tag from a timesheet group.
    Detach { group: GroupId, tag: TagId },

    /// List the timesheet groups carrying a tag.
    Groups { tag: TagId },
}
