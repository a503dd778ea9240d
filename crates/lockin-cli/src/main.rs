use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use lockin_core::Command;
use tracing_subscriber::EnvFilter;

use lockin_cli::commands::util::{parse_at, parse_datetime};
use lockin_cli::commands::{report, session, splits, status, tag, tags};
use lockin_cli::state::SessionStore;
use lockin_cli::{Cli, Commands, Config, SessionAction, SplitsAction, TagAction, TagsAction};

/// Load config and open database, ensuring the parent directory exists.
fn open_database(config_path: Option<&Path>) -> Result<(lockin_db::Database, Config)> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    let db = lockin_db::Database::open(&config.database_path).with_context(|| {
        format!("failed to open database {}", config.database_path.display())
    })?;
    Ok((db, config))
}

fn run_session(
    action: &SessionAction,
    config_path: Option<&Path>,
    out: &mut impl Write,
) -> Result<()> {
    let (mut db, config) = open_database(config_path)?;
    let mut store = SessionStore::open(&config.state_path)?;

    let (group, at, command) = match action {
        SessionAction::Start { split, at } => {
            let now = parse_at(at.at.as_deref())?;
            return session::start(out, &mut db, &mut store, *split, config.skip_policy, now);
        }
        SessionAction::Tick(args) => (args.group, &args.at, Command::Tick),
        SessionAction::Pause(args) => (args.group, &args.at, Command::Pause),
        SessionAction::Resume(args) => (args.group, &args.at, Command::Resume),
        SessionAction::Skip(args) => (args.group, &args.at, Command::Skip),
        SessionAction::Stop(args) => (args.group, &args.at, Command::Stop),
    };
    let now = parse_at(at.at.as_deref())?;
    session::run(out, &mut db, &mut store, group, command, now)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Logs go to stderr so stdout stays clean for --json output
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let config_path = cli.config.as_deref();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match &cli.command {
        Some(Commands::Status) => {
            let (db, config) = open_database(config_path)?;
            let store = SessionStore::open(&config.state_path)?;
            status::run(&mut out, &config, &db, &store, chrono::Utc::now())?;
        }
        Some(Commands::Splits(action)) => {
            let (mut db, _config) = open_database(config_path)?;
            match action {
                SplitsAction::List { all, json } => splits::list(&mut out, &db, *all, *json)?,
                SplitsAction::Show { id } => splits::show(&mut out, &db, *id)?,
                SplitsAction::Create {
                    name,
                    description,
                    phases,
                } => splits::create(&mut out, &mut db, name, description.as_deref(), phases)?,
                SplitsAction::Delete { id } => splits::delete(&mut out, &db, *id)?,
            }
        }
        Some(Commands::Tags(action)) => {
            let (mut db, _config) = open_database(config_path)?;
            match action {
                TagsAction::List { all, json } => tags::list(&mut out, &db, *all, *json)?,
                TagsAction::Create { label } => tags::create(&mut out, &mut db, label)?,
                TagsAction::Delete { id } => tags::delete(&mut out, &db, *id)?,
            }
        }
        Some(Commands::Session(action)) => {
            run_session(action, config_path, &mut out)?;
        }
        Some(Commands::Tag(action)) => {
            let (db, _config) = open_database(config_path)?;
            match action {
                TagAction::Attach { group, tag } => tag::attach(&mut out, &db, *group, *tag)?,
                TagAction::Detach { group, tag } => tag::detach(&mut out, &db, *group, *tag)?,
                TagAction::Groups { tag } => tag::groups(&mut out, &db, *tag)?,
            }
        }
        Some(Commands::Report {
            group,
            from,
            to,
            json,
        }) => {
            let (db, _config) = open_database(config_path)?;
            let from = from.as_deref().map(parse_datetime).transpose()?;
            let to = to.as_deref().map(parse_datetime).transpose()?;
            report::run(&mut out, &db, *group, from, to, *json)?;
        }
        None => {
            // No subcommand, show help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}
