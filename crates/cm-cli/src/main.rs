use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cm_cli::commands::{award, ingest, init, monitor, report, roster, school, settle};
use cm_cli::{Cli, Commands, Config, ReportAction, RosterAction, SchoolAction};
use cm_core::SessionId;

/// Load config and open the database, ensuring the parent directory exists.
fn open_database(config_path: Option<&Path>) -> Result<(Arc<cm_db::Database>, Config)> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    let db = cm_db::Database::open(&config.database_path).context("failed to open database")?;
    Ok((Arc::new(db), config))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    match &cli.command {
        Some(Commands::Init) => {
            let (db, config) = open_database(cli.config.as_deref())?;
            init::run(&db, &config.database_path)?;
        }
        Some(Commands::Roster { action }) => {
            let (db, _config) = open_database(cli.config.as_deref())?;
            match action {
                RosterAction::Class { name } => roster::create_class(&db, name)?,
                RosterAction::Add {
                    class,
                    name,
                    number,
                    device,
                } => roster::add_student(&db, *class, name, *number, device.as_deref())?,
                RosterAction::Join {
                    code,
                    name,
                    number,
                    device,
                } => roster::join(&db, code, name, *number, device.as_deref())?,
                RosterAction::List { class } => roster::list(&db, *class)?,
            }
        }
        Some(Commands::Ingest {
            session,
            participant,
            kind,
            detected_at,
            name,
        }) => {
            let (db, _config) = open_database(cli.config.as_deref())?;
            ingest::run(
                &db,
                *session,
                *participant,
                *kind,
                detected_at.as_deref(),
                name.clone(),
            )?;
        }
        Some(Commands::Monitor { session }) => {
            let (db, _config) = open_database(cli.config.as_deref())?;
            monitor::run(&db, SessionId::new(*session))?;
        }
        Some(Commands::Settle {
            session,
            start,
            end,
            subject,
            period,
            no_xp,
        }) => {
            let (db, _config) = open_database(cli.config.as_deref())?;
            settle::run(&db, *session, start, end, subject, *period, *no_xp)?;
        }
        Some(Commands::Award {
            participant,
            amount,
            reason,
        }) => {
            let (db, _config) = open_database(cli.config.as_deref())?;
            award::run(&db, *participant, *amount, reason.as_deref())?;
        }
        Some(Commands::Xp { participant }) => {
            let (db, _config) = open_database(cli.config.as_deref())?;
            award::summary(&db, *participant)?;
        }
        Some(Commands::Report { action }) => {
            let (db, _config) = open_database(cli.config.as_deref())?;
            match action {
                ReportAction::Day { participant, date } => {
                    report::day(&db, *participant, date)?;
                }
                ReportAction::Week { participant, start } => {
                    report::week(&db, *participant, start)?;
                }
                ReportAction::Month { participant, month } => {
                    report::month(&db, *participant, month)?;
                }
                ReportAction::Subject { participant, month } => {
                    report::subject(&db, *participant, month)?;
                }
            }
        }
        Some(Commands::School { action }) => {
            let config = Config::load_from(cli.config.as_deref())
                .context("failed to load configuration")?;
            match action {
                SchoolAction::Search { name } => school::search(&config, name)?,
                SchoolAction::Timetable {
                    office,
                    school: school_code,
                    date,
                } => school::timetable(&config, office, school_code, date)?,
            }
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
