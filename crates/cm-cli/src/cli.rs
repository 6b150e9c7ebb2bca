//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use cm_core::EventKind;

/// Classroom session monitor.
///
/// Records student attention events during class sessions, settles each
/// session into per-student focus statistics, and tracks XP progression.
#[derive(Debug, Parser)]
#[command(name = "cm", version, about, long_about = None)]
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
    /// Initialize the database and seed the level table.
    Init,

    /// Manage classes and students.
    Roster {
        #[command(subcommand)]
        action: RosterAction,
    },

    /// Route one attention event and print the resulting notification.
    Ingest {
        /// The session (class) the event belongs to.
        #[arg(long)]
        session: i64,

        /// The reporting student.
        #[arg(long)]
        participant: i64,

        /// Event kind (away, unfocus, focus, restroom, activity).
        #[arg(long)]
        kind: EventKind,

        /// Detection time, ISO 8601; defaults to now.
        #[arg(long)]
        detected_at: Option<String>,

        /// Display name override from the device.
        #[arg(long)]
        name: Option<String>,
    },

    /// Follow a session live: route stdin commands, print broadcasts.
    Monitor {
        /// The session to follow.
        #[arg(long)]
        session: i64,
    },

    /// Settle a session window into per-student focus records.
    Settle {
        #[arg(long)]
        session: i64,

        /// Window start, ISO 8601.
        #[arg(long)]
        start: String,

        /// Window end, ISO 8601.
        #[arg(long)]
        end: String,

        #[arg(long)]
        subject: String,

        /// Period number within the school day.
        #[arg(long)]
        period: i32,

        /// Skip the focus XP award for settled students.
        #[arg(long)]
        no_xp: bool,
    },

    /// Award XP to a student.
    Award {
        #[arg(long)]
        participant: i64,

        /// XP delta; negative values reduce XP.
        #[arg(long, allow_hyphen_values = true)]
        amount: i64,

        #[arg(long)]
        reason: Option<String>,
    },

    /// Show a student's XP summary.
    Xp {
        #[arg(long)]
        participant: i64,
    },

    /// Render focus statistics.
    Report {
        #[command(subcommand)]
        action: ReportAction,
    },

    /// Query the school registry.
    School {
        #[command(subcommand)]
        action: SchoolAction,
    },
}

/// Roster management actions.
#[derive(Debug, Subcommand)]
pub enum RosterAction {
    /// Create a class with a fresh invite code.
    Class { name: String },

    /// Add a student to a class roster.
    Add {
        #[arg(long)]
        class: i64,

        #[arg(long)]
        name: String,

        /// Roster number within the class.
        #[arg(long)]
        number: Option<i32>,

        /// Device UUID bound to the student.
        #[arg(long)]
        device: Option<String>,
    },

    /// Join a class by invite code, as a student device would.
    Join {
        /// Invite code handed out by the teacher.
        #[arg(long)]
        code: String,

        #[arg(long)]
        name: String,

        #[arg(long)]
        number: Option<i32>,

        /// Device UUID bound to the student.
        #[arg(long)]
        device: Option<String>,
    },

    /// List a class roster.
    List {
        #[arg(long)]
        class: i64,
    },
}

/// Report variants.
#[derive(Debug, Subcommand)]
pub enum ReportAction {
    /// One student's settled periods for a date.
    Day {
        #[arg(long)]
        participant: i64,

        /// Date, YYYY-MM-DD.
        #[arg(long)]
        date: String,
    },

    /// Seven-day focus trend starting at a date.
    Week {
        #[arg(long)]
        participant: i64,

        /// First day of the range, YYYY-MM-DD.
        #[arg(long)]
        start: String,
    },

    /// Per-day averages for a month, for the focus heatmap.
    Month {
        #[arg(long)]
        participant: i64,

        /// Any day inside the month, YYYY-MM-DD.
        #[arg(long)]
        month: String,
    },

    /// Per-subject averages for a month.
    Subject {
        #[arg(long)]
        participant: i64,

        /// Any day inside the month, YYYY-MM-DD.
        #[arg(long)]
        month: String,
    },
}

/// School registry lookups.
#[derive(Debug, Subcommand)]
pub enum SchoolAction {
    /// Search schools by name.
    Search { name: String },

    /// Fetch one school day's timetable.
    Timetable {
        /// Regional education office code.
        #[arg(long)]
        office: String,

        /// School code.
        #[arg(long)]
        school: String,

        /// Date, YYYY-MM-DD.
        #[arg(long)]
        date: String,
    },
}
