use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use memo_core::export::ExportFormat as CoreExportFormat;
use memo_core::view::SortMode;

#[derive(Parser)]
#[command(name = "memo")]
#[command(about = "Quick categorized notes with optional cloud sync")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional path to the shared remote database
    #[arg(long, global = true, value_name = "PATH")]
    pub remote_path: Option<PathBuf>,

    /// Category for quick capture
    #[arg(short, long, default_value = "idea")]
    pub category: String,

    /// Quick capture: memo "my thought here"
    #[arg(trailing_var_arg = true)]
    pub note: Vec<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new note
    #[command(alias = "new")]
    Add {
        /// Category key
        #[arg(short, long, default_value = "idea")]
        category: String,
        /// Note text
        text: Vec<String>,
    },
    /// List notes
    #[command(alias = "ls")]
    List {
        /// Sort mode (defaults to the configured one)
        #[arg(short, long, value_enum)]
        sort: Option<SortArg>,
        /// Only notes in this category
        #[arg(long)]
        category: Option<String>,
        /// Hide completed notes
        #[arg(long)]
        hide_completed: bool,
        /// Show completed notes even when hidden by config
        #[arg(long, conflicts_with = "hide_completed")]
        show_completed: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit a note's text (opens $EDITOR when no text is given)
    Edit {
        /// Note ID or unique ID prefix
        id: String,
        /// Replacement text
        text: Vec<String>,
    },
    /// Toggle a note's completed flag
    Done {
        /// Note ID or unique ID prefix
        id: String,
    },
    /// Delete a note
    #[command(alias = "rm")]
    Delete {
        /// Note ID or unique ID prefix
        id: String,
    },
    /// Move a note to another category
    Move {
        /// Note ID or unique ID prefix
        id: String,
        /// Target category key
        category: String,
    },
    /// Copy a note into another category
    Copy {
        /// Note ID or unique ID prefix
        id: String,
        /// Target category key
        category: String,
    },
    /// Change a note's position in the manual order
    Reorder {
        /// Note ID or unique ID prefix
        id: String,
        /// New zero-based position
        position: usize,
    },
    /// Manage categories
    Category {
        #[command(subcommand)]
        command: CategoryCommands,
    },
    /// Export notes
    Export {
        /// Export format
        #[arg(long, value_enum, default_value_t = ExportFormat::Json)]
        format: ExportFormat,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Replace all notes and categories with an export file
    Import {
        /// JSON export file
        path: PathBuf,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Reconcile with the remote store
    Sync {
        #[command(subcommand)]
        command: Option<SyncCommands>,
        #[command(flatten)]
        volume: VolumeArgs,
    },
    /// Show or change configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Sign in or out
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ExportFormat {
    Json,
    Markdown,
}

impl From<ExportFormat> for CoreExportFormat {
    fn from(format: ExportFormat) -> Self {
        match format {
            ExportFormat::Json => Self::Json,
            ExportFormat::Markdown => Self::Markdown,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum SortArg {
    Manual,
    Newest,
    Oldest,
    Category,
}

impl From<SortArg> for SortMode {
    fn from(sort: SortArg) -> Self {
        match sort {
            SortArg::Manual => Self::Manual,
            SortArg::Newest => Self::Newest,
            SortArg::Oldest => Self::Oldest,
            SortArg::Category => Self::Category,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

/// Answers to the large-local-set question, given up front.
#[derive(clap::Args, Clone, Copy, Debug, Default)]
pub struct VolumeArgs {
    /// Replace remote notes with local notes if the local set is much larger
    #[arg(long, global = true, conflicts_with = "merge")]
    pub overwrite_remote: bool,
    /// Merge even if the local set is much larger than the remote one
    #[arg(long, global = true)]
    pub merge: bool,
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Merge local notes with the remote store (default)
    Save,
    /// Discard local state and reload everything from the remote store
    Reload,
}

#[derive(Subcommand)]
pub enum CategoryCommands {
    /// List categories in display order
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create a category
    Add {
        name: String,
        #[arg(long, default_value = "📁")]
        icon: String,
        #[arg(long, default_value = "gray")]
        color: String,
    },
    /// Rename or restyle a category
    Update {
        key: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        icon: Option<String>,
        #[arg(long)]
        color: Option<String>,
    },
    /// Remove a category (its notes keep the key)
    Remove { key: String },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Set a configuration value
    Set { key: String, value: String },
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Sign in and reconcile with the remote store
    Login {
        /// Account identifier
        #[arg(long, value_name = "ID")]
        user: String,
        /// Optional email shown in status output
        #[arg(long, value_name = "EMAIL")]
        email: Option<String>,
        #[command(flatten)]
        volume: VolumeArgs,
    },
    /// Show the signed-in identity and sync state
    Status,
    /// Sign out; local notes are kept
    Logout,
}
