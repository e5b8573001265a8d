//! CLI command definitions and subcommands

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use settingsstore::APP_DIR_NAME;
use tracing::debug;

/// gtt-sidebar - widget host for a desktop sidebar
#[derive(Parser)]
#[command(
    name = "sb",
    about = "Widget host for a persistent desktop sidebar",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the host and print widget panels on every tick
    Run {
        /// Stop after this many master ticks (runs until Ctrl-C otherwise)
        #[arg(short, long)]
        ticks: Option<u64>,
    },

    /// List available widgets in layout order
    Widgets,

    /// Inspect or reset the settings document
    Settings {
        #[command(subcommand)]
        command: SettingsCommand,
    },

    /// Manage launcher shortcuts
    Shortcuts {
        #[command(subcommand)]
        command: ShortcutsCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum SettingsCommand {
    /// Print the current settings
    Show {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Print where documents are stored
    Path,

    /// Back up the settings document and restore defaults
    Reset,

    /// Copy the settings document to a timestamped backup
    Backup,
}

#[derive(Debug, Subcommand)]
pub enum ShortcutsCommand {
    /// List shortcuts in display order
    List,

    /// Add a shortcut
    Add {
        /// Display label
        label: String,

        /// Executable, URL or command line
        path: String,

        /// Icon glyph shown before the label
        #[arg(short, long, default_value = "")]
        icon: String,
    },

    /// Remove a shortcut by id
    Remove {
        /// Shortcut id as printed by `list`
        id: String,
    },
}

/// Output format for `settings show`
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Yaml,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            _ => Err(format!("Unknown format: {}. Use: text, json, or yaml", s)),
        }
    }
}

/// Get the log file path
pub fn get_log_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
        .join("logs")
        .join("sidebar.log")
}
