use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Keeps test cases synchronized with discovered requirements")]
pub struct Cli {
    /// Path to the configuration file (defaults to ~/.testsync.config)
    #[clap(long, short = 'c')]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Discover requirements and synchronize one subject
    Sync {
        /// Subject name, e.g. "dashboard"
        subject: String,
    },

    /// Synchronize every known subject
    SyncAll,

    /// Run requirements discovery for a subject without synchronizing
    Discover {
        /// Subject name
        subject: String,
    },

    /// Show the version history of a subject
    History {
        /// Subject name
        subject: String,
    },

    /// Export a subject's current test cases
    Export {
        /// Subject name
        subject: String,

        /// Output format: csv or markdown
        #[clap(long, default_value = "markdown")]
        format: String,

        /// Output file path (defaults to <subject>-test-cases.<ext>)
        #[clap(long)]
        output: Option<PathBuf>,
    },

    /// Learn or refresh the project's pattern rules
    Learn {
        /// Relearn even when a fresh cache exists
        #[clap(long)]
        force: bool,
    },

    /// Configuration management
    Config(ConfigCommand),
}

#[derive(Parser, Debug)]
pub struct ConfigCommand {
    #[clap(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the active configuration
    Show,

    /// Write a default configuration file if none exists
    Init,
}
