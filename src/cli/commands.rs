//! CLI command definitions

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "frith")]
#[command(about = "Access control and group policy for a nostr relay", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database URL
    #[arg(long, env = "DATABASE_URL", global = true)]
    pub database_url: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database schema
    Init,

    /// Manage the ban lists
    ///
    /// Examples:
    ///   frith ban pubkey <hex> --reason spam
    ///   frith ban remove event <id>
    Ban {
        #[command(subcommand)]
        command: BanCommands,
    },

    /// Inspect groups
    Group {
        #[command(subcommand)]
        command: GroupCommands,
    },

    /// Issue an invite code
    Invite {
        /// Pubkey the invite is issued on behalf of
        #[arg(long, required = true)]
        issuer: String,
    },

    /// Create groups for chat traffic that predates group events
    Migrate,

    /// Print every stored event as a JSON line
    Export,
}

#[derive(Subcommand)]
pub enum BanCommands {
    /// Ban a pubkey
    Pubkey {
        subject: String,

        #[arg(long, default_value = "")]
        reason: String,
    },

    /// Ban an event (also deletes it)
    Event {
        subject: String,

        #[arg(long, default_value = "")]
        reason: String,
    },

    /// Lift a ban
    Remove {
        #[arg(value_enum)]
        target: BanTarget,

        subject: String,
    },

    /// List all bans
    List,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum BanTarget {
    Pubkey,
    Event,
}

#[derive(Subcommand)]
pub enum GroupCommands {
    /// List all groups
    List,

    /// Show group details
    Show {
        /// Group id
        id: String,
    },

    /// List current group members
    Members {
        /// Group id
        id: String,
    },
}
