//! Operator command line

mod commands;

pub use commands::{BanCommands, BanTarget, Cli, Commands, GroupCommands};
