//! CLI entry point for Ember.

pub mod auth;
pub mod launch;

use clap::{Parser, Subcommand};

/// Ember launcher CLI
#[derive(Parser, Debug)]
#[command(name = "ember", version, about = "Ember — launcher core CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Account management
    Auth(AuthArgs),
    /// Launch a game client
    Launch(LaunchArgs),
}

/// Arguments for the `auth` subcommand group.
#[derive(Parser, Debug)]
pub struct AuthArgs {
    #[command(subcommand)]
    pub command: AuthCommands,
}

/// Auth subcommands for login, status, and logout.
#[derive(Subcommand, Debug)]
pub enum AuthCommands {
    /// Sign in with a device code
    Login,
    /// Show sign-in status
    Status,
    /// Remove stored credentials
    Logout,
}

/// Arguments for the `launch` subcommand.
#[derive(Parser, Debug)]
pub struct LaunchArgs {
    /// Server to launch against
    #[arg(short, long)]
    pub server: String,

    /// Memory budget in MB
    #[arg(short, long, default_value = "4096")]
    pub memory_mb: u32,
}
