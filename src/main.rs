//! Ember CLI binary entry point.

use clap::Parser;
use ember::cli::{AuthCommands, Cli, Commands};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Auth(auth_args) => match auth_args.command {
            AuthCommands::Login => ember::cli::auth::handle_login().await,
            AuthCommands::Status => ember::cli::auth::handle_status().await,
            AuthCommands::Logout => ember::cli::auth::handle_logout().await,
        },
        Commands::Launch(launch_args) => ember::cli::launch::handle_launch(launch_args).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
