//! Docdesk CLI
//!
//! Command-line client for the docdesk admin API.
//!
//! # Usage
//!
//! ```bash
//! # Sign in (the refresh cookie is kept in the OS keyring)
//! DOCDESK_PASSWORD=secret docdesk login --username alice
//!
//! # Who am I?
//! docdesk whoami
//!
//! # List users of one organization as JSON
//! docdesk --format json users --organization 7d1e9b52-8c3a-4f6e-b0d2-1a9c8e7f6d5b
//!
//! # Any other endpoint
//! docdesk get admin/roles
//! ```

mod commands;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docdesk_client::{ClientConfig, DocdeskClient, PageQuery};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use output::OutputFormat;

#[derive(Parser)]
#[command(name = "docdesk")]
#[command(about = "Command-line client for the docdesk admin API")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to config.toml (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with a username and password
    Login {
        #[arg(short, long)]
        username: String,

        /// Password (prefer DOCDESK_PASSWORD over the command line)
        #[arg(short, long, env = "DOCDESK_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Sign out and forget the saved session
    Logout,

    /// Show the signed-in user
    Whoami,

    /// List users
    Users {
        #[arg(long, default_value_t = 1)]
        page: u32,

        #[arg(long, default_value_t = 10)]
        page_size: u32,

        /// Only users of this organization
        #[arg(long)]
        organization: Option<Uuid>,
    },

    /// List organizations
    Organizations {
        #[arg(long, default_value_t = 1)]
        page: u32,

        #[arg(long, default_value_t = 10)]
        page_size: u32,
    },

    /// GET an API path and print the JSON response
    Get {
        /// Path under the API root (e.g., admin/roles)
        path: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if commands::is_session_expired(&e) => {
            debug!(error = %e, "session expired");
            eprintln!("{}", commands::SESSION_EXPIRED);
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config =
        ClientConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    init_logging(if cli.verbose { "debug" } else { &config.log_level });
    debug!(base_url = %config.base_url, vault = ?config.vault, "configuration loaded");

    let client = DocdeskClient::from_config(&config).context("failed to create client")?;
    client.on_session_terminated(|error| {
        warn!(error = %error, "session terminated");
    });

    let mut out = std::io::stdout();
    match cli.command {
        Commands::Login { username, password } => {
            commands::login(&client, &username, password.as_deref(), cli.format, &mut out).await
        }
        Commands::Logout => commands::logout(&client, &mut out).await,
        Commands::Whoami => commands::whoami(&client, cli.format, &mut out).await,
        Commands::Users {
            page,
            page_size,
            organization,
        } => {
            let query = PageQuery::new(page, page_size);
            commands::users(&client, &query, organization, cli.format, &mut out).await
        }
        Commands::Organizations { page, page_size } => {
            let query = PageQuery::new(page, page_size);
            commands::organizations(&client, &query, cli.format, &mut out).await
        }
        Commands::Get { path } => commands::get(&client, &path, &mut out).await,
    }
}

/// Log to stderr. `RUST_LOG` wins over the configured level.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["docdesk", "users", "--page", "3", "--format", "json"]).unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        match cli.command {
            Commands::Users { page, page_size, .. } => {
                assert_eq!(page, 3);
                assert_eq!(page_size, 10);
            }
            _ => panic!("expected users"),
        }
    }

    #[test]
    fn test_rejects_bad_organization_id() {
        assert!(Cli::try_parse_from(["docdesk", "users", "--organization", "acme"]).is_err());
    }
}
