//! PawHaven - command-line client for the PawHaven pet adoption platform.
//!
//! Signs in against the PawHaven API, keeps the session on disk (or in the
//! OS keyring) and shows the protected profile area. `pawhaven watch` mounts
//! the session monitor and offers renewal before the session runs out.

mod commands;
mod watch;

use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pawhaven_core::{ClientConfig, StorageKind};

// ============================================================================
// Constants
// ============================================================================

/// Log file name prefix inside the data directory
const LOG_FILE_PREFIX: &str = "pawhaven.log";

#[derive(Parser, Debug)]
#[command(name = "pawhaven", version, about = "PawHaven pet adoption client")]
struct Cli {
    /// Also write logs to a daily file in the data directory
    #[arg(long, global = true)]
    log_file: bool,

    /// Where to keep the session: file, keyring or memory
    #[arg(long, global = true)]
    storage: Option<StorageKind>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and store the session
    Login {
        #[arg(long)]
        email: Option<String>,
    },
    /// Create an account and sign in
    Register {
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    /// Confirm an email address with the code sent after registration
    Verify {
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        code: Option<String>,
    },
    /// Remove the stored session
    Logout,
    /// Request a password reset code by email
    ForgotPassword {
        #[arg(long)]
        email: Option<String>,
    },
    /// Set a new password using the emailed code
    ResetPassword {
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        code: Option<String>,
    },
    /// Show the stored session and time remaining
    Status,
    /// Show your profile and pets (requires a session)
    Profile,
    /// Keep the session under watch and offer renewal before it expires
    Watch {
        /// Renew automatically instead of asking
        #[arg(long)]
        auto_renew: bool,
    },
}

/// Initialize the tracing subscriber for logging.
///
/// The returned guard flushes the file writer and must outlive the program.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let mut config = ClientConfig::load().context("Failed to load configuration")?;
    if let Some(storage) = cli.storage {
        config.storage = storage;
    }

    let log_dir = if cli.log_file {
        let dir = config.data_dir()?;
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        Some(dir)
    } else {
        None
    };
    let _log_guard = init_tracing(log_dir.as_deref());
    info!(api_url = %config.api_url, storage = ?config.storage, "PawHaven starting");

    let ctx = commands::Context::new(config)?;
    match cli.command {
        Command::Login { email } => commands::login(ctx, email).await,
        Command::Register { username, email } => commands::register(ctx, username, email).await,
        Command::Verify { email, code } => commands::verify(ctx, email, code).await,
        Command::Logout => commands::logout(ctx),
        Command::ForgotPassword { email } => commands::forgot_password(ctx, email).await,
        Command::ResetPassword { email, code } => {
            commands::reset_password(ctx, email, code).await
        }
        Command::Status => commands::status(ctx),
        Command::Profile => commands::profile(ctx).await,
        Command::Watch { auto_renew } => watch::run(ctx, auto_renew).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["pawhaven", "watch", "--auto-renew", "--storage", "memory"])
            .unwrap();
        assert_eq!(cli.storage, Some(StorageKind::Memory));
        assert!(matches!(cli.command, Command::Watch { auto_renew: true }));
    }

    #[test]
    fn test_cli_rejects_unknown_storage() {
        assert!(Cli::try_parse_from(["pawhaven", "status", "--storage", "floppy"]).is_err());
    }

    #[test]
    fn test_cli_login_email() {
        let cli = Cli::try_parse_from(["pawhaven", "login", "--email", "ana@example.com"]).unwrap();
        match cli.command {
            Command::Login { email } => assert_eq!(email.as_deref(), Some("ana@example.com")),
            other => panic!("unexpected command {:?}", other),
        }
    }
}
