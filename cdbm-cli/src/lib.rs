//! cdbm - command-line interface for versioned database migrations.
//!
//! The binary ships without custom migrations. Projects that need code
//! migrations build their own binary around [`run`]:
//!
//! ```rust,ignore
//! use cdbm_cli::cli::Cli;
//! use cdbm_migrate::CustomMigrations;
//! use clap::Parser;
//!
//! #[tokio::main]
//! async fn main() {
//!     let custom = CustomMigrations::new().with(4, my_app::backfill_emails());
//!     if let Err(e) = cdbm_cli::run(Cli::parse(), custom).await {
//!         cdbm_cli::output::failure(&e.to_string());
//!         std::process::exit(1);
//!     }
//! }
//! ```

use cdbm_migrate::CustomMigrations;

pub mod cli;
pub mod commands;
pub mod config;
pub mod connect;
pub mod error;
pub mod logging;
pub mod output;

use cli::{Cli, Command};
use commands::Context;
use error::CliResult;

/// Dispatch a parsed command line.
pub async fn run(cli: Cli, custom: CustomMigrations) -> CliResult<()> {
    if let Command::Version = cli.command {
        return commands::version::run().await;
    }

    let ctx = Context::load(cli.global)?.with_custom_migrations(custom);

    match cli.command {
        Command::Migrate(args) => commands::migrate::run(args, ctx).await,
        Command::Status(args) => commands::status::run(args, ctx).await,
        Command::Drop(args) => commands::drop::run(args, ctx).await,
        Command::Force(args) => commands::force::run(args, ctx).await,
        Command::Logs => commands::logs::run(ctx).await,
        Command::Version => commands::version::run().await,
    }
}
