//! `cdbm force` command - Record a version without running migrations.

use cdbm_migrate::{MigrationConfig, MigrationEngine};

use crate::cli::ForceArgs;
use crate::commands::Context;
use crate::error::CliResult;
use crate::output;

/// Run the force command
pub async fn run(args: ForceArgs, ctx: Context) -> CliResult<()> {
    let config = MigrationConfig::new()
        .migrations_dir(ctx.migrations_dir(args.migrations_dir)?)
        .table_name(ctx.table_name(args.table_name));
    let conn = ctx.connect().await?;

    let engine = MigrationEngine::for_database(config, conn.db, conn.dialect)?
        .with_custom_migrations(ctx.custom);
    let state = engine.force(args.version).await?;

    output::done(&format!("Forced version {}", args.version));
    output::state(&state);
    Ok(())
}
