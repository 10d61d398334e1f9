//! `cdbm drop` command - Drop every table in the database.

use cdbm_migrate::{SqlFileStepRunner, StepRunner};

use crate::cli::DropArgs;
use crate::commands::Context;
use crate::error::CliResult;
use crate::output;

/// Run the drop command
pub async fn run(args: DropArgs, ctx: Context) -> CliResult<()> {
    if !args.confirm && !output::confirm("Drop every table in the database?") {
        output::note("Aborted, nothing was dropped");
        return Ok(());
    }

    let conn = ctx.connect().await?;
    let dir = ctx.config.migrate.migrations_dir.clone().unwrap_or_default();

    SqlFileStepRunner::new(conn.db, conn.dialect, dir)
        .drop_all()
        .await?;

    output::done("All tables dropped");
    Ok(())
}
