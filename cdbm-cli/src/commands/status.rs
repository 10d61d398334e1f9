//! `cdbm status` command - Show the recorded schema state.

use cdbm_migrate::{SchemaState, SqlSchemaStateStore};

use crate::cli::StatusArgs;
use crate::commands::Context;
use crate::error::CliResult;
use crate::output;

/// Run the status command
///
/// Read-only: a missing tracking table is reported as no entry and is not
/// created.
pub async fn run(args: StatusArgs, ctx: Context) -> CliResult<()> {
    let conn = ctx.connect().await?;
    let store = SqlSchemaStateStore::new(conn.db, conn.dialect)
        .with_table(ctx.table_name(args.table_name))?;

    let state = match store.probe().await {
        Ok(()) => store.read().await?,
        Err(e) if e.is_not_found() => SchemaState::NoEntry,
        Err(e) => return Err(e.into()),
    };

    if args.json {
        output::raw(&serde_json::to_string_pretty(&state)?);
    } else {
        output::state(&state);
    }

    Ok(())
}
