//! `cdbm logs` command - Print the migration error log.

use crate::commands::Context;
use crate::error::{CliError, CliResult};
use crate::output;

/// Run the logs command
pub async fn run(ctx: Context) -> CliResult<()> {
    let path = ctx.log_file().ok_or_else(|| {
        CliError::config("no log file configured (use --log-file or [logs] log_file)")
    })?;

    if !path.exists() {
        return Err(CliError::config(format!(
            "log file {} does not exist",
            path.display()
        )));
    }

    let content = tokio::fs::read_to_string(&path).await?;
    if content.trim().is_empty() {
        output::note("The log file is empty");
    } else {
        print!("{}", content);
    }

    Ok(())
}
