//! `cdbm version` command - Display version information.

use crate::error::CliResult;
use crate::output::{self, field};

/// Package version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Run the version command
pub async fn run() -> CliResult<()> {
    output::banner("version");

    field("Version", VERSION);

    #[cfg(debug_assertions)]
    let build_mode = "debug";
    #[cfg(not(debug_assertions))]
    let build_mode = "release";

    field("Build", build_mode);
    field("Protocols", "postgres, cockroachdb, sqlite");
    field("Sources", crate::config::FILE_PROTOCOL);

    Ok(())
}
