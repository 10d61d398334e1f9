//! `cdbm migrate` command - Move the database to a target version.

use cdbm_migrate::{MigrationConfig, MigrationEngine, MigrationReport};

use crate::cli::MigrateArgs;
use crate::commands::Context;
use crate::config::FILE_PROTOCOL;
use crate::error::{CliError, CliResult};
use crate::output::{self, field};

/// Build the engine configuration from flags layered over the config file.
pub fn migration_config(args: &MigrateArgs, ctx: &Context) -> CliResult<MigrationConfig> {
    let section = &ctx.config.migrate;

    let protocol = args
        .migrations_protocol
        .as_deref()
        .unwrap_or(&section.migrations_protocol);
    if protocol != FILE_PROTOCOL {
        return Err(CliError::config(format!(
            "unsupported migrations protocol '{}' (valid values: {})",
            protocol, FILE_PROTOCOL
        )));
    }

    Ok(MigrationConfig::new()
        .migrations_dir(ctx.migrations_dir(args.migrations_dir.clone())?)
        .target_version(args.target_version.or(section.target_version))
        .rollback_on_failure(args.rollback_on_failure || section.rollback_on_failure)
        .reset_dirty_flag(args.reset_dirty_flag || section.reset_dirty_flag)
        .skip_reset_on_failure(args.skip_reset_on_failure || section.skip_reset_on_failure)
        .table_name(ctx.table_name(args.table_name.clone()))
        .use_transaction(!args.no_transaction && section.use_transaction))
}

/// Run the migrate command
pub async fn run(args: MigrateArgs, ctx: Context) -> CliResult<()> {
    let config = migration_config(&args, &ctx)?;
    let conn = ctx.connect().await?;

    output::banner("migrate");
    field("Database", &conn.label);
    field("Migrations", &config.migrations_dir.display().to_string());
    field(
        "Target",
        &config
            .target_version
            .map_or_else(|| "latest".to_string(), |v| v.to_string()),
    );
    output::blank();

    let logger = ctx.logger();
    let engine = MigrationEngine::for_database(config, conn.db, conn.dialect)?
        .with_logger(logger)
        .with_custom_migrations(ctx.custom);

    match engine.migrate().await {
        Ok(report) => {
            print_report(&report);
            Ok(())
        }
        Err(e) => {
            if e.leaves_dirty() {
                output::caution(
                    "The database is left dirty. Inspect it with 'cdbm status' \
                     and rerun with --reset-dirty-flag.",
                );
            }
            Err(e.into())
        }
    }
}

fn print_report(report: &MigrationReport) {
    if report.is_no_change() {
        output::note("No Change");
        return;
    }

    if let Some(version) = report.corrected_version {
        output::caution(&format!("Reset dirty version {}", version));
    }

    for step in &report.applied {
        output::step(step);
    }

    output::blank();
    output::done(&report.summary());
}
