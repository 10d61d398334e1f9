//! Integration tests for the cdbm CLI

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Get the cdbm binary
#[allow(deprecated)]
fn cdbm_cmd() -> Command {
    let mut cmd = Command::cargo_bin("cdbm").unwrap();
    cmd.env_remove("CDBM_CONFIG")
        .env_remove("CDBM_PASSWORD")
        .env_remove("RUST_LOG");
    cmd
}

/// A project directory with three migrations and a SQLite database path.
struct Project {
    dir: TempDir,
}

impl Project {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let migrations = dir.path().join("migrations");
        fs::create_dir(&migrations).unwrap();

        for (version, table) in [(1, "users"), (2, "posts"), (3, "comments")] {
            fs::write(
                migrations.join(format!("{:06}_create_{}.up.sql", version, table)),
                format!("CREATE TABLE {} (id INTEGER PRIMARY KEY);", table),
            )
            .unwrap();
            fs::write(
                migrations.join(format!("{:06}_create_{}.down.sql", version, table)),
                format!("DROP TABLE {};", table),
            )
            .unwrap();
        }

        Self { dir }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn migrations(&self) -> PathBuf {
        self.path().join("migrations")
    }

    fn database(&self) -> String {
        self.path().join("app.db").display().to_string()
    }

    /// `cdbm --db-protocol sqlite --database <db> <args>`
    fn cmd(&self, args: &[&str]) -> Command {
        let mut cmd = cdbm_cmd();
        cmd.current_dir(self.path())
            .args(["--db-protocol", "sqlite", "--database", &self.database()])
            .args(args);
        cmd
    }

    fn migrate(&self, extra: &[&str]) -> Command {
        let migrations = self.migrations().display().to_string();
        let mut args = vec!["migrate", "-m", migrations.as_str()];
        args.extend_from_slice(extra);
        self.cmd(&args)
    }
}

#[test]
fn test_help_command() {
    cdbm_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: cdbm"))
        .stdout(predicate::str::contains("migrate"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("force"))
        .stdout(predicate::str::contains("drop"))
        .stdout(predicate::str::contains("logs"));
}

#[test]
fn test_migrate_help() {
    cdbm_cmd()
        .args(["migrate", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--target-version"))
        .stdout(predicate::str::contains("--rollback-on-failure"))
        .stdout(predicate::str::contains("--reset-dirty-flag"))
        .stdout(predicate::str::contains("--skip-reset-on-failure"));
}

#[test]
fn test_version_command() {
    cdbm_cmd()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("cdbm version"))
        .stdout(predicate::str::contains("Version"))
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_protocol_is_required() {
    let project = Project::new();
    cdbm_cmd()
        .current_dir(project.path())
        .args(["migrate", "-m", "migrations"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--db-protocol is required"));
}

#[test]
fn test_migrations_dir_is_required() {
    let project = Project::new();
    project
        .cmd(&["migrate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--migrations-dir is required"));
}

#[test]
fn test_unsupported_migrations_protocol() {
    let project = Project::new();
    project
        .migrate(&["-p", "s3://bucket"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("valid values: file://"));
}

#[test]
fn test_migrate_status_round_trip() {
    let project = Project::new();

    project
        .cmd(&["status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No migration entry"));

    project
        .migrate(&[])
        .assert()
        .success()
        .stdout(predicate::str::contains("cdbm migrate"))
        .stdout(predicate::str::contains("Up file migration 1"))
        .stdout(predicate::str::contains("3 applied Up (0 -> 3)"));

    project
        .migrate(&[])
        .assert()
        .success()
        .stdout(predicate::str::contains("No Change"));

    project
        .cmd(&["status"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "migration state - version:3 / dirty:false / dirty state:",
        ));

    project
        .migrate(&["-t", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 applied Down (3 -> 1)"));

    project
        .cmd(&["status", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"state\": \"clean\""))
        .stdout(predicate::str::contains("\"version\": 1"));
}

#[test]
fn test_target_version_not_found() {
    let project = Project::new();
    project
        .migrate(&["-t", "7"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "target version 7 does not exist (latest version is 3)",
        ));
}

#[test]
fn test_removed_migration_files_are_reported() {
    let project = Project::new();
    project.migrate(&[]).assert().success();

    for name in ["000003_create_comments.up.sql", "000003_create_comments.down.sql"] {
        fs::remove_file(project.migrations().join(name)).unwrap();
    }

    project
        .migrate(&[])
        .assert()
        .failure()
        .stdout(predicate::str::contains("No Change").not())
        .stderr(predicate::str::contains(
            "database is at version 3 but the latest migration is 2",
        ));

    project
        .cmd(&["status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("version:3 / dirty:false"));
}

#[test]
fn test_failure_marks_dirty_and_is_logged() {
    let project = Project::new();
    fs::write(
        project.migrations().join("000002_create_posts.up.sql"),
        "CREATE TABLE posts (id INTEGER PRIMARY KEY);\nINSERT INTO nowhere VALUES (1);",
    )
    .unwrap();
    let log_file = project.path().join("logs").join("cdbm.log");
    let log_arg = log_file.display().to_string();

    project
        .migrate(&["--log-file", &log_arg])
        .assert()
        .failure()
        .stderr(predicate::str::contains("file migration 2 failed going Up"));

    project
        .cmd(&["status"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "migration state - version:2 / dirty:true / dirty state:Up",
        ));

    project
        .migrate(&[])
        .assert()
        .failure()
        .stderr(predicate::str::contains("must set --reset-dirty-flag"));

    project
        .cmd(&["logs", "--log-file", &log_arg])
        .assert()
        .success()
        .stdout(predicate::str::contains("file migration 2 failed going Up"));
}

#[test]
fn test_rollback_on_failure() {
    let project = Project::new();
    fs::write(
        project.migrations().join("000003_create_comments.up.sql"),
        "SELECT * FROM nowhere;",
    )
    .unwrap();

    project
        .migrate(&["-f"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "but successfully rolled back to version: '0'",
        ));

    project
        .cmd(&["status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No migration entry"));
}

#[test]
fn test_reset_dirty_flag_resumes() {
    let project = Project::new();
    let bad = project.migrations().join("000002_create_posts.up.sql");
    fs::write(&bad, "INSERT INTO nowhere VALUES (1);").unwrap();

    project.migrate(&[]).assert().failure();

    fs::write(&bad, "CREATE TABLE posts (id INTEGER PRIMARY KEY);").unwrap();
    // The down-step of version 2 drops a table that was never created.
    fs::write(
        project.migrations().join("000002_create_posts.down.sql"),
        "DROP TABLE IF EXISTS posts;",
    )
    .unwrap();

    project
        .migrate(&["-r"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Reset dirty version 2"))
        .stdout(predicate::str::contains("(2 -> 3)"));
}

#[test]
fn test_force_and_drop() {
    let project = Project::new();
    let migrations = project.migrations().display().to_string();

    project
        .cmd(&["force", "2", "-m", &migrations])
        .assert()
        .success()
        .stdout(predicate::str::contains("Forced version 2"));

    project
        .cmd(&["status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("version:2 / dirty:false"));

    project
        .cmd(&["drop", "--confirm"])
        .assert()
        .success()
        .stdout(predicate::str::contains("All tables dropped"));

    project
        .cmd(&["status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No migration entry"));
}

#[test]
fn test_drop_declined() {
    let project = Project::new();
    project
        .cmd(&["drop"])
        .write_stdin("n\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("nothing was dropped"));
}

#[test]
fn test_config_file_connections() {
    let project = Project::new();
    fs::write(
        project.path().join("cdbm.toml"),
        format!(
            "db_protocol = \"sqlite\"\n\n\
             [migrate]\nmigrations_dir = \"migrations\"\n\n\
             [[connections]]\nname = \"broken\"\ndatabase = \"{}\"\n\n\
             [[connections]]\nname = \"local\"\ndatabase = \"{}\"\n",
            project.path().join("no").join("such").join("dir.db").display(),
            project.database()
        ),
    )
    .unwrap();

    cdbm_cmd()
        .current_dir(project.path())
        .arg("migrate")
        .assert()
        .success()
        .stdout(predicate::str::contains("local"))
        .stdout(predicate::str::contains("3 applied Up"));
}

#[test]
fn test_no_connection_configured() {
    let project = Project::new();
    cdbm_cmd()
        .current_dir(project.path())
        .args(["--db-protocol", "postgres", "status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "no connection to database was established",
        ));
}

#[test]
fn test_logs_without_log_file() {
    let project = Project::new();
    cdbm_cmd()
        .current_dir(project.path())
        .arg("logs")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no log file configured"));
}
