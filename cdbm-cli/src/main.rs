//! cdbm - command-line database migration tool.

use clap::Parser;

use cdbm_cli::cli::Cli;
use cdbm_cli::{logging, output};
use cdbm_migrate::CustomMigrations;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.global.verbose);

    if let Err(e) = cdbm_cli::run(cli, CustomMigrations::new()).await {
        output::blank();
        output::failure(&e.to_string());
        std::process::exit(1);
    }
}
