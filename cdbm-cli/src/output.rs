//! Terminal rendering for cdbm commands.
//!
//! Results go to stdout, failures to stderr. Colour never splits a message,
//! so the plain text of every line stays greppable.

use std::io::{self, BufRead, Write};

use cdbm_migrate::{AppliedStep, MigrationDirection, SchemaState};
use owo_colors::OwoColorize;

/// Width of the key column printed by [`field`].
const FIELD_WIDTH: usize = 11;

/// `cdbm <command>` title line.
pub fn banner(command: &str) {
    let title = format!("cdbm {command}");
    println!("{}", title.bold());
    println!("{}", "=".repeat(title.len()).dimmed());
}

/// Aligned `key value` line under a banner.
pub fn field(key: &str, value: &str) {
    let key = format!("{key:<FIELD_WIDTH$}");
    println!("  {} {}", key.dimmed(), value);
}

/// One applied migration step, e.g. `^ Up file migration 3`.
pub fn step(step: &AppliedStep) {
    let marker = match step.direction {
        MigrationDirection::Down => "v".magenta().to_string(),
        _ => "^".cyan().to_string(),
    };
    println!(
        "  {} {} {} migration {}",
        marker, step.direction, step.kind, step.version
    );
}

/// Schema state, coloured by cleanliness.
pub fn state(state: &SchemaState) {
    let text = state.to_string();
    match state {
        SchemaState::NoEntry => println!("{}", text.dimmed()),
        SchemaState::Clean { .. } => println!("{}", text.green()),
        SchemaState::Dirty { .. } => println!("{}", text.red()),
    }
}

/// The command finished and changed something.
pub fn done(text: &str) {
    println!("{} {}", "ok".green().bold(), text.green());
}

/// Neutral outcome, such as "No Change".
pub fn note(text: &str) {
    println!("{} {}", "--".blue().bold(), text);
}

/// Something the operator should look at.
pub fn caution(text: &str) {
    println!("{} {}", "!!".yellow().bold(), text.yellow());
}

/// Command failure, on stderr.
pub fn failure(text: &str) {
    eprintln!("{} {}", "error:".red().bold(), text.red());
}

/// Unstyled text, for JSON and log contents.
pub fn raw(text: &str) {
    println!("{text}");
}

/// Empty line.
pub fn blank() {
    println!();
}

/// Ask a yes/no question on stdin; anything but `y`/`yes` is no.
pub fn confirm(question: &str) -> bool {
    print!("{} {} ", question, "[y/N]".dimmed());
    if io::stdout().flush().is_err() {
        return false;
    }

    let mut answer = String::new();
    match io::stdin().lock().read_line(&mut answer) {
        Ok(_) => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
        Err(_) => false,
    }
}
