#![allow(dead_code)]
#[macro_use]
mod console;
#[macro_use]
mod errors;
mod command;
mod repl;
mod sql;
mod storage;

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use storage::table::Table;

const VERSION: &str = env!("CARGO_PKG_VERSION");

const EXIT_FAILURE: i32 = 1;

#[derive(Parser)]
#[command(
    name = "tiny-rdb",
    version = VERSION,
    about = "Tiny single-table relational database with a persistent B+tree index."
)]
struct Cli {
    /// Path to the database file.
    file: PathBuf,

    /// Execute a single statement and exit.
    #[arg(short, long)]
    command: Option<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let table = match Table::open(&cli.file) {
        Ok(table) => table,
        Err(e) => {
            error!("Unable to open DB file: {}", e);
            std::process::exit(EXIT_FAILURE);
        }
    };

    if let Some(statement) = cli.command {
        run_once(table, statement.trim());
        return;
    }

    if let Err(e) = repl::start(table) {
        error!("Error: {}", e);
        std::process::exit(EXIT_FAILURE);
    }
}

/// Execute a single statement passed via `--command`, then close.
fn run_once(mut table: Table, input: &str) {
    if let Err(e) = command::run_statement(&mut table, input) {
        error!("Error: {}", e);
        std::process::exit(EXIT_FAILURE);
    }
    if let Err(e) = table.close() {
        error!("Error: {}", e);
        std::process::exit(EXIT_FAILURE);
    }
}
