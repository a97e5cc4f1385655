/// The REPL (Read-Eval-Print-Loop) module.
use std::fs::OpenOptions;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::command::{self, RawCommandResult};
use crate::console;
use crate::errors::Error;
use crate::storage::table::Table;

const NAME: &str = env!("CARGO_PKG_NAME");

/// Run the interactive loop until `#exit`, `#quit` or end of input, then
/// close the table.
pub fn start(mut table: Table) -> Result<(), Error> {
    let history_path = history_file();
    if let Some(path) = &history_path {
        let history = read_history(path);
        info!(entries = history.len(), "Loaded command history");
    }

    let stdin = io::stdin();
    let mut input = String::new();

    loop {
        console::print_prompt()?;

        input.clear();
        if stdin.lock().read_line(&mut input)? == 0 {
            // End of input closes the database like an explicit #exit.
            break;
        }
        let line = input.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(path) = &history_path {
            if let Err(e) = record_history(path, line) {
                warn!("Failed to save history. {}", e);
            }
        }

        if line.starts_with('#') {
            match command::run_raw_command(line, &mut table)? {
                RawCommandResult::Exit => break,
                RawCommandResult::Success => {}
                RawCommandResult::Unrecognized => echo!("Unrecognized raw command: {}", line),
            }
            continue;
        }

        command::run_statement(&mut table, line)?;
    }

    table.close()
}

/// Location of the command history file, when a home directory can be
/// determined. Sessions without one simply run without history.
fn history_file() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(format!(".{}_history", NAME)))
}

/// Appends one accepted input line to the history file, creating it on
/// first use.
fn record_history(path: &Path, line: &str) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", line)
}

/// Reads the command history back, skipping blank lines. A missing or
/// unreadable file counts as an empty history.
fn read_history(path: &Path) -> Vec<String> {
    match std::fs::read_to_string(path) {
        Ok(contents) => contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect(),
        Err(_) => Vec::new(),
    }
}
