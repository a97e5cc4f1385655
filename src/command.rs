/// The command processor: meta-commands and statement execution.
use tracing::debug;

use crate::errors::Error;
use crate::sql::parser;
use crate::sql::statement::{ExecuteError, PrepareError, Statement};
use crate::storage::btree;
use crate::storage::cursor::Cursor;
use crate::storage::row::Row;
use crate::storage::table::Table;

/// Outcome of a meta-command (a line starting with `#`).
#[derive(Debug, PartialEq, Eq)]
pub enum RawCommandResult {
    Success,
    Exit,
    Unrecognized,
}

/// Handle a meta-command. `#exit`/`#quit` ask the caller to shut down;
/// `#other` is a no-op kept as a parse probe.
pub fn run_raw_command(input: &str, table: &mut Table) -> Result<RawCommandResult, Error> {
    match input {
        "#exit" | "#quit" => Ok(RawCommandResult::Exit),
        "#btree" => {
            echo!("Visual B-Tree:");
            let root_page_num = table.root_page_num;
            echo_lines!("{}", btree::format_tree(&mut table.pager, root_page_num, 0)?);
            Ok(RawCommandResult::Success)
        }
        "#other" => Ok(RawCommandResult::Success),
        _ => Ok(RawCommandResult::Unrecognized),
    }
}

/// Prepare and execute one statement line, printing the outcome message.
/// Engine errors bubble up as fatal.
pub fn run_statement(table: &mut Table, input: &str) -> Result<(), Error> {
    match parser::prepare(input) {
        Ok(statement) => match execute(table, &statement) {
            Ok(()) => echo!("Executed."),
            Err(ExecuteError::DuplicateKey) => echo!("Error: Duplicate Key"),
            Err(ExecuteError::TableFull) => echo!("Error: Table full"),
            Err(ExecuteError::Engine(e)) => return Err(e),
        },
        Err(PrepareError::SyntaxError) => echo!("Syntax Error: Cannot parse statement"),
        Err(PrepareError::StringTooLong) => echo!("String too long"),
        Err(PrepareError::Unrecognized) => echo!("Unrecognized statement: {}", input),
    }
    Ok(())
}

/// Execute a prepared statement.
pub fn execute(table: &mut Table, statement: &Statement) -> Result<(), ExecuteError> {
    match statement {
        Statement::Insert(row) => execute_insert(table, row),
        Statement::Select => {
            for row in execute_select(table)? {
                echo!("{}", row);
            }
            Ok(())
        }
        // Recognized verbs without an implementation succeed as no-ops.
        Statement::Delete | Statement::Create => Ok(()),
    }
}

/// Insert one row, rejecting a primary id that is already present. The
/// tree itself does not check for duplicates; the check happens here on
/// the cursor returned by the key search.
pub fn execute_insert(table: &mut Table, row: &Row) -> Result<(), ExecuteError> {
    let key = row.id;
    let mut cursor = Cursor::find(table, key)?;

    if cursor.current_key()? == Some(key) {
        return Err(ExecuteError::DuplicateKey);
    }

    btree::leaf_insert(&mut cursor, key, row)?;
    debug!(key, "Inserted row");
    Ok(())
}

/// Collect every row in key order.
pub fn execute_select(table: &mut Table) -> Result<Vec<Row>, ExecuteError> {
    let mut rows = Vec::new();
    let mut cursor = Cursor::start(table)?;
    while !cursor.end_of_table {
        rows.push(cursor.row()?);
        cursor.advance()?;
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn prepare(input: &str) -> Statement {
        parser::prepare(input).unwrap()
    }

    #[test]
    fn test_insert_and_select() {
        let tmp = NamedTempFile::new().unwrap();
        let mut table = Table::open(tmp.path()).unwrap();

        let statement = prepare("insert 12 chen we@qq.com");
        execute(&mut table, &statement).unwrap();

        let rows = execute_select(&mut table).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(format!("{}", rows[0]), "(12, chen, we@qq.com)");
    }

    #[test]
    fn test_duplicate_key_after_reopen() {
        let tmp = NamedTempFile::new().unwrap();
        {
            let mut table = Table::open(tmp.path()).unwrap();
            for i in 0..10 {
                let statement = prepare(&format!("insert {} user{} u{}@example.com", i, i, i));
                execute(&mut table, &statement).unwrap();
            }
            table.close().unwrap();
        }

        let mut table = Table::open(tmp.path()).unwrap();
        for i in 0..10 {
            let statement = prepare(&format!("insert {} other{} o{}@example.com", i, i, i));
            match execute(&mut table, &statement) {
                Err(ExecuteError::DuplicateKey) => {}
                other => panic!("Expected duplicate key, got {:?}", other.err()),
            }
        }

        // The rejected inserts must not have modified the tree.
        assert_eq!(execute_select(&mut table).unwrap().len(), 10);
    }

    #[test]
    fn test_duplicate_key_leaves_cells_unchanged() {
        let tmp = NamedTempFile::new().unwrap();
        let mut table = Table::open(tmp.path()).unwrap();

        execute(&mut table, &prepare("insert 1 a a@b.c")).unwrap();
        let before = Cursor::end(&mut table).unwrap().passed_cells;

        assert!(matches!(
            execute_insert(&mut table, &Row::new(1, "dup", "dup@b.c")),
            Err(ExecuteError::DuplicateKey)
        ));
        assert_eq!(Cursor::end(&mut table).unwrap().passed_cells, before);
    }

    #[test]
    fn test_noop_statements_succeed() {
        let tmp = NamedTempFile::new().unwrap();
        let mut table = Table::open(tmp.path()).unwrap();

        execute(&mut table, &prepare("delete")).unwrap();
        execute(&mut table, &prepare("create")).unwrap();
    }

    #[test]
    fn test_select_returns_rows_in_key_order() {
        let tmp = NamedTempFile::new().unwrap();
        let mut table = Table::open(tmp.path()).unwrap();
        for i in (1..=10).rev() {
            let statement = prepare(&format!("insert {} user{} u{}@example.com", i, i, i));
            execute(&mut table, &statement).unwrap();
        }

        let ids: Vec<u32> = execute_select(&mut table)
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, (1..=10).collect::<Vec<_>>());
    }

    #[test]
    fn test_raw_commands() {
        let tmp = NamedTempFile::new().unwrap();
        let mut table = Table::open(tmp.path()).unwrap();

        assert_eq!(
            run_raw_command("#exit", &mut table).unwrap(),
            RawCommandResult::Exit
        );
        assert_eq!(
            run_raw_command("#quit", &mut table).unwrap(),
            RawCommandResult::Exit
        );
        assert_eq!(
            run_raw_command("#other", &mut table).unwrap(),
            RawCommandResult::Success
        );
        assert_eq!(
            run_raw_command("#btree", &mut table).unwrap(),
            RawCommandResult::Success
        );
        assert_eq!(
            run_raw_command("#nonsense", &mut table).unwrap(),
            RawCommandResult::Unrecognized
        );
    }

    #[test]
    fn test_run_statement_messages_do_not_fail() {
        let tmp = NamedTempFile::new().unwrap();
        let mut table = Table::open(tmp.path()).unwrap();

        run_statement(&mut table, "insert 1 a a@b.c").unwrap();
        run_statement(&mut table, "insert 1 a a@b.c").unwrap();
        run_statement(&mut table, "insert nonsense").unwrap();
        run_statement(&mut table, "gibberish").unwrap();
        run_statement(&mut table, "select").unwrap();
    }
}
