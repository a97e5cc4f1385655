use crate::errors::Error;
use crate::storage::row::Row;

/// A prepared statement, ready for execution.
#[derive(Debug)]
pub enum Statement {
    Insert(Row),
    Select,
    /// Recognized but not implemented; executes as a no-op.
    Delete,
    /// Recognized but not implemented; executes as a no-op.
    Create,
}

/// Outcome of preparing a line of input that is not a statement the
/// engine can execute.
#[derive(Debug, PartialEq, Eq)]
pub enum PrepareError {
    /// The verb was recognized but the arguments did not parse.
    SyntaxError,
    /// A text field exceeds its column width.
    StringTooLong,
    /// The verb itself is unknown.
    Unrecognized,
}

/// Statement-level execution failures. Engine errors are fatal and carry
/// the underlying storage error.
#[derive(Debug)]
pub enum ExecuteError {
    DuplicateKey,
    TableFull,
    Engine(Error),
}

impl From<Error> for ExecuteError {
    fn from(err: Error) -> ExecuteError {
        ExecuteError::Engine(err)
    }
}
