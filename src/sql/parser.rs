use lazy_static::lazy_static;
use regex::Regex;

use super::statement::{PrepareError, Statement};
use crate::storage::row::{Row, EMAIL_SIZE, USERNAME_SIZE};

lazy_static! {
    static ref INSERT_REGEX: Regex = Regex::new(r"^insert\s+(\d+)\s+(\S+)\s+(\S+)$").unwrap();
}

/// Parse one line of input into a [`Statement`].
pub fn prepare(input: &str) -> Result<Statement, PrepareError> {
    if input.starts_with("insert") {
        return prepare_insert(input);
    }

    match input {
        "select" => Ok(Statement::Select),
        "delete" => Ok(Statement::Delete),
        "create" => Ok(Statement::Create),
        _ => Err(PrepareError::Unrecognized),
    }
}

/// Parse `insert <id> <username> <email>`, enforcing the column widths.
fn prepare_insert(input: &str) -> Result<Statement, PrepareError> {
    let captures = INSERT_REGEX
        .captures(input)
        .ok_or(PrepareError::SyntaxError)?;

    let id: u32 = captures[1].parse().map_err(|_| PrepareError::SyntaxError)?;
    let username = &captures[2];
    let email = &captures[3];

    if username.len() > USERNAME_SIZE || email.len() > EMAIL_SIZE {
        return Err(PrepareError::StringTooLong);
    }

    Ok(Statement::Insert(Row::new(id, username, email)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_insert() {
        match prepare("insert 12 chen we@qq.com") {
            Ok(Statement::Insert(row)) => {
                assert_eq!(row.id, 12);
                assert_eq!(row.username(), "chen");
                assert_eq!(row.email(), "we@qq.com");
            }
            other => panic!("Expected insert statement, got {:?}", other),
        }
    }

    #[test]
    fn test_prepare_select() {
        assert!(matches!(prepare("select"), Ok(Statement::Select)));
    }

    #[test]
    fn test_prepare_noop_verbs() {
        assert!(matches!(prepare("delete"), Ok(Statement::Delete)));
        assert!(matches!(prepare("create"), Ok(Statement::Create)));
    }

    #[test]
    fn test_unrecognized_statement() {
        assert!(matches!(prepare("unkown"), Err(PrepareError::Unrecognized)));
        assert!(matches!(
            prepare("select extra"),
            Err(PrepareError::Unrecognized)
        ));
    }

    #[test]
    fn test_insert_syntax_errors() {
        assert!(matches!(
            prepare("insert 1 only_two"),
            Err(PrepareError::SyntaxError)
        ));
        assert!(matches!(
            prepare("insert abc name mail"),
            Err(PrepareError::SyntaxError)
        ));
        assert!(matches!(
            prepare("insert -1 name mail"),
            Err(PrepareError::SyntaxError)
        ));
        assert!(matches!(
            prepare("insert 99999999999 name mail"),
            Err(PrepareError::SyntaxError)
        ));
    }

    #[test]
    fn test_insert_string_too_long() {
        // 33-byte username, one past the column width.
        let result = prepare("insert 15 xsssliuliuliuliuyifeifeifeifeifei kk@google.com");
        assert!(matches!(result, Err(PrepareError::StringTooLong)));

        let long_email = "e".repeat(EMAIL_SIZE + 1);
        let result = prepare(&format!("insert 15 name {}", long_email));
        assert!(matches!(result, Err(PrepareError::StringTooLong)));
    }

    #[test]
    fn test_insert_boundary_lengths() {
        let name = "u".repeat(USERNAME_SIZE);
        let email = "e".repeat(EMAIL_SIZE);
        assert!(matches!(
            prepare(&format!("insert 1 {} {}", name, email)),
            Ok(Statement::Insert(_))
        ));
    }
}
