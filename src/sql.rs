//! The statement surface: parsing and statement/outcome types.
pub mod parser;
pub mod statement;
