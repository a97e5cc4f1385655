//! The on-disk storage engine: pager, B+tree, cursor and table lifecycle.
pub mod btree;
pub mod cursor;
pub mod pager;
pub mod row;
pub mod table;
