//! Cursor-based navigation of the table.
//!
//! A cursor is a logical `(page, cell)` position in the B+tree, advanced
//! through the leaf sibling chain. It never holds a pointer into a page
//! buffer; rows are copied out under the page lock.
use tracing::{debug, trace};

use super::btree::NodeType;
use super::pager;
use super::row::Row;
use super::table::Table;
use crate::errors::Error;

pub struct Cursor<'a> {
    /// The table being navigated; the cursor borrows it for its whole
    /// lifetime.
    pub table: &'a mut Table,

    /// Current page number.
    pub page_num: u32,

    /// Current cell number within the page.
    pub cell_num: u32,

    /// Number of cells this cursor has moved past.
    pub passed_cells: u32,

    /// Set when the cursor is one past the last cell.
    pub end_of_table: bool,
}

impl<'a> Cursor<'a> {
    /// Creates a cursor positioned at the first row of the table.
    ///
    /// # Arguments
    /// * `table` - Mutable reference to the table
    ///
    /// # Returns
    /// A new `Cursor` on the leftmost leaf, with `end_of_table` set when
    /// the table holds no rows.
    ///
    /// # Errors
    /// Returns an error if a page on the search path cannot be loaded.
    pub fn start(table: &'a mut Table) -> Result<Self, Error> {
        let mut cursor = Cursor::find(table, 0)?;

        let num_cells = {
            let page = cursor.table.pager.get(cursor.page_num)?;
            let n = pager::lock(&page)?.leaf_num_cells();
            n
        };
        cursor.end_of_table = num_cells == 0;

        debug!(
            page_num = cursor.page_num,
            "Created cursor at start of the table"
        );
        Ok(cursor)
    }

    /// Creates a cursor positioned one past the last row of the table.
    ///
    /// Walks the whole leaf chain from the leftmost leaf, so
    /// `passed_cells` ends up holding the total number of cells in the
    /// tree.
    ///
    /// # Arguments
    /// * `table` - Mutable reference to the table
    ///
    /// # Errors
    /// Returns an error if a leaf along the chain cannot be loaded.
    pub fn end(table: &'a mut Table) -> Result<Self, Error> {
        let mut cursor = Cursor::find(table, 0)?;

        let mut passed_cells = 0u32;
        loop {
            let (num_cells, next_leaf) = {
                let page = cursor.table.pager.get(cursor.page_num)?;
                let node = pager::lock(&page)?;
                (node.leaf_num_cells(), node.leaf_next_leaf())
            };
            passed_cells += num_cells;
            cursor.cell_num = num_cells;
            if next_leaf == 0 {
                break;
            }
            cursor.page_num = next_leaf;
        }

        cursor.passed_cells = passed_cells;
        cursor.end_of_table = true;
        Ok(cursor)
    }

    /// Finds the position of `key` in the tree.
    ///
    /// # Arguments
    /// * `table` - Mutable reference to the table
    /// * `key` - Key to find a position for
    ///
    /// # Returns
    /// A new `Cursor` pointing either at the cell holding `key` or at
    /// the slot where the key would have to be inserted.
    ///
    /// # Errors
    /// Returns an error if a page on the search path cannot be loaded or
    /// carries an invalid node kind.
    pub fn find(table: &'a mut Table, key: u32) -> Result<Self, Error> {
        let root_page_num = table.root_page_num;
        let root_type = {
            let page = table.pager.get(root_page_num)?;
            let t = pager::lock(&page)?.node_type()?;
            t
        };

        match root_type {
            NodeType::Leaf => Cursor::leaf_node_find(table, root_page_num, key),
            NodeType::Internal => Cursor::internal_node_find(table, root_page_num, key),
        }
    }

    fn leaf_node_find(table: &'a mut Table, page_num: u32, key: u32) -> Result<Self, Error> {
        let cell_num = {
            let page = table.pager.get(page_num)?;
            let c = pager::lock(&page)?.leaf_find(key)?;
            c
        };

        Ok(Cursor {
            table,
            page_num,
            cell_num,
            passed_cells: 0,
            end_of_table: false,
        })
    }

    /// Descend through an internal node. Each key is the maximum key of
    /// the child to its left, so the binary search lands on the child
    /// that covers `key`.
    fn internal_node_find(table: &'a mut Table, page_num: u32, key: u32) -> Result<Self, Error> {
        trace!(page_num, key, "Descending internal node");

        let child_page_num = {
            let page = table.pager.get(page_num)?;
            let node = pager::lock(&page)?;
            let child_index = node.internal_find_child(key)?;
            node.internal_child(child_index)?
        };

        let child_type = {
            let page = table.pager.get(child_page_num)?;
            let t = pager::lock(&page)?.node_type()?;
            t
        };

        match child_type {
            NodeType::Leaf => Cursor::leaf_node_find(table, child_page_num, key),
            NodeType::Internal => Cursor::internal_node_find(table, child_page_num, key),
        }
    }

    /// Reads the key under the cursor.
    ///
    /// # Returns
    /// The key at the cursor position, or `None` when the cursor points
    /// past the leaf's last cell (an insertion slot at the end).
    ///
    /// # Errors
    /// Returns an error if the current page cannot be loaded.
    pub fn current_key(&mut self) -> Result<Option<u32>, Error> {
        let page = self.table.pager.get(self.page_num)?;
        let node = pager::lock(&page)?;
        if self.cell_num < node.leaf_num_cells() {
            Ok(Some(node.leaf_key(self.cell_num)?))
        } else {
            Ok(None)
        }
    }

    /// Copies the row under the cursor out of the page cache.
    ///
    /// The copy is taken under the page lock, so callers never hold a
    /// reference into a cached page buffer.
    ///
    /// # Errors
    /// Returns an error if the current page cannot be loaded or the cell
    /// index is out of bounds.
    pub fn row(&mut self) -> Result<Row, Error> {
        let page = self.table.pager.get(self.page_num)?;
        let node = pager::lock(&page)?;
        Ok(Row::deserialize(node.leaf_value(self.cell_num)?))
    }

    /// Advances the cursor to the next cell, following the sibling chain
    /// across leaves.
    ///
    /// # Errors
    /// Returns an error if the current page cannot be loaded.
    pub fn advance(&mut self) -> Result<(), Error> {
        let (num_cells, next_leaf) = {
            let page = self.table.pager.get(self.page_num)?;
            let node = pager::lock(&page)?;
            (node.leaf_num_cells(), node.leaf_next_leaf())
        };

        self.cell_num += 1;
        self.passed_cells += 1;
        if self.cell_num >= num_cells {
            if next_leaf == 0 {
                // This was the rightmost leaf.
                self.end_of_table = true;
            } else {
                self.page_num = next_leaf;
                self.cell_num = 0;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::btree::{self, LEAF_MAX_CELLS, LEAF_LEFT_SPLIT_COUNT, LEAF_RIGHT_SPLIT_COUNT};
    use tempfile::NamedTempFile;

    fn insert(table: &mut Table, id: u32) {
        let mut cursor = Cursor::find(table, id).unwrap();
        let row = Row::new(id, &format!("user{}", id), &format!("user{}@example.com", id));
        btree::leaf_insert(&mut cursor, id, &row).unwrap();
    }

    fn scan_keys(table: &mut Table) -> Vec<u32> {
        let mut keys = Vec::new();
        let mut cursor = Cursor::start(table).unwrap();
        while !cursor.end_of_table {
            keys.push(cursor.row().unwrap().id);
            cursor.advance().unwrap();
        }
        keys
    }

    #[test]
    fn test_empty_table() {
        let tmp = NamedTempFile::new().unwrap();
        let mut table = Table::open(tmp.path()).unwrap();

        let cursor = Cursor::start(&mut table).unwrap();
        assert!(cursor.end_of_table);
        assert_eq!(cursor.page_num, 0);
        assert_eq!(cursor.cell_num, 0);

        let end = Cursor::end(&mut table).unwrap();
        assert_eq!(end.passed_cells, 0);
    }

    #[test]
    fn test_find_positions_at_insertion_slot() {
        let tmp = NamedTempFile::new().unwrap();
        let mut table = Table::open(tmp.path()).unwrap();
        for id in [10, 20, 30] {
            insert(&mut table, id);
        }

        let mut cursor = Cursor::find(&mut table, 20).unwrap();
        assert_eq!(cursor.cell_num, 1);
        assert_eq!(cursor.current_key().unwrap(), Some(20));

        let mut cursor = Cursor::find(&mut table, 25).unwrap();
        assert_eq!(cursor.cell_num, 2);
        assert_eq!(cursor.current_key().unwrap(), Some(30));

        let mut cursor = Cursor::find(&mut table, 99).unwrap();
        assert_eq!(cursor.current_key().unwrap(), None);
    }

    #[test]
    fn test_reverse_insert_scans_ascending() {
        let tmp = NamedTempFile::new().unwrap();
        let mut table = Table::open(tmp.path()).unwrap();
        for id in (1..=10).rev() {
            insert(&mut table, id);
        }

        assert_eq!(scan_keys(&mut table), (1..=10).collect::<Vec<_>>());
    }

    #[test]
    fn test_leaf_split_shape() {
        let tmp = NamedTempFile::new().unwrap();
        let mut table = Table::open(tmp.path()).unwrap();
        for id in 0..(LEAF_MAX_CELLS as u32 + 1) {
            insert(&mut table, id);
        }

        // The root became internal with one key and two leaf children.
        let root_page = table.pager.get(0).unwrap();
        let root = pager::lock(&root_page).unwrap();
        assert_eq!(root.node_type().unwrap(), NodeType::Internal);
        assert!(root.is_root());
        assert_eq!(root.internal_num_keys(), 1);

        let left_page_num = root.internal_child(0).unwrap();
        let right_page_num = root.internal_right_child();
        drop(root);

        let left_page = table.pager.get(left_page_num).unwrap();
        let left = pager::lock(&left_page).unwrap();
        assert_eq!(left.node_type().unwrap(), NodeType::Leaf);
        assert_eq!(left.leaf_num_cells(), LEAF_LEFT_SPLIT_COUNT as u32);
        assert_eq!(left.leaf_next_leaf(), right_page_num);
        assert_eq!(left.parent(), 0);

        let right_page = table.pager.get(right_page_num).unwrap();
        let right = pager::lock(&right_page).unwrap();
        assert_eq!(right.leaf_num_cells(), LEAF_RIGHT_SPLIT_COUNT as u32);
        assert_eq!(right.leaf_next_leaf(), 0);
        assert_eq!(right.parent(), 0);
    }

    #[test]
    fn test_scan_crosses_leaves() {
        let tmp = NamedTempFile::new().unwrap();
        let mut table = Table::open(tmp.path()).unwrap();
        for id in 0..30 {
            insert(&mut table, id);
        }

        assert_eq!(scan_keys(&mut table), (0..30).collect::<Vec<_>>());
    }

    #[test]
    fn test_end_counts_cells_across_reopen() {
        let tmp = NamedTempFile::new().unwrap();
        {
            let mut table = Table::open(tmp.path()).unwrap();
            for id in 0..100 {
                insert(&mut table, id);
            }
            let end = Cursor::end(&mut table).unwrap();
            assert_eq!(end.passed_cells, 100);
            table.close().unwrap();
        }

        let mut table = Table::open(tmp.path()).unwrap();
        let end = Cursor::end(&mut table).unwrap();
        assert_eq!(end.passed_cells, 100);
        assert_eq!(scan_keys(&mut table), (0..100).collect::<Vec<_>>());
        table.close().unwrap();
    }

    #[test]
    fn test_random_order_insert_scans_ascending() {
        let tmp = NamedTempFile::new().unwrap();
        let mut table = Table::open(tmp.path()).unwrap();
        let keys = [23u32, 5, 91, 2, 47, 14, 8, 70, 33, 1, 99, 60, 12, 27, 54, 36];
        for id in keys {
            insert(&mut table, id);
        }

        let mut sorted = keys.to_vec();
        sorted.sort_unstable();
        assert_eq!(scan_keys(&mut table), sorted);
    }
}
