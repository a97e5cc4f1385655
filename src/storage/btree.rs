//! B+tree node layouts and tree operations.
//!
//! Each node occupies exactly one page. Leaf nodes store `{key, row}`
//! cells and are chained left-to-right through `next_leaf`; internal
//! nodes store `{child, key}` cells plus a rightmost child pointer in the
//! header, where every key is the maximum key of the subtree to its left.
//! The root always lives on page 0: splitting the root copies it to a
//! fresh page and rewrites page 0 in place.
//!
//! All multi-byte fields are little-endian.
use tracing::debug;

use super::cursor::Cursor;
use super::pager::{self, Page, Pager};
use super::row::{Row, ROW_SIZE};
use super::table::{Table, PAGE_SIZE};
use crate::errors::Error;

/// B+tree node kind, stored in the first byte of every page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Internal,
    Leaf,
}

// Common node header layout.
const NODE_TYPE_SIZE: usize = std::mem::size_of::<u8>();
const NODE_TYPE_OFFSET: usize = 0;
const IS_ROOT_SIZE: usize = std::mem::size_of::<u8>();
const IS_ROOT_OFFSET: usize = NODE_TYPE_OFFSET + NODE_TYPE_SIZE;
const PARENT_POINTER_SIZE: usize = std::mem::size_of::<u32>();
const PARENT_POINTER_OFFSET: usize = IS_ROOT_OFFSET + IS_ROOT_SIZE;
const COMMON_NODE_HEADER_SIZE: usize = NODE_TYPE_SIZE + IS_ROOT_SIZE + PARENT_POINTER_SIZE;

// Leaf node header layout.
const LEAF_NODE_NUM_CELLS_SIZE: usize = std::mem::size_of::<u32>();
const LEAF_NODE_NUM_CELLS_OFFSET: usize = COMMON_NODE_HEADER_SIZE;
const LEAF_NODE_NEXT_LEAF_SIZE: usize = std::mem::size_of::<u32>();
const LEAF_NODE_NEXT_LEAF_OFFSET: usize = LEAF_NODE_NUM_CELLS_OFFSET + LEAF_NODE_NUM_CELLS_SIZE;
const LEAF_NODE_HEADER_SIZE: usize =
    COMMON_NODE_HEADER_SIZE + LEAF_NODE_NUM_CELLS_SIZE + LEAF_NODE_NEXT_LEAF_SIZE;

// Leaf node body layout: a packed array of cells, each a key followed by
// a serialized row. The tail that cannot fit a whole cell stays zeroed.
const LEAF_NODE_KEY_SIZE: usize = std::mem::size_of::<u32>();
const LEAF_NODE_VALUE_SIZE: usize = ROW_SIZE;
const LEAF_NODE_CELL_SIZE: usize = LEAF_NODE_KEY_SIZE + LEAF_NODE_VALUE_SIZE;
const LEAF_NODE_SPACE_FOR_CELLS: usize = PAGE_SIZE - LEAF_NODE_HEADER_SIZE;

/// Maximum number of cells in a leaf node.
pub const LEAF_MAX_CELLS: usize = LEAF_NODE_SPACE_FOR_CELLS / LEAF_NODE_CELL_SIZE;

/// Cells assigned to the right sibling when a leaf splits.
pub const LEAF_RIGHT_SPLIT_COUNT: usize = (LEAF_MAX_CELLS + 1) / 2;
/// Cells kept by the left node when a leaf splits (takes the extra cell
/// when the total is odd).
pub const LEAF_LEFT_SPLIT_COUNT: usize = (LEAF_MAX_CELLS + 1) - LEAF_RIGHT_SPLIT_COUNT;

// The split redistribution derives destination indexes as
// `i % LEAF_LEFT_SPLIT_COUNT`, which is only valid while both halves are
// equal. A layout change that breaks this must fail the build.
const _: () = assert!(LEAF_LEFT_SPLIT_COUNT == LEAF_RIGHT_SPLIT_COUNT);

// Internal node header layout.
const INTERNAL_NODE_NUM_KEYS_SIZE: usize = std::mem::size_of::<u32>();
const INTERNAL_NODE_NUM_KEYS_OFFSET: usize = COMMON_NODE_HEADER_SIZE;
const INTERNAL_NODE_RIGHT_CHILD_SIZE: usize = std::mem::size_of::<u32>();
const INTERNAL_NODE_RIGHT_CHILD_OFFSET: usize =
    INTERNAL_NODE_NUM_KEYS_OFFSET + INTERNAL_NODE_NUM_KEYS_SIZE;
const INTERNAL_NODE_HEADER_SIZE: usize =
    COMMON_NODE_HEADER_SIZE + INTERNAL_NODE_NUM_KEYS_SIZE + INTERNAL_NODE_RIGHT_CHILD_SIZE;

// Internal node body layout: a packed array of child/key pairs. Internal
// nodes carry one more child pointer than keys; the extra pointer is the
// rightmost child in the header.
const INTERNAL_NODE_CHILD_SIZE: usize = std::mem::size_of::<u32>();
const INTERNAL_NODE_KEY_SIZE: usize = std::mem::size_of::<u32>();
const INTERNAL_NODE_CELL_SIZE: usize = INTERNAL_NODE_CHILD_SIZE + INTERNAL_NODE_KEY_SIZE;
const INTERNAL_NODE_SPACE_FOR_CELLS: usize = PAGE_SIZE - INTERNAL_NODE_HEADER_SIZE;

/// Maximum number of child/key cells in an internal node. Inserting past
/// this bound would require an internal-node split, which this engine
/// does not implement.
pub const INTERNAL_MAX_CELLS: usize = INTERNAL_NODE_SPACE_FOR_CELLS / INTERNAL_NODE_CELL_SIZE;

impl Page {
    fn read_u32(&self, offset: usize) -> u32 {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.data[offset..offset + 4]);
        u32::from_le_bytes(bytes)
    }

    fn write_u32(&mut self, offset: usize, value: u32) {
        self.data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Reads the kind of this node from the first byte of the page.
    ///
    /// # Errors
    /// Returns an `Error::Storage` if the byte is neither the internal
    /// nor the leaf tag, which means the page was never initialized as a
    /// node or has been overwritten.
    pub fn node_type(&self) -> Result<NodeType, Error> {
        match self.data[NODE_TYPE_OFFSET] {
            0 => Ok(NodeType::Internal),
            1 => Ok(NodeType::Leaf),
            invalid => Err(err!(Storage, "Invalid node type byte: {}", invalid)),
        }
    }

    /// Writes the node kind tag into the first byte of the page.
    pub fn set_node_type(&mut self, node_type: NodeType) {
        self.data[NODE_TYPE_OFFSET] = match node_type {
            NodeType::Internal => 0,
            NodeType::Leaf => 1,
        };
    }

    /// Checks whether this node is the root of the tree.
    pub fn is_root(&self) -> bool {
        self.data[IS_ROOT_OFFSET] == 1
    }

    /// Sets or clears the root flag.
    pub fn set_root(&mut self, is_root: bool) {
        self.data[IS_ROOT_OFFSET] = is_root as u8;
    }

    /// Reads the parent page number. Undefined for the root, which has no
    /// parent.
    pub fn parent(&self) -> u32 {
        self.read_u32(PARENT_POINTER_OFFSET)
    }

    /// Writes the parent page number.
    pub fn set_parent(&mut self, page_num: u32) {
        self.write_u32(PARENT_POINTER_OFFSET, page_num);
    }

    // Leaf node accessors.

    /// Reads the number of cells stored in the leaf.
    ///
    /// The value is stored in little-endian format at
    /// `LEAF_NODE_NUM_CELLS_OFFSET`.
    pub fn leaf_num_cells(&self) -> u32 {
        self.read_u32(LEAF_NODE_NUM_CELLS_OFFSET)
    }

    /// Writes the number of cells stored in the leaf.
    pub fn set_leaf_num_cells(&mut self, num: u32) {
        self.write_u32(LEAF_NODE_NUM_CELLS_OFFSET, num);
    }

    /// Reads the page number of the right sibling leaf.
    ///
    /// A value of 0 means no sibling: page 0 is always the root, so it
    /// can never be a sibling.
    pub fn leaf_next_leaf(&self) -> u32 {
        self.read_u32(LEAF_NODE_NEXT_LEAF_OFFSET)
    }

    /// Writes the page number of the right sibling leaf.
    pub fn set_leaf_next_leaf(&mut self, page_num: u32) {
        self.write_u32(LEAF_NODE_NEXT_LEAF_OFFSET, page_num);
    }

    /// Computes the byte offset of a leaf cell.
    ///
    /// # Errors
    /// Returns an `Error::Storage` if `cell_num` is at or past
    /// `LEAF_MAX_CELLS`.
    fn leaf_cell_offset(&self, cell_num: u32) -> Result<usize, Error> {
        if cell_num as usize >= LEAF_MAX_CELLS {
            return Err(err!(
                Storage,
                "Leaf cell number out of bounds (cell_num={}, max_cells={})",
                cell_num,
                LEAF_MAX_CELLS
            ));
        }
        Ok(LEAF_NODE_HEADER_SIZE + cell_num as usize * LEAF_NODE_CELL_SIZE)
    }

    /// Copies a whole leaf cell (key plus value) out of the page.
    ///
    /// # Arguments
    /// - `cell_num`: The index of the cell to read.
    ///
    /// # Errors
    /// Returns an `Error::Storage` if the cell index is out of bounds.
    pub fn leaf_cell(&self, cell_num: u32) -> Result<[u8; LEAF_NODE_CELL_SIZE], Error> {
        let offset = self.leaf_cell_offset(cell_num)?;
        let mut cell = [0u8; LEAF_NODE_CELL_SIZE];
        cell.copy_from_slice(&self.data[offset..offset + LEAF_NODE_CELL_SIZE]);
        Ok(cell)
    }

    /// Overwrites a whole leaf cell.
    ///
    /// # Arguments
    /// - `cell_num`: The index of the cell to write.
    /// - `cell`: The raw cell bytes (key plus value).
    ///
    /// # Errors
    /// Returns an `Error::Storage` if the cell index is out of bounds.
    pub fn set_leaf_cell(
        &mut self,
        cell_num: u32,
        cell: &[u8; LEAF_NODE_CELL_SIZE],
    ) -> Result<(), Error> {
        let offset = self.leaf_cell_offset(cell_num)?;
        self.data[offset..offset + LEAF_NODE_CELL_SIZE].copy_from_slice(cell);
        Ok(())
    }

    /// Reads the key of the specified cell.
    ///
    /// The key is stored in little-endian format at the start of the
    /// cell.
    ///
    /// # Errors
    /// Returns an `Error::Storage` if the cell index is out of bounds.
    pub fn leaf_key(&self, cell_num: u32) -> Result<u32, Error> {
        let offset = self.leaf_cell_offset(cell_num)?;
        Ok(self.read_u32(offset))
    }

    /// Writes the key of the specified cell.
    ///
    /// # Errors
    /// Returns an `Error::Storage` if the cell index is out of bounds.
    pub fn set_leaf_key(&mut self, cell_num: u32, key: u32) -> Result<(), Error> {
        let offset = self.leaf_cell_offset(cell_num)?;
        self.write_u32(offset, key);
        Ok(())
    }

    /// Returns the serialized row stored in a leaf cell.
    ///
    /// The value follows the key in the cell layout.
    ///
    /// # Errors
    /// Returns an `Error::Storage` if the cell index is out of bounds.
    pub fn leaf_value(&self, cell_num: u32) -> Result<&[u8], Error> {
        let offset = self.leaf_cell_offset(cell_num)? + LEAF_NODE_KEY_SIZE;
        Ok(&self.data[offset..offset + LEAF_NODE_VALUE_SIZE])
    }

    /// Returns a mutable view of the serialized row in a leaf cell, for
    /// writing a row in place.
    ///
    /// # Errors
    /// Returns an `Error::Storage` if the cell index is out of bounds.
    pub fn leaf_value_mut(&mut self, cell_num: u32) -> Result<&mut [u8], Error> {
        let offset = self.leaf_cell_offset(cell_num)? + LEAF_NODE_KEY_SIZE;
        Ok(&mut self.data[offset..offset + LEAF_NODE_VALUE_SIZE])
    }

    /// Resets the page to an empty non-root leaf with no sibling.
    pub fn init_leaf(&mut self) {
        self.set_node_type(NodeType::Leaf);
        self.set_root(false);
        self.set_leaf_num_cells(0);
        self.set_leaf_next_leaf(0);
    }

    /// Binary-searches the leaf for `key`.
    ///
    /// # Returns
    /// The index of the cell holding `key`, or the index of the slot
    /// where it would have to be inserted to keep the cells sorted.
    ///
    /// # Errors
    /// Returns an `Error::Storage` if a probed cell index cannot be read.
    pub fn leaf_find(&self, key: u32) -> Result<u32, Error> {
        let mut min_index = 0u32;
        let mut max_index = self.leaf_num_cells();
        while max_index != min_index {
            let index = (min_index + max_index) / 2;
            let index_key = self.leaf_key(index)?;
            if index_key == key {
                return Ok(index);
            }
            if key < index_key {
                max_index = index;
            } else {
                min_index = index + 1;
            }
        }
        Ok(min_index)
    }

    // Internal node accessors.

    /// Reads the number of keys stored in the internal node.
    ///
    /// The value is stored in little-endian format at
    /// `INTERNAL_NODE_NUM_KEYS_OFFSET`.
    pub fn internal_num_keys(&self) -> u32 {
        self.read_u32(INTERNAL_NODE_NUM_KEYS_OFFSET)
    }

    /// Writes the number of keys stored in the internal node.
    pub fn set_internal_num_keys(&mut self, num: u32) {
        self.write_u32(INTERNAL_NODE_NUM_KEYS_OFFSET, num);
    }

    /// Reads the page number of the rightmost child.
    ///
    /// Internal nodes carry one more child pointer than keys; this is
    /// the extra pointer, kept in the header.
    pub fn internal_right_child(&self) -> u32 {
        self.read_u32(INTERNAL_NODE_RIGHT_CHILD_OFFSET)
    }

    /// Writes the page number of the rightmost child.
    pub fn set_internal_right_child(&mut self, page_num: u32) {
        self.write_u32(INTERNAL_NODE_RIGHT_CHILD_OFFSET, page_num);
    }

    /// Computes the byte offset of an internal cell.
    ///
    /// # Errors
    /// Returns an `Error::Storage` if `cell_num` is at or past
    /// `INTERNAL_MAX_CELLS`.
    fn internal_cell_offset(&self, cell_num: u32) -> Result<usize, Error> {
        if cell_num as usize >= INTERNAL_MAX_CELLS {
            return Err(err!(
                Storage,
                "Internal cell number out of bounds (cell_num={}, max_cells={})",
                cell_num,
                INTERNAL_MAX_CELLS
            ));
        }
        Ok(INTERNAL_NODE_HEADER_SIZE + cell_num as usize * INTERNAL_NODE_CELL_SIZE)
    }

    /// Copies a whole internal cell (child pointer plus key) out of the
    /// page.
    ///
    /// # Errors
    /// Returns an `Error::Storage` if the cell index is out of bounds.
    pub fn internal_cell(&self, cell_num: u32) -> Result<[u8; INTERNAL_NODE_CELL_SIZE], Error> {
        let offset = self.internal_cell_offset(cell_num)?;
        let mut cell = [0u8; INTERNAL_NODE_CELL_SIZE];
        cell.copy_from_slice(&self.data[offset..offset + INTERNAL_NODE_CELL_SIZE]);
        Ok(cell)
    }

    /// Overwrites a whole internal cell.
    ///
    /// # Errors
    /// Returns an `Error::Storage` if the cell index is out of bounds.
    pub fn set_internal_cell(
        &mut self,
        cell_num: u32,
        cell: &[u8; INTERNAL_NODE_CELL_SIZE],
    ) -> Result<(), Error> {
        let offset = self.internal_cell_offset(cell_num)?;
        self.data[offset..offset + INTERNAL_NODE_CELL_SIZE].copy_from_slice(cell);
        Ok(())
    }

    /// Reads the child page number at the specified index.
    ///
    /// If `child_num` equals the number of keys, this resolves to the
    /// rightmost child stored in the header; otherwise it reads the
    /// child pointer from the cell array.
    ///
    /// # Arguments
    /// - `child_num`: The index of the child to read (0-based, up to and
    ///   including `num_keys`).
    ///
    /// # Errors
    /// Returns an `Error::Storage` if `child_num` exceeds the number of
    /// keys.
    pub fn internal_child(&self, child_num: u32) -> Result<u32, Error> {
        let num_keys = self.internal_num_keys();
        if child_num > num_keys {
            return Err(err!(
                Storage,
                "Child index {} exceeds num_keys {}",
                child_num,
                num_keys
            ));
        }
        if child_num == num_keys {
            Ok(self.internal_right_child())
        } else {
            let offset = self.internal_cell_offset(child_num)?;
            Ok(self.read_u32(offset))
        }
    }

    /// Writes the child pointer of the specified cell. The rightmost
    /// child is written through `set_internal_right_child` instead.
    ///
    /// # Errors
    /// Returns an `Error::Storage` if the cell index is out of bounds.
    pub fn set_internal_child(&mut self, cell_num: u32, page_num: u32) -> Result<(), Error> {
        let offset = self.internal_cell_offset(cell_num)?;
        self.write_u32(offset, page_num);
        Ok(())
    }

    /// Reads the key at the specified index.
    ///
    /// # Errors
    /// Returns an `Error::Storage` if `key_num` is at or past the number
    /// of keys.
    pub fn internal_key(&self, key_num: u32) -> Result<u32, Error> {
        let num_keys = self.internal_num_keys();
        if key_num >= num_keys {
            return Err(err!(
                Storage,
                "Key index {} exceeds num_keys {}",
                key_num,
                num_keys
            ));
        }
        let offset = self.internal_cell_offset(key_num)? + INTERNAL_NODE_CHILD_SIZE;
        Ok(self.read_u32(offset))
    }

    /// Writes the key at the specified index.
    ///
    /// # Errors
    /// Returns an `Error::Storage` if `key_num` is at or past the number
    /// of keys, so the key count must be bumped before new keys are
    /// written.
    pub fn set_internal_key(&mut self, key_num: u32, key: u32) -> Result<(), Error> {
        let num_keys = self.internal_num_keys();
        if key_num >= num_keys {
            return Err(err!(
                Storage,
                "Key index {} exceeds num_keys {}",
                key_num,
                num_keys
            ));
        }
        let offset = self.internal_cell_offset(key_num)? + INTERNAL_NODE_CHILD_SIZE;
        self.write_u32(offset, key);
        Ok(())
    }

    /// Resets the page to an empty internal root; callers override the
    /// root flag where needed.
    pub fn init_internal(&mut self) {
        self.set_node_type(NodeType::Internal);
        self.set_root(true);
        self.set_internal_num_keys(0);
    }

    /// Binary-searches for the index of the child that should contain
    /// `key`. The key to the right of each child pointer is the maximum
    /// key contained by that child.
    ///
    /// # Returns
    /// The index of the covering child; may be `num_keys`, meaning the
    /// rightmost child.
    ///
    /// # Errors
    /// Returns an `Error::Storage` if a probed key index cannot be read.
    pub fn internal_find_child(&self, key: u32) -> Result<u32, Error> {
        let mut min_index = 0u32;
        let mut max_index = self.internal_num_keys();
        while max_index != min_index {
            let index = (min_index + max_index) / 2;
            if self.internal_key(index)? >= key {
                max_index = index;
            } else {
                min_index = index + 1;
            }
        }
        Ok(min_index)
    }

    /// Reads the maximum key stored under this node. For both node kinds
    /// it is the key of the last cell.
    ///
    /// # Errors
    /// Returns an `Error::Storage` if the node is empty or its kind byte
    /// is invalid.
    pub fn max_key(&self) -> Result<u32, Error> {
        match self.node_type()? {
            NodeType::Internal => {
                let last = self
                    .internal_num_keys()
                    .checked_sub(1)
                    .ok_or_else(|| err!(Storage, "Empty internal node has no max key"))?;
                self.internal_key(last)
            }
            NodeType::Leaf => {
                let last = self
                    .leaf_num_cells()
                    .checked_sub(1)
                    .ok_or_else(|| err!(Storage, "Empty leaf node has no max key"))?;
                self.leaf_key(last)
            }
        }
    }
}

/// Insert a key/row pair at the cursor position, splitting the leaf when
/// it is already full.
///
/// Callers are responsible for the duplicate-key check; this function
/// assumes the cursor points at the correct insertion slot.
pub fn leaf_insert(cursor: &mut Cursor, key: u32, row: &Row) -> Result<(), Error> {
    let page = cursor.table.pager.get(cursor.page_num)?;
    let mut node = pager::lock(&page)?;

    let num_cells = node.leaf_num_cells();
    if num_cells as usize >= LEAF_MAX_CELLS {
        drop(node);
        return leaf_split_and_insert(cursor, key, row);
    }

    if cursor.cell_num < num_cells {
        // Shift cells right to open a slot at the insertion point.
        for i in ((cursor.cell_num + 1)..=num_cells).rev() {
            let cell = node.leaf_cell(i - 1)?;
            node.set_leaf_cell(i, &cell)?;
        }
    }

    node.set_leaf_key(cursor.cell_num, key)?;
    row.serialize(node.leaf_value_mut(cursor.cell_num)?);
    node.set_leaf_num_cells(num_cells + 1);
    Ok(())
}

/// Split a full leaf and insert the new cell. The upper half of the
/// fourteen virtual cells (thirteen existing plus the new one) moves to a
/// freshly allocated right sibling; parent bookkeeping follows.
fn leaf_split_and_insert(cursor: &mut Cursor, key: u32, row: &Row) -> Result<(), Error> {
    debug!(page_num = cursor.page_num, key, "Splitting leaf node");

    let old_page = cursor.table.pager.get(cursor.page_num)?;
    let old_max = pager::lock(&old_page)?.max_key()?;
    let new_page_num = cursor.table.pager.unallocated_page_num();
    let new_page = cursor.table.pager.get(new_page_num)?;

    let mut old_node = pager::lock(&old_page)?;
    let mut new_node = pager::lock(&new_page)?;

    new_node.init_leaf();
    new_node.set_parent(old_node.parent());

    // Splice the new leaf into the sibling chain.
    new_node.set_leaf_next_leaf(old_node.leaf_next_leaf());
    old_node.set_leaf_next_leaf(new_page_num);

    // Redistribute every existing cell plus the new one evenly between
    // the old (left) and new (right) nodes, moving from the right.
    for i in (0..=LEAF_MAX_CELLS).rev() {
        let dest_is_new = i >= LEAF_LEFT_SPLIT_COUNT;
        let index_within = (i % LEAF_LEFT_SPLIT_COUNT) as u32;
        let i = i as u32;

        if i == cursor.cell_num {
            let dest = if dest_is_new {
                &mut *new_node
            } else {
                &mut *old_node
            };
            dest.set_leaf_key(index_within, key)?;
            row.serialize(dest.leaf_value_mut(index_within)?);
        } else {
            let src = if i > cursor.cell_num { i - 1 } else { i };
            let cell = old_node.leaf_cell(src)?;
            let dest = if dest_is_new {
                &mut *new_node
            } else {
                &mut *old_node
            };
            dest.set_leaf_cell(index_within, &cell)?;
        }
    }

    old_node.set_leaf_num_cells(LEAF_LEFT_SPLIT_COUNT as u32);
    new_node.set_leaf_num_cells(LEAF_RIGHT_SPLIT_COUNT as u32);

    let was_root = old_node.is_root();
    let parent_page_num = old_node.parent();
    let new_max = old_node.max_key()?;
    drop(old_node);
    drop(new_node);

    if was_root {
        create_new_root(cursor.table, new_page_num)
    } else {
        let parent_page = cursor.table.pager.get(parent_page_num)?;
        {
            let mut parent = pager::lock(&parent_page)?;
            update_internal_key(&mut parent, old_max, new_max)?;
        }
        internal_insert(cursor.table, parent_page_num, new_page_num)
    }
}

/// Handle splitting the root: the old root is copied to a fresh page
/// (becoming the left child) and page 0 is reinitialized as an internal
/// node with two children.
fn create_new_root(table: &mut Table, right_page_num: u32) -> Result<(), Error> {
    let root_page = table.pager.get(table.root_page_num)?;
    let right_page = table.pager.get(right_page_num)?;
    let left_page_num = table.pager.unallocated_page_num();
    let left_page = table.pager.get(left_page_num)?;

    let mut root = pager::lock(&root_page)?;
    let mut left = pager::lock(&left_page)?;
    let mut right = pager::lock(&right_page)?;

    left.data.copy_from_slice(&root.data);
    left.set_root(false);

    root.init_internal();
    root.set_root(true);
    root.set_internal_num_keys(1);
    root.set_internal_child(0, left_page_num)?;
    root.set_internal_key(0, left.max_key()?)?;
    root.set_internal_right_child(right_page_num);

    left.set_parent(table.root_page_num);
    right.set_parent(table.root_page_num);

    debug!(
        left = left_page_num,
        right = right_page_num,
        "Created new root"
    );
    Ok(())
}

/// Add a child/key pair for `child_page_num` to the internal node at
/// `parent_page_num`.
fn internal_insert(table: &mut Table, parent_page_num: u32, child_page_num: u32) -> Result<(), Error> {
    let parent_page = table.pager.get(parent_page_num)?;
    let child_page = table.pager.get(child_page_num)?;
    let child_max = pager::lock(&child_page)?.max_key()?;

    let (index, old_num_keys, right_child_page_num) = {
        let parent = pager::lock(&parent_page)?;
        (
            parent.internal_find_child(child_max)?,
            parent.internal_num_keys(),
            parent.internal_right_child(),
        )
    };

    if old_num_keys as usize >= INTERNAL_MAX_CELLS {
        return Err(err!(
            Storage,
            "Split of internal node is not implemented (num_keys={})",
            old_num_keys
        ));
    }

    let right_child_page = table.pager.get(right_child_page_num)?;
    let right_child_max = pager::lock(&right_child_page)?.max_key()?;

    let mut parent = pager::lock(&parent_page)?;
    parent.set_internal_num_keys(old_num_keys + 1);

    if child_max > right_child_max {
        // The new child becomes the rightmost; the old right child moves
        // into the cell array with its own max key.
        parent.set_internal_child(old_num_keys, right_child_page_num)?;
        parent.set_internal_key(old_num_keys, right_child_max)?;
        parent.set_internal_right_child(child_page_num);
    } else {
        // Shift cells right to open a slot for the new child.
        for i in ((index + 1)..=old_num_keys).rev() {
            let cell = parent.internal_cell(i - 1)?;
            parent.set_internal_cell(i, &cell)?;
        }
        parent.set_internal_child(index, child_page_num)?;
        parent.set_internal_key(index, child_max)?;
    }
    Ok(())
}

/// Rewrite the parent key that tracked `old_key` after its child's max
/// key changed. The rightmost child has no key entry in the parent, so
/// there is nothing to rewrite for it.
fn update_internal_key(node: &mut Page, old_key: u32, new_key: u32) -> Result<(), Error> {
    let index = node.internal_find_child(old_key)?;
    if index < node.internal_num_keys() {
        node.set_internal_key(index, new_key)?;
    }
    Ok(())
}

/// Render the tree below `page_num` for the `#btree` meta-command.
pub fn format_tree(pager: &mut Pager, page_num: u32, indent_level: u32) -> Result<String, Error> {
    let indent = "  ".repeat(indent_level as usize);
    let mut out = String::new();

    let page = pager.get(page_num)?;
    let node = pager::lock(&page)?;

    match node.node_type()? {
        NodeType::Leaf => {
            let num_cells = node.leaf_num_cells();
            out.push_str(&format!("{}- Leaf num of cells: {}\n", indent, num_cells));
            for i in 0..num_cells {
                out.push_str(&format!(
                    "{}  - (Leaf cell num: {}, key: {})\n",
                    indent,
                    i,
                    node.leaf_key(i)?
                ));
            }
        }
        NodeType::Internal => {
            let num_keys = node.internal_num_keys();
            let mut children = Vec::with_capacity(num_keys as usize + 1);
            let mut keys = Vec::with_capacity(num_keys as usize);
            for i in 0..num_keys {
                children.push(node.internal_child(i)?);
                keys.push(node.internal_key(i)?);
            }
            let right_child = node.internal_right_child();
            drop(node);

            out.push_str(&format!("{}- Internal num of cells: {}\n", indent, num_keys));
            for (i, (child, key)) in children.iter().zip(&keys).enumerate() {
                out.push_str(&format_tree(pager, *child, indent_level + 1)?);
                out.push_str(&format!(
                    "{}  - (Internal cell num: {}, key: {})\n",
                    indent, i, key
                ));
            }
            out.push_str(&format_tree(pager, right_child, indent_level + 1)?);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_constants() {
        assert_eq!(COMMON_NODE_HEADER_SIZE, 6);
        assert_eq!(LEAF_NODE_HEADER_SIZE, 14);
        assert_eq!(LEAF_NODE_CELL_SIZE, 296);
        assert_eq!(LEAF_MAX_CELLS, 13);
        assert_eq!(LEAF_LEFT_SPLIT_COUNT, 7);
        assert_eq!(LEAF_RIGHT_SPLIT_COUNT, 7);
        assert_eq!(INTERNAL_NODE_HEADER_SIZE, 14);
        assert_eq!(INTERNAL_MAX_CELLS, 510);
    }

    #[test]
    fn test_init_leaf() {
        let mut page = Page::new();
        page.data.fill(0xFF);
        page.init_leaf();

        assert_eq!(page.node_type().unwrap(), NodeType::Leaf);
        assert!(!page.is_root());
        assert_eq!(page.leaf_num_cells(), 0);
        assert_eq!(page.leaf_next_leaf(), 0);
    }

    #[test]
    fn test_leaf_cell_round_trip() {
        let mut page = Page::new();
        page.init_leaf();

        page.set_leaf_key(0, 42).unwrap();
        let row = crate::storage::row::Row::new(42, "alice", "alice@example.com");
        row.serialize(page.leaf_value_mut(0).unwrap());
        page.set_leaf_num_cells(1);

        assert_eq!(page.leaf_key(0).unwrap(), 42);
        let decoded = crate::storage::row::Row::deserialize(page.leaf_value(0).unwrap());
        assert_eq!(decoded, row);
    }

    #[test]
    fn test_leaf_cell_out_of_bounds() {
        let page = Page::new();
        assert!(page.leaf_cell(LEAF_MAX_CELLS as u32).is_err());
    }

    #[test]
    fn test_leaf_find() {
        let mut page = Page::new();
        page.init_leaf();
        for (i, key) in [10u32, 20, 30].iter().enumerate() {
            page.set_leaf_key(i as u32, *key).unwrap();
        }
        page.set_leaf_num_cells(3);

        assert_eq!(page.leaf_find(5).unwrap(), 0);
        assert_eq!(page.leaf_find(10).unwrap(), 0);
        assert_eq!(page.leaf_find(20).unwrap(), 1);
        assert_eq!(page.leaf_find(25).unwrap(), 2);
        assert_eq!(page.leaf_find(40).unwrap(), 3);
    }

    #[test]
    fn test_internal_child_resolution() {
        let mut page = Page::new();
        page.init_internal();
        page.set_internal_num_keys(2);
        page.set_internal_child(0, 3).unwrap();
        page.set_internal_key(0, 7).unwrap();
        page.set_internal_child(1, 4).unwrap();
        page.set_internal_key(1, 15).unwrap();
        page.set_internal_right_child(5);

        assert_eq!(page.internal_child(0).unwrap(), 3);
        assert_eq!(page.internal_child(1).unwrap(), 4);
        assert_eq!(page.internal_child(2).unwrap(), 5);
        assert!(page.internal_child(3).is_err());
    }

    #[test]
    fn test_internal_find_child() {
        let mut page = Page::new();
        page.init_internal();
        page.set_internal_num_keys(2);
        page.set_internal_child(0, 3).unwrap();
        page.set_internal_key(0, 7).unwrap();
        page.set_internal_child(1, 4).unwrap();
        page.set_internal_key(1, 15).unwrap();
        page.set_internal_right_child(5);

        assert_eq!(page.internal_find_child(1).unwrap(), 0);
        assert_eq!(page.internal_find_child(7).unwrap(), 0);
        assert_eq!(page.internal_find_child(8).unwrap(), 1);
        assert_eq!(page.internal_find_child(99).unwrap(), 2);
    }

    #[test]
    fn test_max_key() {
        let mut leaf = Page::new();
        leaf.init_leaf();
        leaf.set_leaf_key(0, 1).unwrap();
        leaf.set_leaf_key(1, 9).unwrap();
        leaf.set_leaf_num_cells(2);
        assert_eq!(leaf.max_key().unwrap(), 9);

        let mut internal = Page::new();
        internal.init_internal();
        internal.set_internal_num_keys(1);
        internal.set_internal_child(0, 1).unwrap();
        internal.set_internal_key(0, 21).unwrap();
        assert_eq!(internal.max_key().unwrap(), 21);

        let empty = {
            let mut p = Page::new();
            p.init_leaf();
            p
        };
        assert!(empty.max_key().is_err());
    }

    #[test]
    fn test_invalid_node_type() {
        let mut page = Page::new();
        page.data[0] = 9;
        assert!(page.node_type().is_err());
    }
}
