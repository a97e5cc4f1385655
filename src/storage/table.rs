//! Table lifecycle: binds a pager to the root page of the B+tree.
use std::path::Path;

use tracing::info;

use super::btree::NodeType;
use super::pager::{self, Pager};
use crate::errors::Error;

/// Page size 4 kilobytes because it's the same size as a page used in
/// the virtual memory systems of most computer architectures.
pub const PAGE_SIZE: usize = 4096;

/// Hard cap on the database size, in pages.
pub const TABLE_MAX_PAGES: usize = 100;

pub struct Table {
    pub root_page_num: u32,
    pub pager: Pager,
}

impl Table {
    /// Open the database file behind a pager. An empty file gets page 0
    /// initialized as an empty root leaf.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let mut pager = Pager::open(path)?;

        if pager.num_pages() == 0 {
            let page = pager.get(0)?;
            let mut root = pager::lock(&page)?;
            root.init_leaf();
            root.set_root(true);
            info!("Initialized empty DB with a root leaf node");
        }

        Ok(Table {
            root_page_num: 0,
            pager,
        })
    }

    /// Flush the page cache to disk and release it. The file handle
    /// closes when the table is dropped.
    pub fn close(mut self) -> Result<(), Error> {
        self.pager.close()?;
        info!("Closed table");
        Ok(())
    }

    /// Node kind of the current root page.
    pub fn root_node_type(&mut self) -> Result<NodeType, Error> {
        let root_page_num = self.root_page_num;
        let page = self.pager.get(root_page_num)?;
        let node = pager::lock(&page)?;
        node.node_type()
    }
}
