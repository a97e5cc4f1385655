//! The pager owns the database file handle and a fixed-capacity cache of
//! page buffers. Pages are loaded lazily on first access and written back
//! on [`Pager::flush`] / [`Pager::close`]; between those points the cached
//! buffer is the authoritative copy.
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, trace};

use super::table::{PAGE_SIZE, TABLE_MAX_PAGES};
use crate::errors::Error;

/// One 4 KiB page: the unit of file I/O and of one B+tree node.
pub struct Page {
    pub data: [u8; PAGE_SIZE],
}

impl Page {
    pub fn new() -> Self {
        Page {
            data: [0u8; PAGE_SIZE],
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Page::new()
    }
}

/// A cache slot handle. Cloning is cheap; the buffer itself lives in the
/// pager until the table closes.
pub type SharedPage = Arc<Mutex<Page>>;

/// Lock a page for access, surfacing poisoning as a storage-level error.
pub fn lock(page: &SharedPage) -> Result<MutexGuard<'_, Page>, Error> {
    page.lock().map_err(|_| err!(LockPage, "Page lock poisoned"))
}

pub struct Pager {
    file: File,
    file_length: u64,
    num_pages: u32,
    pages: heapless::Vec<Option<SharedPage>, TABLE_MAX_PAGES>,
}

impl Pager {
    /// Opens or creates the database file and prepares an empty cache.
    ///
    /// # Arguments
    /// - `path`: Location of the database file.
    ///
    /// # Errors
    /// Returns an `Error::Io` if the file cannot be opened or its size
    /// cannot be read, and an `Error::Corrupt` if the file length is not
    /// a whole number of pages (the file was not produced by this engine
    /// or was truncated mid-write).
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let mut options = OpenOptions::new();
        options.read(true).write(true).create(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o755);
        }
        let file = options.open(path.as_ref())?;

        let file_length = file.metadata()?.len();
        if file_length % PAGE_SIZE as u64 != 0 {
            return Err(err!(
                Corrupt,
                "DB file does not contain a whole number of pages (length {})",
                file_length
            ));
        }

        let num_pages = (file_length / PAGE_SIZE as u64) as u32;
        debug!(
            path = %path.as_ref().display(),
            file_length,
            num_pages,
            "Opened DB file"
        );

        Ok(Pager {
            file,
            file_length,
            num_pages,
            pages: heapless::Vec::new(),
        })
    }

    /// Number of pages in the logical file (cached pages included).
    pub fn num_pages(&self) -> u32 {
        self.num_pages
    }

    /// Page number for the next allocation. Pages are always appended;
    /// there is no free list.
    pub fn unallocated_page_num(&self) -> u32 {
        self.num_pages
    }

    /// Fetches a page, reading it from the file on first access.
    ///
    /// Requesting a page past the current end of the file grows the
    /// logical file; the physical growth happens on flush.
    ///
    /// # Arguments
    /// - `page_num`: The page to fetch.
    ///
    /// # Errors
    /// Returns an `Error::Storage` if `page_num` is past the page cap,
    /// and an `Error::Io` if an existing page cannot be read back from
    /// the file.
    pub fn get(&mut self, page_num: u32) -> Result<SharedPage, Error> {
        let slot = page_num as usize;
        if slot >= TABLE_MAX_PAGES {
            return Err(err!(
                Storage,
                "Page number out of bounds (page_num={}, max_pages={})",
                page_num,
                TABLE_MAX_PAGES
            ));
        }

        while self.pages.len() <= slot {
            self.pages
                .push(None)
                .map_err(|_| err!(Storage, "Page cache overflow"))?;
        }

        if self.pages[slot].is_none() {
            let mut page = Page::new();
            let pages_on_file = (self.file_length / PAGE_SIZE as u64) as u32;
            if page_num < pages_on_file {
                self.file
                    .seek(SeekFrom::Start(page_num as u64 * PAGE_SIZE as u64))?;
                self.file.read_exact(&mut page.data)?;
                trace!(page_num, "Read page from file");
            } else {
                trace!(page_num, "Allocated fresh page");
            }

            self.pages[slot] = Some(Arc::new(Mutex::new(page)));
            if page_num >= self.num_pages {
                self.num_pages = page_num + 1;
            }
        }

        self.pages[slot]
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(|| err!(Storage, "Page slot {} empty after install", page_num))
    }

    /// Writes one cached page back to the file and syncs it.
    ///
    /// # Errors
    /// Returns an `Error::Storage` if slot `page_num` holds no cached
    /// page, and an `Error::Io` if the seek, write or sync fails.
    pub fn flush(&mut self, page_num: u32) -> Result<(), Error> {
        let page = self
            .pages
            .get(page_num as usize)
            .and_then(|slot| slot.as_ref())
            .ok_or_else(|| err!(Storage, "Flush of empty page slot {}", page_num))?;
        let node = lock(page)?;

        self.file
            .seek(SeekFrom::Start(page_num as u64 * PAGE_SIZE as u64))?;
        self.file.write_all(&node.data)?;
        self.file.sync_all()?;
        trace!(page_num, "Flushed page");
        Ok(())
    }

    /// Flushes every cached page, releases the buffers and syncs the
    /// file. The file handle itself closes when the pager is dropped.
    ///
    /// # Errors
    /// Returns the first flush error encountered; later pages are not
    /// flushed after a failure.
    pub fn close(&mut self) -> Result<(), Error> {
        let mut flushed = 0u32;
        for page_num in 0..self.num_pages {
            let slot = page_num as usize;
            if slot < self.pages.len() && self.pages[slot].is_some() {
                self.flush(page_num)?;
                self.pages[slot] = None;
                flushed += 1;
            }
        }
        self.file.sync_all()?;
        debug!(flushed, "Closed pager");
        Ok(())
    }
}
