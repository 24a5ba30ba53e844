//! Defines the HeapFile structure: an unordered collection of tuples stored in
//! consecutive pages of one file.

use crate::api::{DbFile, FileId, PageId, StorageError};
use crate::disk_manager::DiskManager;
use crate::tuple::TupleDesc;
use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};
use std::io;
use std::path::Path;
use tracing::debug;

/// A heap file. Pages are numbered from zero; page contents are only ever
/// read and written through a storage manager.
#[derive(Debug)]
pub struct HeapFile {
    id: FileId,
    desc: TupleDesc,
    disk_manager: DiskManager,
}

impl HeapFile {
    /// Opens the heap file at `path`, creating it if it does not exist.
    ///
    /// The file id is derived from the canonical path, so reopening the same
    /// file yields the same id.
    pub fn open(path: impl AsRef<Path>, desc: TupleDesc, direct_io: bool) -> io::Result<Self> {
        let disk_manager = DiskManager::new(path.as_ref(), direct_io)?;
        let canonical = std::fs::canonicalize(path.as_ref())?;
        let mut hasher = FxHasher::default();
        canonical.hash(&mut hasher);

        let id = FileId(hasher.finish());
        debug!(file_id = %id, path = %canonical.display(), num_pages = disk_manager.num_pages(), "opened heap file");
        Ok(Self {
            id,
            desc,
            disk_manager,
        })
    }

    pub fn path(&self) -> &Path {
        self.disk_manager.path()
    }

    /// Reads page `page_no` into `data`.
    pub fn read_page(&self, page_no: usize, data: &mut [u8]) -> Result<(), StorageError> {
        self.check_range(page_no)?;
        self.disk_manager.read_page(page_no, data)?;
        Ok(())
    }

    pub fn write_page(&self, page_no: usize, data: &[u8]) -> Result<(), StorageError> {
        self.check_range(page_no)?;
        self.disk_manager.write_page(page_no, data)?;
        Ok(())
    }

    /// Reserves the next page number. The page is empty until written.
    pub fn allocate_page(&self) -> usize {
        self.disk_manager.allocate_page()
    }

    /// Forces written pages to stable storage.
    pub fn sync(&self) -> Result<(), StorageError> {
        self.disk_manager.sync()?;
        Ok(())
    }

    fn check_range(&self, page_no: usize) -> Result<(), StorageError> {
        let num_pages = self.num_pages();
        if page_no >= num_pages {
            return Err(StorageError::PageOutOfRange {
                page_id: PageId::new(self.id, page_no),
                num_pages,
            });
        }
        Ok(())
    }
}

impl DbFile for HeapFile {
    fn id(&self) -> FileId {
        self.id
    }

    fn num_pages(&self) -> usize {
        self.disk_manager.num_pages()
    }

    fn tuple_desc(&self) -> &TupleDesc {
        &self.desc
    }
}
