//! Defines the storage API consumed by the query engine.
//!
//! The query engine never touches frames or files directly: it asks a
//! [`StorageManager`] for a page by identity and walks the decoded tuples.
use crate::page::HeapPage;
use crate::tuple::{CodecError, TupleDesc};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// The size of a single page in bytes.
pub const PAGE_SIZE: usize = 4096;

/// Identifies a file known to the storage manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub u64);

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// A unique identifier for a page: the owning file plus a zero-based page number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageId {
    pub file_id: FileId,
    pub page_no: usize,
}

impl PageId {
    pub fn new(file_id: FileId, page_no: usize) -> Self {
        Self { file_id, page_no }
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file_id, self.page_no)
    }
}

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies the transaction on whose behalf pages are requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(u64);

impl TransactionId {
    /// Allocates a fresh, process-unique transaction id.
    pub fn new() -> Self {
        Self(NEXT_TRANSACTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx{}", self.0)
    }
}

/// The intent accompanying a page request. Decides the lock mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    ReadOnly,
    ReadWrite,
}

/// A specialized error type for storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Returned when the pool is full and no frame can be evicted.
    #[error("buffer pool has no free frames")]
    NoFreeFrames,
    /// The request conflicts with a lock held by another transaction.
    #[error("transaction {tid} aborted: page {page_id} is locked by another transaction")]
    TransactionAborted { tid: TransactionId, page_id: PageId },
    #[error("file {0} is not registered with the storage manager")]
    UnknownFile(FileId),
    #[error("page {page_id} is out of range, file has {num_pages} pages")]
    PageOutOfRange { page_id: PageId, num_pages: usize },
    #[error("page {page_id} is corrupt")]
    CorruptPage {
        page_id: PageId,
        #[source]
        source: CodecError,
    },
    #[error("tuple does not match the file schema")]
    SchemaMismatch(#[source] CodecError),
    /// The record is larger than an empty page can hold.
    #[error("record of {0} bytes does not fit in a page")]
    RecordTooLarge(usize),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A page-organised file of tuples sharing one schema.
pub trait DbFile: Send + Sync {
    fn id(&self) -> FileId;

    /// Number of pages currently allocated to the file.
    fn num_pages(&self) -> usize;

    fn tuple_desc(&self) -> &TupleDesc;
}

/// The paged-storage manager.
///
/// Maps a page identity to its resident contents and decides, based on the
/// permission, whether the requesting transaction may see the page at all.
/// Implementations must be object-safe so operators can hold an
/// `Arc<dyn StorageManager>`.
pub trait StorageManager: Send + Sync {
    /// Returns a snapshot of the page's tuples.
    ///
    /// # Errors
    /// `TransactionAborted` when the page is locked incompatibly by another
    /// transaction, plus any I/O or decoding failure while loading the page.
    fn get_page(
        &self,
        tid: TransactionId,
        page_id: PageId,
        permission: Permission,
    ) -> Result<HeapPage, StorageError>;
}
