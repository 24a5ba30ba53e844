//! A fixed-size buffer pool serving heap-file pages to the query engine.
//!
//! Frames are guarded by individual `RwLock`s and replaced with the CLOCK
//! algorithm. Page requests carry a transaction id and a permission; the pool
//! grants page locks through a no-wait [`LockTable`].

mod lock_table;

pub use lock_table::LockTable;

use common::api::{
    DbFile, FileId, PageId, Permission, StorageError, StorageManager, TransactionId, PAGE_SIZE,
};
use common::heap_file::HeapFile;
use common::page::{HeapPage, SlottedPage, HEADER_SIZE, SLOT_SIZE};
use common::tuple::{RecordId, Tuple};
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, trace};

// Type alias for a frame index
type FrameId = usize;

/// Page-aligned frame memory, as `O_DIRECT` requires.
#[derive(Debug)]
#[repr(C, align(4096))]
struct PageBuf([u8; PAGE_SIZE]);

impl Deref for PageBuf {
    type Target = [u8; PAGE_SIZE];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for PageBuf {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// Represents a single frame in the buffer pool.
#[derive(Debug)]
struct Frame {
    page_id: Option<PageId>,
    data: Box<PageBuf>,
    is_dirty: bool,
    is_referenced: bool, // For the CLOCK replacer
}

impl Frame {
    fn empty() -> Self {
        Self {
            page_id: None,
            data: Box::new(PageBuf([0; PAGE_SIZE])),
            is_dirty: false,
            is_referenced: false,
        }
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// The buffer pool.
///
/// Lock order is always page table, then frame. The page table latch is held
/// for the whole of a page access, so a frame can never be re-targeted while
/// it is being read.
#[derive(Debug)]
pub struct BufferPool {
    frames: Vec<RwLock<Frame>>,
    page_table: RwLock<HashMap<PageId, FrameId>>,
    free_list: Mutex<Vec<FrameId>>,
    files: RwLock<HashMap<FileId, Arc<HeapFile>>>,
    locks: LockTable,
    pool_size: usize,
    // The "clock hand" for the CLOCK replacement algorithm.
    clock_hand: Mutex<usize>,
}

impl BufferPool {
    /// Creates a pool holding at most `pool_size` pages.
    ///
    /// # Panics
    /// If `pool_size` is zero.
    pub fn new(pool_size: usize) -> Self {
        assert!(pool_size > 0, "buffer pool needs at least one frame");
        let frames = (0..pool_size).map(|_| RwLock::new(Frame::empty())).collect();
        // Reversed so frames are handed out in ascending order.
        let free_list = (0..pool_size).rev().collect();

        Self {
            frames,
            page_table: RwLock::new(HashMap::new()),
            free_list: Mutex::new(free_list),
            files: RwLock::new(HashMap::new()),
            locks: LockTable::new(),
            pool_size,
            clock_hand: Mutex::new(0),
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Makes a heap file's pages reachable through this pool.
    pub fn register_file(&self, file: Arc<HeapFile>) {
        debug!(file_id = %file.id(), path = %file.path().display(), "registering heap file");
        write(&self.files).insert(file.id(), file);
    }

    pub fn file(&self, file_id: FileId) -> Result<Arc<HeapFile>, StorageError> {
        read(&self.files)
            .get(&file_id)
            .cloned()
            .ok_or(StorageError::UnknownFile(file_id))
    }

    /// Inserts a tuple on behalf of `tid`, filling existing pages before
    /// appending a new one.
    pub fn insert_tuple(
        &self,
        tid: TransactionId,
        file_id: FileId,
        tuple: &Tuple,
    ) -> Result<RecordId, StorageError> {
        let file = self.file(file_id)?;
        let record = tuple
            .serialize(file.tuple_desc())
            .map_err(StorageError::SchemaMismatch)?;
        if record.len() + SLOT_SIZE > PAGE_SIZE - HEADER_SIZE {
            return Err(StorageError::RecordTooLarge(record.len()));
        }

        for page_no in 0..file.num_pages() {
            let page_id = PageId::new(file_id, page_no);
            let held_before = self.locks.holds_lock(tid, page_id);
            self.locks.acquire(tid, page_id, Permission::ReadWrite)?;
            let inserted = self.try_insert(&file, page_id, &record);
            if let Ok(Some(slot)) = inserted {
                return Ok(RecordId { page_id, slot });
            }
            if !held_before {
                self.locks.release(tid, page_id);
            }
            inserted?;
        }

        let page_id = self.new_page(&file)?;
        self.locks.acquire(tid, page_id, Permission::ReadWrite)?;
        let inserted = self.try_insert(&file, page_id, &record);
        if let Ok(Some(slot)) = inserted {
            return Ok(RecordId { page_id, slot });
        }
        self.locks.release(tid, page_id);
        inserted?;
        Err(StorageError::RecordTooLarge(record.len()))
    }

    fn try_insert(
        &self,
        file: &HeapFile,
        page_id: PageId,
        record: &[u8],
    ) -> Result<Option<u16>, StorageError> {
        self.with_frame(file, page_id, |frame| {
            let slot = SlottedPage::new(&mut frame.data[..]).insert_record(record);
            if slot.is_some() {
                frame.is_dirty = true;
            }
            Ok(slot)
        })
    }

    /// Releases the lock `tid` holds on `page_id`.
    pub fn release_page(&self, tid: TransactionId, page_id: PageId) {
        self.locks.release(tid, page_id);
    }

    /// Ends a transaction: releases every page lock it holds.
    pub fn transaction_complete(&self, tid: TransactionId) {
        debug!(%tid, "transaction complete");
        self.locks.release_all(tid);
    }

    pub fn holds_lock(&self, tid: TransactionId, page_id: PageId) -> bool {
        self.locks.holds_lock(tid, page_id)
    }

    /// Writes a page back to its file if it is resident and dirty.
    pub fn flush_page(&self, page_id: PageId) -> Result<(), StorageError> {
        let page_table = read(&self.page_table);
        if let Some(&frame_id) = page_table.get(&page_id) {
            let mut frame = write(&self.frames[frame_id]);
            self.write_back(&mut frame)?;
        }
        Ok(())
    }

    /// Flushes all dirty pages in the buffer pool to disk, then syncs every
    /// registered file.
    pub fn flush_all_pages(&self) -> Result<(), StorageError> {
        let page_table = read(&self.page_table);
        for &frame_id in page_table.values() {
            let mut frame = write(&self.frames[frame_id]);
            self.write_back(&mut frame)?;
        }
        drop(page_table);
        for file in read(&self.files).values() {
            file.sync()?;
        }
        Ok(())
    }

    fn write_back(&self, frame: &mut Frame) -> Result<(), StorageError> {
        if let (true, Some(page_id)) = (frame.is_dirty, frame.page_id) {
            trace!(%page_id, "writing back dirty page");
            self.file(page_id.file_id)?
                .write_page(page_id.page_no, &frame.data[..])?;
            frame.is_dirty = false;
        }
        Ok(())
    }

    /// Runs `f` against the frame holding `page_id`, loading it on a miss.
    fn with_frame<R>(
        &self,
        file: &HeapFile,
        page_id: PageId,
        f: impl FnOnce(&mut Frame) -> Result<R, StorageError>,
    ) -> Result<R, StorageError> {
        let mut page_table = write(&self.page_table);
        let frame_id = match page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => {
                let frame_id = self.claim_frame(&mut page_table)?;
                let mut frame = write(&self.frames[frame_id]);
                if let Err(e) = file.read_page(page_id.page_no, &mut frame.data[..]) {
                    self.release_frame(frame_id, &mut frame);
                    return Err(e);
                }
                trace!(%page_id, frame_id, "loaded page");
                frame.page_id = Some(page_id);
                page_table.insert(page_id, frame_id);
                frame_id
            }
        };

        let mut frame = write(&self.frames[frame_id]);
        frame.is_referenced = true;
        f(&mut frame)
    }

    /// Appends an empty page to `file` and makes it resident.
    fn new_page(&self, file: &HeapFile) -> Result<PageId, StorageError> {
        let mut page_table = write(&self.page_table);
        let frame_id = self.claim_frame(&mut page_table)?;
        let mut frame = write(&self.frames[frame_id]);

        let page_id = PageId::new(file.id(), file.allocate_page());
        SlottedPage::new(&mut frame.data[..]).init();
        frame.page_id = Some(page_id);
        frame.is_dirty = true; // New page is immediately dirty.
        frame.is_referenced = true;
        page_table.insert(page_id, frame_id);

        debug!(%page_id, "allocated new heap page");
        Ok(page_id)
    }

    /// Picks a frame and empties it, writing back its old page if dirty.
    fn claim_frame(
        &self,
        page_table: &mut HashMap<PageId, FrameId>,
    ) -> Result<FrameId, StorageError> {
        let frame_id = self.find_victim_frame()?;
        let mut frame = write(&self.frames[frame_id]);
        // On failure the frame keeps its page and stays mapped.
        self.write_back(&mut frame)?;
        if let Some(old_page_id) = frame.page_id.take() {
            trace!(page_id = %old_page_id, frame_id, "evicting page");
            page_table.remove(&old_page_id);
        }
        frame.is_referenced = false;
        Ok(frame_id)
    }

    fn release_frame(&self, frame_id: FrameId, frame: &mut Frame) {
        frame.page_id = None;
        frame.is_dirty = false;
        self.free_list
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(frame_id);
    }

    /// Finds a victim frame using the free list or the CLOCK algorithm.
    fn find_victim_frame(&self) -> Result<FrameId, StorageError> {
        // 1. Try to get a frame from the free list.
        let mut free_list = self.free_list.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(frame_id) = free_list.pop() {
            return Ok(frame_id);
        }
        drop(free_list);

        // 2. If free list is empty, run the CLOCK algorithm.
        let mut clock_hand = self.clock_hand.lock().unwrap_or_else(PoisonError::into_inner);
        for _ in 0..(2 * self.pool_size) {
            // Search twice to avoid infinite loop
            let frame_id = *clock_hand;
            *clock_hand = (*clock_hand + 1) % self.pool_size;

            // A frame somebody else is using is skipped.
            if let Ok(mut frame) = self.frames[frame_id].try_write() {
                if frame.is_referenced {
                    // Give it a second chance.
                    frame.is_referenced = false;
                } else {
                    return Ok(frame_id);
                }
            }
        }

        Err(StorageError::NoFreeFrames)
    }
}

impl StorageManager for BufferPool {
    fn get_page(
        &self,
        tid: TransactionId,
        page_id: PageId,
        permission: Permission,
    ) -> Result<HeapPage, StorageError> {
        trace!(%tid, %page_id, ?permission, "page request");
        let file = self.file(page_id.file_id)?;
        let held_before = self.locks.holds_lock(tid, page_id);
        self.locks.acquire(tid, page_id, permission)?;
        let page = self.with_frame(&file, page_id, |frame| {
            HeapPage::decode(page_id, file.tuple_desc(), &frame.data[..])
        });
        // A failed request leaves no new lock behind.
        if page.is_err() && !held_before {
            self.locks.release(tid, page_id);
        }
        page
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::tuple::{Field, Type, TupleDesc};

    fn open_file(dir: &tempfile::TempDir, name: &str) -> Arc<HeapFile> {
        let desc = TupleDesc::new([("id", Type::Int)]);
        Arc::new(HeapFile::open(dir.path().join(name), desc, false).unwrap())
    }

    #[test]
    fn test_unknown_file_is_rejected() {
        let pool = BufferPool::new(2);
        let tid = TransactionId::new();
        let err = pool
            .get_page(tid, PageId::new(FileId(99), 0), Permission::ReadOnly)
            .unwrap_err();
        assert!(matches!(err, StorageError::UnknownFile(FileId(99))));
    }

    #[test]
    fn test_insert_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let file = open_file(&dir, "pool_insert.db");
        let pool = BufferPool::new(2);
        pool.register_file(file.clone());
        let tid = TransactionId::new();

        let rid = pool
            .insert_tuple(tid, file.id(), &Tuple::new(vec![Field::Int(42)]))
            .unwrap();
        assert_eq!(rid.page_id, PageId::new(file.id(), 0));
        assert_eq!(rid.slot, 0);

        let page = pool.get_page(tid, rid.page_id, Permission::ReadOnly).unwrap();
        assert_eq!(page.num_tuples(), 1);
        assert_eq!(page.iter().next().unwrap().fields(), &[Field::Int(42)]);
    }

    #[test]
    fn test_eviction_writes_back_dirty_pages() {
        let dir = tempfile::tempdir().unwrap();
        let file = open_file(&dir, "pool_evict.db");
        let pool = BufferPool::new(1);
        pool.register_file(file.clone());
        let tid = TransactionId::new();

        let per_page = HeapPage::tuples_per_page(file.tuple_desc());
        for i in 0..(per_page * 3) as i32 {
            pool.insert_tuple(tid, file.id(), &Tuple::new(vec![Field::Int(i)]))
                .unwrap();
        }
        assert_eq!(file.num_pages(), 3);

        // Only one frame: every page below was evicted and re-read at least once.
        let mut seen = 0;
        for page_no in 0..3 {
            let page = pool
                .get_page(tid, PageId::new(file.id(), page_no), Permission::ReadOnly)
                .unwrap();
            seen += page.num_tuples();
        }
        assert_eq!(seen, per_page * 3);
    }
}
