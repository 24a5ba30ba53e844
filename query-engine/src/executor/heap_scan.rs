//! Sequential scan over a heap file.
//!
//! Iterates through all tuples in a file by requesting its pages in order
//! from the storage manager.

use super::{Lookahead, OpIterator};
use crate::Result;
use common::api::{DbFile, PageId, Permission, StorageManager, TransactionId};
use common::tuple::{Tuple, TupleDesc};
use std::sync::Arc;
use std::vec;
use tracing::debug;

/// Position of a scan within its file.
struct PageCursor {
    file: Arc<dyn DbFile>,
    storage: Arc<dyn StorageManager>,
    tid: TransactionId,
    page_no: usize,
    // `None` while closed, and while open over a file with no pages.
    tuples: Option<vec::IntoIter<Tuple>>,
}

impl PageCursor {
    fn open(&mut self) -> Result<()> {
        self.page_no = 0;
        self.tuples = None;
        if self.file.num_pages() > 0 {
            self.load_page(0)?;
        }
        Ok(())
    }

    fn load_page(&mut self, page_no: usize) -> Result<()> {
        let page_id = PageId::new(self.file.id(), page_no);
        let page = self
            .storage
            .get_page(self.tid, page_id, Permission::ReadOnly)?;
        self.page_no = page_no;
        self.tuples = Some(page.into_iter());
        Ok(())
    }

    /// Returns the next tuple of the current page, moving on to later pages
    /// as the current one runs dry. Empty pages are skipped.
    fn read_next(&mut self) -> Result<Option<Tuple>> {
        loop {
            let Some(tuples) = self.tuples.as_mut() else {
                return Ok(None);
            };
            if let Some(tuple) = tuples.next() {
                return Ok(Some(tuple));
            }
            if self.page_no + 1 >= self.file.num_pages() {
                return Ok(None);
            }
            self.load_page(self.page_no + 1)?;
        }
    }

    fn close(&mut self) {
        self.tuples = None;
    }
}

/// Sequential scan executor.
///
/// Surfaces every tuple of every page exactly once, in ascending page order
/// and slot order within a page. Pages are always requested read-only.
pub struct HeapScan {
    lookahead: Lookahead,
    cursor: PageCursor,
}

impl HeapScan {
    /// Creates a scan of `file` on behalf of `tid`.
    pub fn new(
        tid: TransactionId,
        file: Arc<dyn DbFile>,
        storage: Arc<dyn StorageManager>,
    ) -> Self {
        Self {
            lookahead: Lookahead::new(),
            cursor: PageCursor {
                file,
                storage,
                tid,
                page_no: 0,
                tuples: None,
            },
        }
    }

    /// Page number the scan is currently positioned on.
    pub fn current_page(&self) -> usize {
        self.cursor.page_no
    }
}

impl OpIterator for HeapScan {
    fn open(&mut self) -> Result<()> {
        debug!(file_id = %self.cursor.file.id(), tid = %self.cursor.tid, "opening heap scan");
        self.cursor.open()?;
        self.lookahead.open();
        Ok(())
    }

    fn has_next(&mut self) -> Result<bool> {
        let cursor = &mut self.cursor;
        self.lookahead.has_next(|| cursor.read_next())
    }

    fn next(&mut self) -> Result<Tuple> {
        let cursor = &mut self.cursor;
        self.lookahead.next(|| cursor.read_next())
    }

    fn rewind(&mut self) -> Result<()> {
        self.lookahead.ensure_open()?;
        debug!(file_id = %self.cursor.file.id(), page_no = self.cursor.page_no, "rewinding heap scan");
        self.close();
        self.open()
    }

    fn close(&mut self) {
        self.cursor.close();
        self.lookahead.close();
    }

    fn tuple_desc(&self) -> &TupleDesc {
        self.cursor.file.tuple_desc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::collect;
    use crate::QueryError;
    use common::api::{FileId, StorageError};
    use common::page::HeapPage;
    use common::tuple::{Field, Type};
    use std::sync::Mutex;

    /// An in-memory file that is also its own storage manager.
    struct PagedFile {
        desc: TupleDesc,
        pages: Vec<Vec<i32>>,
        requests: Mutex<Vec<(usize, Permission)>>,
        deny_page: Option<usize>,
    }

    impl PagedFile {
        fn new(pages: Vec<Vec<i32>>) -> Arc<Self> {
            Arc::new(Self {
                desc: TupleDesc::new([("v", Type::Int)]),
                pages,
                requests: Mutex::new(Vec::new()),
                deny_page: None,
            })
        }

        fn denying(pages: Vec<Vec<i32>>, page_no: usize) -> Arc<Self> {
            Arc::new(Self {
                desc: TupleDesc::new([("v", Type::Int)]),
                pages,
                requests: Mutex::new(Vec::new()),
                deny_page: Some(page_no),
            })
        }

        fn requested_pages(&self) -> Vec<usize> {
            self.requests.lock().unwrap().iter().map(|(p, _)| *p).collect()
        }
    }

    impl DbFile for PagedFile {
        fn id(&self) -> FileId {
            FileId(1)
        }

        fn num_pages(&self) -> usize {
            self.pages.len()
        }

        fn tuple_desc(&self) -> &TupleDesc {
            &self.desc
        }
    }

    impl StorageManager for PagedFile {
        fn get_page(
            &self,
            tid: TransactionId,
            page_id: PageId,
            permission: Permission,
        ) -> std::result::Result<HeapPage, StorageError> {
            self.requests.lock().unwrap().push((page_id.page_no, permission));
            if self.deny_page == Some(page_id.page_no) {
                return Err(StorageError::TransactionAborted { tid, page_id });
            }
            let tuples = self.pages[page_id.page_no]
                .iter()
                .map(|&v| Tuple::new(vec![Field::Int(v)]))
                .collect();
            Ok(HeapPage::from_tuples(page_id, tuples))
        }
    }

    fn scan(file: &Arc<PagedFile>) -> HeapScan {
        HeapScan::new(TransactionId::new(), file.clone(), file.clone())
    }

    fn values(tuples: &[Tuple]) -> Vec<i32> {
        tuples
            .iter()
            .map(|t| t.field(0).and_then(Field::as_int).unwrap())
            .collect()
    }

    #[test]
    fn test_scan_visits_pages_in_order() {
        let file = PagedFile::new(vec![vec![1, 2], vec![3], vec![4, 5, 6]]);
        let mut heap_scan = scan(&file);

        let tuples = collect(&mut heap_scan).unwrap();

        assert_eq!(values(&tuples), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(file.requested_pages(), vec![0, 1, 2]);
        assert!(file
            .requests
            .lock()
            .unwrap()
            .iter()
            .all(|(_, perm)| *perm == Permission::ReadOnly));
    }

    #[test]
    fn test_scan_skips_empty_pages() {
        let file = PagedFile::new(vec![vec![], vec![1], vec![], vec![], vec![2]]);
        let tuples = collect(&mut scan(&file)).unwrap();
        assert_eq!(values(&tuples), vec![1, 2]);
    }

    #[test]
    fn test_scan_of_file_without_pages() {
        let file = PagedFile::new(vec![]);
        let mut heap_scan = scan(&file);
        heap_scan.open().unwrap();
        assert!(!heap_scan.has_next().unwrap());
        assert!(matches!(heap_scan.next(), Err(QueryError::NoSuchElement)));
        assert!(file.requested_pages().is_empty());
    }

    #[test]
    fn test_rewind_reproduces_sequence() {
        let file = PagedFile::new(vec![vec![1, 2], vec![3, 4]]);
        let mut heap_scan = scan(&file);
        heap_scan.open().unwrap();

        let mut first = Vec::new();
        while heap_scan.has_next().unwrap() {
            first.push(heap_scan.next().unwrap());
        }
        heap_scan.rewind().unwrap();
        assert_eq!(heap_scan.current_page(), 0);
        let mut second = Vec::new();
        while heap_scan.has_next().unwrap() {
            second.push(heap_scan.next().unwrap());
        }

        assert_eq!(first, second);
        assert_eq!(values(&second), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_calls_out_of_order() {
        let file = PagedFile::new(vec![vec![1]]);
        let mut heap_scan = scan(&file);

        assert!(matches!(heap_scan.next(), Err(QueryError::IllegalState(_))));
        assert!(matches!(heap_scan.rewind(), Err(QueryError::IllegalState(_))));

        heap_scan.open().unwrap();
        heap_scan.close();
        assert!(matches!(heap_scan.has_next(), Err(QueryError::IllegalState(_))));

        // Reopening after close is allowed.
        heap_scan.open().unwrap();
        assert_eq!(heap_scan.next().unwrap().fields(), &[Field::Int(1)]);
    }

    #[test]
    fn test_denied_page_propagates_unchanged() {
        let file = PagedFile::denying(vec![vec![1], vec![2]], 1);
        let mut heap_scan = scan(&file);
        heap_scan.open().unwrap();

        assert_eq!(heap_scan.next().unwrap().fields(), &[Field::Int(1)]);
        let err = heap_scan.next().unwrap_err();
        assert!(matches!(
            err,
            QueryError::Storage(StorageError::TransactionAborted { page_id, .. }) if page_id.page_no == 1
        ));
        // No retry: exactly one request for the denied page.
        assert_eq!(file.requested_pages(), vec![0, 1]);
    }

    #[test]
    fn test_denied_first_page_fails_open() {
        let file = PagedFile::denying(vec![vec![1]], 0);
        let mut heap_scan = scan(&file);
        assert!(matches!(heap_scan.open(), Err(QueryError::Storage(_))));
        assert!(matches!(heap_scan.has_next(), Err(QueryError::IllegalState(_))));
    }
}
