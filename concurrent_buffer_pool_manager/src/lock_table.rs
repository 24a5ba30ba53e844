//! Page-level shared/exclusive locks with no waiting: a conflicting request
//! aborts the requester instead of blocking.

use common::api::{PageId, Permission, StorageError, TransactionId};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct PageLock {
    shared: HashSet<TransactionId>,
    exclusive: Option<TransactionId>,
}

impl PageLock {
    fn is_free(&self) -> bool {
        self.shared.is_empty() && self.exclusive.is_none()
    }
}

#[derive(Debug, Default)]
pub struct LockTable {
    locks: Mutex<HashMap<PageId, PageLock>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<PageId, PageLock>> {
        // Every mutation below leaves the map consistent, so a poisoned guard is still usable.
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Grants `tid` a lock on `page_id` matching `permission`.
    ///
    /// A read-only request takes a shared lock, a read-write request an
    /// exclusive one. A transaction that already holds the exclusive lock is
    /// granted either mode; a sole shared holder may upgrade.
    pub fn acquire(
        &self,
        tid: TransactionId,
        page_id: PageId,
        permission: Permission,
    ) -> Result<(), StorageError> {
        let mut table = self.table();
        let lock = table.entry(page_id).or_default();

        let conflict = match (permission, lock.exclusive) {
            (_, Some(holder)) if holder == tid => false,
            (_, Some(_)) => true,
            (Permission::ReadOnly, None) => {
                lock.shared.insert(tid);
                false
            }
            (Permission::ReadWrite, None) => {
                if lock.shared.iter().any(|&holder| holder != tid) {
                    true
                } else {
                    lock.shared.remove(&tid);
                    lock.exclusive = Some(tid);
                    false
                }
            }
        };

        if conflict {
            if lock.is_free() {
                table.remove(&page_id);
            }
            tracing::warn!(%tid, %page_id, ?permission, "lock conflict, aborting request");
            return Err(StorageError::TransactionAborted { tid, page_id });
        }
        Ok(())
    }

    pub fn release(&self, tid: TransactionId, page_id: PageId) {
        let mut table = self.table();
        if let Some(lock) = table.get_mut(&page_id) {
            lock.shared.remove(&tid);
            if lock.exclusive == Some(tid) {
                lock.exclusive = None;
            }
            if lock.is_free() {
                table.remove(&page_id);
            }
        }
    }

    /// Releases every lock held by `tid`.
    pub fn release_all(&self, tid: TransactionId) {
        let mut table = self.table();
        table.retain(|_, lock| {
            lock.shared.remove(&tid);
            if lock.exclusive == Some(tid) {
                lock.exclusive = None;
            }
            !lock.is_free()
        });
    }

    pub fn holds_lock(&self, tid: TransactionId, page_id: PageId) -> bool {
        self.table()
            .get(&page_id)
            .map_or(false, |lock| lock.exclusive == Some(tid) || lock.shared.contains(&tid))
    }
}
