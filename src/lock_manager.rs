use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use tracing::trace;

use crate::{page::PageId, transaction::TransactionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// The lock held on one page.
/// An exclusive lock has exactly one holder; a lock with no holders is never kept.
#[derive(Debug)]
struct LockState {
    mode: LockMode,
    holders: HashSet<TransactionId>,
}

/// Page-level reader/writer lock registry.
///
/// Every operation runs under one mutex and answers immediately: `try_acquire`
/// grants or refuses, it never waits. Waiting and timeouts live in the buffer pool.
#[derive(Debug, Default)]
pub struct LockManager {
    lock_table: Mutex<HashMap<PageId, LockState>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to take `mode` on `pid` for `tid`.
    ///
    /// A sole shared holder is upgraded to exclusive whatever it asks for. A shared
    /// holder among several may re-take shared but is refused exclusive.
    pub fn try_acquire(&self, pid: PageId, tid: TransactionId, mode: LockMode) -> bool {
        let mut lock_table = self.lock_table.lock();
        let Some(state) = lock_table.get_mut(&pid) else {
            lock_table.insert(
                pid,
                LockState {
                    mode,
                    holders: HashSet::from([tid]),
                },
            );
            trace!(%tid, %pid, ?mode, "lock created");
            return true;
        };

        let current = state.mode;
        let granted = if state.holders.contains(&tid) {
            match current {
                LockMode::Exclusive => true,
                LockMode::Shared if state.holders.len() == 1 => {
                    state.mode = LockMode::Exclusive;
                    true
                }
                LockMode::Shared => mode == LockMode::Shared,
            }
        } else {
            match (current, mode) {
                (LockMode::Shared, LockMode::Shared) => {
                    state.holders.insert(tid);
                    true
                }
                _ => false,
            }
        };
        trace!(%tid, %pid, ?mode, granted, "lock requested");
        granted
    }

    /// Drop `tid`'s hold on `pid`. Returns whether `tid` was a holder.
    pub fn release(&self, pid: PageId, tid: TransactionId) -> bool {
        let mut lock_table = self.lock_table.lock();
        Self::release_locked(&mut lock_table, pid, tid)
    }

    fn release_locked(
        lock_table: &mut HashMap<PageId, LockState>,
        pid: PageId,
        tid: TransactionId,
    ) -> bool {
        let Some(state) = lock_table.get_mut(&pid) else {
            return false;
        };
        if !state.holders.remove(&tid) {
            return false;
        }
        if state.holders.is_empty() {
            lock_table.remove(&pid);
        }
        trace!(%tid, %pid, "lock released");
        true
    }

    pub fn holds(&self, pid: PageId, tid: TransactionId) -> bool {
        self.lock_table
            .lock()
            .get(&pid)
            .is_some_and(|state| state.holders.contains(&tid))
    }

    /// Release every lock `tid` holds
    pub fn release_all(&self, tid: TransactionId) {
        let mut lock_table = self.lock_table.lock();
        let held: Vec<PageId> = lock_table
            .iter()
            .filter(|(_, state)| state.holders.contains(&tid))
            .map(|(pid, _)| *pid)
            .collect();
        for pid in held {
            Self::release_locked(&mut lock_table, pid, tid);
        }
    }

    /// Current mode of the lock on `pid`, if anyone holds it
    pub fn lock_mode(&self, pid: PageId) -> Option<LockMode> {
        self.lock_table.lock().get(&pid).map(|state| state.mode)
    }

    /// Current holders of the lock on `pid`
    pub fn holders(&self, pid: PageId) -> Vec<TransactionId> {
        let mut holders: Vec<_> = self
            .lock_table
            .lock()
            .get(&pid)
            .map(|state| state.holders.iter().copied().collect())
            .unwrap_or_default();
        holders.sort();
        holders
    }

    /// Number of pages with at least one holder
    pub fn locked_pages(&self) -> usize {
        self.lock_table.lock().len()
    }
}

#[cfg(test)]
mod lock_manager_tests {
    use std::{sync::Arc, thread};

    use super::*;

    fn pid(page_no: usize) -> PageId {
        PageId::new(7, page_no)
    }

    #[test]
    fn test_basic_shared_lock() {
        let lock_manager = LockManager::new();
        let (t1, t2) = (TransactionId::new(), TransactionId::new());

        assert!(lock_manager.try_acquire(pid(0), t1, LockMode::Shared));
        assert!(lock_manager.try_acquire(pid(0), t2, LockMode::Shared));
        assert_eq!(lock_manager.lock_mode(pid(0)), Some(LockMode::Shared));
        assert_eq!(lock_manager.holders(pid(0)), vec![t1, t2]);

        assert!(lock_manager.release(pid(0), t1));
        assert!(lock_manager.release(pid(0), t2));
        assert_eq!(lock_manager.lock_mode(pid(0)), None);
        assert_eq!(lock_manager.locked_pages(), 0);
    }

    #[test]
    fn test_basic_exclusive_lock() {
        let lock_manager = LockManager::new();
        let (t1, t2) = (TransactionId::new(), TransactionId::new());

        assert!(lock_manager.try_acquire(pid(0), t1, LockMode::Exclusive));
        assert!(!lock_manager.try_acquire(pid(0), t2, LockMode::Shared));
        assert!(!lock_manager.try_acquire(pid(0), t2, LockMode::Exclusive));
        //  reentrant in either mode
        assert!(lock_manager.try_acquire(pid(0), t1, LockMode::Shared));
        assert!(lock_manager.try_acquire(pid(0), t1, LockMode::Exclusive));
        assert_eq!(lock_manager.holders(pid(0)), vec![t1]);

        lock_manager.release(pid(0), t1);
        assert!(lock_manager.try_acquire(pid(0), t2, LockMode::Shared));
    }

    #[test]
    fn test_exclusive_refused_against_foreign_shared() {
        let lock_manager = LockManager::new();
        let (t1, t2) = (TransactionId::new(), TransactionId::new());

        assert!(lock_manager.try_acquire(pid(0), t1, LockMode::Shared));
        assert!(!lock_manager.try_acquire(pid(0), t2, LockMode::Exclusive));
        assert_eq!(lock_manager.holders(pid(0)), vec![t1]);
    }

    #[test]
    fn test_lock_upgrade_sole_holder() {
        let lock_manager = LockManager::new();
        let t1 = TransactionId::new();

        assert!(lock_manager.try_acquire(pid(0), t1, LockMode::Shared));
        assert!(lock_manager.try_acquire(pid(0), t1, LockMode::Exclusive));
        assert_eq!(lock_manager.lock_mode(pid(0)), Some(LockMode::Exclusive));
        assert_eq!(lock_manager.holders(pid(0)), vec![t1]);
    }

    #[test]
    fn test_sole_shared_holder_is_upgraded_even_on_shared_request() {
        let lock_manager = LockManager::new();
        let t1 = TransactionId::new();

        assert!(lock_manager.try_acquire(pid(0), t1, LockMode::Shared));
        assert!(lock_manager.try_acquire(pid(0), t1, LockMode::Shared));
        assert_eq!(lock_manager.lock_mode(pid(0)), Some(LockMode::Exclusive));
    }

    #[test]
    fn test_lock_upgrade_blocked_by_other_reader() {
        let lock_manager = LockManager::new();
        let (t1, t2) = (TransactionId::new(), TransactionId::new());

        assert!(lock_manager.try_acquire(pid(0), t1, LockMode::Shared));
        assert!(lock_manager.try_acquire(pid(0), t2, LockMode::Shared));
        for _ in 0..3 {
            assert!(!lock_manager.try_acquire(pid(0), t1, LockMode::Exclusive));
        }
        assert!(lock_manager.try_acquire(pid(0), t1, LockMode::Shared));
        assert_eq!(lock_manager.lock_mode(pid(0)), Some(LockMode::Shared));

        //  once the other reader leaves the upgrade goes through
        lock_manager.release(pid(0), t2);
        assert!(lock_manager.try_acquire(pid(0), t1, LockMode::Exclusive));
        assert_eq!(lock_manager.lock_mode(pid(0)), Some(LockMode::Exclusive));
    }

    #[test]
    fn test_release_of_non_holder() {
        let lock_manager = LockManager::new();
        let (t1, t2) = (TransactionId::new(), TransactionId::new());

        assert!(!lock_manager.release(pid(0), t1));
        lock_manager.try_acquire(pid(0), t1, LockMode::Shared);
        assert!(!lock_manager.release(pid(0), t2));
        assert!(lock_manager.holds(pid(0), t1));
        assert!(!lock_manager.holds(pid(0), t2));
    }

    #[test]
    fn test_release_all() {
        let lock_manager = LockManager::new();
        let (t1, t2) = (TransactionId::new(), TransactionId::new());

        for page_no in 0..5 {
            lock_manager.try_acquire(pid(page_no), t1, LockMode::Shared);
        }
        lock_manager.try_acquire(pid(0), t2, LockMode::Shared);
        lock_manager.try_acquire(pid(9), t1, LockMode::Exclusive);

        lock_manager.release_all(t1);
        for page_no in 0..10 {
            assert!(!lock_manager.holds(pid(page_no), t1));
        }
        assert!(lock_manager.holds(pid(0), t2));
        assert_eq!(lock_manager.locked_pages(), 1);
    }

    #[test]
    fn test_exclusive_is_never_shared_across_threads() {
        let lock_manager = Arc::new(LockManager::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lock_manager = Arc::clone(&lock_manager);
                thread::spawn(move || {
                    let tid = TransactionId::new();
                    let mut granted = 0;
                    for _ in 0..200 {
                        if lock_manager.try_acquire(pid(0), tid, LockMode::Exclusive) {
                            assert_eq!(lock_manager.holders(pid(0)), vec![tid]);
                            granted += 1;
                            lock_manager.release(pid(0), tid);
                        }
                    }
                    granted
                })
            })
            .collect();
        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert!(total > 0);
        assert_eq!(lock_manager.locked_pages(), 0);
    }
}
