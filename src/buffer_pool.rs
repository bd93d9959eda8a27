use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use parking_lot::{Mutex, RwLock, RwLockUpgradableReadGuard};
use rand::Rng;
use tracing::{debug, trace, warn};

use crate::{
    catalog::Catalog,
    config::DbConfig,
    error::{DbError, Result},
    lock_manager::{LockManager, LockMode},
    page::{HeapPage, PageId},
    replacement::PolicyState,
    transaction::{Permissions, TransactionId},
    tuple::Tuple,
};

/// A cached page. The `RwLock` is a short-term latch guarding the page bytes;
/// transactional isolation comes from the page locks taken in [`BufferPool::get_page`].
pub type PageRef = Arc<RwLock<HeapPage>>;

/// Hit and miss counters for [`BufferPool::get_page`]
#[derive(Debug, Default)]
pub struct BufferStats {
    pub hits: AtomicUsize,
    pub misses: AtomicUsize,
}

impl BufferStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> (usize, usize) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }

    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    pub fn hit_rate(&self) -> f64 {
        let (hits, misses) = self.get();
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            (hits as f64 / total as f64) * 100.0
        }
    }
}

#[derive(Debug)]
struct PoolState {
    pages: HashMap<PageId, PageRef>,
    policy: PolicyState,
}

/// Bounded page cache with strict two-phase page locking.
///
/// Commits force every page the transaction dirtied to disk; aborts re-read those
/// pages from disk. Dirty pages are never evicted, so a pool full of dirty pages
/// refuses to load anything new.
#[derive(Debug)]
pub struct BufferPool {
    config: DbConfig,
    catalog: Arc<Catalog>,
    lock_manager: LockManager,
    state: Mutex<PoolState>,
    stats: BufferStats,
}

impl BufferPool {
    pub fn new(config: DbConfig, catalog: Arc<Catalog>) -> Self {
        Self {
            state: Mutex::new(PoolState {
                pages: HashMap::with_capacity(config.buffer_pages),
                policy: PolicyState::new(),
            }),
            config,
            catalog,
            lock_manager: LockManager::new(),
            stats: BufferStats::new(),
        }
    }

    /// Maximum number of pages held at once
    pub fn capacity(&self) -> usize {
        self.config.buffer_pages
    }

    /// Number of pages currently cached
    pub fn len(&self) -> usize {
        self.state.lock().pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> &BufferStats {
        &self.stats
    }

    pub fn lock_manager(&self) -> &LockManager {
        &self.lock_manager
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    /// Fetch `pid` on behalf of `tid`, taking a shared lock for
    /// [`Permissions::ReadOnly`] and an exclusive one for [`Permissions::ReadWrite`].
    ///
    /// While the lock is refused the call polls. Each call draws its own deadline
    /// from the configured timeout range and gives up with
    /// [`DbError::TransactionAborted`] once it passes. A miss reads the page from
    /// disk, evicting a clean page first if the pool is full.
    pub fn get_page(&self, tid: TransactionId, pid: PageId, perm: Permissions) -> Result<PageRef> {
        let mode = match perm {
            Permissions::ReadOnly => LockMode::Shared,
            Permissions::ReadWrite => LockMode::Exclusive,
        };
        self.acquire_lock(tid, pid, mode)?;

        let mut state = self.state.lock();
        if let Some(page) = state.pages.get(&pid).cloned() {
            state.policy.record_hit(pid);
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(page);
        }

        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        let page = self.catalog.file(pid.table_id)?.read_page(pid)?;
        if state.pages.len() >= self.capacity() {
            Self::evict_page(&mut state)?;
        }
        let page = Arc::new(RwLock::new(page));
        state.pages.insert(pid, Arc::clone(&page));
        state.policy.record_insert(pid);
        trace!(%tid, %pid, "page loaded into pool");
        Ok(page)
    }

    fn acquire_lock(&self, tid: TransactionId, pid: PageId, mode: LockMode) -> Result<()> {
        let started = Instant::now();
        let min = self.config.lock_timeout_min.as_millis() as u64;
        let max = self.config.lock_timeout_max.as_millis() as u64;
        let timeout = Duration::from_millis(rand::thread_rng().gen_range(min..=max));

        while !self.lock_manager.try_acquire(pid, tid, mode) {
            if started.elapsed() > timeout {
                warn!(%tid, %pid, ?mode, ?timeout, "lock wait timed out, aborting");
                return Err(DbError::TransactionAborted { tid, pid });
            }
            thread::sleep(self.config.lock_poll_interval);
        }
        Ok(())
    }

    /// Release `tid`'s lock on `pid` before the transaction ends.
    ///
    /// This breaks two-phase locking. It exists for callers that know the page was
    /// only probed, never read or written under the lock.
    pub fn release_page(&self, tid: TransactionId, pid: PageId) {
        self.lock_manager.release(pid, tid);
    }

    pub fn holds_lock(&self, tid: TransactionId, pid: PageId) -> bool {
        self.lock_manager.holds(pid, tid)
    }

    /// End `tid`. A commit flushes its dirty pages; an abort restores them from disk.
    /// Either way every lock it holds is then released.
    ///
    /// If an I/O error interrupts the flush or restore, the locks stay held so the
    /// caller can still complete the transaction with `commit = false`.
    pub fn transaction_complete(&self, tid: TransactionId, commit: bool) -> Result<()> {
        if commit {
            self.flush_pages(tid)?;
        } else {
            self.restore_pages(tid)?;
        }
        self.lock_manager.release_all(tid);
        debug!(%tid, commit, "transaction complete");
        Ok(())
    }

    /// Insert `tuple` into `table_id` under `tid`. The touched pages end up cached
    /// and marked dirty by `tid`.
    pub fn insert_tuple(&self, tid: TransactionId, table_id: i32, tuple: &mut Tuple) -> Result<()> {
        let file = self.catalog.file(table_id)?;
        for page in file.insert_tuple(self, tid, tuple)? {
            self.cache_dirty_page(tid, page)?;
        }
        Ok(())
    }

    /// Delete `tuple` from the table named by its record id
    pub fn delete_tuple(&self, tid: TransactionId, tuple: &Tuple) -> Result<()> {
        let record_id = tuple.record_id().ok_or(DbError::MissingRecordId)?;
        let file = self.catalog.file(record_id.pid.table_id)?;
        for page in file.delete_tuple(self, tid, tuple)? {
            self.cache_dirty_page(tid, page)?;
        }
        Ok(())
    }

    /// Mark a page dirty and make sure the pool holds this very copy of it
    fn cache_dirty_page(&self, tid: TransactionId, page: PageRef) -> Result<()> {
        let pid = {
            let mut guard = page.write();
            guard.mark_dirty(true, tid);
            guard.pid()
        };
        let mut state = self.state.lock();
        match state.pages.get(&pid) {
            Some(cached) if Arc::ptr_eq(cached, &page) => {}
            Some(_) => {
                state.pages.insert(pid, page);
            }
            None => {
                if state.pages.len() >= self.capacity() {
                    Self::evict_page(&mut state)?;
                }
                state.pages.insert(pid, page);
                state.policy.record_insert(pid);
            }
        }
        Ok(())
    }

    /// Write every dirty cached page to disk. Pages stay cached and become clean.
    ///
    /// This writes uncommitted data and is meant for tests and orderly shutdown.
    pub fn flush_all_pages(&self) -> Result<()> {
        let state = self.state.lock();
        for page in state.pages.values() {
            self.write_if_dirty(page, |_| true)?;
        }
        Ok(())
    }

    /// Write `pid` to disk if it is cached and dirty
    pub fn flush_page(&self, pid: PageId) -> Result<()> {
        let state = self.state.lock();
        if let Some(page) = state.pages.get(&pid) {
            self.write_if_dirty(page, |_| true)?;
        }
        Ok(())
    }

    /// Write every page dirtied by `tid` to disk
    pub fn flush_pages(&self, tid: TransactionId) -> Result<()> {
        let state = self.state.lock();
        for page in state.pages.values() {
            self.write_if_dirty(page, |dirtier| dirtier == tid)?;
        }
        Ok(())
    }

    /// Only a page that will actually be written is latched exclusively. Readers of
    /// other cached pages never hold up a flush.
    fn write_if_dirty(&self, page: &PageRef, flush: impl Fn(TransactionId) -> bool) -> Result<()> {
        let guard = page.upgradable_read();
        let Some(dirtier) = guard.is_dirty().filter(|dirtier| flush(*dirtier)) else {
            return Ok(());
        };
        self.catalog.file(guard.pid().table_id)?.write_page(&guard)?;
        let mut guard = RwLockUpgradableReadGuard::upgrade(guard);
        guard.mark_dirty(false, dirtier);
        trace!(pid = %guard.pid(), tid = %dirtier, "page flushed");
        Ok(())
    }

    /// Replace every page dirtied by `tid` with its on-disk image, in place
    pub fn restore_pages(&self, tid: TransactionId) -> Result<()> {
        let state = self.state.lock();
        for page in state.pages.values() {
            let guard = page.upgradable_read();
            if guard.is_dirty() != Some(tid) {
                continue;
            }
            let pid = guard.pid();
            let fresh = self.catalog.file(pid.table_id)?.read_page(pid)?;
            *RwLockUpgradableReadGuard::upgrade(guard) = fresh;
            trace!(%pid, %tid, "page restored from disk");
        }
        Ok(())
    }

    /// Drop `pid` from the cache without writing it back
    pub fn discard_page(&self, pid: PageId) {
        let mut state = self.state.lock();
        if state.pages.remove(&pid).is_some() {
            state.policy.record_remove(pid);
        }
    }

    /// Remove one clean page. A page whose latch is held is skipped, since its
    /// holder owns the page lock and may be about to dirty it.
    fn evict_page(state: &mut PoolState) -> Result<()> {
        let PoolState { pages, policy } = state;
        let victim = policy
            .pick_victim(|pid| {
                pages.get(pid).is_some_and(|page| {
                    page.try_read()
                        .is_some_and(|guard| guard.is_dirty().is_none())
                })
            })
            .ok_or(DbError::NoEvictablePage)?;
        pages.remove(&victim);
        debug!(pid = %victim, "page evicted");
        Ok(())
    }
}
