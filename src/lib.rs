//! A page-oriented transactional storage engine.
//!
//! Tables are heap files of fixed-size slotted pages. All page access goes
//! through a bounded [`BufferPool`] which takes page-level shared/exclusive locks
//! under strict two-phase locking, forces dirty pages to disk at commit and
//! restores them from disk at abort.

use std::{path::Path, sync::Arc};

pub mod buffer_pool;
pub mod catalog;
pub mod config;
pub mod encoder;
pub mod error;
pub mod heap_file;
pub mod lock_manager;
pub mod page;
mod replacement;
#[cfg(test)]
mod test_utils;
pub mod transaction;
pub mod tuple;

pub use buffer_pool::{BufferPool, BufferStats, PageRef};
pub use catalog::Catalog;
pub use config::{DbConfig, DEFAULT_PAGES, DEFAULT_PAGE_SIZE};
pub use error::{DbError, Result};
pub use heap_file::{HeapFile, HeapFileIterator};
pub use lock_manager::{LockManager, LockMode};
pub use page::{HeapPage, PageId, RecordId};
pub use transaction::{Permissions, Transaction, TransactionId};
pub use tuple::{Field, Tuple, TupleDesc, Type};

/// The database: a catalog of tables plus the buffer pool every table is read through
#[derive(Debug)]
pub struct Database {
    config: DbConfig,
    catalog: Arc<Catalog>,
    buffer_pool: Arc<BufferPool>,
}

impl Database {
    pub fn new(config: DbConfig) -> Self {
        let catalog = Arc::new(Catalog::new());
        let buffer_pool = Arc::new(BufferPool::new(config.clone(), Arc::clone(&catalog)));
        Self {
            config,
            catalog,
            buffer_pool,
        }
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn buffer_pool(&self) -> &Arc<BufferPool> {
        &self.buffer_pool
    }

    /// Open (or create) the heap file at `path` and register it as `name`
    pub fn add_table<P: AsRef<Path>>(
        &self,
        path: P,
        name: &str,
        desc: Arc<TupleDesc>,
        primary_key: Option<&str>,
    ) -> Result<i32> {
        let file = HeapFile::open(path, desc, self.config.page_size)?;
        Ok(self.catalog.add_table(file, name, primary_key))
    }

    /// Register every table listed in a schema file
    pub fn load_schema<P: AsRef<Path>>(&self, path: P) -> Result<Vec<i32>> {
        self.catalog.load_schema(path, self.config.page_size)
    }

    pub fn insert_tuple(&self, tid: TransactionId, table_id: i32, tuple: &mut Tuple) -> Result<()> {
        self.buffer_pool.insert_tuple(tid, table_id, tuple)
    }

    pub fn delete_tuple(&self, tid: TransactionId, tuple: &Tuple) -> Result<()> {
        self.buffer_pool.delete_tuple(tid, tuple)
    }

    /// An opened cursor over every tuple of `table_id`, read under shared page locks
    pub fn scan(&self, tid: TransactionId, table_id: i32) -> Result<HeapFileIterator<'_>> {
        let mut iter = self.catalog.file(table_id)?.iterator(&self.buffer_pool, tid);
        iter.open()?;
        Ok(iter)
    }

    /// Insert every tuple and return how many were inserted
    pub fn insert_all<I>(&self, tid: TransactionId, table_id: i32, tuples: I) -> Result<usize>
    where
        I: IntoIterator<Item = Tuple>,
    {
        let mut count = 0;
        for mut tuple in tuples {
            self.insert_tuple(tid, table_id, &mut tuple)?;
            count += 1;
        }
        Ok(count)
    }

    /// Delete every tuple of `table_id` matching `predicate` and return how many went
    pub fn delete_where<F>(&self, tid: TransactionId, table_id: i32, predicate: F) -> Result<usize>
    where
        F: Fn(&Tuple) -> bool,
    {
        let mut doomed = Vec::new();
        for tuple in self.scan(tid, table_id)? {
            let tuple = tuple?;
            if predicate(&tuple) {
                doomed.push(tuple);
            }
        }
        for tuple in &doomed {
            self.delete_tuple(tid, tuple)?;
        }
        Ok(doomed.len())
    }
}
