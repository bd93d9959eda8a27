use std::{
    fmt::Display,
    sync::{
        atomic::{AtomicU64, Ordering},
        OnceLock,
    },
};

use tracing::debug;

use crate::{error::Result, Database};

/// Process-unique transaction identifier. Never reused within one process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(u64);

impl TransactionId {
    /// Allocate the next identifier from the process-wide counter
    pub fn new() -> Self {
        let generator = TX_ID_GENERATOR.get_or_init(|| TxIdGenerator {
            next_id: AtomicU64::new(0),
        });
        Self(generator.next_id())
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// Hands out transaction ids in a monotonically increasing fashion
struct TxIdGenerator {
    next_id: AtomicU64,
}

impl TxIdGenerator {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

static TX_ID_GENERATOR: OnceLock<TxIdGenerator> = OnceLock::new();

/// The access a transaction asks for when it fetches a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permissions {
    ReadOnly,
    ReadWrite,
}

/// A running transaction against a [`Database`].
///
/// Both [`Transaction::commit`] and [`Transaction::abort`] consume the handle and
/// release every page lock the transaction holds.
pub struct Transaction<'a> {
    db: &'a Database,
    tid: TransactionId,
}

impl<'a> Transaction<'a> {
    pub fn begin(db: &'a Database) -> Self {
        let tid = TransactionId::new();
        debug!(%tid, "transaction started");
        Self { db, tid }
    }

    pub fn id(&self) -> TransactionId {
        self.tid
    }

    /// Force every page this transaction dirtied to disk, then release its locks
    pub fn commit(self) -> Result<()> {
        debug!(tid = %self.tid, "transaction committing");
        self.db.buffer_pool().transaction_complete(self.tid, true)
    }

    /// Discard the in-memory changes of this transaction, then release its locks
    pub fn abort(self) -> Result<()> {
        debug!(tid = %self.tid, "transaction aborting");
        self.db.buffer_pool().transaction_complete(self.tid, false)
    }
}
