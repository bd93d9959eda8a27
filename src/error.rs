use thiserror::Error;

use crate::{page::PageId, transaction::TransactionId};

pub type Result<T> = std::result::Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    /// The lock wait inside `get_page` ran past its randomized deadline.
    /// The transaction must be completed with `commit = false`.
    #[error("transaction {tid} aborted while waiting for a lock on {pid}")]
    TransactionAborted { tid: TransactionId, pid: PageId },

    #[error("no page evictable: every cached page is dirty")]
    NoEvictablePage,

    #[error("page {0} has no empty slot")]
    PageFull(PageId),

    #[error("tuple schema mismatch: expected [{expected}], found [{found}]")]
    SchemaMismatch { expected: String, found: String },

    #[error("tuple is not stored on page {pid}")]
    TupleNotOnPage { pid: PageId },

    #[error("tuple has no record id")]
    MissingRecordId,

    #[error("slot {slot} on page {pid} is already empty")]
    SlotEmpty { pid: PageId, slot: usize },

    #[error("no table with id {0}")]
    NoSuchTable(i32),

    #[error("no table named {0}")]
    NoSuchTableName(String),

    #[error("no such element")]
    NoSuchElement,

    #[error("short read of page {pid}: got {read} bytes")]
    ShortRead { pid: PageId, read: usize },

    #[error("a page of {page_size} bytes cannot hold a tuple of {tuple_width} bytes")]
    InvalidPageSize {
        page_size: usize,
        tuple_width: usize,
    },

    #[error("parse error: {0}")]
    Parse(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DbError {
    pub fn is_transaction_aborted(&self) -> bool {
        matches!(self, DbError::TransactionAborted { .. })
    }
}
