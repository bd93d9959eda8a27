use std::{
    fs::{self, File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::{
    buffer_pool::{BufferPool, PageRef},
    error::{DbError, Result},
    page::{empty_page_image, HeapPage, PageId},
    transaction::{Permissions, TransactionId},
    tuple::{Tuple, TupleDesc},
};

/// Deterministic 32-bit id for a table file: the `31 * h + c` string hash over the
/// UTF-16 units of the absolute path. The same path yields the same id across restarts.
pub fn table_id_for_path(path: &Path) -> i32 {
    path.to_string_lossy()
        .encode_utf16()
        .fold(0i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(unit as i32))
}

/// A table stored as a sequence of fixed-size heap pages in one file.
/// Page `k` lives at byte offset `k * page_size`.
#[derive(Debug)]
pub struct HeapFile {
    path: PathBuf,
    table_id: i32,
    desc: Arc<TupleDesc>,
    page_size: usize,
    //  serializes page writes and file extension
    io_lock: Mutex<()>,
}

impl HeapFile {
    /// Open the heap file at `path`, creating an empty file if it does not exist
    pub fn open<P: AsRef<Path>>(path: P, desc: Arc<TupleDesc>, page_size: usize) -> Result<Self> {
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.as_ref())?;
        let path = fs::canonicalize(path.as_ref())?;
        Ok(Self {
            table_id: table_id_for_path(&path),
            path,
            desc,
            page_size,
            io_lock: Mutex::new(()),
        })
    }

    pub fn id(&self) -> i32 {
        self.table_id
    }

    pub fn tuple_desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of whole pages in the file, recomputed from its current length
    pub fn num_pages(&self) -> Result<usize> {
        Ok(fs::metadata(&self.path)?.len() as usize / self.page_size)
    }

    /// Read page `pid.page_no` straight from disk
    pub fn read_page(&self, pid: PageId) -> Result<HeapPage> {
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start((pid.page_no * self.page_size) as u64))?;
        let mut data = Vec::with_capacity(self.page_size);
        file.take(self.page_size as u64).read_to_end(&mut data)?;
        if data.len() < self.page_size {
            return Err(DbError::ShortRead {
                pid,
                read: data.len(),
            });
        }
        trace!(%pid, "page read from disk");
        HeapPage::new(pid, data, Arc::clone(&self.desc))
    }

    /// Write the page image at its offset and sync it before returning
    pub fn write_page(&self, page: &HeapPage) -> Result<()> {
        let _guard = self.io_lock.lock();
        self.write_image(page.pid(), &page.page_data())
    }

    fn write_image(&self, pid: PageId, image: &[u8]) -> Result<()> {
        let mut file = OpenOptions::new().write(true).open(&self.path)?;
        file.seek(SeekFrom::Start((pid.page_no * self.page_size) as u64))?;
        file.write_all(image)?;
        file.sync_data()?;
        trace!(%pid, "page written to disk");
        Ok(())
    }

    /// Append a zeroed page at the end of the file and return its id.
    /// This goes straight to disk, not through the buffer pool.
    fn append_empty_page(&self) -> Result<PageId> {
        let _guard = self.io_lock.lock();
        let pid = PageId::new(self.table_id, self.num_pages()?);
        self.write_image(pid, &empty_page_image(self.page_size))?;
        debug!(%pid, "heap file extended");
        Ok(pid)
    }

    /// Insert `tuple` into the first page with a free slot, extending the file when
    /// every page is full. Pages are fetched read-write through `pool`.
    /// Returns the page that was dirtied.
    pub fn insert_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &mut Tuple,
    ) -> Result<Vec<PageRef>> {
        if **tuple.desc() != *self.desc {
            return Err(DbError::SchemaMismatch {
                expected: self.desc.to_string(),
                found: tuple.desc().to_string(),
            });
        }

        for page_no in 0..self.num_pages()? {
            let pid = PageId::new(self.table_id, page_no);
            let page = pool.get_page(tid, pid, Permissions::ReadWrite)?;
            let inserted = {
                let mut guard = page.write();
                if guard.num_empty_slots() == 0 {
                    false
                } else {
                    guard.insert_tuple(tuple)?;
                    guard.mark_dirty(true, tid);
                    true
                }
            };
            if inserted {
                return Ok(vec![page]);
            }
        }

        let pid = self.append_empty_page()?;
        let page = pool.get_page(tid, pid, Permissions::ReadWrite)?;
        {
            let mut guard = page.write();
            guard.insert_tuple(tuple)?;
            guard.mark_dirty(true, tid);
        }
        Ok(vec![page])
    }

    /// Clear the slot named by `tuple`'s record id. Returns the page that was dirtied.
    pub fn delete_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &Tuple,
    ) -> Result<Vec<PageRef>> {
        let record_id = tuple.record_id().ok_or(DbError::MissingRecordId)?;
        if record_id.pid.table_id != self.table_id {
            return Err(DbError::TupleNotOnPage { pid: record_id.pid });
        }
        let page = pool.get_page(tid, record_id.pid, Permissions::ReadWrite)?;
        {
            let mut guard = page.write();
            guard.delete_tuple(tuple)?;
            guard.mark_dirty(true, tid);
        }
        Ok(vec![page])
    }

    /// A cursor over every tuple of this table, page by page, in slot order.
    /// Call [`HeapFileIterator::open`] before reading from it.
    pub fn iterator<'a>(
        self: &Arc<Self>,
        pool: &'a BufferPool,
        tid: TransactionId,
    ) -> HeapFileIterator<'a> {
        HeapFileIterator {
            file: Arc::clone(self),
            pool,
            tid,
            cursor: None,
        }
    }
}

struct Cursor {
    next_page_no: usize,
    tuples: std::vec::IntoIter<Tuple>,
    peeked: Option<Tuple>,
}

/// Stateful cursor over a heap file.
///
/// Each page is fetched read-only through the buffer pool when the cursor first
/// reaches it; its tuples are decoded under the page latch and the latch is dropped.
/// Pages with no tuples are skipped.
pub struct HeapFileIterator<'a> {
    file: Arc<HeapFile>,
    pool: &'a BufferPool,
    tid: TransactionId,
    cursor: Option<Cursor>,
}

impl HeapFileIterator<'_> {
    pub fn open(&mut self) -> Result<()> {
        self.cursor = Some(Cursor {
            next_page_no: 0,
            tuples: Vec::new().into_iter(),
            peeked: None,
        });
        Ok(())
    }

    pub fn close(&mut self) {
        self.cursor = None;
    }

    pub fn rewind(&mut self) -> Result<()> {
        self.close();
        self.open()
    }

    pub fn is_open(&self) -> bool {
        self.cursor.is_some()
    }

    /// Whether another tuple remains. A closed iterator has none.
    pub fn has_next(&mut self) -> Result<bool> {
        let Some(cursor) = self.cursor.as_mut() else {
            return Ok(false);
        };
        if cursor.peeked.is_some() {
            return Ok(true);
        }
        cursor.peeked = Self::advance(&self.file, self.pool, self.tid, cursor)?;
        Ok(cursor.peeked.is_some())
    }

    /// The next tuple; [`DbError::NoSuchElement`] once exhausted or when not open
    pub fn next_tuple(&mut self) -> Result<Tuple> {
        if !self.has_next()? {
            return Err(DbError::NoSuchElement);
        }
        self.cursor
            .as_mut()
            .and_then(|cursor| cursor.peeked.take())
            .ok_or(DbError::NoSuchElement)
    }

    fn advance(
        file: &HeapFile,
        pool: &BufferPool,
        tid: TransactionId,
        cursor: &mut Cursor,
    ) -> Result<Option<Tuple>> {
        loop {
            if let Some(tuple) = cursor.tuples.next() {
                return Ok(Some(tuple));
            }
            if cursor.next_page_no >= file.num_pages()? {
                return Ok(None);
            }
            let pid = PageId::new(file.id(), cursor.next_page_no);
            let page = pool.get_page(tid, pid, Permissions::ReadOnly)?;
            let tuples = page.read().iter().collect::<Result<Vec<_>>>()?;
            cursor.next_page_no += 1;
            cursor.tuples = tuples.into_iter();
        }
    }
}

impl Iterator for HeapFileIterator<'_> {
    type Item = Result<Tuple>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.has_next() {
            Ok(true) => Some(self.next_tuple()),
            Ok(false) => None,
            Err(e) => {
                self.close();
                Some(Err(e))
            }
        }
    }
}
