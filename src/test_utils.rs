use std::{path::Path, sync::Arc};

use tempfile::TempDir;

use crate::{
    config::DbConfig,
    page::{empty_page_image, HeapPage, PageId},
    transaction::TransactionId,
    tuple::{Field, Tuple, TupleDesc, Type},
    Database,
};

/// A database whose table files live in a temporary directory removed on drop
pub struct TestDb {
    pub db: Database,
    dir: TempDir,
}

impl TestDb {
    pub fn new(buffer_pages: usize) -> Self {
        Self::with_config(DbConfig::default().with_buffer_pages(buffer_pages))
    }

    pub fn with_config(config: DbConfig) -> Self {
        Self {
            db: Database::new(config),
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Register an empty table stored in `<name>.dat`
    pub fn add_table(&self, name: &str, desc: Arc<TupleDesc>) -> i32 {
        self.db
            .add_table(self.dir().join(format!("{name}.dat")), name, desc, None)
            .unwrap()
    }

    /// Register a table whose file already holds `pages` empty pages
    pub fn add_table_with_pages(&self, name: &str, desc: Arc<TupleDesc>, pages: usize) -> i32 {
        let table_id = self.add_table(name, Arc::clone(&desc));
        let file = self.db.catalog().file(table_id).unwrap();
        let page_size = file.page_size();
        for page_no in 0..pages {
            let pid = PageId::new(table_id, page_no);
            let page = HeapPage::new(pid, empty_page_image(page_size), Arc::clone(&desc)).unwrap();
            file.write_page(&page).unwrap();
        }
        table_id
    }

    /// Insert one single-int row per value in its own committed transaction
    pub fn insert_committed(&self, table_id: i32, values: &[i32]) {
        let desc = self.db.catalog().tuple_desc(table_id).unwrap();
        let tid = TransactionId::new();
        for value in values {
            self.db
                .insert_tuple(tid, table_id, &mut int_tuple(&desc, *value))
                .unwrap();
        }
        self.db.buffer_pool().transaction_complete(tid, true).unwrap();
    }

    /// Values of the first column of every row, read in a committed transaction
    pub fn scan_ints(&self, table_id: i32) -> Vec<i32> {
        let tid = TransactionId::new();
        let values = self
            .db
            .scan(tid, table_id)
            .unwrap()
            .map(|tuple| match tuple.unwrap().field(0) {
                Some(Field::Int(value)) => *value,
                other => panic!("expected an int field, got {other:?}"),
            })
            .collect();
        self.db.buffer_pool().transaction_complete(tid, true).unwrap();
        values
    }
}

/// A single unnamed int column
pub fn int_desc() -> Arc<TupleDesc> {
    Arc::new(TupleDesc::from_types(&[Type::Int]))
}

pub fn int_tuple(desc: &Arc<TupleDesc>, value: i32) -> Tuple {
    let mut tuple = Tuple::new(Arc::clone(desc));
    tuple.set_field(0, Field::Int(value)).unwrap();
    tuple
}
