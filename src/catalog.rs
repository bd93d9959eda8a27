use std::{collections::HashMap, fs, path::Path, sync::Arc};

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::{
    error::{DbError, Result},
    heap_file::HeapFile,
    tuple::{TupleDesc, Type},
};

#[derive(Debug)]
struct TableEntry {
    file: Arc<HeapFile>,
    name: String,
    primary_key: Option<String>,
}

#[derive(Debug, Default)]
struct Tables {
    by_id: HashMap<i32, TableEntry>,
    by_name: HashMap<String, i32>,
}

/// Registry of the tables in the database, keyed by table id and by name
#[derive(Debug, Default)]
pub struct Catalog {
    tables: RwLock<Tables>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `file` under `name`. An existing table with the same name or the
    /// same id is replaced.
    pub fn add_table(&self, file: HeapFile, name: &str, primary_key: Option<&str>) -> i32 {
        let table_id = file.id();
        let mut tables = self.tables.write();
        if let Some(old_id) = tables.by_name.remove(name) {
            tables.by_id.remove(&old_id);
        }
        if let Some(old) = tables.by_id.remove(&table_id) {
            tables.by_name.remove(&old.name);
        }
        tables.by_name.insert(name.to_string(), table_id);
        tables.by_id.insert(
            table_id,
            TableEntry {
                file: Arc::new(file),
                name: name.to_string(),
                primary_key: primary_key.map(str::to_string),
            },
        );
        debug!(table_id, name, "table registered");
        table_id
    }

    pub fn table_id(&self, name: &str) -> Result<i32> {
        self.tables
            .read()
            .by_name
            .get(name)
            .copied()
            .ok_or_else(|| DbError::NoSuchTableName(name.to_string()))
    }

    pub fn file(&self, table_id: i32) -> Result<Arc<HeapFile>> {
        self.with_entry(table_id, |entry| Arc::clone(&entry.file))
    }

    pub fn tuple_desc(&self, table_id: i32) -> Result<Arc<TupleDesc>> {
        self.with_entry(table_id, |entry| Arc::clone(entry.file.tuple_desc()))
    }

    pub fn table_name(&self, table_id: i32) -> Result<String> {
        self.with_entry(table_id, |entry| entry.name.clone())
    }

    pub fn primary_key(&self, table_id: i32) -> Result<Option<String>> {
        self.with_entry(table_id, |entry| entry.primary_key.clone())
    }

    fn with_entry<T>(&self, table_id: i32, f: impl FnOnce(&TableEntry) -> T) -> Result<T> {
        self.tables
            .read()
            .by_id
            .get(&table_id)
            .map(f)
            .ok_or(DbError::NoSuchTable(table_id))
    }

    /// Ids of every registered table, ascending
    pub fn table_ids(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self.tables.read().by_id.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn clear(&self) {
        let mut tables = self.tables.write();
        tables.by_id.clear();
        tables.by_name.clear();
    }

    /// Register every table described in a schema file.
    ///
    /// Each non-empty line reads `name (field type [pk], field type, ...)` with
    /// `type` one of `int` or `string`. The table's data lives in `name.dat` next to
    /// the schema file. Returns the registered ids in file order.
    pub fn load_schema<P: AsRef<Path>>(&self, path: P, page_size: usize) -> Result<Vec<i32>> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));

        let mut ids = Vec::new();
        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let schema = parse_schema_line(line)
                .map_err(|e| DbError::Parse(format!("line {}: {e}", line_no + 1)))?;
            let names: Vec<&str> = schema.fields.iter().map(|(name, _)| name.as_str()).collect();
            let types: Vec<Type> = schema.fields.iter().map(|(_, t)| *t).collect();
            let desc = Arc::new(TupleDesc::new(&types, &names));
            let file = HeapFile::open(base.join(format!("{}.dat", schema.name)), desc, page_size)?;
            ids.push(self.add_table(file, &schema.name, schema.primary_key.as_deref()));
        }
        info!(path = %path.display(), tables = ids.len(), "schema loaded");
        Ok(ids)
    }
}

struct SchemaLine {
    name: String,
    fields: Vec<(String, Type)>,
    primary_key: Option<String>,
}

fn parse_schema_line(line: &str) -> std::result::Result<SchemaLine, String> {
    let (name, rest) = line
        .split_once('(')
        .ok_or_else(|| "expected '(' after table name".to_string())?;
    let name = name.trim();
    if name.is_empty() {
        return Err("missing table name".to_string());
    }
    let body = rest
        .trim_end()
        .strip_suffix(')')
        .ok_or_else(|| "expected closing ')'".to_string())?;

    let mut fields = Vec::new();
    let mut primary_key = None;
    for column in body.split(',') {
        let words: Vec<&str> = column.split_whitespace().collect();
        let (field, type_name, annotation) = match words.as_slice() {
            [field, type_name] => (*field, *type_name, None),
            [field, type_name, annotation] => (*field, *type_name, Some(*annotation)),
            _ => return Err(format!("malformed column '{}'", column.trim())),
        };
        let field_type = Type::from_name(type_name).map_err(|e| e.to_string())?;
        match annotation {
            None => {}
            Some("pk") => primary_key = Some(field.to_string()),
            Some(other) => return Err(format!("unknown annotation '{other}'")),
        }
        fields.push((field.to_string(), field_type));
    }
    Ok(SchemaLine {
        name: name.to_string(),
        fields,
        primary_key,
    })
}
