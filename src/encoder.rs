//! Bulk loader that packs delimited text rows into heap pages.
//!
//! Pages are built in memory and written straight to the output file, one after
//! the other, without going through a buffer pool or taking locks. The result is
//! a file any [`HeapFile`](crate::heap_file::HeapFile) with the same schema and
//! page size can open.

use std::{
    fs::File,
    io::{BufRead, BufWriter, Write},
    path::Path,
    sync::Arc,
};

use tracing::{debug, info};

use crate::{
    error::{DbError, Result},
    page::{empty_page_image, HeapPage, PageId},
    tuple::{Field, Tuple, TupleDesc},
};

/// Read rows from `reader`, one per line with fields split on `separator`, and
/// write them to `out_path` as heap pages. Blank lines are skipped.
/// Returns the number of pages written; no rows means an empty file.
pub fn convert<R, P>(
    reader: R,
    out_path: P,
    desc: &Arc<TupleDesc>,
    separator: char,
    page_size: usize,
) -> Result<usize>
where
    R: BufRead,
    P: AsRef<Path>,
{
    let out_path = out_path.as_ref();
    let mut out = BufWriter::new(File::create(out_path)?);
    let mut page_no = 0;
    let mut page = new_page(page_no, desc, page_size)?;
    let mut rows_on_page = 0;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let mut tuple = parse_row(&line, desc, separator)
            .map_err(|e| DbError::Parse(format!("line {}: {e}", line_no + 1)))?;

        if page.num_empty_slots() == 0 {
            out.write_all(&page.page_data())?;
            debug!(page_no, rows = rows_on_page, "page packed");
            page_no += 1;
            page = new_page(page_no, desc, page_size)?;
            rows_on_page = 0;
        }
        page.insert_tuple(&mut tuple)?;
        rows_on_page += 1;
    }

    let pages = if rows_on_page > 0 {
        out.write_all(&page.page_data())?;
        page_no + 1
    } else {
        page_no
    };
    out.flush()?;
    info!(path = %out_path.display(), pages, "heap file written");
    Ok(pages)
}

fn new_page(page_no: usize, desc: &Arc<TupleDesc>, page_size: usize) -> Result<HeapPage> {
    HeapPage::new(
        PageId::new(0, page_no),
        empty_page_image(page_size),
        Arc::clone(desc),
    )
}

fn parse_row(line: &str, desc: &Arc<TupleDesc>, separator: char) -> Result<Tuple> {
    let values: Vec<&str> = line.split(separator).collect();
    if values.len() != desc.num_fields() {
        return Err(DbError::Parse(format!(
            "expected {} fields, found {}",
            desc.num_fields(),
            values.len()
        )));
    }
    let fields = values
        .iter()
        .zip(desc.types())
        .map(|(text, field_type)| Field::parse_text(text, &field_type))
        .collect::<Result<Vec<_>>>()?;
    Tuple::from_fields(Arc::clone(desc), fields)
}
