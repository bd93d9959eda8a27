use std::{
    error::Error,
    fs::File,
    io::{self, BufReader, Write},
    path::PathBuf,
    sync::Arc,
};

use clap::{Args, Parser, Subcommand};
use heapdb::{
    encoder, Database, DbConfig, Transaction, TupleDesc, Type, DEFAULT_PAGES, DEFAULT_PAGE_SIZE,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "heapdb", version, about = "Heap file tools")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Pack a delimited text file into a heap file
    Convert {
        input: PathBuf,
        output: PathBuf,
        #[command(flatten)]
        schema: SchemaArgs,
        /// Field separator
        #[arg(long, default_value_t = ',')]
        separator: char,
    },
    /// Print every tuple of a heap file, one per line
    Print {
        file: PathBuf,
        #[command(flatten)]
        schema: SchemaArgs,
        /// Number of pages the buffer pool may cache
        #[arg(long, default_value_t = DEFAULT_PAGES)]
        buffer_pages: usize,
    },
}

#[derive(Args)]
struct SchemaArgs {
    /// Comma-separated column types, e.g. `int,string`
    #[arg(long, value_delimiter = ',', required = true)]
    types: Vec<String>,
    /// Page size in bytes
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: usize,
}

impl SchemaArgs {
    fn tuple_desc(&self) -> heapdb::Result<Arc<TupleDesc>> {
        let types = self
            .types
            .iter()
            .map(|name| Type::from_name(name))
            .collect::<heapdb::Result<Vec<_>>>()?;
        Ok(Arc::new(TupleDesc::from_types(&types)))
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    match Cli::parse().command {
        Command::Convert {
            input,
            output,
            schema,
            separator,
        } => {
            let desc = schema.tuple_desc()?;
            let reader = BufReader::new(File::open(&input)?);
            let pages = encoder::convert(reader, &output, &desc, separator, schema.page_size)?;
            println!("wrote {pages} pages to {}", output.display());
        }
        Command::Print {
            file,
            schema,
            buffer_pages,
        } => {
            let config = DbConfig::default()
                .with_page_size(schema.page_size)
                .with_buffer_pages(buffer_pages);
            let db = Database::new(config);
            let table_id = db.add_table(&file, "table", schema.tuple_desc()?, None)?;

            let txn = Transaction::begin(&db);
            let stdout = io::stdout();
            let mut out = stdout.lock();
            for tuple in db.scan(txn.id(), table_id)? {
                writeln!(out, "{}", tuple?)?;
            }
            txn.commit()?;
        }
    }
    Ok(())
}
