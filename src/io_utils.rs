//! Tokenizer construction and stream helpers.
//!
//! The RFC 4180 tokenizer is the `csv` crate. Every reader in csvpb is built
//! here so the dialect stays identical between top-level records and the
//! sub-records re-tokenized out of a single cell:
//!
//! - **No header handling**: the header row is read explicitly by the caller.
//! - **Flexible lengths**: a record may be shorter or longer than the header.
//! - **stdin/stdout**: the `-` path convention routes through standard streams.

use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Read, Write},
    path::Path,
};

use anyhow::{Context, Result};
use csv::StringRecord;

use crate::error::Error;

pub const DEFAULT_DELIMITER: u8 = b',';
pub const RECORD_SEPARATOR: u8 = b'\n';

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn csv_reader_builder(delimiter: u8) -> csv::ReaderBuilder {
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(false)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true);
    builder
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8) -> csv::Reader<R>
where
    R: Read,
{
    csv_reader_builder(delimiter).from_reader(reader)
}

/// Re-tokenizes one cell as its own comma-separated record.
///
/// Only the first line of the cell is considered; empty text yields no items.
pub fn split_cell(text: &str) -> Result<Vec<String>, Error> {
    let mut reader = open_csv_reader(text.as_bytes(), DEFAULT_DELIMITER);
    let mut record = StringRecord::new();
    if reader.read_record(&mut record)? {
        Ok(record.iter().map(str::to_owned).collect())
    } else {
        Ok(Vec::new())
    }
}

/// Reads exactly one record, returning `None` at end of input.
pub fn read_single_record<R>(reader: &mut csv::Reader<R>) -> Result<Option<Vec<String>>, Error>
where
    R: Read,
{
    let mut record = StringRecord::new();
    if reader.read_record(&mut record)? {
        Ok(Some(record.iter().map(str::to_owned).collect()))
    } else {
        Ok(None)
    }
}

pub fn open_input(path: &Path) -> Result<Box<dyn Read + Send>> {
    if is_dash(path) {
        Ok(Box::new(io::stdin()))
    } else {
        Ok(Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Opening input file {path:?}"))?,
        )))
    }
}

pub fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    match path {
        Some(p) if !is_dash(p) => Ok(Box::new(BufWriter::new(
            File::create(p).with_context(|| format!("Creating output file {p:?}"))?,
        ))),
        _ => Ok(Box::new(io::stdout())),
    }
}
