//! I/O utilities for reading raw input tables and writing canonical CSV.
//!
//! All file I/O flows through this module:
//!
//! - **Delimiter resolution**: extension-based auto-detection (`.csv` → comma,
//!   `.tsv` → tab) with manual override support.
//! - **Encoding**: input decoding via `encoding_rs`, defaulting to UTF-8.
//! - **stdin/stdout**: the `-` path convention routes through standard streams.
//! - **Raw tables**: every input file is read into a [`RawTable`] of untyped
//!   string cells; typing is the normalizer's job.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8};
use log::debug;

use crate::schema::{CanonicalRecord, RawTable};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    })
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true);
    builder.from_reader(reader)
}

pub fn open_csv_reader_from_path(path: &Path, delimiter: u8) -> Result<csv::Reader<Box<dyn Read>>> {
    let reader: Box<dyn Read> = if is_dash(path) {
        Box::new(std::io::stdin().lock())
    } else {
        Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Opening input file {path:?}"))?,
        ))
    };
    Ok(open_csv_reader(reader, delimiter))
}

pub fn open_csv_writer(path: Option<&Path>, delimiter: u8) -> Result<csv::Writer<Box<dyn Write>>> {
    let writer: Box<dyn Write> = match path {
        Some(p) if !is_dash(p) => Box::new(BufWriter::new(
            File::create(p).with_context(|| format!("Creating output file {p:?}"))?,
        )),
        _ => Box::new(std::io::stdout()),
    };
    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Necessary)
        .double_quote(true);
    Ok(builder.from_writer(writer))
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(anyhow!(
            "Failed to decode text with encoding {}",
            encoding.name()
        ))
    } else {
        Ok(text.into_owned())
    }
}

pub fn decode_record(record: &csv::ByteRecord, encoding: &'static Encoding) -> Result<Vec<String>> {
    record
        .iter()
        .map(|field| decode_bytes(field, encoding))
        .collect()
}

pub fn read_raw_table_from_reader<R: Read>(
    reader: &mut csv::Reader<R>,
    source: &str,
    encoding: &'static Encoding,
) -> Result<RawTable> {
    let headers = decode_record(reader.byte_headers()?, encoding)
        .with_context(|| format!("Decoding headers of {source}"))?;
    let mut rows = Vec::new();
    for (row_idx, record) in reader.byte_records().enumerate() {
        let record =
            record.with_context(|| format!("Reading row {} in {source}", row_idx + 2))?;
        let mut decoded = decode_record(&record, encoding)
            .with_context(|| format!("Decoding row {} in {source}", row_idx + 2))?;
        if decoded.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        decoded.resize(headers.len(), String::new());
        rows.push(decoded);
    }
    debug!("Read {} row(s) from {source}", rows.len());
    Ok(RawTable::new(source, headers, rows))
}

pub fn read_raw_table(
    path: &Path,
    delimiter: Option<u8>,
    encoding: &'static Encoding,
) -> Result<RawTable> {
    let delimiter = resolve_input_delimiter(path, delimiter);
    let mut reader = open_csv_reader_from_path(path, delimiter)?;
    let source = if is_dash(path) {
        "stdin".to_string()
    } else {
        path.display().to_string()
    };
    read_raw_table_from_reader(&mut reader, &source, encoding)
}

/// Writes normalized records as canonical CSV and returns the row count.
pub fn write_records<T: CanonicalRecord>(
    records: &[T],
    path: Option<&Path>,
    delimiter: u8,
) -> Result<usize> {
    let mut writer = open_csv_writer(path, delimiter)?;
    writer
        .write_record(T::csv_headers())
        .context("Writing output headers")?;
    for (idx, record) in records.iter().enumerate() {
        writer
            .write_record(record.csv_row())
            .with_context(|| format!("Writing output row {}", idx + 2))?;
    }
    writer.flush().context("Flushing output")?;
    Ok(records.len())
}
