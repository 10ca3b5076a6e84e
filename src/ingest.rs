// CSV ingestion for uploaded reading lists.
//
// The parser is deliberately narrow so that exports from spreadsheet tools
// produce the same records the web client always produced: rows are split on
// raw newlines before quote state is tracked, and `""` is not an escaped quote.

use std::path::Path;

use serde::ser::{Serialize, SerializeMap, Serializer};
use tracing::{debug, instrument};

use crate::error::IngestError;

/// One data row keyed by normalized column name, in header order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: Vec<(String, String)>,
}

impl Record {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    // Repeated keys keep their first position and take the latest value.
    fn insert(&mut self, key: &str, value: String) {
        match self.fields.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((key.to_string(), value)),
        }
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Records from one upload, in file row order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordSet {
    columns: Vec<String>,
    records: Vec<Record>,
}

impl RecordSet {
    /// Normalized header keys, as they appeared in the header row.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Split raw text into rows of trimmed fields.
pub fn parse_rows(text: &str) -> Vec<Vec<String>> {
    text.split('\n').map(parse_row).collect()
}

fn parse_row(row: &str) -> Vec<String> {
    let mut values = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in row.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                values.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    values.push(current.trim().to_string());
    values
}

/// `Book Title` -> `book_title`.
pub fn normalize_header(cell: &str) -> String {
    cell.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

#[instrument(skip(text), fields(bytes = text.len()))]
pub fn ingest(text: &str) -> Result<RecordSet, IngestError> {
    let mut rows = parse_rows(text).into_iter();
    let columns: Vec<String> = rows
        .next()
        .unwrap_or_default()
        .iter()
        .map(|cell| normalize_header(cell))
        .collect();

    let records: Vec<Record> = rows
        .filter(|row| row.len() > 1 && !row[0].is_empty())
        .map(|row| {
            let mut record = Record::default();
            for (index, key) in columns.iter().enumerate() {
                record.insert(key, row.get(index).cloned().unwrap_or_default());
            }
            record
        })
        .collect();

    debug!(columns = ?columns, records = records.len(), "Parsed reading list");

    Ok(RecordSet {
        columns,
        records,
    })
}

pub fn ingest_bytes(bytes: &[u8]) -> Result<RecordSet, IngestError> {
    let text = std::str::from_utf8(bytes)?;
    ingest(text.strip_prefix('\u{feff}').unwrap_or(text))
}

pub fn ingest_file(path: impl AsRef<Path>) -> Result<RecordSet, IngestError> {
    let bytes = std::fs::read(path.as_ref())?;
    ingest_bytes(&bytes)
}
