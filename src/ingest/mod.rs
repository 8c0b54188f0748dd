//! Result Ingestor (C7)
//!
//! Parses a produced prediction CSV, lazily decoding nested-array cell
//! values, and streams rows into batches ready for insertion by
//! [`crate::storage::postgres::PostgresGateway::persist_result`].

mod grammar;

use std::path::Path;

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::storage::error::{StorageError, StorageResult};

pub use grammar::parse_cell;

/// One decoded row from a result CSV: the row index (rounded from a
/// float-coercible header value if needed), the target column name, and the
/// cell value preserved as text (nested-array payloads are parsed lazily by
/// callers, not here; spec §3 `ResultRow`).
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub row_index: i64,
    pub target_name: String,
    pub value: String,
}

#[derive(Debug, Default)]
pub struct ParsedResult {
    pub rows: Vec<ResultRow>,
}

const BATCH_SIZE: usize = 500;

/// Strips a `file://` prefix per spec §6 "File layout".
pub fn canonical_path(result_uri: &str) -> &str {
    result_uri.strip_prefix("file://").unwrap_or(result_uri)
}

/// Streaming scanner over a result CSV: reads lines, buffers decoded rows
/// into batches of [`BATCH_SIZE`], and exposes [`next_batch`] / [`flush`] so
/// callers can insert incrementally rather than materializing the whole
/// file. [`parse_result_csv`] is the non-streaming convenience built on top.
pub struct ResultCsvStream<R> {
    lines: tokio::io::Lines<BufReader<R>>,
    target_name: String,
    buffer: Vec<ResultRow>,
    warned_extra_columns: bool,
}

impl<R: tokio::io::AsyncRead + Unpin> ResultCsvStream<R> {
    pub async fn open(reader: R) -> StorageResult<Self> {
        let mut lines = BufReader::new(reader).lines();
        let header = lines
            .next_line()
            .await
            .map_err(StorageError::Io)?
            .ok_or_else(|| StorageError::ParseError("result CSV is empty".into()))?;
        let mut columns = header.split(',');
        let _index_col = columns
            .next()
            .ok_or_else(|| StorageError::ParseError("result CSV header missing index column".into()))?;
        let target_name = columns
            .next()
            .ok_or_else(|| StorageError::ParseError("result CSV header missing target column".into()))?
            .trim()
            .to_string();
        Ok(Self { lines, target_name, buffer: Vec::with_capacity(BATCH_SIZE), warned_extra_columns: false })
    }

    /// Reads lines until a full batch accumulates or the file ends. Returns
    /// `None` once the source is exhausted and the buffer is empty; call
    /// [`flush`] to retrieve any partial remainder.
    pub async fn next_batch(&mut self) -> StorageResult<Option<Vec<ResultRow>>> {
        while self.buffer.len() < BATCH_SIZE {
            let Some(line) = self.lines.next_line().await.map_err(StorageError::Io)? else {
                break;
            };
            if line.trim().is_empty() {
                continue;
            }
            if let Some(row) = self.parse_line(&line)? {
                self.buffer.push(row);
            }
        }
        if self.buffer.is_empty() {
            return Ok(None);
        }
        Ok(Some(std::mem::replace(&mut self.buffer, Vec::with_capacity(BATCH_SIZE))))
    }

    /// Emits any rows left in the buffer after the source is exhausted.
    pub fn flush(&mut self) -> Vec<ResultRow> {
        std::mem::take(&mut self.buffer)
    }

    fn parse_line(&mut self, line: &str) -> StorageResult<Option<ResultRow>> {
        let mut fields = split_csv_line(line);
        let Some(index_field) = fields.next() else { return Ok(None) };
        let Some(value_field) = fields.next() else {
            return Err(StorageError::ParseError(format!("result row missing value column: {line}")));
        };
        let extra = fields.count();
        if extra > 0 && !self.warned_extra_columns {
            tracing::warn!(extra_columns = extra, "result CSV has more than two columns; ignoring extras");
            self.warned_extra_columns = true;
        }

        let row_index = parse_row_index(&index_field)?;
        Ok(Some(ResultRow { row_index, target_name: self.target_name.clone(), value: value_field }))
    }
}

/// Splits on top-level commas only, respecting single/double quoted fields
/// so an embedded nested-array cell's internal commas survive intact.
fn split_csv_line(line: &str) -> impl Iterator<Item = String> + '_ {
    let mut fields = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut current = String::new();
    for c in line.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => {
                quote = None;
                current.push(c);
            }
            (Some(_), c) => current.push(c),
            (None, '"') | (None, '\'') => {
                quote = Some(c);
                current.push(c);
            }
            (None, '[') => {
                depth += 1;
                current.push(c);
            }
            (None, ']') => {
                depth -= 1;
                current.push(c);
            }
            (None, ',') if depth == 0 => {
                fields.push(std::mem::take(&mut current));
            }
            (None, c) => current.push(c),
        }
    }
    fields.push(current);
    fields.into_iter().map(|f| f.trim().trim_matches('"').to_string())
}

/// Rounds a float-coercible index to the nearest integer (spec §4.7).
fn parse_row_index(raw: &str) -> StorageResult<i64> {
    if let Ok(i) = raw.parse::<i64>() {
        return Ok(i);
    }
    raw.parse::<f64>()
        .map(|f| f.round() as i64)
        .map_err(|_| StorageError::ParseError(format!("non-numeric result row index: {raw}")))
}

/// Parses an entire produced result file in one pass, used by
/// [`crate::storage::postgres::PostgresGateway::persist_result`].
pub async fn parse_result_csv(result_uri: &str) -> StorageResult<ParsedResult> {
    let path = canonical_path(result_uri);
    let file = tokio::fs::File::open(Path::new(path)).await.map_err(StorageError::Io)?;
    let mut stream = ResultCsvStream::open(file).await?;
    let mut rows = Vec::new();
    while let Some(batch) = stream.next_batch().await? {
        rows.extend(batch);
    }
    rows.extend(stream.flush());
    Ok(ParsedResult { rows })
}
