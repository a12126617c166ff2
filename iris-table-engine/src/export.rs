//! Chunked full-table export with type-aware value conversion
//!
//! [`ExportStream`] is a lazy, finite, non-restartable sequence of row
//! batches: it repeatedly fetches pages at increasing offsets and stops when
//! a batch comes back short. Cells are converted to native-typed values
//! before they are yielded, because the downstream spreadsheet writer needs
//! typed cells, not display strings.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::executor::QueryExecutor;
use crate::schema::{FilterCriterion, PageRequest, SortSpec, TableSchema};
use crate::transport::Transport;
use crate::Result;

/// Closed set of type categories the exporter dispatches over
///
/// Kept as a tagged variant rather than open-ended type inspection so the
/// category-to-conversion mapping stays exhaustive and testable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Boolean,
    Integer,
    Float,
    DateTime,
    Text,
}

impl TypeCategory {
    /// Classify a catalog type name, ignoring any length/precision suffix
    pub fn from_sql_type(sql_type: &str) -> Self {
        let base = sql_type
            .split('(')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_uppercase();

        match base.as_str() {
            "BIT" | "BOOL" | "BOOLEAN" => TypeCategory::Boolean,
            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "INTEGER" | "BIGINT" => {
                TypeCategory::Integer
            }
            "DECIMAL" | "NUMERIC" | "FLOAT" | "REAL" | "DOUBLE" | "DOUBLE PRECISION" | "MONEY"
            | "SMALLMONEY" | "NUMBER" => TypeCategory::Float,
            "DATE" | "TIME" | "DATETIME" | "DATETIME2" | "SMALLDATETIME" | "TIMESTAMP"
            | "POSIXTIME" => TypeCategory::DateTime,
            _ => TypeCategory::Text,
        }
    }
}

/// A natively typed export cell
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ExportValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    DateTime(NaiveDateTime),
    Text(String),
}

/// Convert one raw cell to its native export value
///
/// Null passes through. Boolean columns map the textual values `"1"` and
/// `"true"` (case-insensitive) to true and everything else to false. Number
/// and date families parse with a raw-string fallback, so a malformed cell
/// degrades to text instead of failing the export.
pub fn convert_for_export(raw: &Value, sql_type: &str) -> ExportValue {
    if raw.is_null() {
        return ExportValue::Null;
    }

    match TypeCategory::from_sql_type(sql_type) {
        TypeCategory::Boolean => match raw {
            Value::Bool(flag) => ExportValue::Boolean(*flag),
            other => {
                let text = raw_text(other);
                ExportValue::Boolean(text == "1" || text.eq_ignore_ascii_case("true"))
            }
        },
        TypeCategory::Integer => {
            if let Some(value) = raw.as_i64() {
                return ExportValue::Integer(value);
            }
            let text = raw_text(raw);
            match text.trim().parse::<i64>() {
                Ok(value) => ExportValue::Integer(value),
                Err(_) => ExportValue::Text(text),
            }
        }
        TypeCategory::Float => {
            if let Some(value) = raw.as_f64() {
                return ExportValue::Float(value);
            }
            let text = raw_text(raw);
            match text.trim().parse::<f64>() {
                Ok(value) => ExportValue::Float(value),
                Err(_) => ExportValue::Text(text),
            }
        }
        TypeCategory::DateTime => {
            let text = raw_text(raw);
            match parse_date_time(text.trim()) {
                Some(value) => ExportValue::DateTime(value),
                None => ExportValue::Text(text),
            }
        }
        TypeCategory::Text => ExportValue::Text(raw_text(raw)),
    }
}

/// Textual rendering of a raw cell, used for parsing and fallbacks
fn raw_text(raw: &Value) -> String {
    match raw {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        Value::Bool(true) => "true".to_string(),
        Value::Bool(false) => "false".to_string(),
        other => other.to_string(),
    }
}

/// Parse the date/time renderings the remote server produces
fn parse_date_time(text: &str) -> Option<NaiveDateTime> {
    if let Ok(value) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(value);
    }
    if let Ok(value) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(value);
    }
    if let Ok(value) = DateTime::parse_from_rfc3339(text) {
        return Some(value.naive_utc());
    }
    if let Ok(value) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return value.and_hms_opt(0, 0, 0);
    }
    if let Ok(value) = NaiveTime::parse_from_str(text, "%H:%M:%S%.f") {
        return NaiveDate::from_ymd_opt(1970, 1, 1).map(|date| date.and_time(value));
    }
    None
}

/// One converted batch of export rows, plus cumulative progress
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportBatch {
    /// Converted rows; cells follow the schema's catalog column order
    pub rows: Vec<Vec<ExportValue>>,

    /// Rows yielded so far, including this batch
    pub rows_so_far: u64,

    /// Total matching rows as counted when the export started; zero when the
    /// count query degraded
    pub total_matching_row_count: u64,
}

impl ExportBatch {
    /// Fraction complete, or `None` when the total is unknown
    pub fn progress(&self) -> Option<f64> {
        if self.total_matching_row_count == 0 {
            return None;
        }
        Some(self.rows_so_far as f64 / self.total_matching_row_count as f64)
    }
}

/// Lazy, finite, non-restartable sequence of export batches
///
/// Chunks are fetched sequentially: chunk `k+1` is only requested after the
/// caller consumed chunk `k`, which keeps progress reporting monotonic. A
/// caller that stops calling [`next_batch`](Self::next_batch), or cancels a
/// chunk in flight, simply stops the sequence; it cannot be resumed.
impl<T: Transport> std::fmt::Debug for ExportStream<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportStream")
            .field("chunk_size_rows", &self.chunk_size_rows)
            .field("next_chunk_index", &self.next_chunk_index)
            .field("rows_so_far", &self.rows_so_far)
            .field("total_matching_row_count", &self.total_matching_row_count)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

pub struct ExportStream<'a, T: Transport> {
    executor: &'a QueryExecutor<T>,
    schema: TableSchema,
    filters: Vec<FilterCriterion>,
    sort: SortSpec,
    chunk_size_rows: u64,
    next_chunk_index: u64,
    rows_so_far: u64,
    total_matching_row_count: u64,
    finished: bool,
}

impl<'a, T: Transport> ExportStream<'a, T> {
    pub(crate) fn new(
        executor: &'a QueryExecutor<T>,
        schema: TableSchema,
        filters: Vec<FilterCriterion>,
        sort: SortSpec,
        chunk_size_rows: u64,
    ) -> Self {
        Self {
            executor,
            schema,
            filters,
            sort,
            chunk_size_rows,
            next_chunk_index: 0,
            rows_so_far: 0,
            total_matching_row_count: 0,
            finished: false,
        }
    }

    /// Fetch and convert the next chunk
    ///
    /// Returns `Ok(None)` when the sequence is exhausted. A transport error
    /// ends the sequence; later calls return `Ok(None)` rather than retrying,
    /// because the sequence is not restartable.
    pub async fn next_batch(&mut self, cancel: &CancellationToken) -> Result<Option<ExportBatch>> {
        if self.finished {
            return Ok(None);
        }

        let page = PageRequest::new(self.chunk_size_rows, self.next_chunk_index)?;
        let result = match self
            .executor
            .fetch_page(&self.schema, page, &self.filters, &self.sort, cancel)
            .await
        {
            Ok(result) => result,
            Err(error) => {
                self.finished = true;
                return Err(error);
            }
        };

        if self.next_chunk_index == 0 {
            self.total_matching_row_count = result.total_matching_row_count;
        }
        self.next_chunk_index += 1;

        if (result.rows.len() as u64) < self.chunk_size_rows {
            self.finished = true;
        }
        if result.rows.is_empty() {
            return Ok(None);
        }

        let mut rows = Vec::with_capacity(result.rows.len());
        for row in &result.rows {
            let mut cells = Vec::with_capacity(self.schema.columns.len());
            for column in &self.schema.columns {
                let raw = row.get(&column.name).unwrap_or(&Value::Null);
                cells.push(convert_for_export(raw, &column.sql_type));
            }
            rows.push(cells);
        }

        self.rows_so_far += rows.len() as u64;
        debug!(
            table = %self.schema.table.display(),
            rows_so_far = self.rows_so_far,
            total = self.total_matching_row_count,
            "export chunk complete"
        );

        Ok(Some(ExportBatch {
            rows,
            rows_so_far: self.rows_so_far,
            total_matching_row_count: self.total_matching_row_count,
        }))
    }
}
