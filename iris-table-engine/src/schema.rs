//! Schema and query types for remote table browsing
//!
//! These types represent table metadata discovered from the remote catalog at
//! runtime, plus the request/response value objects exchanged with the query
//! executor. Everything here is request-scoped and immutable after
//! construction; nothing is cached inside the engine.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::sql::identifier::{parse_qualified_table_name, validate_identifier};
use crate::{EngineError, Result};

/// A schema-qualified reference to a remote table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableReference {
    /// Schema (namespace-local) the table lives in
    pub schema: String,

    /// Table name without schema qualification
    pub name: String,
}

impl TableReference {
    /// Parse a `schema.table` display string, splitting on the first `.`
    ///
    /// When no `.` is present the default schema is used. Both segments must
    /// pass identifier validation.
    pub fn parse(display: &str) -> Result<Self> {
        parse_qualified_table_name(display)
    }

    /// Render as a quoted, validated `"schema"."table"` SQL fragment
    pub fn to_sql(&self) -> Result<String> {
        let schema = validate_identifier(&self.schema, "schema name")?;
        let name = validate_identifier(&self.name, "table name")?;
        Ok(format!("{}.{}", schema, name))
    }

    /// Display form used in logs and error messages (`schema.table`)
    pub fn display(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

/// Information about a single column, as reported by the remote catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDescriptor {
    /// Column name
    pub name: String,

    /// SQL data type name (e.g. "INTEGER", "VARCHAR", "TIMESTAMP")
    pub sql_type: String,

    /// Whether the column allows NULL values
    pub nullable: bool,

    /// Maximum character length for string types (if reported)
    pub max_length: Option<u32>,

    /// Numeric precision (if reported)
    pub precision: Option<u32>,

    /// Numeric scale (if reported)
    pub scale: Option<u32>,

    /// True for identity/auto-generated columns; such columns are never
    /// included in INSERT or UPDATE column lists
    pub is_read_only: bool,

    /// Whether this column is part of the primary key
    pub is_primary_key: bool,
}

/// Complete schema information for a remote table
///
/// Columns are ordered by the remote catalog's ordinal position. Order is
/// significant: export column alignment depends on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSchema {
    /// The table this schema describes
    pub table: TableReference,

    /// Columns in catalog ordinal order
    pub columns: Vec<ColumnDescriptor>,
}

impl TableSchema {
    /// Look up a column by name
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|column| column.name == name)
    }

    /// First primary key column, if the table has one
    pub fn primary_key_column(&self) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|column| column.is_primary_key)
    }
}

/// A single per-column filter pattern
///
/// `pattern` uses a two-token wildcard language: `*` matches any run of
/// characters and `?` matches exactly one character. Matching is
/// case-insensitive. Multiple criteria combine with AND.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterCriterion {
    /// Column the pattern applies to
    pub column: String,

    /// Wildcard pattern typed by the user
    pub pattern: String,
}

/// Sort direction for a row query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Requested sort column and direction; at most one active sort column
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortSpec {
    /// Column name to sort by
    pub column: Option<String>,

    /// Sort direction (ignored when `column` is absent)
    pub direction: Option<SortDirection>,
}

impl SortSpec {
    /// A spec requesting no sorting
    pub fn none() -> Self {
        Self::default()
    }

    /// Sort by the given column
    pub fn by(column: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            column: Some(column.into()),
            direction: Some(direction),
        }
    }
}

/// Page window for a row fetch
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    /// Number of rows per page; must be positive
    pub page_size_rows: u64,

    /// Zero-indexed page number
    pub page_offset: u64,
}

impl PageRequest {
    /// Create a page request, rejecting a zero page size before any SQL is built
    pub fn new(page_size_rows: u64, page_offset: u64) -> Result<Self> {
        if page_size_rows == 0 {
            return Err(EngineError::InvalidInput(
                "page size must be a positive number of rows".to_string(),
            ));
        }
        Ok(Self {
            page_size_rows,
            page_offset,
        })
    }

    /// Row offset of the first row on this page
    pub fn row_offset(&self) -> u64 {
        self.page_offset * self.page_size_rows
    }
}

/// Parameterized SQL ready for the transport
///
/// This is the only artifact ever handed to the transport client: `sql_text`
/// contains validated identifiers and `?` placeholders, never a raw
/// user-supplied value. The values travel separately in `parameters`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySpec {
    /// SQL text with `?` placeholders
    pub sql_text: String,

    /// Bound parameter values, in placeholder order
    pub parameters: Vec<Value>,
}

impl QuerySpec {
    /// A query with no bound parameters
    pub fn without_parameters(sql_text: impl Into<String>) -> Self {
        Self {
            sql_text: sql_text.into(),
            parameters: Vec::new(),
        }
    }
}

/// One remote result row: column name to cell value
pub type ResultRow = serde_json::Map<String, Value>;

/// Response from a paged row fetch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    /// Rows in remote result order
    pub rows: Vec<ResultRow>,

    /// Total number of rows matching the filters, across all pages
    ///
    /// Zero when the independent count query failed; a degraded but usable
    /// result rather than a failed page fetch.
    pub total_matching_row_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_request_rejects_zero_page_size() {
        let error = PageRequest::new(0, 0).unwrap_err();
        assert!(matches!(error, EngineError::InvalidInput(_)));
    }

    #[test]
    fn test_page_request_row_offset() {
        let page = PageRequest::new(50, 2).unwrap();
        assert_eq!(page.row_offset(), 100);
    }

    #[test]
    fn test_table_reference_to_sql_quotes_both_segments() {
        let table = TableReference {
            schema: "SQLUser".to_string(),
            name: "Employees".to_string(),
        };
        assert_eq!(table.to_sql().unwrap(), "\"SQLUser\".\"Employees\"");
    }

    #[test]
    fn test_primary_key_column_lookup() {
        let schema = TableSchema {
            table: TableReference {
                schema: "SQLUser".to_string(),
                name: "Employees".to_string(),
            },
            columns: vec![
                ColumnDescriptor {
                    name: "Name".to_string(),
                    sql_type: "VARCHAR".to_string(),
                    nullable: true,
                    max_length: Some(50),
                    precision: None,
                    scale: None,
                    is_read_only: false,
                    is_primary_key: false,
                },
                ColumnDescriptor {
                    name: "ID".to_string(),
                    sql_type: "INTEGER".to_string(),
                    nullable: false,
                    max_length: None,
                    precision: None,
                    scale: None,
                    is_read_only: true,
                    is_primary_key: true,
                },
            ],
        };

        assert_eq!(schema.primary_key_column().unwrap().name, "ID");
        assert!(schema.column("Name").is_some());
        assert!(schema.column("name").is_none());
    }
}
