//! Catalog-backed schema discovery
//!
//! Namespaces come from the server's self-describe endpoint; tables and
//! columns come from the `INFORMATION_SCHEMA` catalog views, queried through
//! the same transport as data queries. The catalog is treated as ground
//! truth fetched fresh per call — the engine keeps no schema cache, so any
//! caching policy stays with the caller where it can be injected and mocked.

use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::EngineConfig;
use crate::schema::{ColumnDescriptor, QuerySpec, ResultRow, TableReference, TableSchema};
use crate::transport::{round_trip, round_trip_namespaces, Transport};
use crate::Result;

/// Base-table listing, ordered schema then name; views and system objects
/// are excluded at the catalog level
const TABLES_QUERY: &str = "SELECT TABLE_SCHEMA, TABLE_NAME \
     FROM INFORMATION_SCHEMA.TABLES \
     WHERE TABLE_TYPE = 'BASE TABLE' \
     ORDER BY TABLE_SCHEMA, TABLE_NAME";

/// Column catalog for one table, filtered by bound parameters and ordered by
/// ordinal position
///
/// Schema and table name are bound even though they came from a prior
/// catalog listing; a listing must never become an interpolation vector.
const COLUMNS_QUERY: &str = "SELECT COLUMN_NAME, DATA_TYPE, IS_NULLABLE, \
     CHARACTER_MAXIMUM_LENGTH, NUMERIC_PRECISION, NUMERIC_SCALE, \
     PRIMARY_KEY, AUTO_INCREMENT, IS_GENERATED \
     FROM INFORMATION_SCHEMA.COLUMNS \
     WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? \
     ORDER BY ORDINAL_POSITION";

/// Schema discovery over the remote catalog
pub struct MetadataService<T: Transport> {
    transport: Arc<T>,
    config: EngineConfig,
}

impl<T: Transport> MetadataService<T> {
    /// Create a metadata service over the given transport
    pub fn new(transport: Arc<T>, config: EngineConfig) -> Self {
        Self { transport, config }
    }

    /// List the namespaces the server reports, unfiltered
    pub async fn namespaces(&self, cancel: &CancellationToken) -> Result<Vec<String>> {
        round_trip_namespaces(self.transport.as_ref(), cancel, self.config.request_timeout).await
    }

    /// List base tables in a namespace, ordered by schema then name
    pub async fn tables(
        &self,
        namespace: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<TableReference>> {
        let query = QuerySpec::without_parameters(TABLES_QUERY);
        let rows = round_trip(
            self.transport.as_ref(),
            namespace,
            &query,
            cancel,
            self.config.request_timeout,
        )
        .await?;

        let mut tables = Vec::with_capacity(rows.len());
        for row in rows {
            let schema = text_field(&row, "TABLE_SCHEMA");
            let name = text_field(&row, "TABLE_NAME");
            match (schema, name) {
                (Some(schema), Some(name)) => tables.push(TableReference { schema, name }),
                _ => warn!("skipping catalog table row with missing schema or name"),
            }
        }
        Ok(tables)
    }

    /// Fetch the column schema for one table, ordered by ordinal position
    ///
    /// Identity and generated columns are marked read-only. Catalog rows with
    /// a missing or invalid column name or type are skipped instead of
    /// aborting the whole fetch.
    pub async fn table_schema(
        &self,
        namespace: &str,
        table: &TableReference,
        cancel: &CancellationToken,
    ) -> Result<TableSchema> {
        let query = QuerySpec {
            sql_text: COLUMNS_QUERY.to_string(),
            parameters: vec![
                Value::String(table.schema.clone()),
                Value::String(table.name.clone()),
            ],
        };
        let rows = round_trip(
            self.transport.as_ref(),
            namespace,
            &query,
            cancel,
            self.config.request_timeout,
        )
        .await?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            match parse_column_row(&row) {
                Some(column) => columns.push(column),
                None => warn!(
                    table = %table.display(),
                    "skipping malformed catalog column row"
                ),
            }
        }

        Ok(TableSchema {
            table: table.clone(),
            columns,
        })
    }
}

/// Build one column descriptor from a catalog row, or `None` when the row is
/// unusable
fn parse_column_row(row: &ResultRow) -> Option<ColumnDescriptor> {
    let name = text_field(row, "COLUMN_NAME")?;
    let sql_type = text_field(row, "DATA_TYPE")?;

    let is_identity = yes_flag(row, "AUTO_INCREMENT");
    let is_generated = match text_field(row, "IS_GENERATED") {
        Some(value) => !value.eq_ignore_ascii_case("NEVER") && !value.eq_ignore_ascii_case("NO"),
        None => false,
    };

    Some(ColumnDescriptor {
        name,
        sql_type,
        nullable: yes_flag(row, "IS_NULLABLE"),
        max_length: unsigned_field(row, "CHARACTER_MAXIMUM_LENGTH"),
        precision: unsigned_field(row, "NUMERIC_PRECISION"),
        scale: unsigned_field(row, "NUMERIC_SCALE"),
        is_read_only: is_identity || is_generated,
        is_primary_key: yes_flag(row, "PRIMARY_KEY"),
    })
}

/// Non-empty string cell, tolerating numeric cells the server renders as text
fn text_field(row: &ResultRow, column: &str) -> Option<String> {
    match row.get(column)? {
        Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Unsigned numeric cell, tolerating the server rendering numbers as text
fn unsigned_field(row: &ResultRow, column: &str) -> Option<u32> {
    match row.get(column)? {
        Value::Number(number) => number.as_u64().and_then(|value| u32::try_from(value).ok()),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Catalog YES/NO flag, tolerating booleans and 0/1 renderings
fn yes_flag(row: &ResultRow, column: &str) -> bool {
    match row.get(column) {
        Some(Value::String(text)) => text.eq_ignore_ascii_case("YES") || text == "1",
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Number(number)) => number.as_i64() == Some(1),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Replays canned catalog rows and records every query it receives
    struct CatalogTransport {
        table_rows: Vec<ResultRow>,
        column_rows: Vec<ResultRow>,
        executed: Mutex<Vec<QuerySpec>>,
    }

    impl CatalogTransport {
        fn new(table_rows: Vec<Value>, column_rows: Vec<Value>) -> Self {
            let into_rows = |values: Vec<Value>| {
                values
                    .into_iter()
                    .map(|value| match value {
                        Value::Object(map) => map,
                        other => panic!("catalog fixture must be an object, got {other}"),
                    })
                    .collect()
            };
            Self {
                table_rows: into_rows(table_rows),
                column_rows: into_rows(column_rows),
                executed: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Transport for CatalogTransport {
        async fn execute(
            &self,
            _namespace: &str,
            query: &QuerySpec,
            _cancel: &CancellationToken,
        ) -> Result<Vec<ResultRow>> {
            self.executed.lock().unwrap().push(query.clone());
            if query.sql_text.contains("INFORMATION_SCHEMA.TABLES") {
                Ok(self.table_rows.clone())
            } else {
                Ok(self.column_rows.clone())
            }
        }

        async fn list_namespaces(&self, _cancel: &CancellationToken) -> Result<Vec<String>> {
            Ok(vec!["USER".to_string(), "HSLIB".to_string()])
        }
    }

    fn service(transport: CatalogTransport) -> MetadataService<CatalogTransport> {
        MetadataService::new(Arc::new(transport), EngineConfig::default())
    }

    #[tokio::test]
    async fn test_namespaces_pass_through_unfiltered() {
        let metadata = service(CatalogTransport::new(vec![], vec![]));
        let namespaces = metadata.namespaces(&CancellationToken::new()).await.unwrap();
        assert_eq!(namespaces, vec!["USER", "HSLIB"]);
    }

    #[tokio::test]
    async fn test_tables_skip_malformed_rows() {
        let metadata = service(CatalogTransport::new(
            vec![
                json!({"TABLE_SCHEMA": "HR", "TABLE_NAME": "Employees"}),
                json!({"TABLE_SCHEMA": "HR"}),
                json!({"TABLE_SCHEMA": "Sales", "TABLE_NAME": "Orders"}),
            ],
            vec![],
        ));
        let tables = metadata.tables("USER", &CancellationToken::new()).await.unwrap();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].display(), "HR.Employees");
        assert_eq!(tables[1].display(), "Sales.Orders");
    }

    #[tokio::test]
    async fn test_table_schema_binds_names_and_marks_read_only() {
        let transport = CatalogTransport::new(
            vec![],
            vec![
                json!({
                    "COLUMN_NAME": "ID", "DATA_TYPE": "INTEGER", "IS_NULLABLE": "NO",
                    "PRIMARY_KEY": "YES", "AUTO_INCREMENT": "YES", "IS_GENERATED": "NEVER"
                }),
                json!({
                    "COLUMN_NAME": "Name", "DATA_TYPE": "VARCHAR", "IS_NULLABLE": "YES",
                    "CHARACTER_MAXIMUM_LENGTH": 50,
                    "PRIMARY_KEY": "NO", "AUTO_INCREMENT": "NO", "IS_GENERATED": "NEVER"
                }),
                // Unusable: no data type reported
                json!({"COLUMN_NAME": "Ghost", "IS_NULLABLE": "YES"}),
            ],
        );
        let metadata = service(transport);
        let table = TableReference {
            schema: "HR".to_string(),
            name: "Employees".to_string(),
        };
        let schema = metadata
            .table_schema("USER", &table, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(schema.columns.len(), 2);
        assert!(schema.columns[0].is_read_only);
        assert!(schema.columns[0].is_primary_key);
        assert!(!schema.columns[1].is_read_only);
        assert_eq!(schema.columns[1].max_length, Some(50));

        let executed = metadata.transport.executed.lock().unwrap();
        assert_eq!(executed.len(), 1);
        assert!(executed[0].sql_text.contains("TABLE_SCHEMA = ? AND TABLE_NAME = ?"));
        assert_eq!(
            executed[0].parameters,
            vec![json!("HR"), json!("Employees")]
        );
        // Names travel only as parameters, never in the SQL text
        assert!(!executed[0].sql_text.contains("Employees"));
    }

    #[test]
    fn test_yes_flag_renderings() {
        let row: ResultRow = match json!({"a": "YES", "b": "no", "c": 1, "d": true, "e": "1"}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        assert!(yes_flag(&row, "a"));
        assert!(!yes_flag(&row, "b"));
        assert!(yes_flag(&row, "c"));
        assert!(yes_flag(&row, "d"));
        assert!(yes_flag(&row, "e"));
        assert!(!yes_flag(&row, "missing"));
    }
}
