//! Public CRUD surface
//!
//! Every operation here builds a [`QuerySpec`] from validated identifiers
//! and `?` placeholders, then delegates execution to the injected transport.
//! Identifiers are revalidated at the point of use: a string that passed
//! validation in an earlier call is not trusted across a call boundary.
//! The executor holds no shared mutable state; concurrent calls are
//! independent, and correctness of concurrent edits against the remote data
//! is the remote server's concern.

use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::EngineConfig;
use crate::export::ExportStream;
use crate::schema::{
    FilterCriterion, PageRequest, QueryResult, QuerySpec, ResultRow, SortSpec, TableReference,
    TableSchema,
};
use crate::sql::filter::{compile_filters, compile_sort};
use crate::sql::identifier::validate_identifier;
use crate::sql::pagination::{build_count_query, build_page_query};
use crate::transport::{round_trip, Transport};
use crate::{EngineError, Result};

/// Query executor for one namespace of a remote server
pub struct QueryExecutor<T: Transport> {
    transport: Arc<T>,
    namespace: String,
    config: EngineConfig,
}

impl<T: Transport> QueryExecutor<T> {
    /// Create an executor bound to one namespace
    pub fn new(transport: Arc<T>, namespace: impl Into<String>, config: EngineConfig) -> Self {
        Self {
            transport,
            namespace: namespace.into(),
            config,
        }
    }

    /// Fetch one page of a table with filters and sorting applied
    ///
    /// The matching-row total comes from an independent `SELECT COUNT(*)`
    /// sharing the same filter parameters; when that count fails the page is
    /// still returned with a total of zero — degraded but usable.
    pub async fn fetch_page(
        &self,
        schema: &TableSchema,
        page: PageRequest,
        filters: &[FilterCriterion],
        sort: &SortSpec,
        cancel: &CancellationToken,
    ) -> Result<QueryResult> {
        let page = self.clamp_page(page);
        let compiled_filters = compile_filters(filters, schema)?;
        let order_by = compile_sort(sort, schema);

        let count_query = build_count_query(schema, &compiled_filters)?;
        let total_matching_row_count = match self.execute(&count_query, cancel).await {
            Ok(rows) => parse_count(&rows).unwrap_or(0),
            Err(error) => {
                warn!(
                    table = %schema.table.display(),
                    %error,
                    "row count query failed; reporting zero total"
                );
                0
            }
        };

        let page_query = build_page_query(schema, page, &compiled_filters, &order_by)?;
        let rows = self.execute(&page_query, cancel).await?;

        Ok(QueryResult {
            rows,
            total_matching_row_count,
        })
    }

    /// Count the rows matching the given filters
    ///
    /// Unlike the embedded count in [`fetch_page`](Self::fetch_page), a
    /// failure here propagates: a caller asking only for a count has nothing
    /// to degrade to.
    pub async fn count_matching(
        &self,
        schema: &TableSchema,
        filters: &[FilterCriterion],
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let compiled_filters = compile_filters(filters, schema)?;
        let count_query = build_count_query(schema, &compiled_filters)?;
        let rows = self.execute(&count_query, cancel).await?;
        parse_count(&rows).ok_or_else(|| {
            EngineError::RemoteQueryError("count query returned no usable value".to_string())
        })
    }

    /// Update one cell, addressed by primary key value
    ///
    /// Both the new value and the key travel as bound parameters. There is no
    /// row-unchanged-since-read check; the last writer wins.
    pub async fn update_cell(
        &self,
        table: &TableReference,
        column: &str,
        new_value: Value,
        primary_key_column: &str,
        primary_key_value: Value,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let table_sql = table.to_sql()?;
        let column_sql = validate_identifier(column, "column name")?;
        let key_sql = validate_identifier(primary_key_column, "primary key column")?;

        let query = QuerySpec {
            sql_text: format!("UPDATE {table_sql} SET {column_sql} = ? WHERE {key_sql} = ?"),
            parameters: vec![new_value, primary_key_value],
        };
        self.execute(&query, cancel).await?;
        Ok(())
    }

    /// Insert one row with explicit column and value lists
    ///
    /// The lists must be the same non-zero length; a mismatch fails with
    /// `InvalidInput` before any network call. Identity/generated columns
    /// must not appear in `columns`.
    pub async fn insert_row(
        &self,
        table: &TableReference,
        columns: &[String],
        values: Vec<Value>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if columns.is_empty() {
            return Err(EngineError::InvalidInput(
                "insert requires at least one column".to_string(),
            ));
        }
        if columns.len() != values.len() {
            return Err(EngineError::InvalidInput(format!(
                "insert has {} columns but {} values",
                columns.len(),
                values.len()
            )));
        }

        let table_sql = table.to_sql()?;
        let mut quoted_columns = Vec::with_capacity(columns.len());
        for column in columns {
            quoted_columns.push(validate_identifier(column, "column name")?);
        }
        let placeholders = vec!["?"; values.len()].join(", ");

        let query = QuerySpec {
            sql_text: format!(
                "INSERT INTO {table_sql} ({}) VALUES ({placeholders})",
                quoted_columns.join(", ")
            ),
            parameters: values,
        };
        self.execute(&query, cancel).await?;
        Ok(())
    }

    /// Delete one row, addressed by primary key value
    pub async fn delete_row(
        &self,
        table: &TableReference,
        primary_key_column: &str,
        primary_key_value: Value,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let table_sql = table.to_sql()?;
        let key_sql = validate_identifier(primary_key_column, "primary key column")?;

        let query = QuerySpec {
            sql_text: format!("DELETE FROM {table_sql} WHERE {key_sql} = ?"),
            parameters: vec![primary_key_value],
        };
        self.execute(&query, cancel).await?;
        Ok(())
    }

    /// Begin a chunked export of every row matching the filters
    ///
    /// Returns a lazy, finite, non-restartable batch sequence; see
    /// [`ExportStream`]. Chunk sizes above the configured page cap are
    /// clamped so short-batch termination stays correct.
    pub fn export_all_matching(
        &self,
        schema: TableSchema,
        filters: Vec<FilterCriterion>,
        sort: SortSpec,
        chunk_size_rows: u64,
    ) -> Result<ExportStream<'_, T>> {
        if chunk_size_rows == 0 {
            return Err(EngineError::InvalidInput(
                "export chunk size must be a positive number of rows".to_string(),
            ));
        }
        let chunk_size_rows = chunk_size_rows.min(self.config.max_page_size_rows);
        Ok(ExportStream::new(self, schema, filters, sort, chunk_size_rows))
    }

    fn clamp_page(&self, page: PageRequest) -> PageRequest {
        PageRequest {
            page_size_rows: page.page_size_rows.min(self.config.max_page_size_rows),
            page_offset: page.page_offset,
        }
    }

    async fn execute(&self, query: &QuerySpec, cancel: &CancellationToken) -> Result<Vec<ResultRow>> {
        round_trip(
            self.transport.as_ref(),
            &self.namespace,
            query,
            cancel,
            self.config.request_timeout,
        )
        .await
    }
}

/// Read the single aggregate value out of a COUNT result, whatever the
/// server named the column
fn parse_count(rows: &[ResultRow]) -> Option<u64> {
    let cell = rows.first()?.values().next()?;
    match cell {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::ExportValue;
    use crate::schema::{ColumnDescriptor, SortDirection};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory table that understands exactly the query shapes the engine
    /// emits: COUNT, plain TOP, and the %VID window
    struct TableTransport {
        rows: Vec<ResultRow>,
        calls: AtomicUsize,
        fail_count_query: bool,
        executed: Mutex<Vec<QuerySpec>>,
    }

    impl TableTransport {
        fn with_rows(row_count: u64) -> Self {
            let rows = (1..=row_count)
                .map(|id| {
                    match json!({
                        "ID": id,
                        "Name": format!("Employee{id}"),
                        "Active": if id % 2 == 0 { "1" } else { "0" },
                    }) {
                        Value::Object(map) => map,
                        _ => unreachable!(),
                    }
                })
                .collect();
            Self {
                rows,
                calls: AtomicUsize::new(0),
                fail_count_query: false,
                executed: Mutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn last_query(&self) -> QuerySpec {
            self.executed.lock().unwrap().last().cloned().unwrap()
        }
    }

    /// First integer after `marker` in the SQL text
    fn number_after(sql: &str, marker: &str) -> usize {
        let tail = &sql[sql.find(marker).unwrap() + marker.len()..];
        let digits: String = tail.chars().take_while(char::is_ascii_digit).collect();
        digits.parse().unwrap()
    }

    #[async_trait]
    impl Transport for TableTransport {
        async fn execute(
            &self,
            _namespace: &str,
            query: &QuerySpec,
            _cancel: &CancellationToken,
        ) -> Result<Vec<ResultRow>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.executed.lock().unwrap().push(query.clone());
            let sql = query.sql_text.as_str();

            if sql.starts_with("SELECT COUNT(*)") {
                if self.fail_count_query {
                    return Err(EngineError::RemoteQueryError("count exploded".to_string()));
                }
                let row = match json!({"Aggregate_1": self.rows.len()}) {
                    Value::Object(map) => map,
                    _ => unreachable!(),
                };
                return Ok(vec![row]);
            }

            if sql.starts_with("SELECT TOP ") {
                let page_size = number_after(sql, "SELECT TOP ");
                if sql.contains("%VID > ") {
                    let row_offset = number_after(sql, "%VID > ");
                    let window_size = number_after(sql, "(SELECT TOP ");
                    let end = window_size.min(self.rows.len());
                    let start = row_offset.min(end);
                    return Ok(self.rows[start..end]
                        .iter()
                        .take(page_size)
                        .cloned()
                        .collect());
                }
                let end = page_size.min(self.rows.len());
                return Ok(self.rows[..end].to_vec());
            }

            // Write statements return no result set
            Ok(Vec::new())
        }

        async fn list_namespaces(&self, _cancel: &CancellationToken) -> Result<Vec<String>> {
            Ok(vec!["USER".to_string()])
        }
    }

    fn employee_schema() -> TableSchema {
        let column = |name: &str, sql_type: &str, primary_key: bool| ColumnDescriptor {
            name: name.to_string(),
            sql_type: sql_type.to_string(),
            nullable: !primary_key,
            max_length: None,
            precision: None,
            scale: None,
            is_read_only: primary_key,
            is_primary_key: primary_key,
        };
        TableSchema {
            table: TableReference {
                schema: "SQLUser".to_string(),
                name: "Employees".to_string(),
            },
            columns: vec![
                column("ID", "INTEGER", true),
                column("Name", "VARCHAR", false),
                column("Active", "BIT", false),
            ],
        }
    }

    fn executor(transport: Arc<TableTransport>) -> QueryExecutor<TableTransport> {
        QueryExecutor::new(transport, "USER", EngineConfig::default())
    }

    async fn collect_all_pages(
        executor: &QueryExecutor<TableTransport>,
        schema: &TableSchema,
        page_size: u64,
    ) -> (Vec<u64>, u64) {
        let cancel = CancellationToken::new();
        let mut identifiers = Vec::new();
        let mut total = 0;
        for page_offset in 0.. {
            let page = PageRequest::new(page_size, page_offset).unwrap();
            let result = executor
                .fetch_page(schema, page, &[], &SortSpec::none(), &cancel)
                .await
                .unwrap();
            total = result.total_matching_row_count;
            let fetched = result.rows.len() as u64;
            identifiers.extend(
                result
                    .rows
                    .iter()
                    .map(|row| row.get("ID").unwrap().as_u64().unwrap()),
            );
            if fetched < page_size {
                break;
            }
        }
        (identifiers, total)
    }

    #[tokio::test]
    async fn test_pagination_round_trip_has_no_gaps_or_duplicates() {
        let page_size = 50u64;
        for row_count in [0u64, 1, 49, 50, 51, 157] {
            let transport = Arc::new(TableTransport::with_rows(row_count));
            let executor = executor(transport);
            let (identifiers, total) =
                collect_all_pages(&executor, &employee_schema(), page_size).await;

            let expected: Vec<u64> = (1..=row_count).collect();
            assert_eq!(identifiers, expected, "row_count = {row_count}");
            assert_eq!(total, row_count);
        }
    }

    #[tokio::test]
    async fn test_employees_127_rows_page_size_50() {
        let transport = Arc::new(TableTransport::with_rows(127));
        let executor = executor(transport);
        let schema = employee_schema();
        let cancel = CancellationToken::new();

        let fetch = |page_offset| {
            let schema = &schema;
            let executor = &executor;
            let cancel = &cancel;
            async move {
                executor
                    .fetch_page(
                        schema,
                        PageRequest::new(50, page_offset).unwrap(),
                        &[],
                        &SortSpec::none(),
                        cancel,
                    )
                    .await
                    .unwrap()
            }
        };

        let page_zero = fetch(0).await;
        assert_eq!(page_zero.rows.len(), 50);
        assert_eq!(page_zero.rows[0]["ID"], json!(1));
        assert_eq!(page_zero.rows[49]["ID"], json!(50));
        assert_eq!(page_zero.total_matching_row_count, 127);

        let page_one = fetch(1).await;
        assert_eq!(page_one.rows[0]["ID"], json!(51));
        assert_eq!(page_one.rows[49]["ID"], json!(100));

        let page_two = fetch(2).await;
        assert_eq!(page_two.rows.len(), 27);
        assert_eq!(page_two.rows[0]["ID"], json!(101));
        assert_eq!(page_two.rows[26]["ID"], json!(127));
    }

    #[tokio::test]
    async fn test_count_failure_degrades_to_zero_total() {
        let mut transport = TableTransport::with_rows(10);
        transport.fail_count_query = true;
        let executor = executor(Arc::new(transport));
        let cancel = CancellationToken::new();

        let result = executor
            .fetch_page(
                &employee_schema(),
                PageRequest::new(5, 0).unwrap(),
                &[],
                &SortSpec::none(),
                &cancel,
            )
            .await
            .unwrap();

        assert_eq!(result.rows.len(), 5);
        assert_eq!(result.total_matching_row_count, 0);
    }

    #[tokio::test]
    async fn test_count_matching_propagates_failure() {
        let mut transport = TableTransport::with_rows(10);
        transport.fail_count_query = true;
        let executor = executor(Arc::new(transport));
        let cancel = CancellationToken::new();

        let error = executor
            .count_matching(&employee_schema(), &[], &cancel)
            .await
            .unwrap_err();
        assert!(matches!(error, EngineError::RemoteQueryError(_)));
    }

    #[tokio::test]
    async fn test_export_yields_every_row_and_terminates_on_exact_multiple() {
        let transport = Arc::new(TableTransport::with_rows(100));
        let executor = executor(transport);
        let cancel = CancellationToken::new();

        let mut stream = executor
            .export_all_matching(employee_schema(), Vec::new(), SortSpec::none(), 25)
            .unwrap();

        let mut batches = 0;
        let mut exported_rows = 0u64;
        let mut last_progress = 0.0;
        while let Some(batch) = stream.next_batch(&cancel).await.unwrap() {
            batches += 1;
            exported_rows += batch.rows.len() as u64;
            assert_eq!(batch.rows_so_far, exported_rows);
            assert_eq!(batch.total_matching_row_count, 100);
            let progress = batch.progress().unwrap();
            assert!(progress > last_progress, "progress must be monotonic");
            last_progress = progress;
        }

        assert_eq!(batches, 4);
        assert_eq!(exported_rows, 100);
        assert_eq!(last_progress, 1.0);

        // Exhausted stream stays exhausted
        assert!(stream.next_batch(&cancel).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_export_converts_cells_in_schema_column_order() {
        let transport = Arc::new(TableTransport::with_rows(2));
        let executor = executor(transport);
        let cancel = CancellationToken::new();

        let mut stream = executor
            .export_all_matching(employee_schema(), Vec::new(), SortSpec::none(), 10)
            .unwrap();
        let batch = stream.next_batch(&cancel).await.unwrap().unwrap();

        assert_eq!(batch.rows.len(), 2);
        assert_eq!(
            batch.rows[0],
            vec![
                ExportValue::Integer(1),
                ExportValue::Text("Employee1".to_string()),
                ExportValue::Boolean(false),
            ]
        );
        assert_eq!(batch.rows[1][2], ExportValue::Boolean(true));
    }

    #[tokio::test]
    async fn test_export_rejects_zero_chunk_size() {
        let transport = Arc::new(TableTransport::with_rows(5));
        let executor = executor(transport);
        let error = executor
            .export_all_matching(employee_schema(), Vec::new(), SortSpec::none(), 0)
            .unwrap_err();
        assert!(matches!(error, EngineError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_insert_length_mismatch_fails_before_any_network_call() {
        let transport = Arc::new(TableTransport::with_rows(0));
        let executor = executor(transport.clone());
        let cancel = CancellationToken::new();
        let table = TableReference::parse("SQLUser.Employees").unwrap();

        let error = executor
            .insert_row(
                &table,
                &["Name".to_string(), "Active".to_string()],
                vec![json!("Ada")],
                &cancel,
            )
            .await
            .unwrap_err();

        assert!(matches!(error, EngineError::InvalidInput(_)));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_insert_builds_placeholder_only_statement() {
        let transport = Arc::new(TableTransport::with_rows(0));
        let executor = executor(transport.clone());
        let cancel = CancellationToken::new();
        let table = TableReference::parse("SQLUser.Employees").unwrap();

        executor
            .insert_row(
                &table,
                &["Name".to_string(), "Active".to_string()],
                vec![json!("Ada"), json!("1")],
                &cancel,
            )
            .await
            .unwrap();

        let query = transport.last_query();
        assert_eq!(
            query.sql_text,
            "INSERT INTO \"SQLUser\".\"Employees\" (\"Name\", \"Active\") VALUES (?, ?)"
        );
        assert_eq!(query.parameters, vec![json!("Ada"), json!("1")]);
    }

    #[tokio::test]
    async fn test_update_cell_binds_value_and_key() {
        let transport = Arc::new(TableTransport::with_rows(0));
        let executor = executor(transport.clone());
        let cancel = CancellationToken::new();
        let table = TableReference::parse("SQLUser.Employees").unwrap();

        executor
            .update_cell(&table, "Name", json!("Grace"), "ID", json!(7), &cancel)
            .await
            .unwrap();

        let query = transport.last_query();
        assert_eq!(
            query.sql_text,
            "UPDATE \"SQLUser\".\"Employees\" SET \"Name\" = ? WHERE \"ID\" = ?"
        );
        assert_eq!(query.parameters, vec![json!("Grace"), json!(7)]);
    }

    #[tokio::test]
    async fn test_delete_row_binds_key() {
        let transport = Arc::new(TableTransport::with_rows(0));
        let executor = executor(transport.clone());
        let cancel = CancellationToken::new();
        let table = TableReference::parse("SQLUser.Employees").unwrap();

        executor
            .delete_row(&table, "ID", json!(3), &cancel)
            .await
            .unwrap();

        let query = transport.last_query();
        assert_eq!(
            query.sql_text,
            "DELETE FROM \"SQLUser\".\"Employees\" WHERE \"ID\" = ?"
        );
        assert_eq!(query.parameters, vec![json!(3)]);
    }

    #[tokio::test]
    async fn test_hostile_identifier_never_reaches_transport() {
        let transport = Arc::new(TableTransport::with_rows(0));
        let executor = executor(transport.clone());
        let cancel = CancellationToken::new();
        let table = TableReference::parse("SQLUser.Employees").unwrap();

        let error = executor
            .update_cell(
                &table,
                "Name\" = NULL; DROP TABLE x --",
                json!("x"),
                "ID",
                json!(1),
                &cancel,
            )
            .await
            .unwrap_err();

        assert!(matches!(error, EngineError::InvalidIdentifier { .. }));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_explicit_sort_is_embedded_as_validated_identifier() {
        let transport = Arc::new(TableTransport::with_rows(5));
        let executor = executor(transport.clone());
        let cancel = CancellationToken::new();

        executor
            .fetch_page(
                &employee_schema(),
                PageRequest::new(5, 0).unwrap(),
                &[],
                &SortSpec::by("Name", SortDirection::Descending),
                &cancel,
            )
            .await
            .unwrap();

        let query = transport.last_query();
        assert!(query.sql_text.ends_with("ORDER BY \"Name\" DESC"));
    }
}
