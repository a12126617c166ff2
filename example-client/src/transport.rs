//! Toy in-memory transport standing in for a real server
//!
//! Understands exactly the statement shapes the engine produces: COUNT,
//! plain TOP, the %VID window, the catalog views, and the single-row write
//! statements. Real deployments implement [`Transport`] with an
//! authenticated HTTP client instead.

use std::sync::Mutex;

use async_trait::async_trait;
use iris_table_engine::{QuerySpec, ResultRow, Transport};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

pub struct InMemoryTransport {
    rows: Mutex<Vec<ResultRow>>,
}

impl InMemoryTransport {
    /// Seed an Employees table with `row_count` rows
    pub fn seeded(row_count: u64) -> Self {
        let rows = (1..=row_count)
            .map(|id| {
                object(json!({
                    "ID": id,
                    "Name": format!("Employee {id}"),
                    "Active": if id % 3 == 0 { "0" } else { "1" },
                }))
            })
            .collect();
        Self {
            rows: Mutex::new(rows),
        }
    }
}

fn object(value: Value) -> ResultRow {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

/// First integer after `marker` in the SQL text
fn number_after(sql: &str, marker: &str) -> usize {
    let tail = &sql[sql.find(marker).unwrap() + marker.len()..];
    tail.chars()
        .take_while(char::is_ascii_digit)
        .collect::<String>()
        .parse()
        .unwrap()
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn execute(
        &self,
        _namespace: &str,
        query: &QuerySpec,
        _cancel: &CancellationToken,
    ) -> iris_table_engine::Result<Vec<ResultRow>> {
        let sql = query.sql_text.as_str();
        let mut rows = self.rows.lock().unwrap();

        if sql.contains("INFORMATION_SCHEMA.TABLES") {
            return Ok(vec![object(json!({
                "TABLE_SCHEMA": "HR",
                "TABLE_NAME": "Employees",
            }))]);
        }

        if sql.contains("INFORMATION_SCHEMA.COLUMNS") {
            return Ok(vec![
                object(json!({
                    "COLUMN_NAME": "ID", "DATA_TYPE": "INTEGER", "IS_NULLABLE": "NO",
                    "PRIMARY_KEY": "YES", "AUTO_INCREMENT": "YES", "IS_GENERATED": "NEVER",
                })),
                object(json!({
                    "COLUMN_NAME": "Name", "DATA_TYPE": "VARCHAR", "IS_NULLABLE": "YES",
                    "CHARACTER_MAXIMUM_LENGTH": 50,
                    "PRIMARY_KEY": "NO", "AUTO_INCREMENT": "NO", "IS_GENERATED": "NEVER",
                })),
                object(json!({
                    "COLUMN_NAME": "Active", "DATA_TYPE": "BIT", "IS_NULLABLE": "YES",
                    "PRIMARY_KEY": "NO", "AUTO_INCREMENT": "NO", "IS_GENERATED": "NEVER",
                })),
            ]);
        }

        if sql.starts_with("SELECT COUNT(*)") {
            return Ok(vec![object(json!({"Aggregate_1": rows.len()}))]);
        }

        if sql.starts_with("SELECT TOP ") {
            let page_size = number_after(sql, "SELECT TOP ");
            if sql.contains("%VID > ") {
                let row_offset = number_after(sql, "%VID > ");
                let window_size = number_after(sql, "(SELECT TOP ");
                let end = window_size.min(rows.len());
                let start = row_offset.min(end);
                return Ok(rows[start..end].iter().take(page_size).cloned().collect());
            }
            let end = page_size.min(rows.len());
            return Ok(rows[..end].to_vec());
        }

        if sql.starts_with("UPDATE ") {
            // SET <col> = ? WHERE <pk> = ?
            let key = &query.parameters[1];
            for row in rows.iter_mut() {
                if row.get("ID") == Some(key) {
                    row.insert("Name".to_string(), query.parameters[0].clone());
                }
            }
            return Ok(Vec::new());
        }

        if sql.starts_with("INSERT INTO ") {
            let id = rows.len() as u64 + 1;
            rows.push(object(json!({
                "ID": id,
                "Name": query.parameters[0].clone(),
                "Active": query.parameters[1].clone(),
            })));
            return Ok(Vec::new());
        }

        if sql.starts_with("DELETE FROM ") {
            let key = &query.parameters[0];
            rows.retain(|row| row.get("ID") != Some(key));
            return Ok(Vec::new());
        }

        Ok(Vec::new())
    }

    async fn list_namespaces(
        &self,
        _cancel: &CancellationToken,
    ) -> iris_table_engine::Result<Vec<String>> {
        Ok(vec!["DEMO".to_string()])
    }
}
