//! Windowed pagination over a TOP-only dialect
//!
//! The remote dialect has no OFFSET/LIMIT and no cursor protocol; the only
//! primitive is `SELECT TOP n`. Page `p` of size `s` is fetched by selecting
//! the first `p*s + s` rows in a subquery and discarding the first `p*s` via
//! the dialect's implicit `%VID` row-ordinal pseudo-column on the outer
//! query. Windowing is only deterministic under a stable order, so when the
//! caller requests no sort a tiebreaker is injected.

use crate::schema::{PageRequest, QuerySpec, TableSchema};
use crate::sql::filter::CompiledFilters;
use crate::sql::identifier::validate_identifier;
use crate::Result;

/// Build the windowed SELECT for one page of a table
///
/// `order_by_clause` is the output of
/// [`compile_sort`](crate::sql::filter::compile_sort); when it is empty a
/// deterministic tiebreaker (primary key ascending, else the first schema
/// column) takes its place so that repeated identical queries window the same
/// row order. The TOP counts come from page arithmetic, never from user text.
pub fn build_page_query(
    schema: &TableSchema,
    page: PageRequest,
    filters: &CompiledFilters,
    order_by_clause: &str,
) -> Result<QuerySpec> {
    let table = schema.table.to_sql()?;
    let select_list = build_select_list(schema)?;
    let order_by = if order_by_clause.is_empty() {
        stable_tiebreaker(schema)?
    } else {
        order_by_clause.to_string()
    };

    let page_size = page.page_size_rows;
    let row_offset = page.row_offset();

    let sql_text = if row_offset == 0 {
        format!(
            "SELECT TOP {page_size} {select_list} FROM {table}{}{order_by}",
            filters.where_clause
        )
    } else {
        let window_size = row_offset + page_size;
        format!(
            "SELECT TOP {page_size} {select_list} FROM \
             (SELECT TOP {window_size} {select_list} FROM {table}{}{order_by}) \
             WHERE %VID > {row_offset}",
            filters.where_clause
        )
    };

    Ok(QuerySpec {
        sql_text,
        parameters: filters.parameters.clone(),
    })
}

/// Build the independent `SELECT COUNT(*)` used for the pagination UI
///
/// Shares the compiled filter parameters with the page query so both see the
/// same matching set.
pub fn build_count_query(schema: &TableSchema, filters: &CompiledFilters) -> Result<QuerySpec> {
    let table = schema.table.to_sql()?;
    Ok(QuerySpec {
        sql_text: format!("SELECT COUNT(*) FROM {table}{}", filters.where_clause),
        parameters: filters.parameters.clone(),
    })
}

/// Quoted, comma-separated column list in catalog ordinal order
fn build_select_list(schema: &TableSchema) -> Result<String> {
    let mut quoted = Vec::with_capacity(schema.columns.len());
    for column in &schema.columns {
        quoted.push(validate_identifier(&column.name, "column name")?);
    }
    Ok(quoted.join(", "))
}

/// ORDER BY injected when the caller requested no sort
///
/// Primary key ascending when the table has one; otherwise the first catalog
/// column, which is best-effort for tables the remote server defines without
/// a primary key.
fn stable_tiebreaker(schema: &TableSchema) -> Result<String> {
    let column = schema
        .primary_key_column()
        .or_else(|| schema.columns.first());
    match column {
        Some(column) => {
            let quoted = validate_identifier(&column.name, "column name")?;
            Ok(format!(" ORDER BY {} ASC", quoted))
        }
        None => Ok(String::new()),
    }
}
