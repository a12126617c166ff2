//! Filter and sort compilation
//!
//! Turns per-column wildcard patterns and an optional sort request into
//! `WHERE` / `ORDER BY` fragments. Pattern text only ever reaches the server
//! as a bound parameter; column names are validated identifiers.

use serde_json::Value;
use tracing::debug;

use crate::schema::{FilterCriterion, SortDirection, SortSpec, TableSchema};
use crate::sql::identifier::validate_identifier;
use crate::Result;

/// Escape character used in compiled LIKE patterns
const LIKE_ESCAPE: char = '\\';

/// A compiled `WHERE` fragment plus its bound parameters
#[derive(Debug, Clone, Default)]
pub struct CompiledFilters {
    /// Leading-space `" WHERE ..."` fragment, or empty when no criteria apply
    pub where_clause: String,

    /// Translated pattern values, one per placeholder
    pub parameters: Vec<Value>,
}

/// Compile filter criteria into a `WHERE` clause and bound parameters
///
/// Criteria naming columns absent from `schema` are silently dropped; stale
/// grid state must not be able to smuggle an unvalidated name into SQL. Each
/// surviving criterion becomes a case-insensitive
/// `UPPER(col) LIKE UPPER(?) ESCAPE '\'` predicate, joined with AND.
pub fn compile_filters(
    criteria: &[FilterCriterion],
    schema: &TableSchema,
) -> Result<CompiledFilters> {
    let mut conditions = Vec::new();
    let mut parameters = Vec::new();

    for criterion in criteria {
        if schema.column(&criterion.column).is_none() {
            debug!(
                column = %criterion.column,
                table = %schema.table.display(),
                "dropping filter for column not present in schema"
            );
            continue;
        }

        let quoted_column = validate_identifier(&criterion.column, "column name")?;
        conditions.push(format!(
            "UPPER({}) LIKE UPPER(?) ESCAPE '{}'",
            quoted_column, LIKE_ESCAPE
        ));
        parameters.push(Value::String(translate_pattern(&criterion.pattern)));
    }

    if conditions.is_empty() {
        return Ok(CompiledFilters::default());
    }

    Ok(CompiledFilters {
        where_clause: format!(" WHERE {}", conditions.join(" AND ")),
        parameters,
    })
}

/// Translate the user wildcard language (`*` any run, `?` single character)
/// to LIKE syntax
///
/// Literal `%`, `_` and the escape character itself are escaped first, so a
/// user searching for "100%" matches the literal text rather than a prefix.
fn translate_pattern(pattern: &str) -> String {
    let mut translated = String::with_capacity(pattern.len());
    for character in pattern.chars() {
        match character {
            '*' => translated.push('%'),
            '?' => translated.push('_'),
            '%' | '_' => {
                translated.push(LIKE_ESCAPE);
                translated.push(character);
            }
            LIKE_ESCAPE => {
                translated.push(LIKE_ESCAPE);
                translated.push(LIKE_ESCAPE);
            }
            other => translated.push(other),
        }
    }
    translated
}

/// Compile a sort request into an `ORDER BY` fragment
///
/// Fails closed: a column that is missing from the schema, or that fails
/// identifier validation, silently disables sorting instead of ever reaching
/// the SQL text unchecked. Direction comes from a fixed enum, never free text.
pub fn compile_sort(spec: &SortSpec, schema: &TableSchema) -> String {
    let Some(column) = spec.column.as_deref() else {
        return String::new();
    };

    if schema.column(column).is_none() {
        debug!(column, table = %schema.table.display(), "ignoring sort on unknown column");
        return String::new();
    }

    let Ok(quoted_column) = validate_identifier(column, "sort column") else {
        return String::new();
    };

    let direction = match spec.direction.unwrap_or(SortDirection::Ascending) {
        SortDirection::Ascending => "ASC",
        SortDirection::Descending => "DESC",
    };

    format!(" ORDER BY {} {}", quoted_column, direction)
}
