//! Identifier validation and quoting
//!
//! The single choke point through which every dynamically chosen table,
//! schema or column name must pass before being concatenated into SQL text.
//! Bound parameters cannot represent identifiers, so validation here is the
//! only thing standing between a hostile name and the generated query.

use crate::schema::TableReference;
use crate::{EngineError, Result};

/// Schema used when a table display string carries no `schema.` prefix
pub const DEFAULT_SCHEMA: &str = "SQLUser";

/// Validate an identifier and return it wrapped in the dialect's double-quote
/// quoting syntax
///
/// Accepts only `[A-Za-z_][A-Za-z0-9_]*`. The `role` ("table name",
/// "column name", "primary key column", ...) is carried into the error so the
/// caller can tell which argument was bad.
pub fn validate_identifier(raw: &str, role: &str) -> Result<String> {
    if !is_valid_identifier(raw) {
        return Err(EngineError::InvalidIdentifier {
            role: role.to_string(),
            name: raw.to_string(),
        });
    }
    Ok(format!("\"{}\"", raw))
}

/// Check an identifier against `^[A-Za-z_][A-Za-z0-9_]*$`
pub fn is_valid_identifier(raw: &str) -> bool {
    let mut characters = raw.chars();
    match characters.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    characters.all(|character| character.is_ascii_alphanumeric() || character == '_')
}

/// Split a `schema.table` display string on the first `.`
///
/// When no `.` is present the table is placed in [`DEFAULT_SCHEMA`]. Both
/// segments are validated; the quoted form is not returned here because
/// [`TableReference`] keeps the raw segments and quotes at point of use.
pub fn parse_qualified_table_name(display: &str) -> Result<TableReference> {
    let (schema, name) = match display.split_once('.') {
        Some((schema, name)) => (schema, name),
        None => (DEFAULT_SCHEMA, display),
    };

    validate_identifier(schema, "schema name")?;
    validate_identifier(name, "table name")?;

    Ok(TableReference {
        schema: schema.to_string(),
        name: name.to_string(),
    })
}
