//! SQL text construction
//!
//! Everything that turns validated identifiers, filter patterns and page
//! windows into SQL text plus bound parameters. No module outside this one
//! may concatenate a dynamically-named identifier into SQL.

pub mod filter;
pub mod identifier;
pub mod pagination;
