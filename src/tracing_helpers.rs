//! Span constructors used when the `tracing` feature is enabled.

use tracing::{info_span, Span};

/// Span around a single statement sent to the database
pub fn execute_query_span(query: &str) -> Span {
    info_span!("datamapper.execute", db.statement = query)
}

/// Span around establishing a connection
pub fn acquire_connection_span() -> Span {
    info_span!("datamapper.connect")
}

/// Span around a mapper fetch (`fetch_one`, `fetch_all`, relation loads)
pub fn fetch_span(mapper: &str, table: &str) -> Span {
    info_span!("datamapper.fetch", mapper, table)
}

/// Span around a mapper save (insert or update, including relations)
pub fn save_span(mapper: &str, depth: usize) -> Span {
    info_span!("datamapper.save", mapper, depth)
}

/// Span around a mapper delete
pub fn delete_span(mapper: &str) -> Span {
    info_span!("datamapper.delete", mapper)
}
