//! Shared application state injected into all Axum handlers.

use crate::db::Database;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Routed primary/replica connection set.
    pub db: Database,
}

impl AppState {
    /// Builds the state around an initialized database handle.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}
