//! Data-access plumbing: pools, replica routing, SQL tracing, schema.
//!
//! ```text
//! Repository
//!     │  Session::Detached ──► ReplicaRouter ──► primary / replica-N
//!     │  Session::Transaction ─────────────────► primary (tx connection)
//!     │
//!     └── SqlLogger (trace id, elapsed, rows, route, statement)
//! ```

pub mod pool;
pub mod router;
pub mod schema;
pub mod sql_logger;

use sqlx::{Any, Transaction};

pub use pool::{Database, PoolManager};
pub use router::{OperationKind, ReplicaRouter, Route};
pub use schema::DbKind;
pub use sql_logger::{LogLevel, LoggerConfig, SqlLogger, SqlParam, Statement};

/// Where a repository call executes.
#[derive(Debug)]
pub enum Session<'t> {
    /// Independent statement, routed by operation kind.
    Detached,
    /// Inside the caller's transaction, on the primary.
    Transaction(&'t mut Transaction<'static, Any>),
}

impl<'t> Session<'t> {
    /// Wraps an open transaction.
    #[must_use]
    pub fn tx(tx: &'t mut Transaction<'static, Any>) -> Self {
        Self::Transaction(tx)
    }
}
