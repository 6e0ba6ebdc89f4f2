//! Bootstrap DDL for the `users` table.
//!
//! Executed once on the primary when the pool manager connects. Statements
//! are idempotent (`IF NOT EXISTS`); there is no versioned migration. Each
//! one is traced under a background context.

use sqlx::AnyPool;

use super::router::Route;
use super::sql_logger::{Probe, SqlLogger, Statement};
use crate::context::RequestContext;
use crate::error::AppError;

/// SQL dialect of a connection target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbKind {
    /// PostgreSQL
    Postgres,
    /// SQLite
    Sqlite,
}

impl DbKind {
    /// Detects the dialect from a connection URL.
    #[must_use]
    pub fn from_url(url: &str) -> Self {
        if url.starts_with("sqlite:") {
            Self::Sqlite
        } else {
            Self::Postgres
        }
    }

    fn users_table(self) -> &'static str {
        match self {
            Self::Postgres => {
                "CREATE TABLE IF NOT EXISTS users (
                    id BIGSERIAL PRIMARY KEY,
                    username VARCHAR(191) NOT NULL UNIQUE,
                    password VARCHAR(191) NOT NULL,
                    status BIGINT NOT NULL DEFAULT 0,
                    created_at BIGINT NOT NULL,
                    updated_at BIGINT NOT NULL,
                    deleted_at BIGINT
                )"
            }
            Self::Sqlite => {
                "CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    username TEXT NOT NULL UNIQUE,
                    password TEXT NOT NULL,
                    status BIGINT NOT NULL DEFAULT 0,
                    created_at BIGINT NOT NULL,
                    updated_at BIGINT NOT NULL,
                    deleted_at BIGINT
                )"
            }
        }
    }
}

const DELETED_AT_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_users_deleted_at ON users (deleted_at)";

/// Creates the `users` table and its indexes if missing.
///
/// # Errors
///
/// Returns an [`AppError`] if a statement fails.
pub async fn ensure(pool: &AnyPool, kind: DbKind, logger: &SqlLogger) -> Result<(), AppError> {
    let ctx = RequestContext::background();
    for sql in [kind.users_table(), DELETED_AT_INDEX] {
        let probe = Probe::start();
        let result = sqlx::query(sql).execute(pool).await.map_err(AppError::from);
        let rows = result.as_ref().ok().map(sqlx::any::AnyQueryResult::rows_affected);
        let err = result.as_ref().err();
        logger.trace(&ctx, &probe, Route::Primary, Statement::new(sql), rows, err);
        result?;
    }
    Ok(())
}
