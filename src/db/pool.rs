//! Connection pool management for the primary and its read replicas.
//!
//! [`Database`] owns one `sqlx` pool per target and routes statements
//! through a [`ReplicaRouter`]. [`PoolManager`] gates construction so the
//! pools are opened once per process no matter how often `init` runs.

use sqlx::any::AnyPoolOptions;
use sqlx::{Any, AnyPool, Transaction};
use tokio::sync::OnceCell;

use super::router::{OperationKind, ReplicaRouter, Route};
use super::schema::{self, DbKind};
use super::sql_logger::{Probe, SqlLogger, Statement};
use crate::config::{ConnectionDescriptor, DatabaseConfig, PoolLimits};
use crate::context::RequestContext;
use crate::error::AppError;

/// Routed connection set shared by every request.
///
/// Cheap to clone: pools are reference-counted internally.
#[derive(Debug, Clone)]
pub struct Database {
    primary: AnyPool,
    replicas: Vec<AnyPool>,
    router: ReplicaRouter,
    logger: SqlLogger,
}

impl Database {
    /// Connects the primary and every replica, then creates the schema on
    /// the primary.
    ///
    /// # Errors
    ///
    /// Returns an [`AppError`] if any target is unreachable or the schema
    /// cannot be created.
    pub async fn connect(config: &DatabaseConfig, logger: SqlLogger) -> Result<Self, AppError> {
        sqlx::any::install_default_drivers();

        let primary_url = config.primary.connection_url()?;
        let kind = DbKind::from_url(&primary_url);
        tracing::info!(dsn = %config.primary.redacted(), "connecting primary");
        let primary = open_pool(&primary_url, &config.pool).await?;

        let mut replicas = Vec::with_capacity(config.replicas.len());
        for (index, descriptor) in config.replicas.iter().enumerate() {
            tracing::info!(index, dsn = %descriptor.redacted(), "connecting replica");
            replicas.push(open_descriptor(descriptor, &config.pool).await?);
        }

        schema::ensure(&primary, kind, &logger).await?;

        tracing::info!(replicas = replicas.len(), ?kind, "database ready");
        Ok(Self {
            router: ReplicaRouter::new(replicas.len()),
            primary,
            replicas,
            logger,
        })
    }

    /// Chooses the pool for a statement of the given kind.
    #[must_use]
    pub fn route(&self, kind: OperationKind) -> (Route, &AnyPool) {
        match self.router.route(kind) {
            Route::Replica(i) => match self.replicas.get(i) {
                Some(pool) => (Route::Replica(i), pool),
                None => (Route::Primary, &self.primary),
            },
            Route::Primary => (Route::Primary, &self.primary),
        }
    }

    /// Number of read replicas.
    #[must_use]
    pub fn replica_count(&self) -> usize {
        self.replicas.len()
    }

    /// SQL trace logger.
    #[must_use]
    pub const fn logger(&self) -> &SqlLogger {
        &self.logger
    }

    /// Opens a transaction on the primary.
    ///
    /// # Errors
    ///
    /// Returns an [`AppError`] if no connection can be acquired.
    pub async fn begin(&self, ctx: &RequestContext) -> Result<Transaction<'static, Any>, AppError> {
        let probe = Probe::start();
        let result = self.primary.begin().await.map_err(AppError::from);
        self.logger.trace(
            ctx,
            &probe,
            Route::Primary,
            Statement::new("BEGIN"),
            None,
            result.as_ref().err(),
        );
        result
    }

    /// Commits a transaction opened with [`Database::begin`].
    ///
    /// # Errors
    ///
    /// Returns an [`AppError`] if the commit fails.
    pub async fn commit(
        &self,
        ctx: &RequestContext,
        tx: Transaction<'static, Any>,
    ) -> Result<(), AppError> {
        let probe = Probe::start();
        let result = tx.commit().await.map_err(AppError::from);
        self.logger.trace(
            ctx,
            &probe,
            Route::Primary,
            Statement::new("COMMIT"),
            None,
            result.as_ref().err(),
        );
        result
    }

    /// Rolls back a transaction opened with [`Database::begin`].
    ///
    /// # Errors
    ///
    /// Returns an [`AppError`] if the rollback fails.
    pub async fn rollback(
        &self,
        ctx: &RequestContext,
        tx: Transaction<'static, Any>,
    ) -> Result<(), AppError> {
        let probe = Probe::start();
        let result = tx.rollback().await.map_err(AppError::from);
        self.logger.trace(
            ctx,
            &probe,
            Route::Primary,
            Statement::new("ROLLBACK"),
            None,
            result.as_ref().err(),
        );
        result
    }

    /// Runs `SELECT 1` on the primary.
    ///
    /// # Errors
    ///
    /// Returns an [`AppError`] if the primary does not answer.
    pub async fn ping(&self, ctx: &RequestContext) -> Result<(), AppError> {
        let probe = Probe::start();
        let result = sqlx::query("SELECT 1")
            .execute(&self.primary)
            .await
            .map_err(AppError::from);
        let rows = result.as_ref().ok().map(sqlx::any::AnyQueryResult::rows_affected);
        self.logger.trace(
            ctx,
            &probe,
            Route::Primary,
            Statement::new("SELECT 1"),
            rows,
            result.as_ref().err(),
        );
        result.map(|_| ())
    }

    /// Closes every pool, waiting for checked-out connections to return.
    pub async fn close(&self) {
        for replica in &self.replicas {
            replica.close().await;
        }
        self.primary.close().await;
        tracing::info!("database pools closed");
    }
}

/// Once-gated owner of the process-wide [`Database`].
#[derive(Debug, Default)]
pub struct PoolManager {
    cell: OnceCell<Database>,
}

impl PoolManager {
    /// Creates an uninitialized manager.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            cell: OnceCell::const_new(),
        }
    }

    /// Connects on first call; later calls return the existing handle and
    /// ignore their arguments.
    ///
    /// # Errors
    ///
    /// Returns an [`AppError`] if the first connection attempt fails. A
    /// failed attempt leaves the manager uninitialized.
    pub async fn init(
        &self,
        config: &DatabaseConfig,
        logger: SqlLogger,
    ) -> Result<&Database, AppError> {
        self.cell
            .get_or_try_init(|| Database::connect(config, logger))
            .await
    }
}

async fn open_descriptor(
    descriptor: &ConnectionDescriptor,
    limits: &PoolLimits,
) -> Result<AnyPool, AppError> {
    let url = descriptor.connection_url()?;
    open_pool(&url, limits).await
}

async fn open_pool(url: &str, limits: &PoolLimits) -> Result<AnyPool, AppError> {
    let pool = AnyPoolOptions::new()
        .max_connections(limits.max_open_conns)
        .idle_timeout(limits.max_idle_time())
        .max_lifetime(limits.max_lifetime())
        .connect(url)
        .await
        .map_err(AppError::Database)?;
    Ok(pool)
}
