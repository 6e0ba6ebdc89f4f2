//! User repository: create and look up accounts by name.

use chrono::{SubsecRound, Utc};
use sqlx::any::AnyRow;

use crate::context::RequestContext;
use crate::db::sql_logger::Probe;
use crate::db::{Database, OperationKind, Route, Session, SqlParam, Statement};
use crate::error::AppError;
use crate::models::User;
use crate::models::user::to_millis;

const INSERT_USER: &str = "INSERT INTO users (username, password, status, created_at, updated_at) \
     VALUES ($1, $2, $3, $4, $5) RETURNING id";

const FIND_BY_NAME: &str = "SELECT id, username, password, status, created_at, updated_at, deleted_at \
     FROM users WHERE username = $1 AND deleted_at IS NULL ORDER BY id LIMIT 1";

const FIND_BY_NAME_SUBQUERY: &str = "SELECT id, username, password, status, created_at, updated_at, deleted_at \
     FROM users WHERE id IN (SELECT id FROM users WHERE username = $1 AND deleted_at IS NULL) \
     AND deleted_at IS NULL ORDER BY id LIMIT 1";

/// Stateless access to the `users` table for one request.
#[derive(Debug, Clone, Copy)]
pub struct UserRepository<'a> {
    db: &'a Database,
    ctx: &'a RequestContext,
}

impl<'a> UserRepository<'a> {
    /// Binds a repository to a database handle and request context.
    #[must_use]
    pub const fn new(db: &'a Database, ctx: &'a RequestContext) -> Self {
        Self { db, ctx }
    }

    /// Inserts `user` and fills in its generated id and timestamps.
    ///
    /// Detached inserts always run on the primary.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::UniqueViolation`] if the username is taken, or
    /// [`AppError::Database`] on any other storage failure. `user` is left
    /// untouched on error.
    pub async fn create(&self, session: Session<'_>, user: &mut User) -> Result<(), AppError> {
        let now = Utc::now().trunc_subsecs(3);
        let status = i64::from(i32::from(user.status));
        let params = [
            SqlParam::Text(&user.username),
            SqlParam::Text(&user.password),
            SqlParam::Int(status),
            SqlParam::Int(to_millis(now)),
            SqlParam::Int(to_millis(now)),
        ];
        let probe = Probe::start();
        let query = sqlx::query_scalar::<_, i64>(INSERT_USER)
            .bind(user.username.as_str())
            .bind(user.password.as_str())
            .bind(status)
            .bind(to_millis(now))
            .bind(to_millis(now));

        let (route, result) = match session {
            Session::Detached => {
                let (route, pool) = self.db.route(OperationKind::Write);
                (route, query.fetch_one(pool).await)
            }
            Session::Transaction(tx) => (Route::Primary, query.fetch_one(&mut **tx).await),
        };
        let result = result.map_err(AppError::from);
        self.db.logger().trace(
            self.ctx,
            &probe,
            route,
            Statement::with_params(INSERT_USER, &params),
            result.as_ref().ok().map(|_| 1),
            result.as_ref().err(),
        );

        user.id = result?;
        user.created_at = Some(now);
        user.updated_at = Some(now);
        Ok(())
    }

    /// Returns the first live user named `name`, lowest id first.
    ///
    /// Detached lookups are served by a random replica, or the primary when
    /// none is configured.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::RecordNotFound`] if no row matches, or
    /// [`AppError::Database`] on storage failure.
    pub async fn find_by_name(&self, session: Session<'_>, name: &str) -> Result<User, AppError> {
        let probe = Probe::start();
        self.fetch_one_user(session, &probe, FIND_BY_NAME, name).await
    }

    /// Same result as [`UserRepository::find_by_name`], selected through
    /// an `id IN (subquery)` filter.
    ///
    /// # Errors
    ///
    /// Same as [`UserRepository::find_by_name`].
    pub async fn find_by_name_subquery(
        &self,
        session: Session<'_>,
        name: &str,
    ) -> Result<User, AppError> {
        let probe = Probe::start();
        self.fetch_one_user(session, &probe, FIND_BY_NAME_SUBQUERY, name)
            .await
    }

    async fn fetch_one_user(
        &self,
        session: Session<'_>,
        probe: &Probe,
        sql: &'static str,
        name: &str,
    ) -> Result<User, AppError> {
        let query = sqlx::query(sql).bind(name);
        let (route, row) = match session {
            Session::Detached => {
                let (route, pool) = self.db.route(OperationKind::Read);
                (route, query.fetch_optional(pool).await)
            }
            Session::Transaction(tx) => (Route::Primary, query.fetch_optional(&mut **tx).await),
        };

        let result = row
            .map_err(AppError::from)
            .and_then(|row: Option<AnyRow>| row.ok_or(AppError::RecordNotFound))
            .and_then(|row| User::from_row(&row).map_err(AppError::from));
        let rows = match &result {
            Ok(_) => Some(1),
            Err(AppError::RecordNotFound) => Some(0),
            Err(_) => None,
        };
        let params = [SqlParam::Text(name)];
        self.db.logger().trace(
            self.ctx,
            probe,
            route,
            Statement::with_params(sql, &params),
            rows,
            result.as_ref().err(),
        );
        result
    }
}
