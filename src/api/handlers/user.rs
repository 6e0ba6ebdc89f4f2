//! `GET /user`: create the demo account, then read it back.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::UserResponse;
use crate::app_state::AppState;
use crate::context::RequestContext;
use crate::db::{Database, Session};
use crate::error::AppError;
use crate::models::{User, UserStatus};
use crate::repository::UserRepository;

/// Username created and looked up by every call.
pub const DEMO_USERNAME: &str = "hejinxue";

const DEMO_PASSWORD: &str = "123456";

/// `GET /user` — Create the demo user and look it up.
///
/// The create step fails with a uniqueness error once the user exists;
/// the lookups still run and return the stored row.
#[utoipa::path(
    get,
    path = "/user",
    tag = "Users",
    summary = "Create and fetch the demo user",
    description = "Inserts the demo user, reads it back by name, then reads it again through a subquery inside a transaction. Always responds 200; failures are reported in `err`.",
    responses(
        (status = 200, description = "Lookup results and the first error, if any", body = UserResponse),
    )
)]
pub async fn get_user(State(state): State<AppState>) -> impl IntoResponse {
    let ctx = RequestContext::new();
    let db = &state.db;
    db.logger().info(&ctx, "GET /user");

    let repo = UserRepository::new(db, &ctx);
    let mut response = UserResponse::default();

    let mut user = User::new(DEMO_USERNAME, DEMO_PASSWORD, UserStatus::Normal);
    if let Err(e) = repo.create(Session::Detached, &mut user).await {
        response.report(&e);
    }

    match repo.find_by_name(Session::Detached, DEMO_USERNAME).await {
        Ok(found) => response.user = Some(found),
        Err(e) => response.report(&e),
    }

    match find_in_transaction(db, &ctx, &repo).await {
        Ok(found) => response.user2 = Some(found),
        Err(AppError::RecordNotFound) => {}
        Err(e) => response.report(&e),
    }

    (StatusCode::OK, Json(response))
}

/// Looks the demo user up through the subquery form inside a transaction,
/// committing on success and rolling back on failure.
async fn find_in_transaction(
    db: &Database,
    ctx: &RequestContext,
    repo: &UserRepository<'_>,
) -> Result<User, AppError> {
    let mut tx = db.begin(ctx).await?;
    match repo
        .find_by_name_subquery(Session::tx(&mut tx), DEMO_USERNAME)
        .await
    {
        Ok(user) => {
            db.commit(ctx, tx).await?;
            Ok(user)
        }
        Err(e) => {
            if let Err(rollback) = db.rollback(ctx, tx).await {
                tracing::warn!(error = %rollback, "rollback failed");
            }
            Err(e)
        }
    }
}

/// User routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/user", get(get_user))
}
