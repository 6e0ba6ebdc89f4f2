//! Response body for `GET /user`.

use serde::Serialize;
use utoipa::ToSchema;

use crate::error::ErrorBody;
use crate::models::User;

/// Response body for `GET /user`.
///
/// Always sent with status 200; failures are reported in `err`.
#[derive(Debug, Default, Serialize, ToSchema)]
pub struct UserResponse {
    /// Row returned by the lookup after the create step.
    pub user: Option<User>,
    /// Row returned by the transactional subquery lookup.
    pub user2: Option<User>,
    /// First error encountered, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub err: Option<ErrorBody>,
}

impl UserResponse {
    /// Records `err` unless an earlier error is already present.
    pub fn report(&mut self, err: &crate::error::AppError) {
        if self.err.is_none() {
            self.err = Some(err.to_body());
        }
    }
}
