//! The `users` table row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use sqlx::any::AnyRow;
use utoipa::ToSchema;

/// Account state stored in the `status` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum UserStatus {
    /// Active account.
    #[default]
    Normal,
    /// Account disabled by an operator.
    Disabled,
    /// Any other stored value, kept as-is.
    Other(i32),
}

impl From<i32> for UserStatus {
    fn from(code: i32) -> Self {
        match code {
            0 => Self::Normal,
            1 => Self::Disabled,
            other => Self::Other(other),
        }
    }
}

impl From<UserStatus> for i32 {
    fn from(status: UserStatus) -> Self {
        match status {
            UserStatus::Normal => 0,
            UserStatus::Disabled => 1,
            UserStatus::Other(code) => code,
        }
    }
}

/// One user account.
///
/// `id` and the timestamps are assigned by the repository on insert; a
/// freshly built value has `id == 0` and no timestamps. `deleted_at` marks a
/// soft-deleted row, which lookups skip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct User {
    /// Storage-generated identifier.
    pub id: i64,
    /// Unique login name.
    pub username: String,
    /// Opaque password string.
    pub password: String,
    /// Account state.
    #[schema(value_type = i32)]
    pub status: UserStatus,
    /// Insert time.
    pub created_at: Option<DateTime<Utc>>,
    /// Last update time.
    pub updated_at: Option<DateTime<Utc>>,
    /// Soft-delete time.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl User {
    /// Builds an unsaved user.
    #[must_use]
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        status: UserStatus,
    ) -> Self {
        Self {
            id: 0,
            username: username.into(),
            password: password.into(),
            status,
            created_at: None,
            updated_at: None,
            deleted_at: None,
        }
    }

    /// Decodes a row carrying every `users` column.
    ///
    /// # Errors
    ///
    /// Returns a [`sqlx::Error`] if a column is missing or has an
    /// unexpected type.
    pub fn from_row(row: &AnyRow) -> Result<Self, sqlx::Error> {
        let status: i64 = row.try_get("status")?;
        let status = i32::try_from(status).map_err(|e| sqlx::Error::ColumnDecode {
            index: "status".to_string(),
            source: Box::new(e),
        })?;
        Ok(Self {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            password: row.try_get("password")?,
            status: UserStatus::from(status),
            created_at: from_millis(row.try_get("created_at")?),
            updated_at: from_millis(row.try_get("updated_at")?),
            deleted_at: row.try_get::<Option<i64>, _>("deleted_at")?.and_then(from_millis),
        })
    }
}

/// Timestamps are stored as epoch milliseconds.
pub(crate) fn to_millis(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_round_trip() {
        assert_eq!(UserStatus::from(0), UserStatus::Normal);
        assert_eq!(UserStatus::from(1), UserStatus::Disabled);
        assert_eq!(UserStatus::from(7), UserStatus::Other(7));
        assert_eq!(i32::from(UserStatus::Other(7)), 7);
    }

    #[test]
    fn new_user_is_unsaved() {
        let user = User::new("alice", "secret", UserStatus::Normal);
        assert_eq!(user.id, 0);
        assert!(user.created_at.is_none());
        assert!(user.deleted_at.is_none());
    }

    #[test]
    fn serializes_status_as_integer() {
        let user = User::new("alice", "secret", UserStatus::Disabled);
        let Ok(json) = serde_json::to_value(&user) else {
            panic!("serialization failed");
        };
        assert_eq!(json["status"], 1);
        assert_eq!(json["username"], "alice");
        assert!(json["deleted_at"].is_null());
    }

    #[test]
    fn millis_conversion() {
        let now = Utc::now();
        let Some(back) = from_millis(to_millis(now)) else {
            panic!("valid timestamp");
        };
        assert_eq!(back.timestamp_millis(), now.timestamp_millis());
    }
}
