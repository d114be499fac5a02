//! Connection model: one row per linked institution item per user.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// A linked institution item. `(user_id, item_id)` is unique; re-linking the
/// same institution updates the row in place.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Connection {
    pub id: i64,
    pub user_id: String,
    pub item_id: String,
    /// Provider access credential. Never serialized into responses.
    #[serde(skip_serializing)]
    pub access_token: String,
    pub institution_name: Option<String>,
    /// Opaque provider pagination token. `None` means no sync has completed
    /// yet and the next sync pulls full history.
    pub sync_cursor: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Input for creating or refreshing a connection.
///
/// `institution_name` and `last_synced_at` have partial-update semantics: a
/// `None` here never clobbers a stored value.
#[derive(Debug, Clone)]
pub struct UpsertConnection {
    pub user_id: String,
    pub item_id: String,
    pub access_token: String,
    pub institution_name: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
}
