use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A user of the organization database. `database_schema` names the namespace
/// holding the member's tables and `database_username` the role owning them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Member {
    pub id: Uuid,
    pub username: String,
    pub organization_id: Option<Uuid>,
    pub database_schema: String,
    pub database_username: String,
    pub quota_in_bytes: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
