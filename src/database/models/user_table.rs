use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Catalog record tracking which namespace a member's table lives in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct UserTable {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub database_schema: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
