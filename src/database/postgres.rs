use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::database::catalog::{Catalog, CatalogTx};
use crate::database::manager::{quote_identifier, DatabaseError};
use crate::database::models::trigger::TriggerRow;
use crate::database::models::{Member, Organization, TriggerDefinition, UserTable};

/// Catalog tables used by the promotion, created by `monk-org bootstrap`
pub const BOOTSTRAP_SQL: &str = include_str!("../../sql/bootstrap.sql");

/// PostgreSQL-backed catalog
#[derive(Clone)]
pub struct PgCatalog {
    pool: PgPool,
    lock_timeout_ms: u64,
    statement_timeout_ms: u64,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lock_timeout_ms: 0,
            statement_timeout_ms: 0,
        }
    }

    pub fn with_timeouts(mut self, settings: &DatabaseConfig) -> Self {
        self.lock_timeout_ms = settings.lock_timeout_ms;
        self.statement_timeout_ms = settings.statement_timeout_ms;
        self
    }

    /// Install the catalog tables if they are missing
    pub async fn bootstrap(&self) -> Result<(), DatabaseError> {
        use sqlx::Executor;
        // Unprepared execution so the multi-statement script runs as one batch
        self.pool.execute(BOOTSTRAP_SQL).await?;
        Ok(())
    }
}

#[async_trait]
impl Catalog for PgCatalog {
    type Tx = PgCatalogTx;

    async fn begin(&self) -> Result<PgCatalogTx, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        if self.lock_timeout_ms > 0 {
            sqlx::query(&format!("SET LOCAL lock_timeout = '{}ms'", self.lock_timeout_ms))
                .execute(&mut *tx)
                .await?;
        }
        if self.statement_timeout_ms > 0 {
            sqlx::query(&format!("SET LOCAL statement_timeout = '{}ms'", self.statement_timeout_ms))
                .execute(&mut *tx)
                .await?;
        }

        Ok(PgCatalogTx { tx })
    }
}

pub struct PgCatalogTx {
    tx: Transaction<'static, Postgres>,
}

impl PgCatalogTx {
    async fn execute_ddl(&mut self, ddl: &str) -> Result<(), DatabaseError> {
        debug!("DDL: {}", ddl);
        sqlx::query(ddl).execute(&mut *self.tx).await?;
        Ok(())
    }
}

#[async_trait]
impl CatalogTx for PgCatalogTx {
    async fn lock_organization(&mut self, id: Uuid) -> Result<Option<Organization>, DatabaseError> {
        let organization = sqlx::query_as::<_, Organization>(
            "SELECT id, name, seats, quota_in_bytes, owner_id, created_at, updated_at
             FROM organizations
             WHERE id = $1
             FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(organization)
    }

    async fn find_member(&mut self, id: Uuid) -> Result<Option<Member>, DatabaseError> {
        let member = sqlx::query_as::<_, Member>(
            "SELECT id, username, organization_id, database_schema, database_username,
                    quota_in_bytes, created_at, updated_at
             FROM users
             WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(member)
    }

    async fn find_table_record(&mut self, user_id: Uuid, name: &str) -> Result<Option<UserTable>, DatabaseError> {
        let record = sqlx::query_as::<_, UserTable>(
            "SELECT id, user_id, name, database_schema, created_at, updated_at
             FROM user_tables
             WHERE user_id = $1 AND name = $2",
        )
        .bind(user_id)
        .bind(name)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(record)
    }

    async fn set_table_namespace(&mut self, table_id: Uuid, namespace: &str) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "UPDATE user_tables SET database_schema = $2, updated_at = now() WHERE id = $1",
        )
        .bind(table_id)
        .bind(namespace)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("user table {}", table_id)));
        }
        Ok(())
    }

    async fn set_member_schema(&mut self, member_id: Uuid, namespace: &str) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "UPDATE users SET database_schema = $2, updated_at = now() WHERE id = $1",
        )
        .bind(member_id)
        .bind(namespace)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("user {}", member_id)));
        }
        Ok(())
    }

    async fn set_organization_owner(&mut self, organization_id: Uuid, member_id: Uuid) -> Result<(), DatabaseError> {
        let result = sqlx::query(
            "UPDATE organizations SET owner_id = $2, updated_at = now() WHERE id = $1",
        )
        .bind(organization_id)
        .bind(member_id)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("organization {}", organization_id)));
        }
        Ok(())
    }

    async fn namespace_exists(&mut self, namespace: &str) -> Result<bool, DatabaseError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pg_namespace WHERE nspname = $1")
            .bind(namespace)
            .fetch_one(&mut *self.tx)
            .await?;

        Ok(count.0 > 0)
    }

    async fn table_exists(&mut self, namespace: &str, table: &str) -> Result<bool, DatabaseError> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*)
             FROM pg_class c
             JOIN pg_namespace n ON n.oid = c.relnamespace
             WHERE n.nspname = $1 AND c.relname = $2 AND c.relkind = 'r'",
        )
        .bind(namespace)
        .bind(table)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(count.0 > 0)
    }

    async fn owned_tables(&mut self, namespace: &str, owner_role: &str) -> Result<Vec<String>, DatabaseError> {
        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT c.relname::text
             FROM pg_class c
             JOIN pg_namespace n ON n.oid = c.relnamespace
             JOIN pg_roles r ON r.oid = c.relowner
             WHERE n.nspname = $1 AND r.rolname = $2 AND c.relkind = 'r'
             ORDER BY c.relname",
        )
        .bind(namespace)
        .bind(owner_role)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(tables)
    }

    async fn list_triggers(&mut self, namespace: &str, tables: &[String]) -> Result<Vec<TriggerDefinition>, DatabaseError> {
        let rows = sqlx::query_as::<_, TriggerRow>(
            "SELECT t.tgname::text AS trigger_name,
                    tn.nspname::text AS table_namespace,
                    c.relname::text AS table_name,
                    t.tgtype AS trigger_type,
                    t.tgargs AS trigger_args,
                    pn.nspname::text AS function_namespace,
                    p.proname::text AS function_name,
                    l.lanname::text AS function_language,
                    p.prosrc AS function_source
             FROM pg_trigger t
             JOIN pg_class c ON c.oid = t.tgrelid
             JOIN pg_namespace tn ON tn.oid = c.relnamespace
             JOIN pg_proc p ON p.oid = t.tgfoid
             JOIN pg_namespace pn ON pn.oid = p.pronamespace
             JOIN pg_language l ON l.oid = p.prolang
             WHERE tn.nspname = $1
               AND c.relname = ANY($2)
               AND NOT t.tgisinternal
             ORDER BY c.relname, t.tgname",
        )
        .bind(namespace)
        .bind(tables)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(rows.into_iter().map(TriggerDefinition::from).collect())
    }

    async fn function_dependents(&mut self, namespace: &str, function: &str) -> Result<i64, DatabaseError> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*)
             FROM pg_trigger t
             JOIN pg_proc p ON p.oid = t.tgfoid
             JOIN pg_namespace n ON n.oid = p.pronamespace
             WHERE n.nspname = $1 AND p.proname = $2 AND NOT t.tgisinternal",
        )
        .bind(namespace)
        .bind(function)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(count.0)
    }

    async fn create_namespace(&mut self, namespace: &str, owner_role: &str) -> Result<(), DatabaseError> {
        let ddl = format!(
            "CREATE SCHEMA IF NOT EXISTS {} AUTHORIZATION {}",
            quote_identifier(namespace),
            quote_identifier(owner_role)
        );
        self.execute_ddl(&ddl).await
    }

    async fn move_table(&mut self, from: &str, to: &str, table: &str) -> Result<(), DatabaseError> {
        let ddl = format!(
            "ALTER TABLE {}.{} SET SCHEMA {}",
            quote_identifier(from),
            quote_identifier(table),
            quote_identifier(to)
        );
        self.execute_ddl(&ddl).await
    }

    async fn drop_trigger(&mut self, namespace: &str, table: &str, trigger: &str) -> Result<(), DatabaseError> {
        let ddl = format!(
            "DROP TRIGGER IF EXISTS {} ON {}.{}",
            quote_identifier(trigger),
            quote_identifier(namespace),
            quote_identifier(table)
        );
        self.execute_ddl(&ddl).await
    }

    async fn drop_function(&mut self, namespace: &str, function: &str) -> Result<(), DatabaseError> {
        let ddl = format!(
            "DROP FUNCTION IF EXISTS {}.{}()",
            quote_identifier(namespace),
            quote_identifier(function)
        );
        self.execute_ddl(&ddl).await
    }

    async fn create_function(&mut self, definition: &TriggerDefinition) -> Result<(), DatabaseError> {
        self.execute_ddl(&definition.function_sql()).await
    }

    async fn create_trigger(&mut self, definition: &TriggerDefinition) -> Result<(), DatabaseError> {
        self.execute_ddl(&definition.trigger_sql()).await
    }

    async fn set_role_search_path(&mut self, role: &str, namespaces: &[&str]) -> Result<(), DatabaseError> {
        let path = namespaces
            .iter()
            .map(|ns| quote_identifier(ns))
            .collect::<Vec<_>>()
            .join(", ");
        let ddl = format!("ALTER ROLE {} SET search_path = {}", quote_identifier(role), path);
        self.execute_ddl(&ddl).await
    }

    async fn commit(self) -> Result<(), DatabaseError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), DatabaseError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
