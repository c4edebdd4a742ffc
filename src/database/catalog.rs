use async_trait::async_trait;
use uuid::Uuid;

use crate::database::manager::DatabaseError;
use crate::database::models::{Member, Organization, TriggerDefinition, UserTable};

/// Source of catalog transactions
#[async_trait]
pub trait Catalog: Send + Sync {
    type Tx: CatalogTx;

    async fn begin(&self) -> Result<Self::Tx, DatabaseError>;
}

/// One open transaction against the organization database.
///
/// Every read, DDL statement and record update of a promotion goes through
/// the same transaction; dropping it without `commit` discards all of them.
#[async_trait]
pub trait CatalogTx: Send {
    /// Load the organization and hold a row lock on it until the transaction ends
    async fn lock_organization(&mut self, id: Uuid) -> Result<Option<Organization>, DatabaseError>;

    async fn find_member(&mut self, id: Uuid) -> Result<Option<Member>, DatabaseError>;

    async fn find_table_record(&mut self, user_id: Uuid, name: &str) -> Result<Option<UserTable>, DatabaseError>;

    async fn set_table_namespace(&mut self, table_id: Uuid, namespace: &str) -> Result<(), DatabaseError>;

    async fn set_member_schema(&mut self, member_id: Uuid, namespace: &str) -> Result<(), DatabaseError>;

    async fn set_organization_owner(&mut self, organization_id: Uuid, member_id: Uuid) -> Result<(), DatabaseError>;

    async fn namespace_exists(&mut self, namespace: &str) -> Result<bool, DatabaseError>;

    async fn table_exists(&mut self, namespace: &str, table: &str) -> Result<bool, DatabaseError>;

    /// Plain tables in `namespace` owned by `owner_role`, ordered by name
    async fn owned_tables(&mut self, namespace: &str, owner_role: &str) -> Result<Vec<String>, DatabaseError>;

    /// User-defined triggers on the named tables, ordered by table then trigger name
    async fn list_triggers(&mut self, namespace: &str, tables: &[String]) -> Result<Vec<TriggerDefinition>, DatabaseError>;

    /// Number of triggers that still invoke `namespace.function`
    async fn function_dependents(&mut self, namespace: &str, function: &str) -> Result<i64, DatabaseError>;

    async fn create_namespace(&mut self, namespace: &str, owner_role: &str) -> Result<(), DatabaseError>;

    async fn move_table(&mut self, from: &str, to: &str, table: &str) -> Result<(), DatabaseError>;

    async fn drop_trigger(&mut self, namespace: &str, table: &str, trigger: &str) -> Result<(), DatabaseError>;

    async fn drop_function(&mut self, namespace: &str, function: &str) -> Result<(), DatabaseError>;

    async fn create_function(&mut self, definition: &TriggerDefinition) -> Result<(), DatabaseError>;

    async fn create_trigger(&mut self, definition: &TriggerDefinition) -> Result<(), DatabaseError>;

    async fn set_role_search_path(&mut self, role: &str, namespaces: &[&str]) -> Result<(), DatabaseError>;

    async fn commit(self) -> Result<(), DatabaseError>;

    async fn rollback(self) -> Result<(), DatabaseError>;
}
