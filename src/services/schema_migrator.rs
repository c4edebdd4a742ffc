use tracing::{debug, info};
use uuid::Uuid;

use crate::database::catalog::CatalogTx;
use crate::database::manager::DatabaseError;
use crate::error::PromotionError;

/// Creates private schemas and moves a member's tables into them, keeping the
/// `user_tables` records in step. All work happens inside the caller's transaction.
#[derive(Debug, Default, Clone, Copy)]
pub struct SchemaMigrator;

impl SchemaMigrator {
    pub fn new() -> Self {
        Self
    }

    /// Create the schema owned by `owner_role` unless it already exists
    pub async fn ensure_namespace<T: CatalogTx>(
        &self,
        tx: &mut T,
        namespace: &str,
        owner_role: &str,
    ) -> Result<(), PromotionError> {
        let relocation = |source: DatabaseError| PromotionError::relocation(namespace, source);

        if tx.namespace_exists(namespace).await.map_err(relocation)? {
            debug!("Schema '{}' already exists", namespace);
            return Ok(());
        }

        tx.create_namespace(namespace, owner_role).await.map_err(relocation)?;
        info!("Created schema '{}' owned by '{}'", namespace, owner_role);
        Ok(())
    }

    /// Move each table from `from` to `to` and update its catalog record.
    ///
    /// Tables without a `user_tables` record are still moved; they simply have
    /// no record to update.
    pub async fn move_tables<T: CatalogTx>(
        &self,
        tx: &mut T,
        user_id: Uuid,
        from: &str,
        to: &str,
        tables: &[String],
    ) -> Result<(), PromotionError> {
        for table in tables {
            let relocation = |source: DatabaseError| PromotionError::relocation(table.as_str(), source);

            if !tx.table_exists(from, table).await.map_err(relocation)? {
                return Err(relocation(DatabaseError::NotFound(format!("table {}.{}", from, table))));
            }

            tx.move_table(from, to, table).await.map_err(relocation)?;

            match tx.find_table_record(user_id, table).await.map_err(relocation)? {
                Some(record) => {
                    tx.set_table_namespace(record.id, to).await.map_err(relocation)?;
                }
                None => debug!("Table '{}' has no catalog record, moved without metadata", table),
            }

            debug!("Moved table '{}' from '{}' to '{}'", table, from, to);
        }

        info!("Moved {} table(s) from '{}' to '{}'", tables.len(), from, to);
        Ok(())
    }
}
