use tracing::debug;

use crate::database::catalog::CatalogTx;
use crate::database::manager::DatabaseError;
use crate::database::models::TriggerDefinition;
use crate::error::PromotionError;

/// Reads the triggers attached to a member's tables, together with the source of
/// the functions they invoke. Read-only.
#[derive(Debug, Default, Clone, Copy)]
pub struct TriggerInventory;

impl TriggerInventory {
    pub fn new() -> Self {
        Self
    }

    pub async fn list_triggers<T: CatalogTx>(
        &self,
        tx: &mut T,
        namespace: &str,
        tables: &[String],
    ) -> Result<Vec<TriggerDefinition>, PromotionError> {
        let introspection = |source: DatabaseError| PromotionError::introspection(namespace, source);

        if !tx.namespace_exists(namespace).await.map_err(introspection)? {
            return Err(introspection(DatabaseError::NotFound(format!("schema {}", namespace))));
        }

        for table in tables {
            if !tx.table_exists(namespace, table).await.map_err(introspection)? {
                return Err(introspection(DatabaseError::NotFound(format!("table {}.{}", namespace, table))));
            }
        }

        if tables.is_empty() {
            return Ok(Vec::new());
        }

        let triggers = tx.list_triggers(namespace, tables).await.map_err(introspection)?;

        // The catalog query already filters by table; this guards the contract for any backend
        let triggers: Vec<_> = triggers
            .into_iter()
            .filter(|t| t.table_namespace == namespace && tables.contains(&t.table_name))
            .collect();

        debug!("Captured {} trigger(s) on {} table(s) in '{}'", triggers.len(), tables.len(), namespace);
        Ok(triggers)
    }
}
