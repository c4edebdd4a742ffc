use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::database::catalog::CatalogTx;
use crate::database::manager::DatabaseError;
use crate::database::models::TriggerDefinition;
use crate::error::PromotionError;
use crate::services::quota_trigger::QuotaTriggerBuilder;

/// Recreates captured triggers, and the functions behind them, in the schema the
/// tables were moved to.
///
/// Work is done in phases so that functions shared by several triggers are
/// dropped and created once: drop every trigger, drop orphaned source
/// functions, create functions, create triggers.
///
/// Function bodies only have references to moved tables and moved functions
/// rewritten. Functions that are not plain source (`internal`, `c`) are never
/// copied; the rebuilt trigger calls the original.
#[derive(Debug, Default, Clone, Copy)]
pub struct TriggerRebuilder {
    quota_builder: QuotaTriggerBuilder,
}

impl TriggerRebuilder {
    pub fn new() -> Self {
        Self {
            quota_builder: QuotaTriggerBuilder::new(),
        }
    }

    pub async fn rebuild<T: CatalogTx>(
        &self,
        tx: &mut T,
        captured: &[TriggerDefinition],
        moved_tables: &[String],
        to: &str,
        quota_limit_bytes: i64,
    ) -> Result<Vec<TriggerDefinition>, PromotionError> {
        if captured.is_empty() {
            return Ok(Vec::new());
        }

        let mut moved: Vec<String> = moved_tables.to_vec();
        for old in captured {
            if old.is_portable() && old.function_namespace == old.table_namespace && !moved.contains(&old.function_name) {
                moved.push(old.function_name.clone());
            }
        }

        // Drop the old triggers wherever the table lives now
        for old in captured {
            let fail = |source: DatabaseError| PromotionError::trigger_rebuild(&old.trigger_name, &old.table_name, source);
            let current = if tx.table_exists(to, &old.table_name).await.map_err(fail)? {
                to
            } else {
                old.table_namespace.as_str()
            };
            tx.drop_trigger(current, &old.table_name, &old.trigger_name)
                .await
                .map_err(fail)?;
        }

        // Drop functions left behind in the source schema once nothing else uses them
        let mut seen = BTreeSet::new();
        for old in captured {
            let key = (old.function_namespace.as_str(), old.function_name.as_str());
            if !old.is_portable() || old.function_namespace != old.table_namespace || !seen.insert(key) {
                continue;
            }
            let fail = |source: DatabaseError| PromotionError::trigger_rebuild(&old.trigger_name, &old.table_name, source);
            let dependents = tx
                .function_dependents(&old.function_namespace, &old.function_name)
                .await
                .map_err(fail)?;
            if dependents > 0 {
                debug!(
                    "Keeping function {} used by {} other trigger(s)",
                    old.qualified_function(),
                    dependents
                );
                continue;
            }
            tx.drop_function(&old.function_namespace, &old.function_name)
                .await
                .map_err(fail)?;
        }

        let rebuilt: Vec<TriggerDefinition> = captured
            .iter()
            .map(|old| self.rebuilt_definition(old, &moved, to, quota_limit_bytes))
            .collect();

        let mut created = BTreeSet::new();
        for new in &rebuilt {
            if new.function_namespace != to || !created.insert((new.function_namespace.as_str(), new.function_name.as_str())) {
                continue;
            }
            tx.create_function(new)
                .await
                .map_err(|source| PromotionError::trigger_rebuild(&new.trigger_name, &new.table_name, source))?;
        }

        for new in &rebuilt {
            tx.create_trigger(new)
                .await
                .map_err(|source| PromotionError::trigger_rebuild(&new.trigger_name, &new.table_name, source))?;
            debug!("Rebuilt trigger '{}' on {}", new.trigger_name, new.qualified_table());
        }

        info!("Rebuilt {} trigger(s) in '{}'", rebuilt.len(), to);
        Ok(rebuilt)
    }

    fn rebuilt_definition(
        &self,
        old: &TriggerDefinition,
        moved: &[String],
        to: &str,
        quota_limit_bytes: i64,
    ) -> TriggerDefinition {
        if QuotaTriggerBuilder::is_quota_trigger(old) {
            self.quota_builder.build(to, &old.table_name, quota_limit_bytes)
        } else if old.is_portable() {
            old.relocated(&old.table_namespace, to, moved)
        } else {
            old.rebound(to)
        }
    }
}
