use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::database::catalog::{Catalog, CatalogTx};
use crate::database::models::{Member, Organization, TriggerDefinition};
use crate::error::PromotionError;
use crate::services::central::{AccountService, NoopAccountService, RoleChange};
use crate::services::quota_trigger::{MemberQuotaPolicy, QuotaPolicy};
use crate::services::schema_migrator::SchemaMigrator;
use crate::services::trigger_inventory::TriggerInventory;
use crate::services::trigger_rebuilder::TriggerRebuilder;

const OWNER_ROLE: &str = "owner";
const MAX_NAMESPACE_LEN: usize = 63;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromotionSummary {
    pub organization_id: Uuid,
    pub member_id: Uuid,
    pub username: String,
    pub namespace: String,
    pub tables_moved: Vec<String>,
    /// `table.trigger` for every trigger recreated in `namespace`
    pub triggers_rebuilt: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PromotionOutcome {
    Promoted(PromotionSummary),
    /// The member already owns the organization and lives in their own schema
    AlreadyPromoted,
}

/// What the organization looked like before the promotion touched it
#[derive(Debug)]
struct PromotionRecord {
    original_namespace: String,
    original_owner: Option<Uuid>,
    tables: Vec<String>,
    captured: Vec<TriggerDefinition>,
}

enum Plan {
    Commit(PromotionSummary),
    Noop,
}

/// Turns an organization member into its owner.
///
/// The member's tables move from the shared schema into a private schema named
/// after them, their triggers are rebuilt there and the organization records the
/// new owner. All of it runs in one catalog transaction.
pub struct PromotionCoordinator<C: Catalog> {
    catalog: C,
    shared_namespace: String,
    inventory: TriggerInventory,
    migrator: SchemaMigrator,
    rebuilder: TriggerRebuilder,
    quota_policy: Arc<dyn QuotaPolicy>,
    accounts: Arc<dyn AccountService>,
    notify_timeout: Duration,
}

impl<C: Catalog> PromotionCoordinator<C> {
    pub fn new(catalog: C, shared_namespace: impl Into<String>) -> Self {
        Self {
            catalog,
            shared_namespace: shared_namespace.into(),
            inventory: TriggerInventory::new(),
            migrator: SchemaMigrator::new(),
            rebuilder: TriggerRebuilder::new(),
            quota_policy: Arc::new(MemberQuotaPolicy),
            accounts: Arc::new(NoopAccountService),
            notify_timeout: Duration::from_secs(10),
        }
    }

    pub fn from_config(catalog: C, config: &AppConfig, accounts: Arc<dyn AccountService>) -> Self {
        Self::new(catalog, config.promotion.shared_namespace.clone())
            .with_account_service(accounts)
            .with_notify_timeout(Duration::from_secs(config.promotion.notify_timeout_secs))
    }

    pub fn with_account_service(mut self, accounts: Arc<dyn AccountService>) -> Self {
        self.accounts = accounts;
        self
    }

    pub fn with_quota_policy(mut self, policy: Arc<dyn QuotaPolicy>) -> Self {
        self.quota_policy = policy;
        self
    }

    pub fn with_notify_timeout(mut self, timeout: Duration) -> Self {
        self.notify_timeout = timeout;
        self
    }

    /// Promote `member_id` to owner of `organization_id`.
    ///
    /// Either every step commits or none does; on failure the original error is
    /// returned after the transaction is rolled back.
    pub async fn promote_to_admin(
        &self,
        organization_id: Uuid,
        member_id: Uuid,
    ) -> Result<PromotionOutcome, PromotionError> {
        info!("Promoting member {} in organization {}", member_id, organization_id);

        let mut tx = self.catalog.begin().await?;
        match self.promote_in(&mut tx, organization_id, member_id).await {
            Ok(Plan::Noop) => {
                tx.rollback().await?;
                info!("Member {} already owns organization {}", member_id, organization_id);
                Ok(PromotionOutcome::AlreadyPromoted)
            }
            Ok(Plan::Commit(summary)) => {
                tx.commit().await?;
                info!(
                    "Promoted '{}' to owner of {}: {} table(s), {} trigger(s) in '{}'",
                    summary.username,
                    organization_id,
                    summary.tables_moved.len(),
                    summary.triggers_rebuilt.len(),
                    summary.namespace
                );
                self.notify(&summary).await;
                Ok(PromotionOutcome::Promoted(summary))
            }
            Err(e) => {
                warn!("Promotion of member {} failed ({}): {}", member_id, e.error_code(), e);
                if let Err(rollback_err) = tx.rollback().await {
                    error!("Rollback after failed promotion of {} also failed: {}", member_id, rollback_err);
                }
                Err(e)
            }
        }
    }

    async fn promote_in(
        &self,
        tx: &mut C::Tx,
        organization_id: Uuid,
        member_id: Uuid,
    ) -> Result<Plan, PromotionError> {
        let organization = tx
            .lock_organization(organization_id)
            .await?
            .ok_or_else(|| PromotionError::validation(format!("Organization {} not found", organization_id)))?;

        let member = tx
            .find_member(member_id)
            .await?
            .ok_or_else(|| PromotionError::validation(format!("Member {} not found", member_id)))?;

        if member.organization_id != Some(organization.id) {
            return Err(PromotionError::validation(format!(
                "Member {} does not belong to organization {}",
                member_id, organization_id
            )));
        }

        let in_shared = member.database_schema == self.shared_namespace;
        if organization.is_active() {
            if organization.owner_id == Some(member.id) && !in_shared {
                return Ok(Plan::Noop);
            }
            return Err(PromotionError::AlreadyActive(organization.id));
        }

        let destination = member.username.clone();
        validate_namespace(&destination, &self.shared_namespace)?;

        if !in_shared {
            // Tables already live in a private schema, only ownership is missing
            debug!(
                "Member '{}' already uses schema '{}', recording ownership only",
                member.username, member.database_schema
            );
            tx.set_organization_owner(organization.id, member.id).await?;
            return Ok(Plan::Commit(PromotionSummary {
                organization_id: organization.id,
                member_id: member.id,
                username: member.username.clone(),
                namespace: member.database_schema.clone(),
                tables_moved: Vec::new(),
                triggers_rebuilt: Vec::new(),
            }));
        }

        let tables = tx
            .owned_tables(&self.shared_namespace, &member.database_username)
            .await
            .map_err(|source| PromotionError::introspection(self.shared_namespace.as_str(), source))?;
        let captured = self
            .inventory
            .list_triggers(tx, &self.shared_namespace, &tables)
            .await?;

        let record = PromotionRecord {
            original_namespace: member.database_schema.clone(),
            original_owner: organization.owner_id,
            tables,
            captured,
        };
        debug!(
            "Captured {} table(s) and {} trigger(s) for '{}'",
            record.tables.len(),
            record.captured.len(),
            member.username
        );

        match self.relocate(tx, &organization, &member, &record, &destination).await {
            Ok(summary) => Ok(Plan::Commit(summary)),
            Err(e) => {
                warn!(
                    "Discarding relocation of {} table(s) for '{}'; they stay in '{}' (owner {:?})",
                    record.tables.len(),
                    member.username,
                    record.original_namespace,
                    record.original_owner
                );
                Err(e)
            }
        }
    }

    async fn relocate(
        &self,
        tx: &mut C::Tx,
        organization: &Organization,
        member: &Member,
        record: &PromotionRecord,
        destination: &str,
    ) -> Result<PromotionSummary, PromotionError> {
        self.migrator
            .ensure_namespace(tx, destination, &member.database_username)
            .await?;
        self.migrator
            .move_tables(tx, member.id, &record.original_namespace, destination, &record.tables)
            .await?;

        let limit = self.quota_policy.quota_limit(organization, member);
        let rebuilt = self
            .rebuilder
            .rebuild(tx, &record.captured, &record.tables, destination, limit)
            .await?;

        tx.set_role_search_path(&member.database_username, &[destination, self.shared_namespace.as_str()])
            .await?;
        tx.set_member_schema(member.id, destination).await?;
        tx.set_organization_owner(organization.id, member.id).await?;

        Ok(PromotionSummary {
            organization_id: organization.id,
            member_id: member.id,
            username: member.username.clone(),
            namespace: destination.to_string(),
            tables_moved: record.tables.clone(),
            triggers_rebuilt: rebuilt
                .iter()
                .map(|t| format!("{}.{}", t.table_name, t.trigger_name))
                .collect(),
        })
    }

    async fn notify(&self, summary: &PromotionSummary) {
        let change = RoleChange {
            organization_id: summary.organization_id,
            member_id: summary.member_id,
            username: summary.username.clone(),
            role: OWNER_ROLE.to_string(),
            database_schema: summary.namespace.clone(),
            promoted_at: Utc::now(),
        };

        match tokio::time::timeout(self.notify_timeout, self.accounts.member_role_changed(&change)).await {
            Ok(Ok(())) => debug!("Central notified of promotion of '{}'", summary.username),
            Ok(Err(e)) => warn!("Failed to notify central of promotion of '{}': {}", summary.username, e),
            Err(_) => warn!(
                "Timed out after {:?} notifying central of promotion of '{}'",
                self.notify_timeout, summary.username
            ),
        }
    }
}

/// Usernames become schema names, so they must be usable as one
pub fn validate_namespace(name: &str, shared_namespace: &str) -> Result<(), PromotionError> {
    if name.is_empty() || name.len() > MAX_NAMESPACE_LEN {
        return Err(PromotionError::validation(format!(
            "Username '{}' must be between 1 and {} bytes to be used as a schema",
            name, MAX_NAMESPACE_LEN
        )));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(PromotionError::validation(format!(
            "Username '{}' contains characters not allowed in a schema name",
            name
        )));
    }
    if name.to_ascii_lowercase().starts_with("pg_") {
        return Err(PromotionError::validation(format!("Username '{}' uses a reserved prefix", name)));
    }
    if name == shared_namespace {
        return Err(PromotionError::validation(format!(
            "Username '{}' collides with the shared schema",
            name
        )));
    }
    Ok(())
}
