// Promotion error kinds
use thiserror::Error;
use uuid::Uuid;

use crate::database::manager::DatabaseError;

/// Errors surfaced by `PromotionCoordinator::promote_to_admin`.
///
/// Precondition failures (`AlreadyActive`, `Validation`) happen before any
/// mutation. The others abort the transaction; the underlying database error is
/// kept as the source.
#[derive(Debug, Error)]
pub enum PromotionError {
    #[error("Organization {0} is already active and can't be promoted into")]
    AlreadyActive(Uuid),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Failed to read triggers in schema '{namespace}': {source}")]
    Introspection {
        namespace: String,
        #[source]
        source: DatabaseError,
    },

    #[error("Failed to relocate table '{table}': {source}")]
    Relocation {
        table: String,
        #[source]
        source: DatabaseError,
    },

    #[error("Failed to rebuild trigger '{trigger}' on '{table}': {source}")]
    TriggerRebuild {
        trigger: String,
        table: String,
        #[source]
        source: DatabaseError,
    },

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl PromotionError {
    pub fn validation(message: impl Into<String>) -> Self {
        PromotionError::Validation(message.into())
    }

    pub fn introspection(namespace: impl Into<String>, source: DatabaseError) -> Self {
        PromotionError::Introspection {
            namespace: namespace.into(),
            source,
        }
    }

    pub fn relocation(table: impl Into<String>, source: DatabaseError) -> Self {
        PromotionError::Relocation {
            table: table.into(),
            source,
        }
    }

    pub fn trigger_rebuild(trigger: impl Into<String>, table: impl Into<String>, source: DatabaseError) -> Self {
        PromotionError::TriggerRebuild {
            trigger: trigger.into(),
            table: table.into(),
            source,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            PromotionError::AlreadyActive(_) => "ALREADY_ACTIVE",
            PromotionError::Validation(_) => "VALIDATION_ERROR",
            PromotionError::Introspection { .. } => "INTROSPECTION_ERROR",
            PromotionError::Relocation { .. } => "RELOCATION_ERROR",
            PromotionError::TriggerRebuild { .. } => "TRIGGER_REBUILD_ERROR",
            PromotionError::Database(_) => "DATABASE_ERROR",
        }
    }

    /// True when the request was rejected before anything was changed
    pub fn is_precondition(&self) -> bool {
        matches!(self, PromotionError::AlreadyActive(_) | PromotionError::Validation(_))
    }
}
