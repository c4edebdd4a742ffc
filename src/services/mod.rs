pub mod central;
pub mod promotion;
pub mod quota_trigger;
pub mod schema_migrator;
pub mod trigger_inventory;
pub mod trigger_rebuilder;

pub use central::{AccountService, CentralClient, CentralError, NoopAccountService, RoleChange};
pub use promotion::{PromotionCoordinator, PromotionOutcome, PromotionSummary};
pub use quota_trigger::{MemberQuotaPolicy, QuotaPolicy, QuotaTriggerBuilder};
pub use schema_migrator::SchemaMigrator;
pub use trigger_inventory::TriggerInventory;
pub use trigger_rebuilder::TriggerRebuilder;
