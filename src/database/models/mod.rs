pub mod member;
pub mod organization;
pub mod trigger;
pub mod user_table;

pub use member::Member;
pub use organization::Organization;
pub use trigger::{TriggerDefinition, TriggerEvent, TriggerTiming};
pub use user_table::UserTable;
