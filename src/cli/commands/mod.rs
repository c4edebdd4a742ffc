pub mod bootstrap;
pub mod promote;
pub mod quota_sql;
pub mod triggers;
