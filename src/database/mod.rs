pub mod catalog;
pub mod manager;
pub mod models;
pub mod postgres;

pub use catalog::{Catalog, CatalogTx};
pub use manager::{DatabaseError, DatabaseManager};
pub use postgres::{PgCatalog, PgCatalogTx};
