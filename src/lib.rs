pub mod cli;
pub mod config;
pub mod database;
pub mod error;
pub mod services;

pub use error::PromotionError;

#[cfg(test)]
pub mod testing;
