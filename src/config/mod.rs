use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub promotion: PromotionConfig,
    pub central: CentralConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub connection_timeout: u64,
    /// Applied with SET LOCAL at the start of every promotion transaction; 0 disables
    pub lock_timeout_ms: u64,
    pub statement_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromotionConfig {
    pub shared_namespace: String,
    pub notify_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CentralConfig {
    pub enabled: bool,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub request_timeout_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Database overrides
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }
        if let Ok(v) = env::var("DATABASE_LOCK_TIMEOUT_MS") {
            self.database.lock_timeout_ms = v.parse().unwrap_or(self.database.lock_timeout_ms);
        }
        if let Ok(v) = env::var("DATABASE_STATEMENT_TIMEOUT_MS") {
            self.database.statement_timeout_ms = v.parse().unwrap_or(self.database.statement_timeout_ms);
        }

        // Promotion overrides
        if let Ok(v) = env::var("PROMOTION_SHARED_NAMESPACE") {
            if !v.trim().is_empty() {
                self.promotion.shared_namespace = v.trim().to_string();
            }
        }
        if let Ok(v) = env::var("PROMOTION_NOTIFY_TIMEOUT_SECS") {
            self.promotion.notify_timeout_secs = v.parse().unwrap_or(self.promotion.notify_timeout_secs);
        }

        // Central account service overrides
        if let Ok(v) = env::var("CENTRAL_ENABLED") {
            self.central.enabled = v.parse().unwrap_or(self.central.enabled);
        }
        if let Ok(v) = env::var("CENTRAL_BASE_URL") {
            self.central.base_url = Some(v).filter(|s| !s.is_empty());
        }
        if let Ok(v) = env::var("CENTRAL_API_KEY") {
            self.central.api_key = Some(v).filter(|s| !s.is_empty());
        }
        if let Ok(v) = env::var("CENTRAL_REQUEST_TIMEOUT_SECS") {
            self.central.request_timeout_secs = v.parse().unwrap_or(self.central.request_timeout_secs);
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            database: DatabaseConfig {
                max_connections: 5,
                connection_timeout: 30,
                lock_timeout_ms: 0,
                statement_timeout_ms: 0,
            },
            promotion: PromotionConfig {
                shared_namespace: "public".to_string(),
                notify_timeout_secs: 10,
            },
            central: CentralConfig {
                enabled: false,
                base_url: None,
                api_key: None,
                request_timeout_secs: 10,
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            database: DatabaseConfig {
                max_connections: 10,
                connection_timeout: 10,
                lock_timeout_ms: 10_000,
                statement_timeout_ms: 120_000,
            },
            promotion: PromotionConfig {
                shared_namespace: "public".to_string(),
                notify_timeout_secs: 5,
            },
            central: CentralConfig {
                enabled: true,
                base_url: None,
                api_key: None,
                request_timeout_secs: 5,
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            database: DatabaseConfig {
                max_connections: 20,
                connection_timeout: 5,
                lock_timeout_ms: 5_000,
                statement_timeout_ms: 300_000,
            },
            promotion: PromotionConfig {
                shared_namespace: "public".to_string(),
                notify_timeout_secs: 5,
            },
            central: CentralConfig {
                enabled: true,
                base_url: None,
                api_key: None,
                request_timeout_secs: 5,
            },
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}

#[macro_export]
macro_rules! is_production {
    () => {
        matches!($crate::config::CONFIG.environment, $crate::config::Environment::Production)
    };
}
