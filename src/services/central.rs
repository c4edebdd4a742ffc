use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::CentralConfig;

#[derive(Debug, thiserror::Error)]
pub enum CentralError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Central rejected the update with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("Invalid central URL: {0}")]
    InvalidUrl(String),
}

/// Notification sent to the central account service after a promotion commits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleChange {
    pub organization_id: Uuid,
    pub member_id: Uuid,
    pub username: String,
    pub role: String,
    pub database_schema: String,
    pub promoted_at: DateTime<Utc>,
}

#[async_trait]
pub trait AccountService: Send + Sync {
    async fn member_role_changed(&self, change: &RoleChange) -> Result<(), CentralError>;
}

/// Used when no central service is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAccountService;

#[async_trait]
impl AccountService for NoopAccountService {
    async fn member_role_changed(&self, change: &RoleChange) -> Result<(), CentralError> {
        debug!("Central service disabled, skipping role change for {}", change.username);
        Ok(())
    }
}

/// HTTP client for the central account service
pub struct CentralClient {
    http: reqwest::Client,
    base_url: url::Url,
    api_key: Option<String>,
}

impl CentralClient {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self, CentralError> {
        let base_url = url::Url::parse(base_url).map_err(|e| CentralError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base_url, api_key })
    }

    /// Build the service described by configuration, falling back to a no-op
    pub fn from_config(settings: &CentralConfig) -> Result<Arc<dyn AccountService>, CentralError> {
        match (&settings.base_url, settings.enabled) {
            (Some(base_url), true) => Ok(Arc::new(Self::new(
                base_url,
                settings.api_key.clone(),
                Duration::from_secs(settings.request_timeout_secs),
            )?)),
            (None, true) => {
                if crate::is_production!() {
                    warn!("Central service enabled without CENTRAL_BASE_URL, role changes will not be sent");
                }
                Ok(Arc::new(NoopAccountService))
            }
            _ => Ok(Arc::new(NoopAccountService)),
        }
    }

    fn role_url(&self, member_id: Uuid) -> Result<url::Url, CentralError> {
        self.base_url
            .join(&format!("api/users/{}/role", member_id))
            .map_err(|e| CentralError::InvalidUrl(e.to_string()))
    }
}

#[async_trait]
impl AccountService for CentralClient {
    async fn member_role_changed(&self, change: &RoleChange) -> Result<(), CentralError> {
        let url = self.role_url(change.member_id)?;
        let mut request = self.http.put(url).json(change);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CentralError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!("Central acknowledged role change for {}", change.username);
        Ok(())
    }
}
