use crate::domain::model::ArmResource;
use crate::utils::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, PartialEq)]
pub struct AccessToken {
    pub token: String,
    pub expires_on: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(token: impl Into<String>, expires_on: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_on,
        }
    }

    /// True once `now + skew` has reached the expiry time.
    pub fn is_expired(&self, skew: Duration) -> bool {
        Utc::now() + skew >= self.expires_on
    }
}

#[async_trait]
pub trait TokenCredential: Send + Sync {
    async fn get_token(&self) -> Result<AccessToken>;
}

/// Create-or-update access to Azure Resource Manager.
///
/// `put` and `delete` return only once the remote operation has reached a
/// terminal state.
#[async_trait]
pub trait ResourceManager: Send + Sync {
    async fn put(&self, path: &str, api_version: &str, body: serde_json::Value) -> Result<ArmResource>;
    async fn get(&self, path: &str, api_version: &str) -> Result<ArmResource>;
    async fn delete(&self, path: &str, api_version: &str) -> Result<()>;
}
