//! Credentials for Azure Resource Manager.
//!
//! Sources are tried in order by [`default_credential`]:
//! - `AZURE_ACCESS_TOKEN` (a pre-issued bearer token)
//! - `AZURE_TENANT_ID` / `AZURE_CLIENT_ID` / `AZURE_CLIENT_SECRET` (service principal)
//! - the Azure CLI login (`az account get-access-token`)

use crate::domain::ports::{AccessToken, TokenCredential};
use crate::utils::error::{ProvisionError, Result};
use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::env;
use tokio::sync::Mutex;

pub const ARM_SCOPE: &str = "https://management.azure.com/.default";
pub const ARM_RESOURCE: &str = "https://management.azure.com/";
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Bearer token handed in from outside, assumed valid for an hour.
#[derive(Debug, Clone)]
pub struct StaticTokenCredential {
    token: AccessToken,
}

impl StaticTokenCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: AccessToken::new(token, Utc::now() + Duration::hours(1)),
        }
    }

    pub fn from_environment() -> Option<Self> {
        env::var("AZURE_ACCESS_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty())
            .map(|t| Self::new(t.trim()))
    }
}

#[async_trait]
impl TokenCredential for StaticTokenCredential {
    async fn get_token(&self) -> Result<AccessToken> {
        Ok(self.token.clone())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: String,
}

/// OAuth2 client-credentials flow against Microsoft Entra ID.
#[derive(Clone)]
pub struct ClientSecretCredential {
    authority_host: String,
    tenant_id: String,
    client_id: String,
    client_secret: String,
    client: Client,
}

impl ClientSecretCredential {
    pub fn new(
        authority_host: impl Into<String>,
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            authority_host: authority_host.into().trim_end_matches('/').to_string(),
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            client: Client::new(),
        }
    }

    pub fn from_environment() -> Option<Self> {
        let tenant_id = env::var("AZURE_TENANT_ID").ok()?;
        let client_id = env::var("AZURE_CLIENT_ID").ok()?;
        let client_secret = env::var("AZURE_CLIENT_SECRET").ok()?;
        let authority_host =
            env::var("AZURE_AUTHORITY_HOST").unwrap_or_else(|_| DEFAULT_AUTHORITY_HOST.to_string());

        Some(Self::new(authority_host, tenant_id, client_id, client_secret))
    }

    fn token_url(&self) -> String {
        format!("{}/{}/oauth2/v2.0/token", self.authority_host, self.tenant_id)
    }
}

impl std::fmt::Debug for ClientSecretCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSecretCredential")
            .field("authority_host", &self.authority_host)
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl TokenCredential for ClientSecretCredential {
    async fn get_token(&self) -> Result<AccessToken> {
        tracing::debug!("Requesting token for client {} from {}", self.client_id, self.token_url());

        let response = self
            .client
            .post(self.token_url())
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("scope", ARM_SCOPE),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let reason = serde_json::from_str::<TokenErrorResponse>(&body)
                .map(|e| format!("{}: {}", e.error, e.error_description))
                .unwrap_or_else(|_| format!("token endpoint returned {}", status));
            return Err(ProvisionError::auth(reason));
        }

        let token: TokenResponse = serde_json::from_str(&body)?;
        Ok(AccessToken::new(
            token.access_token,
            Utc::now() + Duration::seconds(token.expires_in),
        ))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliTokenResponse {
    access_token: String,
    /// Local time, `%Y-%m-%d %H:%M:%S.%f`.
    #[serde(default)]
    expires_on: Option<String>,
    /// Epoch seconds, newer CLI versions only.
    #[serde(default, rename = "expires_on")]
    expires_on_epoch: Option<i64>,
}

/// Reuses the login of an installed Azure CLI.
#[derive(Debug, Clone)]
pub struct AzureCliCredential {
    program: String,
}

impl AzureCliCredential {
    pub fn new() -> Self {
        Self {
            program: "az".to_string(),
        }
    }

    /// Runs `program` instead of `az`.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for AzureCliCredential {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_cli_token(stdout: &[u8]) -> Result<AccessToken> {
    let parsed: CliTokenResponse = serde_json::from_slice(stdout)?;

    let expires_on = match (parsed.expires_on_epoch, parsed.expires_on.as_deref()) {
        (Some(epoch), _) => Utc.timestamp_opt(epoch, 0).single(),
        (None, Some(local)) => NaiveDateTime::parse_from_str(local, "%Y-%m-%d %H:%M:%S%.f")
            .ok()
            .and_then(|naive| chrono::Local.from_local_datetime(&naive).single())
            .map(|local| local.with_timezone(&Utc)),
        (None, None) => None,
    }
    .unwrap_or_else(|| Utc::now() + Duration::minutes(5));

    Ok(AccessToken::new(parsed.access_token, expires_on))
}

#[async_trait]
impl TokenCredential for AzureCliCredential {
    async fn get_token(&self) -> Result<AccessToken> {
        tracing::debug!("Requesting token from the Azure CLI");

        let output = tokio::process::Command::new(&self.program)
            .args(["account", "get-access-token", "--resource", ARM_RESOURCE, "--output", "json"])
            .output()
            .await
            .map_err(|e| ProvisionError::auth(format!("could not run '{}': {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProvisionError::auth(format!(
                "'{} account get-access-token' failed: {}",
                self.program,
                stderr.trim()
            )));
        }

        parse_cli_token(&output.stdout)
    }
}

/// Holds on to a token until it is about to expire.
pub struct CachedCredential<C: TokenCredential> {
    inner: C,
    cached: Mutex<Option<AccessToken>>,
    refresh_skew: Duration,
}

impl<C: TokenCredential> CachedCredential<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            cached: Mutex::new(None),
            refresh_skew: Duration::minutes(5),
        }
    }
}

#[async_trait]
impl<C: TokenCredential> TokenCredential for CachedCredential<C> {
    async fn get_token(&self) -> Result<AccessToken> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if !token.is_expired(self.refresh_skew) {
                return Ok(token.clone());
            }
            tracing::debug!("Access token expires at {}, refreshing", token.expires_on);
        }

        let token = self.inner.get_token().await?;
        *cached = Some(token.clone());
        Ok(token)
    }
}

#[async_trait]
impl TokenCredential for Box<dyn TokenCredential> {
    async fn get_token(&self) -> Result<AccessToken> {
        (**self).get_token().await
    }
}

/// Picks the first configured credential source.
pub fn default_credential() -> CachedCredential<Box<dyn TokenCredential>> {
    let inner: Box<dyn TokenCredential> = if let Some(static_token) = StaticTokenCredential::from_environment() {
        tracing::info!("🔑 Using access token from AZURE_ACCESS_TOKEN");
        Box::new(static_token)
    } else if let Some(service_principal) = ClientSecretCredential::from_environment() {
        tracing::info!("🔑 Using service principal {}", service_principal.client_id);
        Box::new(service_principal)
    } else {
        tracing::info!("🔑 Using Azure CLI login");
        Box::new(AzureCliCredential::new())
    };

    CachedCredential::new(inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingCredential {
        calls: Arc<AtomicUsize>,
        lifetime: Duration,
    }

    #[async_trait]
    impl TokenCredential for CountingCredential {
        async fn get_token(&self) -> Result<AccessToken> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(AccessToken::new(format!("token-{}", n), Utc::now() + self.lifetime))
        }
    }

    #[tokio::test]
    async fn test_client_secret_credential_requests_arm_scope() {
        let server = MockServer::start();
        let token_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/tenant-1/oauth2/v2.0/token")
                .body_contains("grant_type=client_credentials")
                .body_contains("client_id=app-1")
                .body_contains("scope=https%3A%2F%2Fmanagement.azure.com%2F.default");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(serde_json::json!({
                    "token_type": "Bearer",
                    "expires_in": 3599,
                    "access_token": "eyJ0eXAi"
                }));
        });

        let credential = ClientSecretCredential::new(server.base_url(), "tenant-1", "app-1", "s3cret");
        let token = credential.get_token().await.unwrap();

        token_mock.assert();
        assert_eq!(token.token, "eyJ0eXAi");
        assert!(!token.is_expired(Duration::minutes(5)));
    }

    #[tokio::test]
    async fn test_client_secret_credential_reports_aad_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/tenant-1/oauth2/v2.0/token");
            then.status(401)
                .header("Content-Type", "application/json")
                .json_body(serde_json::json!({
                    "error": "invalid_client",
                    "error_description": "AADSTS7000215: Invalid client secret provided."
                }));
        });

        let credential = ClientSecretCredential::new(server.base_url(), "tenant-1", "app-1", "wrong");
        let err = credential.get_token().await.unwrap_err();

        match err {
            ProvisionError::AuthError { message } => {
                assert!(message.starts_with("invalid_client"));
                assert!(message.contains("AADSTS7000215"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_client_secret_is_redacted_in_debug() {
        let credential = ClientSecretCredential::new(DEFAULT_AUTHORITY_HOST, "tenant-1", "app-1", "s3cret-value");
        let printed = format!("{:?}", credential);

        assert!(printed.contains("app-1"));
        assert!(printed.contains("<redacted>"));
        assert!(!printed.contains("s3cret-value"));
    }

    #[tokio::test]
    async fn test_cached_credential_reuses_fresh_token() {
        let calls = Arc::new(AtomicUsize::new(0));
        let credential = CachedCredential::new(CountingCredential {
            calls: calls.clone(),
            lifetime: Duration::hours(1),
        });

        let first = credential.get_token().await.unwrap();
        let second = credential.get_token().await.unwrap();

        assert_eq!(first.token, second.token);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cached_credential_refreshes_near_expiry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let credential = CachedCredential::new(CountingCredential {
            calls: calls.clone(),
            lifetime: Duration::minutes(2),
        });

        credential.get_token().await.unwrap();
        let second = credential.get_token().await.unwrap();

        assert_eq!(second.token, "token-1");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_parse_cli_token_prefers_epoch() {
        let stdout = br#"{
            "accessToken": "cli-token",
            "expiresOn": "2030-01-01 10:00:00.000000",
            "expires_on": 1893492000,
            "subscription": "11111111-2222-3333-4444-555555555555",
            "tenant": "tenant-1",
            "tokenType": "Bearer"
        }"#;

        let token = parse_cli_token(stdout).unwrap();
        assert_eq!(token.token, "cli-token");
        assert_eq!(token.expires_on.timestamp(), 1893492000);
    }

    #[test]
    fn test_parse_cli_token_local_time() {
        let stdout = br#"{"accessToken": "cli-token", "expiresOn": "2030-01-01 10:00:00.123456"}"#;

        let token = parse_cli_token(stdout).unwrap();
        assert!(!token.is_expired(Duration::zero()));
    }

    #[tokio::test]
    async fn test_cli_credential_missing_program() {
        let credential = AzureCliCredential::with_program("definitely-not-an-az-binary");
        let err = credential.get_token().await.unwrap_err();
        assert!(matches!(err, ProvisionError::AuthError { .. }));
    }
}
