use crate::utils::error::{ProvisionError, Result};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::Deserialize;
use std::time::{Duration, Instant};

pub const AZURE_ASYNC_OPERATION: &str = "azure-asyncoperation";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    /// `None` waits as long as the operation takes.
    pub timeout: Option<Duration>,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: None,
        }
    }
}

/// Status of a long-running ARM operation, from either an
/// `Azure-AsyncOperation` body or a resource's `provisioningState`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationStatus {
    InProgress,
    Succeeded,
    Failed,
    Canceled,
    Other(String),
}

impl OperationStatus {
    pub fn parse(status: &str) -> Self {
        match status.to_lowercase().as_str() {
            "inprogress" => Self::InProgress,
            "succeeded" => Self::Succeeded,
            "failed" => Self::Failed,
            "canceled" | "cancelled" => Self::Canceled,
            _ => Self::Other(status.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::InProgress => "InProgress",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Canceled => "Canceled",
            Self::Other(s) => s,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct AsyncOperation {
    pub status: String,
    #[serde(default)]
    pub error: Option<ErrorDetail>,
}

/// Tracks one wait loop: how long it has run and how long to sleep next.
#[derive(Debug)]
pub struct Poller {
    resource: String,
    settings: PollSettings,
    started: Instant,
    attempts: u32,
}

impl Poller {
    pub fn new(resource: impl Into<String>, settings: PollSettings) -> Self {
        Self {
            resource: resource.into(),
            settings,
            started: Instant::now(),
            attempts: 0,
        }
    }

    /// Sleeps before the next status check. `retry_after` from the service
    /// takes precedence over the configured interval; neither may run past
    /// the deadline.
    pub async fn wait(&mut self, retry_after: Option<Duration>) -> Result<()> {
        let elapsed = self.started.elapsed();
        let mut delay = retry_after.unwrap_or(self.settings.interval);
        if let Some(timeout) = self.settings.timeout {
            if elapsed >= timeout {
                return Err(ProvisionError::TimeoutError {
                    resource: self.resource.clone(),
                    elapsed,
                });
            }
            delay = delay.min(timeout - elapsed);
        }

        self.attempts += 1;
        tracing::debug!(
            "Waiting {:?} before status check #{} for {}",
            delay,
            self.attempts,
            self.resource
        );
        tokio::time::sleep(delay).await;
        Ok(())
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn failed(&self, status: &OperationStatus, error: Option<ErrorDetail>) -> ProvisionError {
        let detail = error.unwrap_or_default();
        let message = if detail.code.is_empty() {
            detail.message
        } else {
            format!("{}: {}", detail.code, detail.message)
        };

        ProvisionError::OperationFailed {
            resource: self.resource.clone(),
            status: status.as_str().to_string(),
            message,
        }
    }
}

pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

pub fn async_operation_url(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AZURE_ASYNC_OPERATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
