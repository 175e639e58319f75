use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Authentication failed: {message}")]
    AuthError { message: String },

    #[error("Azure API returned {status} ({code}): {message}")]
    ApiError {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Operation on {resource} ended with status {status}: {message}")]
    OperationFailed {
        resource: String,
        status: String,
        message: String,
    },

    #[error("Timed out after {elapsed:?} waiting for {resource}")]
    TimeoutError { resource: String, elapsed: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Authentication,
    Network,
    RemoteOperation,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Medium,
    High,
    Critical,
}

impl ProvisionError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::AuthError {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigError { .. }
            | Self::MissingConfigError { .. }
            | Self::InvalidConfigValueError { .. } => ErrorCategory::Configuration,
            Self::AuthError { .. } => ErrorCategory::Authentication,
            Self::HttpError(_) | Self::TimeoutError { .. } => ErrorCategory::Network,
            Self::ApiError { status, .. } if *status == 401 || *status == 403 => {
                ErrorCategory::Authentication
            }
            Self::ApiError { .. } | Self::OperationFailed { .. } => ErrorCategory::RemoteOperation,
            Self::IoError(_) | Self::SerializationError(_) => ErrorCategory::System,
        }
    }

    /// Transport failures, throttling and server-side errors. Another
    /// attempt may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::HttpError(_) => true,
            Self::ApiError { status, .. } => *status == 408 || *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            _ if self.is_transient() => ErrorSeverity::Medium,
            Self::TimeoutError { .. } => ErrorSeverity::Medium,
            Self::IoError(_) | Self::SerializationError(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::High,
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self.severity() {
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            Self::MissingConfigError { .. } => {
                "Set the missing value via its flag, environment variable or the .env file"
            }
            Self::ConfigError { .. } | Self::InvalidConfigValueError { .. } => {
                "Check the command line flags and the deployment TOML file"
            }
            Self::AuthError { .. } => {
                "Set AZURE_ACCESS_TOKEN, the AZURE_TENANT_ID/AZURE_CLIENT_ID/AZURE_CLIENT_SECRET trio, or run 'az login'"
            }
            Self::ApiError { status: 401, .. } | Self::ApiError { status: 403, .. } => {
                "Make sure the identity has Contributor rights on the subscription"
            }
            Self::ApiError { status: 409, .. } => {
                "A conflicting resource exists; pick different names or run 'down' first"
            }
            Self::ApiError { .. } => "Inspect the error code returned by Azure and adjust the deployment",
            Self::OperationFailed { .. } => {
                "Inspect the resource group in the Azure portal; resources created so far are left in place"
            }
            Self::HttpError(_) => "Check network connectivity to Azure and retry",
            Self::TimeoutError { .. } => "Increase --timeout-secs or check the operation in the Azure portal",
            Self::IoError(_) | Self::SerializationError(_) => "Re-run with --verbose and report the failure",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::MissingConfigError { field } => format!("Missing required setting: {}", field),
            Self::InvalidConfigValueError { field, reason, .. } => {
                format!("Invalid {}: {}", field, reason)
            }
            Self::ApiError { code, message, .. } => format!("Azure rejected the request ({}): {}", code, message),
            Self::OperationFailed {
                resource, status, ..
            } => format!("Provisioning of {} finished as {}", resource, status),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ProvisionError>;
