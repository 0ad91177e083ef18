use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("{tool} failed: {reason}")]
    ToolExecutionError { tool: String, reason: String },

    #[error("{tool} did not complete within {timeout:?}")]
    TimeoutError { tool: String, timeout: Duration },

    #[error("Could not extract {protocol} port from {tool} output")]
    ParseError { tool: String, protocol: String },

    #[error("Firewall API request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Firewall API returned HTTP {status} for {operation}: {body}")]
    HttpStatusError {
        operation: String,
        status: u16,
        body: String,
    },

    #[error("Unexpected firewall response for {operation}: {body}")]
    UnexpectedResponseError { operation: String, body: String },

    #[error("Application unreachable: {reason}")]
    ConnectivityError { reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing configuration value: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid configuration value for {field} ({value}): {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Relay is in state {state} and cannot perform this operation")]
    InvalidStateError { state: String },
}

/// 錯誤所屬的外部系統，用於日誌與退出處理
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    PortMapper,
    Firewall,
    Application,
    Configuration,
    Internal,
}

impl RelayError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            RelayError::ToolExecutionError { .. }
            | RelayError::TimeoutError { .. }
            | RelayError::ParseError { .. } => ErrorCategory::PortMapper,
            RelayError::HttpError(_)
            | RelayError::HttpStatusError { .. }
            | RelayError::UnexpectedResponseError { .. } => ErrorCategory::Firewall,
            RelayError::ConnectivityError { .. } => ErrorCategory::Application,
            RelayError::IoError(_)
            | RelayError::ConfigError { .. }
            | RelayError::MissingConfigError { .. }
            | RelayError::InvalidConfigValueError { .. } => ErrorCategory::Configuration,
            RelayError::InvalidStateError { .. } => ErrorCategory::Internal,
        }
    }

    /// 錯誤訊息加上完整的 source 鏈（例如 reqwest 底層的連線錯誤）
    pub fn detailed_message(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            let cause_text = cause.to_string();
            // #[from] 變體的 Display 已包含第一層 source
            if !message.ends_with(&cause_text) {
                message.push_str(": ");
                message.push_str(&cause_text);
            }
            source = cause.source();
        }
        message
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::PortMapper => {
                "Check that natpmpc is installed and the NAT-PMP gateway address is reachable"
            }
            ErrorCategory::Firewall => {
                "Check the firewall URL, API key/secret and that the alias exists"
            }
            ErrorCategory::Application => {
                "Check that transmission-remote is installed and the application URL is correct"
            }
            ErrorCategory::Configuration => {
                "Review the configuration file or environment variables"
            }
            ErrorCategory::Internal => "Restart the relay",
        }
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
