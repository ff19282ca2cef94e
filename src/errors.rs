// src/errors.rs

use thiserror::Error;

use crate::broker::BrokerError;

/// Failures that end an invocation without a transaction outcome.
///
/// Errors raised after a session exists never show up here: they are
/// handled by rolling back and reported as `TransactionOutcome::RolledBack`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Could not open a transacted session: {0}")]
    BrokerConnect(#[source] BrokerError),
}

impl AppError {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::InvalidArgument(_) | AppError::Config(_) => 1,
            AppError::BrokerConnect(_) => 2,
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::Config(format!("{:#}", error))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(AppError::InvalidArgument("x".into()).exit_code(), 1);
        assert_eq!(AppError::Config("x".into()).exit_code(), 1);
        assert_eq!(
            AppError::BrokerConnect(BrokerError::Connection("refused".into())).exit_code(),
            2
        );
    }

    #[test]
    fn test_config_error_keeps_context_chain() {
        let error =
            anyhow::anyhow!("missing field `connection`").context("settings.json is invalid");
        let app: AppError = error.into();
        assert_eq!(
            app.to_string(),
            "Configuration error: settings.json is invalid: missing field `connection`"
        );
    }
}
