// src/broker/errors.rs

use lapin::Error as LapinError;
use thiserror::Error;
use tokio::time::error::Elapsed;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Broker connection error: {0}")]
    Connection(String),

    #[error("Broker channel error: {0}")]
    Channel(String),

    #[error("Invalid broker URI: {0}")]
    InvalidUri(String),

    #[error("Failed to declare queue '{queue}': {reason}")]
    Declare { queue: String, reason: String },

    #[error("Failed to publish to '{queue}': {reason}")]
    Publish { queue: String, reason: String },

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Broker operation timed out: {0}")]
    Timeout(String),

    #[error("Simulated broker failure: {0}")]
    Simulated(String),
}

// Custom Result type for broker operations
pub type Result<T> = std::result::Result<T, BrokerError>;

// lapin errors carry no operation context, so the callers that know which
// queue was involved map them explicitly; this covers the rest.
impl From<LapinError> for BrokerError {
    fn from(error: LapinError) -> Self {
        let error_text = error.to_string();

        if error_text.to_lowercase().contains("channel") {
            BrokerError::Channel(error_text)
        } else {
            BrokerError::Connection(error_text)
        }
    }
}

impl From<Elapsed> for BrokerError {
    fn from(_: Elapsed) -> Self {
        BrokerError::Timeout("no answer from the broker in time".to_string())
    }
}

impl BrokerError {
    pub fn declare(queue: &str, error: impl ToString) -> Self {
        BrokerError::Declare {
            queue: queue.to_string(),
            reason: error.to_string(),
        }
    }

    pub fn publish(queue: &str, error: impl ToString) -> Self {
        BrokerError::Publish {
            queue: queue.to_string(),
            reason: error.to_string(),
        }
    }
}
