//! Sends two related messages to two broker queues inside one transacted
//! session: both become visible on commit, or neither does.

pub mod broker;
pub mod cli;
pub mod config;
pub mod env;
pub mod errors;
pub mod message;
pub mod transaction;

pub use errors::AppError;
pub use transaction::{Invocation, TransactedDualSend, TransactionOutcome};
