//! Positional command line of the `transacted-dual-send` binary.

use clap::Parser;
use std::path::PathBuf;

use crate::broker::BrokerEndpoint;
use crate::config::ConnectionSettings;
use crate::errors::{AppError, Result};
use crate::message::DerivationMode;
use crate::transaction::Invocation;

#[derive(Parser, Debug, Clone)]
#[command(name = "transacted-dual-send")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Send two related messages to two queues in one broker transaction")]
#[command(after_help = "Example of a successful transaction:\n  \
    transacted-dual-send admin secret amqps://b-1234.mq.eu-west-1.amazonaws.com:5671 warehouse-queue shipping-queue 12345 false\n\n\
    Example of a rolled back transaction:\n  \
    transacted-dual-send admin secret amqps://b-1234.mq.eu-west-1.amazonaws.com:5671 warehouse-queue shipping-queue 12345 true")]
pub struct Cli {
    /// Broker user name
    pub broker_user: String,

    /// Broker password
    pub broker_password: String,

    /// Broker URL (amqp://, amqps://, tcp:// or ssl://)
    pub broker_url: String,

    /// Queue that receives the first message
    pub first_queue: String,

    /// Queue that receives the second message
    pub second_queue: String,

    /// Order id the two messages are derived from (the payload itself with --literal)
    pub order_id: String,

    /// Roll back after the first send instead of committing (true|false)
    pub simulate_failure: String,

    /// Send the payload unmodified to both queues
    #[arg(long)]
    pub literal: bool,

    /// Path to the JSON settings file
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Validated invocation; nothing here touches the broker.
    pub fn into_invocation(self, connection: &ConnectionSettings) -> Result<Invocation> {
        let simulate_failure = parse_flag(&self.simulate_failure)?;

        let mut endpoint =
            BrokerEndpoint::new(&self.broker_url, &self.broker_user, &self.broker_password);
        endpoint.heartbeat_seconds = Some(connection.heartbeat_seconds);
        endpoint.connection_timeout = Some(connection.connection_timeout());

        let invocation = Invocation {
            endpoint,
            first_queue: self.first_queue,
            second_queue: self.second_queue,
            input: self.order_id,
            mode: if self.literal {
                DerivationMode::Literal
            } else {
                DerivationMode::Order
            },
            simulate_failure,
        };
        invocation.validate()?;
        Ok(invocation)
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        "" => Err(AppError::InvalidArgument(
            "simulate failure flag must not be blank".to_string(),
        )),
        other => Err(AppError::InvalidArgument(format!(
            "simulate failure flag must be true or false, got '{}'",
            other
        ))),
    }
}
