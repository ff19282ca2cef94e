// src/broker/mod.rs
// Broker collaborator seam: the transaction flow only talks to these traits.

pub mod amqp;
pub mod errors;
pub mod memory;

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

use crate::message::Message;

pub use amqp::AmqpBroker;
pub use errors::{BrokerError, Result};
pub use memory::InMemoryBroker;

/// Where and as whom to connect.
#[derive(Clone, PartialEq, Eq)]
pub struct BrokerEndpoint {
    pub url: String,
    pub username: String,
    pub password: String,
    pub heartbeat_seconds: Option<u16>,
    pub connection_timeout: Option<Duration>,
}

impl BrokerEndpoint {
    pub fn new(url: &str, username: &str, password: &str) -> Self {
        Self {
            url: url.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            heartbeat_seconds: None,
            connection_timeout: None,
        }
    }
}

// Keeps the password out of logs.
impl fmt::Debug for BrokerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerEndpoint")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"***")
            .field("heartbeat_seconds", &self.heartbeat_seconds)
            .field("connection_timeout", &self.connection_timeout)
            .finish()
    }
}

/// A queue resolved within a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Destination {
    name: String,
}

impl Destination {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Entry point of a broker client library.
#[async_trait]
pub trait Broker: Send + Sync {
    type Connection: BrokerConnection;

    async fn connect(&self, endpoint: &BrokerEndpoint) -> Result<Self::Connection>;
}

#[async_trait]
pub trait BrokerConnection: Send + Sync {
    type Session: TransactedSession;

    /// Opens a session whose sends stay invisible until `commit`.
    async fn create_transacted_session(&self) -> Result<Self::Session>;

    /// Number of messages currently visible in `queue`, read outside any transaction.
    async fn queue_depth(&self, queue: &str) -> Result<u32>;

    async fn close(self) -> Result<()>;
}

/// A transacted session. `close` consumes the session, so it runs at most once.
#[async_trait]
pub trait TransactedSession: Send {
    async fn create_destination(&mut self, name: &str) -> Result<Destination>;

    async fn send(&mut self, destination: &Destination, message: &Message) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;

    async fn close(self) -> Result<()>;
}
