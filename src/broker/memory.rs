// src/broker/memory.rs
//! In-process broker with transactional visibility.
//!
//! Sends are staged per session and only reach the queues on commit, which
//! makes the all-or-nothing behaviour observable without a RabbitMQ server.
//! Every call is recorded, and individual operations can be made to fail.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::errors::{BrokerError, Result};
use super::{Broker, BrokerConnection, BrokerEndpoint, Destination, TransactedSession};
use crate::message::Message;

/// One recorded collaborator call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BrokerCall {
    Connect { url: String, username: String },
    CreateSession,
    CreateDestination(String),
    Send { queue: String, payload: String },
    Commit,
    Rollback,
    CloseSession,
    QueueDepth(String),
    CloseConnection,
}

/// Operations that can be told to fail.
#[derive(Clone, Debug, Default)]
pub struct FailurePlan {
    pub connect: bool,
    pub create_session: bool,
    pub create_destination: Option<String>,
    pub send_to: Option<String>,
    pub commit: bool,
    pub rollback: bool,
    /// Queue depth reads fail.
    pub queue_depth: bool,
    /// Delay applied to every send, to exercise operation timeouts.
    pub send_delay: Option<Duration>,
}

#[derive(Debug, Default)]
struct State {
    queues: HashMap<String, Vec<String>>,
    calls: Vec<BrokerCall>,
    failures: FailurePlan,
}

/// Cloning shares the same queues and call log.
#[derive(Clone, Debug, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<State>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failures(failures: FailurePlan) -> Self {
        let broker = Self::new();
        broker.lock().failures = failures;
        broker
    }

    /// Committed messages of `queue`, oldest first.
    pub fn messages(&self, queue: &str) -> Vec<String> {
        self.lock().queues.get(queue).cloned().unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<BrokerCall> {
        self.lock().calls.clone()
    }

    pub fn count_calls(&self, call: &BrokerCall) -> usize {
        self.lock().calls.iter().filter(|c| *c == call).count()
    }

    /// Whether any send to `queue` was attempted, committed or not.
    pub fn send_attempted(&self, queue: &str) -> bool {
        self.lock()
            .calls
            .iter()
            .any(|c| matches!(c, BrokerCall::Send { queue: q, .. } if q == queue))
    }

    // A poisoned lock only means a test panicked mid-call; the data is still usable.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, call: BrokerCall) -> FailurePlan {
        let mut state = self.lock();
        state.calls.push(call);
        state.failures.clone()
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    type Connection = InMemoryConnection;

    async fn connect(&self, endpoint: &BrokerEndpoint) -> Result<InMemoryConnection> {
        let failures = self.record(BrokerCall::Connect {
            url: endpoint.url.clone(),
            username: endpoint.username.clone(),
        });
        if failures.connect {
            return Err(BrokerError::Connection(format!(
                "connection refused by {}",
                endpoint.url
            )));
        }
        Ok(InMemoryConnection {
            broker: self.clone(),
        })
    }
}

pub struct InMemoryConnection {
    broker: InMemoryBroker,
}

#[async_trait]
impl BrokerConnection for InMemoryConnection {
    type Session = InMemorySession;

    async fn create_transacted_session(&self) -> Result<InMemorySession> {
        if self.broker.record(BrokerCall::CreateSession).create_session {
            return Err(BrokerError::Simulated("session refused".to_string()));
        }
        Ok(InMemorySession {
            broker: self.broker.clone(),
            staged: Vec::new(),
        })
    }

    async fn queue_depth(&self, queue: &str) -> Result<u32> {
        if self.broker.record(BrokerCall::QueueDepth(queue.to_string())).queue_depth {
            return Err(BrokerError::declare(queue, "simulated depth read failure"));
        }
        Ok(self.broker.messages(queue).len() as u32)
    }

    async fn close(self) -> Result<()> {
        self.broker.record(BrokerCall::CloseConnection);
        Ok(())
    }
}

pub struct InMemorySession {
    broker: InMemoryBroker,
    staged: Vec<(String, String)>,
}

#[async_trait]
impl TransactedSession for InMemorySession {
    async fn create_destination(&mut self, name: &str) -> Result<Destination> {
        let failures = self
            .broker
            .record(BrokerCall::CreateDestination(name.to_string()));
        if failures.create_destination.as_deref() == Some(name) {
            return Err(BrokerError::declare(name, "simulated declare failure"));
        }
        self.broker.lock().queues.entry(name.to_string()).or_default();
        Ok(Destination::new(name))
    }

    async fn send(&mut self, destination: &Destination, message: &Message) -> Result<()> {
        let failures = self.broker.record(BrokerCall::Send {
            queue: destination.name().to_string(),
            payload: message.payload().to_string(),
        });
        if let Some(delay) = failures.send_delay {
            tokio::time::sleep(delay).await;
        }
        if failures.send_to.as_deref() == Some(destination.name()) {
            return Err(BrokerError::publish(destination.name(), "simulated publish failure"));
        }
        self.staged
            .push((destination.name().to_string(), message.payload().to_string()));
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        if self.broker.record(BrokerCall::Commit).commit {
            return Err(BrokerError::Simulated("commit rejected".to_string()));
        }
        let mut state = self.broker.lock();
        for (queue, payload) in self.staged.drain(..) {
            state.queues.entry(queue).or_default().push(payload);
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        let failures = self.broker.record(BrokerCall::Rollback);
        // Staged sends are discarded even when the rollback reports an error;
        // nothing uncommitted may ever become visible.
        self.staged.clear();
        if failures.rollback {
            return Err(BrokerError::Simulated("rollback rejected".to_string()));
        }
        Ok(())
    }

    async fn close(self) -> Result<()> {
        self.broker.record(BrokerCall::CloseSession);
        Ok(())
    }
}
