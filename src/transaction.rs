// src/transaction.rs
//! Two destinations, one transacted session: commit both sends or neither.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::broker::{self, Broker, BrokerConnection, BrokerEndpoint, BrokerError, TransactedSession};
use crate::config::TransactionSettings;
use crate::errors::{AppError, Result};
use crate::message::{derive_pair, DerivationMode, Message};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionOutcome {
    Committed,
    RolledBack,
}

/// Everything one run needs.
#[derive(Clone, Debug)]
pub struct Invocation {
    pub endpoint: BrokerEndpoint,
    pub first_queue: String,
    pub second_queue: String,
    /// Order id, or the literal payload in `DerivationMode::Literal`.
    pub input: String,
    pub mode: DerivationMode,
    pub simulate_failure: bool,
}

impl Invocation {
    /// Every string input must be non-blank.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("broker user", &self.endpoint.username),
            ("broker password", &self.endpoint.password),
            ("broker URL", &self.endpoint.url),
            ("first queue", &self.first_queue),
            ("second queue", &self.second_queue),
            (self.input_label(), &self.input),
        ];
        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(AppError::InvalidArgument(format!("{} must not be blank", name)));
            }
        }
        Ok(())
    }

    fn input_label(&self) -> &'static str {
        match self.mode {
            DerivationMode::Order => "order id",
            DerivationMode::Literal => "message",
        }
    }
}

/// Why the send phase gave up before commit.
#[derive(Debug, Error)]
pub enum AbortReason {
    #[error("failure simulation requested")]
    SimulatedFailure,

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

/// Result of the send phase; the flow commits on `Ready` and rolls back otherwise.
#[derive(Debug)]
pub enum SendPhase {
    Ready,
    Aborted(AbortReason),
}

impl From<std::result::Result<(), AbortReason>> for SendPhase {
    fn from(result: std::result::Result<(), AbortReason>) -> Self {
        match result {
            Ok(()) => SendPhase::Ready,
            Err(reason) => SendPhase::Aborted(reason),
        }
    }
}

pub struct TransactedDualSend<B> {
    broker: B,
    settings: TransactionSettings,
}

impl<B: Broker> TransactedDualSend<B> {
    pub fn new(broker: B, settings: TransactionSettings) -> Self {
        Self { broker, settings }
    }

    /// Runs one transaction. Only validation and connection problems come
    /// back as errors; anything after the session is open ends in a rollback.
    #[instrument(
        skip_all,
        fields(first = %invocation.first_queue, second = %invocation.second_queue)
    )]
    pub async fn run(&self, invocation: &Invocation) -> Result<TransactionOutcome> {
        invocation.validate()?;

        let connection = self
            .broker
            .connect(&invocation.endpoint)
            .await
            .map_err(AppError::BrokerConnect)?;

        let session = match self.bounded(connection.create_transacted_session()).await {
            Ok(session) => session,
            Err(e) => {
                close_connection(connection).await;
                return Err(AppError::BrokerConnect(e));
            }
        };

        let outcome = self.transact(&connection, session, invocation).await;
        close_connection(connection).await;

        Ok(outcome)
    }

    async fn transact(
        &self,
        connection: &B::Connection,
        mut session: <B::Connection as BrokerConnection>::Session,
        invocation: &Invocation,
    ) -> TransactionOutcome {
        let (first, second) = derive_pair(invocation.mode, &invocation.input);

        let phase: SendPhase = self
            .send_both(connection, &mut session, invocation, &first, &second)
            .await
            .into();

        let outcome = match phase {
            SendPhase::Ready => {
                info!("Committing");
                match self.bounded(session.commit()).await {
                    Ok(()) => {
                        info!(first = %first, second = %second, "Transaction committed");
                        TransactionOutcome::Committed
                    }
                    Err(e) => {
                        error!(error = %e, "Commit failed");
                        self.roll_back(&mut session, &first).await
                    }
                }
            }
            SendPhase::Aborted(reason) => {
                warn!(reason = %reason, "Aborting transaction");
                self.roll_back(&mut session, &first).await
            }
        };

        // The one and only close of this session.
        if let Err(e) = self.bounded(session.close()).await {
            warn!(error = %e, "Failed to close session");
        }

        self.log_depths(connection, invocation, "after the transaction").await;
        outcome
    }

    async fn send_both<S: TransactedSession>(
        &self,
        connection: &B::Connection,
        session: &mut S,
        invocation: &Invocation,
        first: &Message,
        second: &Message,
    ) -> std::result::Result<(), AbortReason> {
        let first_queue = self
            .bounded(session.create_destination(&invocation.first_queue))
            .await?;
        let second_queue = self
            .bounded(session.create_destination(&invocation.second_queue))
            .await?;
        self.log_depths(connection, invocation, "before sending").await;

        info!(queue = %first_queue, message = %first, "Sending message");
        self.bounded(session.send(&first_queue, first)).await?;
        info!(queue = %first_queue, message = %first, "Message sent but not yet committed");
        self.pause().await;
        self.log_depths(connection, invocation, "after the first send").await;

        if invocation.simulate_failure {
            return Err(AbortReason::SimulatedFailure);
        }

        info!(queue = %second_queue, message = %second, "Sending message");
        self.bounded(session.send(&second_queue, second)).await?;
        info!(queue = %second_queue, message = %second, "Message sent but not yet committed");
        self.pause().await;
        self.log_depths(connection, invocation, "after the second send").await;

        Ok(())
    }

    async fn roll_back<S: TransactedSession>(
        &self,
        session: &mut S,
        first: &Message,
    ) -> TransactionOutcome {
        match self.bounded(session.rollback()).await {
            Ok(()) => info!(message = %first, "Transaction rolled back"),
            // Nothing was committed, so the outcome stands.
            Err(e) => error!(error = %e, message = %first, "Rollback failed"),
        }
        TransactionOutcome::RolledBack
    }

    async fn bounded<T, F>(&self, operation: F) -> broker::Result<T>
    where
        F: Future<Output = broker::Result<T>>,
    {
        match self.settings.operation_timeout() {
            Some(limit) => tokio::time::timeout(limit, operation).await?,
            None => operation.await,
        }
    }

    async fn pause(&self) {
        let delay = self.settings.step_delay();
        if delay > Duration::ZERO {
            info!(delay_ms = delay.as_millis() as u64, "Pausing before the next step");
            tokio::time::sleep(delay).await;
        }
    }

    async fn log_depths(&self, connection: &B::Connection, invocation: &Invocation, stage: &str) {
        if !self.settings.inspect_queue_depth {
            return;
        }
        for queue in [&invocation.first_queue, &invocation.second_queue] {
            match self.bounded(connection.queue_depth(queue)).await {
                Ok(depth) => info!(queue = %queue, depth, stage, "Queue depth"),
                Err(e) => warn!(queue = %queue, stage, error = %e, "Queue depth unknown"),
            }
        }
    }
}

async fn close_connection<C: BrokerConnection>(connection: C) {
    if let Err(e) = connection.close().await {
        warn!(error = %e, "Failed to close broker connection");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::memory::{BrokerCall, FailurePlan, InMemoryBroker};

    fn invocation(simulate_failure: bool) -> Invocation {
        Invocation {
            endpoint: BrokerEndpoint::new("tcp://broker", "u", "p"),
            first_queue: "warehouse".to_string(),
            second_queue: "shipping".to_string(),
            input: "42".to_string(),
            mode: DerivationMode::Order,
            simulate_failure,
        }
    }

    #[test]
    fn test_validate_rejects_blank_fields() {
        let mut inv = invocation(false);
        inv.second_queue = "   ".to_string();
        let err = inv.validate().unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(ref m) if m.contains("second queue")));

        let mut inv = invocation(false);
        inv.endpoint.password = String::new();
        assert!(matches!(inv.validate(), Err(AppError::InvalidArgument(_))));
    }

    #[test]
    fn test_send_phase_from_result() {
        assert!(matches!(SendPhase::from(Ok(())), SendPhase::Ready));
        assert!(matches!(
            SendPhase::from(Err(AbortReason::SimulatedFailure)),
            SendPhase::Aborted(AbortReason::SimulatedFailure)
        ));
    }

    #[tokio::test]
    async fn test_call_sequence_on_commit() {
        let broker = InMemoryBroker::new();
        let sender = TransactedDualSend::new(broker.clone(), TransactionSettings::default());

        let outcome = sender.run(&invocation(false)).await.unwrap();
        assert_eq!(outcome, TransactionOutcome::Committed);

        assert_eq!(
            broker.calls(),
            vec![
                BrokerCall::Connect {
                    url: "tcp://broker".to_string(),
                    username: "u".to_string()
                },
                BrokerCall::CreateSession,
                BrokerCall::CreateDestination("warehouse".to_string()),
                BrokerCall::CreateDestination("shipping".to_string()),
                BrokerCall::Send {
                    queue: "warehouse".to_string(),
                    payload: "PREPARE ORDERID 42".to_string()
                },
                BrokerCall::Send {
                    queue: "shipping".to_string(),
                    payload: "SHIP ORDERID 42".to_string()
                },
                BrokerCall::Commit,
                BrokerCall::CloseSession,
                BrokerCall::CloseConnection,
            ]
        );
    }

    #[tokio::test]
    async fn test_call_sequence_on_simulated_failure() {
        let broker = InMemoryBroker::new();
        let sender = TransactedDualSend::new(broker.clone(), TransactionSettings::default());

        let outcome = sender.run(&invocation(true)).await.unwrap();
        assert_eq!(outcome, TransactionOutcome::RolledBack);

        let calls = broker.calls();
        assert_eq!(
            &calls[calls.len() - 3..],
            &[
                BrokerCall::Rollback,
                BrokerCall::CloseSession,
                BrokerCall::CloseConnection
            ]
        );
        assert!(!calls.contains(&BrokerCall::Commit));
    }

    #[tokio::test]
    async fn test_session_refused_closes_connection() {
        let broker = InMemoryBroker::with_failures(FailurePlan {
            create_session: true,
            ..FailurePlan::default()
        });
        let sender = TransactedDualSend::new(broker.clone(), TransactionSettings::default());

        let err = sender.run(&invocation(false)).await.unwrap_err();
        assert!(matches!(err, AppError::BrokerConnect(_)));
        assert_eq!(broker.count_calls(&BrokerCall::CloseSession), 0);
        assert_eq!(broker.count_calls(&BrokerCall::CloseConnection), 1);
    }
}
