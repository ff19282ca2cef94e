// src/broker/amqp.rs
// RabbitMQ implementation of the broker traits. AMQP 0-9-1 channel
// transactions (tx.select / tx.commit / tx.rollback) back the session.

use async_trait::async_trait;
use chrono::Utc;
use lapin::{
    options::{BasicPublishOptions, QueueDeclareOptions},
    types::{AMQPValue, FieldTable},
    uri::{AMQPUri, AMQPUserInfo},
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::errors::{BrokerError, Result};
use super::{Broker, BrokerConnection, BrokerEndpoint, Destination, TransactedSession};
use crate::message::Message;

const CONNECTION_NAME: &str = "transacted-dual-send";
const REPLY_SUCCESS: u16 = 200;

/// Connects to RabbitMQ through lapin.
#[derive(Debug, Clone)]
pub struct AmqpBroker {
    durable_queues: bool,
}

impl AmqpBroker {
    pub fn new(durable_queues: bool) -> Self {
        Self { durable_queues }
    }
}

impl Default for AmqpBroker {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Builds the AMQP URI for `endpoint`. Credentials always come from the
/// endpoint fields, never from the URL. `tcp://` and `ssl://` (ActiveMQ style
/// endpoints) are accepted as `amqp://` and `amqps://`.
pub fn amqp_uri(endpoint: &BrokerEndpoint) -> Result<AMQPUri> {
    let url = normalize_scheme(endpoint.url.trim());
    let mut uri: AMQPUri = url
        .parse()
        .map_err(|e: String| BrokerError::InvalidUri(format!("{}: {}", endpoint.url, e)))?;

    uri.authority.userinfo = AMQPUserInfo {
        username: endpoint.username.clone(),
        password: endpoint.password.clone(),
    };
    if let Some(heartbeat) = endpoint.heartbeat_seconds {
        uri.query.heartbeat = Some(heartbeat);
    }
    if let Some(timeout) = endpoint.connection_timeout {
        uri.query.connection_timeout = Some(timeout.as_millis() as u64);
    }

    Ok(uri)
}

fn normalize_scheme(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("tcp://") {
        format!("amqp://{}", rest)
    } else if let Some(rest) = url.strip_prefix("ssl://") {
        format!("amqps://{}", rest)
    } else {
        url.to_string()
    }
}

#[async_trait]
impl Broker for AmqpBroker {
    type Connection = AmqpConnection;

    async fn connect(&self, endpoint: &BrokerEndpoint) -> Result<AmqpConnection> {
        let uri = amqp_uri(endpoint)?;
        info!(
            host = %uri.authority.host,
            port = uri.authority.port,
            user = %endpoint.username,
            "Connecting to RabbitMQ"
        );

        let properties =
            ConnectionProperties::default().with_connection_name(CONNECTION_NAME.into());
        let connection = Connection::connect_uri(uri, properties)
            .await
            .map_err(|e| BrokerError::Connection(format!("Failed to connect: {}", e)))?;

        debug!("Successfully connected to RabbitMQ");
        Ok(AmqpConnection {
            connection,
            durable_queues: self.durable_queues,
        })
    }
}

pub struct AmqpConnection {
    connection: Connection,
    durable_queues: bool,
}

#[async_trait]
impl BrokerConnection for AmqpConnection {
    type Session = AmqpSession;

    async fn create_transacted_session(&self) -> Result<AmqpSession> {
        let channel = self
            .connection
            .create_channel()
            .await
            .map_err(|e| BrokerError::Channel(format!("Failed to create channel: {}", e)))?;

        channel
            .tx_select()
            .await
            .map_err(|e| {
                BrokerError::Transaction(format!("Failed to enable transactions: {}", e))
            })?;

        debug!(channel_id = channel.id(), "Transacted channel opened");
        Ok(AmqpSession {
            channel,
            durable_queues: self.durable_queues,
        })
    }

    async fn queue_depth(&self, queue: &str) -> Result<u32> {
        // A failed passive declare closes the channel, so never use the
        // transacted one for this.
        let channel = self.connection.create_channel().await?;
        let declared = channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    passive: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::declare(queue, e));

        if channel.status().connected() {
            if let Err(e) = channel.close(REPLY_SUCCESS, "Depth read").await {
                debug!(error = %e, "Could not close inspection channel");
            }
        }

        Ok(declared?.message_count())
    }

    async fn close(self) -> Result<()> {
        info!("Closing RabbitMQ connection");
        self.connection
            .close(REPLY_SUCCESS, "Transaction finished")
            .await
            .map_err(|e| BrokerError::Connection(format!("Failed to close connection: {}", e)))
    }
}

pub struct AmqpSession {
    channel: Channel,
    durable_queues: bool,
}

/// Properties of every published message. Persistent when the queues are durable;
/// order messages carry their id in an `order-id` header.
pub fn publish_properties(message: &Message, durable: bool) -> BasicProperties {
    let mut properties = BasicProperties::default()
        .with_content_type("text/plain".into())
        .with_message_id(Uuid::new_v4().to_string().into())
        .with_timestamp(Utc::now().timestamp() as u64);

    if durable {
        // persistent
        properties = properties.with_delivery_mode(2);
    }

    if let Some(order_id) = message.order_id() {
        let mut headers = FieldTable::default();
        headers.insert(
            "order-id".into(),
            AMQPValue::LongString(order_id.to_string().into()),
        );
        properties = properties.with_headers(headers);
    }

    properties
}

#[async_trait]
impl TransactedSession for AmqpSession {
    async fn create_destination(&mut self, name: &str) -> Result<Destination> {
        let queue = self
            .channel
            .queue_declare(
                name,
                QueueDeclareOptions {
                    durable: self.durable_queues,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::declare(name, e))?;

        debug!(queue = %name, messages = queue.message_count(), "Queue declared");
        Ok(Destination::new(name))
    }

    async fn send(&mut self, destination: &Destination, message: &Message) -> Result<()> {
        // Default exchange: the routing key is the queue name.
        self.channel
            .basic_publish(
                "",
                destination.name(),
                BasicPublishOptions::default(),
                message.payload().as_bytes(),
                publish_properties(message, self.durable_queues),
            )
            .await
            .map_err(|e| BrokerError::publish(destination.name(), e))?;

        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.channel
            .tx_commit()
            .await
            .map_err(|e| BrokerError::Transaction(format!("Commit failed: {}", e)))
    }

    async fn rollback(&mut self) -> Result<()> {
        self.channel
            .tx_rollback()
            .await
            .map_err(|e| BrokerError::Transaction(format!("Rollback failed: {}", e)))
    }

    async fn close(self) -> Result<()> {
        if !self.channel.status().connected() {
            warn!(channel_id = self.channel.id(), "Channel already closed by the broker");
            return Ok(());
        }
        self.channel
            .close(REPLY_SUCCESS, "Session closed")
            .await
            .map_err(|e| BrokerError::Channel(format!("Failed to close channel: {}", e)))
    }
}
