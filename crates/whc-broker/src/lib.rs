//! AMQP broker wiring: connection/channel setup, durable queue declaration,
//! the real [`Publisher`](whc_coordinator::Publisher) implementation, and the
//! three per-queue intake consumer loops.
//!
//! Each consumer loop processes its queue strictly serially: it takes one
//! delivery, runs the full handler, acks, and only then polls for the next.
//! There is no `JoinSet`/fan-out here — §5's "at most one handler in flight
//! per source queue" rules that out by design, not as an oversight.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use tokio::sync::broadcast;

use whc_coordinator::{Coordinator, Publisher};
use whc_wire::{ClientCommand, DeliveryMessage, RobotMessage};

/// Queue-name suffixes, prefixed with the group id to build the real names.
pub const CLIENT_TO_CONTROLLER: &str = "C2X";
pub const CONTROLLER_TO_ROBOT: &str = "X2R";
pub const ROBOT_TO_CONTROLLER: &str = "R2X";
pub const CONTROLLER_TO_DELIVERY: &str = "X2D";
pub const DELIVERY_TO_CONTROLLER: &str = "D2X";

/// Build the real queue name for a suffix under a given group id.
pub fn queue_name(group_id: &str, suffix: &str) -> String {
    format!("{group_id}{suffix}")
}

/// Build the per-client response queue name.
pub fn client_queue_name(group_id: &str, uid: &str) -> String {
    format!("{group_id}{uid}")
}

/// Owns the single AMQP connection for this process. Per §9's design note,
/// the source's three independent connections are an ecosystem constraint
/// of the source broker library, not a requirement — this rewrite opens one
/// connection and hands each consumer task its own channel on it, plus one
/// more for publishing.
pub struct BrokerHandle {
    group_id: String,
    publish_channel: Channel,
    connection: Connection,
}

impl BrokerHandle {
    pub async fn connect(amqp_url: &str, group_id: &str) -> Result<Self> {
        let connection = Connection::connect(amqp_url, ConnectionProperties::default())
            .await
            .with_context(|| format!("failed to connect to broker at {amqp_url}"))?;
        let publish_channel = connection.create_channel().await.context("failed to open channel")?;

        for suffix in [
            CLIENT_TO_CONTROLLER,
            CONTROLLER_TO_ROBOT,
            ROBOT_TO_CONTROLLER,
            CONTROLLER_TO_DELIVERY,
            DELIVERY_TO_CONTROLLER,
        ] {
            declare_durable_queue(&publish_channel, &queue_name(group_id, suffix)).await?;
        }

        Ok(Self { group_id: group_id.to_string(), publish_channel, connection })
    }

    pub fn channel(&self) -> Channel {
        self.publish_channel.clone()
    }

    /// Open a fresh channel on the same connection, for a dedicated intake
    /// consumer loop.
    pub async fn new_consumer_channel(&self) -> Result<Channel> {
        self.connection.create_channel().await.context("failed to open consumer channel")
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }
}

async fn declare_durable_queue(channel: &Channel, name: &str) -> Result<()> {
    channel
        .queue_declare(
            name,
            QueueDeclareOptions { durable: true, ..QueueDeclareOptions::default() },
            FieldTable::default(),
        )
        .await
        .with_context(|| format!("failed to declare queue {name}"))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Publisher
// ---------------------------------------------------------------------------

/// The real, broker-backed [`Publisher`]. Every publish uses persistent
/// delivery mode per §6. A failed publish is logged and swallowed: the
/// inbound message that triggered it has already been acknowledged and its
/// state transition already committed, so there is nothing to retry.
pub struct AmqpPublisher {
    channel: Channel,
    group_id: String,
}

impl AmqpPublisher {
    pub fn new(broker: &BrokerHandle) -> Self {
        Self { channel: broker.channel(), group_id: broker.group_id().to_string() }
    }

    async fn publish(&self, queue: &str, body: String) {
        let result = self
            .channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                body.as_bytes(),
                BasicProperties::default().with_delivery_mode(2),
            )
            .await;

        match result {
            Ok(confirm) => {
                if let Err(e) = confirm.await {
                    tracing::warn!(queue, error = %e, "publish confirm failed");
                }
            }
            Err(e) => tracing::warn!(queue, error = %e, "publish failed"),
        }
    }
}

#[async_trait]
impl Publisher for AmqpPublisher {
    async fn send_to_client(&self, uid: &str, body: String) {
        let queue = client_queue_name(&self.group_id, uid);
        self.publish(&queue, body).await;
    }

    async fn send_to_robot(&self, body: String) {
        let queue = queue_name(&self.group_id, CONTROLLER_TO_ROBOT);
        self.publish(&queue, body).await;
    }

    async fn send_to_delivery(&self, body: String) {
        let queue = queue_name(&self.group_id, CONTROLLER_TO_DELIVERY);
        self.publish(&queue, body).await;
    }
}

// ---------------------------------------------------------------------------
// Intake consumer loops
// ---------------------------------------------------------------------------

/// Run the client-queue (`C2X`) intake consumer until `shutdown` fires.
pub async fn run_client_intake<P: Publisher + 'static>(
    channel: Channel,
    group_id: &str,
    coordinator: Arc<Coordinator<P>>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let queue = queue_name(group_id, CLIENT_TO_CONTROLLER);
    let mut consumer = consume(&channel, &queue, "whc-client-intake").await?;

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!(queue, "client intake received shutdown signal");
                return Ok(());
            }
            delivery = consumer.next() => {
                let Some(delivery) = delivery else {
                    tracing::warn!(queue, "client intake stream ended");
                    return Ok(());
                };
                let delivery = match delivery {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::error!(queue, error = %e, "client intake delivery error");
                        continue;
                    }
                };

                let body = String::from_utf8_lossy(&delivery.data).to_string();
                match ClientCommand::parse(&body) {
                    Ok(cmd) => dispatch_client_command(&coordinator, cmd).await,
                    Err(e) => tracing::warn!(queue, body, error = %e, "dropping malformed client message"),
                }

                if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                    tracing::error!(queue, error = %e, "failed to ack client message");
                }
            }
        }
    }
}

/// Run the robot-queue (`R2X`) intake consumer until `shutdown` fires.
pub async fn run_robot_intake<P: Publisher + 'static>(
    channel: Channel,
    group_id: &str,
    coordinator: Arc<Coordinator<P>>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let queue = queue_name(group_id, ROBOT_TO_CONTROLLER);
    let mut consumer = consume(&channel, &queue, "whc-robot-intake").await?;

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!(queue, "robot intake received shutdown signal");
                return Ok(());
            }
            delivery = consumer.next() => {
                let Some(delivery) = delivery else {
                    tracing::warn!(queue, "robot intake stream ended");
                    return Ok(());
                };
                let delivery = match delivery {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::error!(queue, error = %e, "robot intake delivery error");
                        continue;
                    }
                };

                let body = String::from_utf8_lossy(&delivery.data).to_string();
                match RobotMessage::parse(&body) {
                    Ok(msg) => dispatch_robot_message(&coordinator, msg).await,
                    Err(e) => tracing::warn!(queue, body, error = %e, "dropping malformed robot message"),
                }

                if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                    tracing::error!(queue, error = %e, "failed to ack robot message");
                }
            }
        }
    }
}

/// Run the delivery-queue (`D2X`) intake consumer until `shutdown` fires.
pub async fn run_delivery_intake<P: Publisher + 'static>(
    channel: Channel,
    group_id: &str,
    coordinator: Arc<Coordinator<P>>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let queue = queue_name(group_id, DELIVERY_TO_CONTROLLER);
    let mut consumer = consume(&channel, &queue, "whc-delivery-intake").await?;

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!(queue, "delivery intake received shutdown signal");
                return Ok(());
            }
            delivery = consumer.next() => {
                let Some(delivery) = delivery else {
                    tracing::warn!(queue, "delivery intake stream ended");
                    return Ok(());
                };
                let delivery = match delivery {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::error!(queue, error = %e, "delivery intake delivery error");
                        continue;
                    }
                };

                let body = String::from_utf8_lossy(&delivery.data).to_string();
                match DeliveryMessage::parse(&body) {
                    Ok(msg) => dispatch_delivery_message(&coordinator, msg).await,
                    Err(e) => tracing::warn!(queue, body, error = %e, "dropping malformed delivery message"),
                }

                if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                    tracing::error!(queue, error = %e, "failed to ack delivery message");
                }
            }
        }
    }
}

async fn consume(channel: &Channel, queue: &str, consumer_tag: &str) -> Result<lapin::Consumer> {
    channel
        .basic_consume(queue, consumer_tag, BasicConsumeOptions::default(), FieldTable::default())
        .await
        .with_context(|| format!("failed to start consuming from {queue}"))
}

async fn dispatch_client_command<P: Publisher>(coordinator: &Coordinator<P>, cmd: ClientCommand) {
    let result = match cmd {
        ClientCommand::SignUp { uid } => coordinator.handle_sign_up(&uid).await,
        ClientCommand::SignIn { uid } => coordinator.handle_sign_in(&uid).await,
        ClientCommand::SignOut { uid } => coordinator.handle_sign_out(&uid).await,
        ClientCommand::Request { uid, products } => coordinator.handle_request(&uid, products).await,
        ClientCommand::Cancel { uid, order_id } => coordinator.handle_cancel(&uid, &order_id).await,
        ClientCommand::View { uid } => coordinator.handle_view(&uid).await,
    };
    if let Err(e) = result {
        tracing::error!(error = %e, "client command handler failed");
    }
}

async fn dispatch_robot_message<P: Publisher>(coordinator: &Coordinator<P>, msg: RobotMessage) {
    let result = match msg {
        RobotMessage::Moved { order_id, product } => coordinator.handle_moved(&order_id, &product).await,
        RobotMessage::NotFound { order_id, product } => {
            coordinator.handle_not_found(&order_id, &product).await
        }
    };
    if let Err(e) = result {
        tracing::error!(error = %e, "robot message handler failed");
    }
}

async fn dispatch_delivery_message<P: Publisher>(coordinator: &Coordinator<P>, msg: DeliveryMessage) {
    let result = match msg {
        DeliveryMessage::Delivered { order_id } => coordinator.handle_delivered(&order_id).await,
        DeliveryMessage::DeliveryFailed { order_id } => {
            coordinator.handle_delivery_failed(&order_id).await
        }
    };
    if let Err(e) = result {
        tracing::error!(error = %e, "delivery message handler failed");
    }
}
