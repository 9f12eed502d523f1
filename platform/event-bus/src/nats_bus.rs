//! NATS JetStream implementation of the EventBus trait

use crate::delivery::{Acker, Delivery};
use crate::subjects::{STREAM_NAME, STREAM_SUBJECTS};
use crate::{BusError, BusMessage, BusResult, EventBus, RedeliveryPolicy};
use async_nats::jetstream::{self, AckKind};
use async_nats::Client;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::time::Duration;

/// Stream provisioning settings
#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub name: String,
    pub subjects: Vec<String>,
    /// Retention window; zero keeps messages until limits evict them
    pub max_age: Duration,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            name: STREAM_NAME.to_string(),
            subjects: STREAM_SUBJECTS.iter().map(|s| s.to_string()).collect(),
            max_age: Duration::from_secs(7 * 24 * 3600),
        }
    }
}

/// EventBus implementation using NATS JetStream
///
/// Publishes go through JetStream and wait for the stream ack. Consumer
/// groups map to durable pull consumers named `{group}-{subject}`, so every
/// process started with the same group shares one cursor.
///
/// # Example
/// ```rust,no_run
/// use event_bus::{EventBus, NatsBus, StreamSettings};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let nats_client = async_nats::connect("nats://localhost:4222").await?;
/// let bus = NatsBus::connect(nats_client, StreamSettings::default()).await?;
///
/// bus.publish("media.snapshot.created", b"{}".to_vec()).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct NatsBus {
    client: Client,
    jetstream: jetstream::Context,
    stream_name: String,
}

impl NatsBus {
    /// Wrap a connected client and make sure the stream exists.
    pub async fn connect(client: Client, settings: StreamSettings) -> BusResult<Self> {
        let jetstream = jetstream::new(client.clone());
        ensure_stream(&jetstream, &settings).await?;

        Ok(Self {
            client,
            jetstream,
            stream_name: settings.name,
        })
    }

    /// Get a reference to the underlying NATS client
    pub fn client(&self) -> &Client {
        &self.client
    }

    async fn publish_inner(
        &self,
        subject: &str,
        msg_id: Option<&str>,
        payload: Vec<u8>,
    ) -> BusResult<()> {
        let ack_future = match msg_id {
            Some(id) => {
                let mut headers = async_nats::HeaderMap::new();
                headers.insert("Nats-Msg-Id", id);
                self.jetstream
                    .publish_with_headers(subject.to_string(), headers, payload.into())
                    .await
            }
            None => {
                self.jetstream
                    .publish(subject.to_string(), payload.into())
                    .await
            }
        }
        .map_err(|e| BusError::PublishError(format!("{}: {}", subject, e)))?;

        let ack = ack_future
            .await
            .map_err(|e| BusError::PublishError(format!("{}: ack failed: {}", subject, e)))?;

        tracing::debug!(subject = %subject, sequence = ack.sequence, duplicate = ack.duplicate, "Published");
        Ok(())
    }
}

/// Create the stream if missing.
pub async fn ensure_stream(js: &jetstream::Context, settings: &StreamSettings) -> BusResult<()> {
    let config = jetstream::stream::Config {
        name: settings.name.clone(),
        subjects: settings.subjects.clone(),
        max_age: settings.max_age,
        storage: jetstream::stream::StorageType::File,
        retention: jetstream::stream::RetentionPolicy::Limits,
        duplicate_window: Duration::from_secs(120),
        ..Default::default()
    };

    js.get_or_create_stream(config).await.map_err(|e| {
        BusError::ConnectionError(format!("failed to create/get stream '{}': {}", settings.name, e))
    })?;

    tracing::info!(stream = %settings.name, subjects = ?settings.subjects, "JetStream stream ready");
    Ok(())
}

/// Durable consumer name for a group on a subject. NATS forbids dots here.
pub fn durable_name(group: &str, subject: &str) -> String {
    format!("{}-{}", group, subject)
        .chars()
        .map(|c| match c {
            '.' | '*' | '>' | ' ' => '-',
            c => c,
        })
        .collect()
}

fn to_bus_message(nats_msg: &async_nats::Message) -> BusMessage {
    let mut msg = BusMessage::new(nats_msg.subject.to_string(), nats_msg.payload.to_vec());

    if let Some(reply) = &nats_msg.reply {
        msg = msg.with_reply_to(reply.to_string());
    }

    if let Some(nats_headers) = &nats_msg.headers {
        let mut headers = std::collections::HashMap::new();
        for (key, values) in nats_headers.iter() {
            if let Some(value) = values.first() {
                headers.insert(key.to_string(), value.to_string());
            }
        }
        if !headers.is_empty() {
            msg = msg.with_headers(headers);
        }
    }

    msg
}

struct JetStreamAcker {
    message: jetstream::Message,
}

#[async_trait]
impl Acker for JetStreamAcker {
    async fn ack(self: Box<Self>) -> BusResult<()> {
        self.message
            .ack()
            .await
            .map_err(|e| BusError::AckError(e.to_string()))
    }

    async fn nak(self: Box<Self>, delay: Duration) -> BusResult<()> {
        self.message
            .ack_with(AckKind::Nak(Some(delay)))
            .await
            .map_err(|e| BusError::AckError(e.to_string()))
    }

    async fn term(self: Box<Self>) -> BusResult<()> {
        self.message
            .ack_with(AckKind::Term)
            .await
            .map_err(|e| BusError::AckError(e.to_string()))
    }
}

#[async_trait]
impl EventBus for NatsBus {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> BusResult<()> {
        self.publish_inner(subject, None, payload).await
    }

    async fn publish_with_id(&self, subject: &str, msg_id: &str, payload: Vec<u8>) -> BusResult<()> {
        self.publish_inner(subject, Some(msg_id), payload).await
    }

    async fn subscribe(&self, subject: &str) -> BusResult<BoxStream<'static, BusMessage>> {
        let subscriber = self
            .client
            .subscribe(subject.to_string())
            .await
            .map_err(|e| BusError::SubscribeError(e.to_string()))?;

        Ok(subscriber.map(|m| to_bus_message(&m)).boxed())
    }

    async fn queue_subscribe(
        &self,
        subject: &str,
        group: &str,
        policy: &RedeliveryPolicy,
    ) -> BusResult<BoxStream<'static, Delivery>> {
        let name = durable_name(group, subject);

        let stream = self
            .jetstream
            .get_stream(&self.stream_name)
            .await
            .map_err(|e| BusError::SubscribeError(format!("stream {}: {}", self.stream_name, e)))?;

        let consumer = stream
            .get_or_create_consumer(
                &name,
                jetstream::consumer::pull::Config {
                    durable_name: Some(name.clone()),
                    filter_subject: subject.to_string(),
                    ack_policy: jetstream::consumer::AckPolicy::Explicit,
                    max_deliver: if policy.max_deliver == 0 {
                        -1
                    } else {
                        i64::from(policy.max_deliver)
                    },
                    ack_wait: policy.ack_wait,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| BusError::SubscribeError(format!("consumer {}: {}", name, e)))?;

        let messages = consumer
            .messages()
            .await
            .map_err(|e| BusError::SubscribeError(format!("{}: {}", subject, e)))?;

        tracing::info!(consumer = %name, subject = %subject, max_deliver = policy.max_deliver, "Durable subscription created");

        let consumer_name = name.clone();
        let deliveries = messages.filter_map(move |item| {
            let consumer_name = consumer_name.clone();
            async move {
                match item {
                    Ok(message) => {
                        let attempt = message
                            .info()
                            .map(|info| u32::try_from(info.delivered).unwrap_or(u32::MAX))
                            .unwrap_or(1);
                        let bus_message = to_bus_message(&message.message);
                        Some(Delivery::new(
                            bus_message,
                            attempt,
                            Box::new(JetStreamAcker { message }),
                        ))
                    }
                    Err(e) => {
                        tracing::warn!(consumer = %consumer_name, error = %e, "Error pulling message");
                        None
                    }
                }
            }
        });

        Ok(deliveries.boxed())
    }
}
