use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::*;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::Message;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Producer side of the durable queues. Publishes are persistent and each
/// accepted ingestion call maps to exactly one publish.
pub struct QueueProducer {
    producer: FutureProducer,
    config: Arc<Config>,
}

impl QueueProducer {
    pub fn new(config: &Config) -> AppResult<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.kafka.brokers)
            .set("message.timeout.ms", &config.kafka.send_timeout_ms.to_string())
            .set("queue.buffering.max.messages", "100000")
            .set("queue.buffering.max.kbytes", "1048576")
            .set("batch.num.messages", "1000")
            .create()
            .map_err(|e| AppError::Queue(format!("failed to create producer: {}", e)))?;

        Ok(Self {
            producer,
            config: Arc::new(config.clone()),
        })
    }

    pub async fn publish_action(&self, event: &InteractionEvent) -> AppResult<()> {
        self.send(&self.config.kafka.action_topic, &event.user_id, event)
            .await?;
        info!("Interaction event {} sent to queue: {:?}", event.req_id, event.action);
        Ok(())
    }

    pub async fn publish_recommendation_request(
        &self,
        request: &RecommendationRequest,
    ) -> AppResult<()> {
        self.send(&self.config.kafka.recommend_topic, &request.user_id, request)
            .await?;
        info!("Recommendation request {} sent to queue", request.req_id);
        Ok(())
    }

    pub async fn publish_candidate_set(&self, set: &CandidateSet) -> AppResult<()> {
        self.send(&self.config.kafka.embedding_topic, &set.user_id, set)
            .await?;
        info!(
            "Candidate set for request {} sent to queue ({} candidates)",
            set.req_id,
            set.candidates.len()
        );
        Ok(())
    }

    pub async fn publish_training_record(&self, record: &TrainingRecord) -> AppResult<()> {
        self.send(&self.config.kafka.training_topic, &record.user_id, record)
            .await?;
        Ok(())
    }

    async fn send<T: Serialize>(&self, topic: &str, key: &str, payload: &T) -> AppResult<()> {
        let payload = serde_json::to_string(payload)?;
        let record = FutureRecord::to(topic).payload(&payload).key(key);

        match self
            .producer
            .send(record, self.config.kafka.send_timeout())
            .await
        {
            Ok(_) => Ok(()),
            Err((e, _)) => {
                error!("Failed to send message to {}: {}", topic, e);
                Err(AppError::DependencyUnavailable(format!(
                    "queue publish to {} failed: {}",
                    topic, e
                )))
            }
        }
    }
}

/// Consumer side: one instance per subscription, competing with other
/// members of the same group. Offsets are committed only after the fold
/// completes, so a crash mid-fold redelivers the message.
pub struct QueueConsumer {
    consumer: StreamConsumer,
}

impl QueueConsumer {
    pub fn new(config: &Config) -> AppResult<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("group.id", &config.kafka.group_id)
            .set("bootstrap.servers", &config.kafka.brokers)
            .set("enable.partition.eof", "false")
            .set("session.timeout.ms", "6000")
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", &config.kafka.auto_offset_reset)
            .create()
            .map_err(|e| AppError::Queue(format!("failed to create consumer: {}", e)))?;

        Ok(Self { consumer })
    }

    /// Drains `topic`, invoking `handler` per decoded message and committing
    /// the offset once the handler resolves. A handler error leaves the
    /// offset uncommitted so the broker redelivers after a restart or
    /// rebalance; payloads that fail to decode are logged and dropped.
    pub async fn run<T, F, Fut>(&self, topic: &str, mut handler: F) -> AppResult<()>
    where
        T: DeserializeOwned,
        F: FnMut(T) -> Fut,
        Fut: Future<Output = AppResult<()>>,
    {
        self.consumer
            .subscribe(&[topic])
            .map_err(|e| AppError::Queue(format!("failed to subscribe to {}: {}", topic, e)))?;

        loop {
            match self.consumer.recv().await {
                Ok(message) => {
                    let Some(payload) = message.payload() else {
                        warn!("Empty payload on {}, dropping", topic);
                        self.commit(&message)?;
                        continue;
                    };

                    match serde_json::from_slice::<T>(payload) {
                        Ok(decoded) => match handler(decoded).await {
                            Ok(()) => self.commit(&message)?,
                            Err(e) => {
                                error!("Handler failed for message on {}: {}", topic, e);
                            }
                        },
                        Err(e) => {
                            warn!("Failed to deserialize message on {}: {}", topic, e);
                            self.commit(&message)?;
                        }
                    }
                }
                Err(e) => {
                    error!("Queue consumer error on {}: {}", topic, e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    /// Forwards decoded messages into an in-process channel. Used by the
    /// joiner, which multiplexes two subscriptions with `select!`.
    pub async fn forward<T>(&self, topic: &str, tx: mpsc::Sender<T>) -> AppResult<()>
    where
        T: DeserializeOwned,
    {
        self.consumer
            .subscribe(&[topic])
            .map_err(|e| AppError::Queue(format!("failed to subscribe to {}: {}", topic, e)))?;

        loop {
            match self.consumer.recv().await {
                Ok(message) => {
                    // Decode and commit before the channel handoff; the
                    // message borrow must not cross the send await.
                    let decoded = message.payload().and_then(|payload| {
                        match serde_json::from_slice::<T>(payload) {
                            Ok(decoded) => Some(decoded),
                            Err(e) => {
                                warn!("Failed to deserialize message on {}: {}", topic, e);
                                None
                            }
                        }
                    });
                    self.commit(&message)?;
                    drop(message);

                    if let Some(decoded) = decoded {
                        if tx.send(decoded).await.is_err() {
                            error!("Receiver for {} dropped, stopping forward", topic);
                            break;
                        }
                    }
                }
                Err(e) => {
                    error!("Queue consumer error on {}: {}", topic, e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }

        Ok(())
    }

    fn commit(&self, message: &rdkafka::message::BorrowedMessage<'_>) -> AppResult<()> {
        self.consumer
            .commit_message(message, CommitMode::Async)
            .map_err(|e| AppError::Queue(format!("offset commit failed: {}", e)))
    }
}
