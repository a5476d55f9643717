use crate::config::FeedConfig;
use crate::db::repositories::detection_events::DetectionEventsRepository;
use crate::error::Error;
use crate::messaging::event::{DetectionMessage, DetectionPhase};
use crate::notify::service::NotificationService;
use anyhow::Result;
use deadpool_lapin::{Config, Pool};
use futures_util::stream::StreamExt;
use lapin::{
    options::{
        BasicAckOptions, BasicConsumeOptions, ExchangeDeclareOptions, QueueBindOptions,
        QueueDeclareOptions,
    },
    types::FieldTable,
    Channel, ConnectionProperties, Consumer, ExchangeKind,
};
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Callback invoked with every decoded message, regardless of phase
pub type RawEventCallback = Arc<dyn Fn(&DetectionMessage) + Send + Sync>;

/// Subscriber for the NVR detection-event feed.
///
/// Owns one broker connection. Decoded messages cross a bounded channel to a
/// single processor task, so transport threading stays decoupled from the
/// persistence and notification pipeline while ordering is preserved.
pub struct FeedSubscriber {
    config: FeedConfig,
    pool: Pool,
    channel: Mutex<Option<Channel>>,
    connected: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    events: DetectionEventsRepository,
    notifications: Arc<NotificationService>,
    raw_callback: Arc<RwLock<Option<RawEventCallback>>>,
}

impl FeedSubscriber {
    /// Create a new feed subscriber; no connection is made until `connect`
    pub fn new(
        config: FeedConfig,
        events: DetectionEventsRepository,
        notifications: Arc<NotificationService>,
    ) -> Result<Self> {
        let pool_config = Config {
            url: Some(config.uri.clone()),
            pool: Some(deadpool_lapin::PoolConfig {
                max_size: 2,
                queue_mode: deadpool::managed::QueueMode::Fifo,
                timeouts: deadpool::managed::Timeouts {
                    wait: Some(Duration::from_millis(config.retry_delay_ms * 10)),
                    create: Some(Duration::from_millis(config.retry_delay_ms * 10)),
                    recycle: Some(Duration::from_millis(config.retry_delay_ms * 10)),
                },
            }),
            connection_properties: ConnectionProperties::default(),
        };
        let pool = pool_config
            .create_pool(Some(deadpool_lapin::Runtime::Tokio1))
            .map_err(|e| Error::Connection(format!("Failed to create broker pool: {}", e)))?;

        Ok(Self {
            config,
            pool,
            channel: Mutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(AtomicBool::new(false)),
            tasks: Mutex::new(Vec::new()),
            events,
            notifications,
            raw_callback: Arc::new(RwLock::new(None)),
        })
    }

    /// Register a callback that sees every decoded message
    pub async fn set_raw_callback(&self, callback: RawEventCallback) {
        *self.raw_callback.write().await = Some(callback);
    }

    /// Establish the broker connection and declare the detection exchange
    pub async fn connect(&self) -> Result<()> {
        if self.connected.load(Ordering::SeqCst) {
            return Err(Error::Connection("already connected".to_string()).into());
        }

        let channel = Self::open_channel(&self.pool, &self.config).await?;

        *self.channel.lock().await = Some(channel);
        self.shutdown.store(false, Ordering::SeqCst);
        self.connected.store(true, Ordering::SeqCst);

        info!("Connected to detection feed at {}", self.config.uri);

        Ok(())
    }

    /// Bind the event queue and start the consumer and processor tasks
    pub async fn subscribe(&self) -> Result<()> {
        let channel_guard = self.channel.lock().await;
        let channel = channel_guard
            .as_ref()
            .ok_or_else(|| Error::NotConnected("subscribe called before connect".to_string()))?;

        let consumer = Self::bind_consumer(channel, &self.config).await?;
        drop(channel_guard);

        let (tx, mut rx) = mpsc::channel::<DetectionMessage>(self.config.channel_capacity);

        // Single processor preserves in-order handling of decoded events
        let events = self.events.clone();
        let notifications = self.notifications.clone();
        let raw_callback = self.raw_callback.clone();
        let processor = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                Self::process(&events, &notifications, &raw_callback, message).await;
            }
            debug!("Feed processor stopped");
        });

        let pool = self.pool.clone();
        let config = self.config.clone();
        let connected = self.connected.clone();
        let shutdown = self.shutdown.clone();
        let consumer_task = tokio::spawn(async move {
            Self::consume_loop(consumer, tx, pool, config, connected, shutdown).await;
        });

        let mut tasks = self.tasks.lock().await;
        tasks.push(processor);
        tasks.push(consumer_task);

        info!("Subscribed to detection topic: {}", self.config.topic);

        Ok(())
    }

    /// Whether the subscriber currently holds a live broker connection
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Tear down the subscription; idempotent, in-flight work is not awaited
    pub async fn disconnect(&self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }

        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }

        if let Some(channel) = self.channel.lock().await.take() {
            if let Err(e) = channel.close(200, "shutdown").await {
                debug!("Error closing feed channel: {}", e);
            }
        }

        self.connected.store(false, Ordering::SeqCst);
        info!("Disconnected from detection feed");
    }

    /// Open a channel on a pooled connection, retrying like the rest of the
    /// broker plumbing, and declare the detection exchange
    async fn open_channel(pool: &Pool, config: &FeedConfig) -> Result<Channel> {
        let mut attempts = 0;

        let connection = loop {
            attempts += 1;
            match pool.get().await {
                Ok(connection) => break connection,
                Err(err) => {
                    if attempts >= config.retry_attempts {
                        return Err(Error::Connection(format!(
                            "Failed to reach broker after {} attempts: {}",
                            attempts, err
                        ))
                        .into());
                    }

                    warn!(
                        "Failed to reach broker (attempt {}/{}): {}",
                        attempts, config.retry_attempts, err
                    );

                    tokio::time::sleep(Duration::from_millis(config.retry_delay_ms)).await;
                }
            }
        };

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| Error::Connection(format!("Failed to create broker channel: {}", e)))?;

        channel
            .exchange_declare(
                &config.exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    auto_delete: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| Error::Connection(format!("Failed to declare exchange: {}", e)))?;

        Ok(channel)
    }

    /// Declare the subscriber's queue, bind it to the topic and start a
    /// consumer with manual acks
    async fn bind_consumer(channel: &Channel, config: &FeedConfig) -> Result<Consumer> {
        let queue_name = format!(
            "nvr-notify.{}.{}",
            config.topic.replace('.', "_"),
            Uuid::new_v4()
        );

        channel
            .queue_declare(
                &queue_name,
                QueueDeclareOptions {
                    exclusive: true,
                    auto_delete: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| Error::Connection(format!("Failed to declare queue: {}", e)))?;

        channel
            .queue_bind(
                &queue_name,
                &config.exchange,
                &config.topic,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| Error::Connection(format!("Failed to bind queue: {}", e)))?;

        let consumer = channel
            .basic_consume(
                &queue_name,
                &format!("nvr-notify-{}", Uuid::new_v4()),
                BasicConsumeOptions {
                    no_ack: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| Error::Connection(format!("Failed to create consumer: {}", e)))?;

        debug!("Bound queue {} to topic {}", queue_name, config.topic);

        Ok(consumer)
    }

    /// Deliver loop with automatic reconnect.
    ///
    /// Every delivery is acked, decodable or not; a decode failure drops the
    /// message (at-most-once, best-effort). When the consumer stream ends the
    /// loop rebinds through the pool with the configured backoff until
    /// shutdown is requested.
    async fn consume_loop(
        mut consumer: Consumer,
        tx: mpsc::Sender<DetectionMessage>,
        pool: Pool,
        config: FeedConfig,
        connected: Arc<AtomicBool>,
        shutdown: Arc<AtomicBool>,
    ) {
        loop {
            while let Some(delivery) = consumer.next().await {
                match delivery {
                    Ok(delivery) => {
                        if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                            error!("Failed to acknowledge delivery: {}", e);
                        }

                        match serde_json::from_slice::<DetectionMessage>(&delivery.data) {
                            Ok(message) => {
                                if tx.send(message).await.is_err() {
                                    // Processor is gone, nothing left to feed
                                    return;
                                }
                            }
                            Err(e) => {
                                error!("Dropping undecodable feed payload: {}", e);
                            }
                        }
                    }
                    Err(e) => {
                        error!("Error receiving from feed: {}", e);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }

            connected.store(false, Ordering::SeqCst);

            if shutdown.load(Ordering::SeqCst) {
                break;
            }

            warn!("Detection feed connection lost, reconnecting");

            let mut attempt: u32 = 0;
            consumer = loop {
                if shutdown.load(Ordering::SeqCst) {
                    return;
                }

                attempt += 1;
                let backoff = config.retry_delay_ms * u64::from(attempt.min(config.retry_attempts));
                tokio::time::sleep(Duration::from_millis(backoff)).await;

                match Self::open_channel(&pool, &config).await {
                    Ok(channel) => match Self::bind_consumer(&channel, &config).await {
                        Ok(consumer) => {
                            connected.store(true, Ordering::SeqCst);
                            info!("Reconnected to detection feed");
                            break consumer;
                        }
                        Err(e) => warn!("Rebind failed (attempt {}): {}", attempt, e),
                    },
                    Err(e) => warn!("Reconnect failed (attempt {}): {}", attempt, e),
                }
            };
        }

        info!("Feed consumer stopped");
    }

    /// Handle one decoded message: persist new-phase events, then run the
    /// raw callback and the notification pipeline. Failures are logged and
    /// never stop processing of later messages.
    async fn process(
        events: &DetectionEventsRepository,
        notifications: &NotificationService,
        raw_callback: &RwLock<Option<RawEventCallback>>,
        message: DetectionMessage,
    ) {
        debug!(
            "Processing {} event {} from camera {}",
            message.phase, message.after.id, message.after.camera
        );

        if message.phase == DetectionPhase::New {
            match events.record_if_new(&message.to_detection_event()).await {
                Ok(true) => debug!("Recorded detection event {}", message.after.id),
                Ok(false) => debug!("Duplicate event {} ignored", message.after.id),
                Err(e) => error!("Failed to persist detection event: {}", e),
            }
        }

        if let Some(callback) = raw_callback.read().await.as_ref() {
            callback(&message);
        }

        if let Err(e) = notifications.notify(&message).await {
            error!("Failed to dispatch notification: {}", e);
        }
    }
}
