//! # Sensor Telemetry Worker
//!
//! Subscribes to a push-based telemetry feed and republishes each reading on
//! the outbox.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! CONNECTING ──subscribe ok──▶ SUBSCRIBED
//!     ▲                            │
//!     └──── wait retry delay ◀─────┘ feed error
//! ```
//!
//! Retries follow a [`RetryPolicy`]: a fixed delay (10 s by default) and no
//! attempt limit unless one is configured. The worker answers `Die` in both
//! states; a `Poll` while waiting to reconnect retries immediately.
//!
//! ## Topic Mapping
//!
//! Each event topic is looked up in a static [`TopicTable`]. Known topics
//! become `(kind, value)` updates; unknown topics are dropped.

use crate::config::SensorTopics;
use crate::outbox::Outbox;
use crate::worker::{Control, Inbox, RetryPolicy, Worker};
use crate::{SensorKind, Update};
use async_trait::async_trait;
use thiserror::Error;

/// One message received from the feed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SensorEvent {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Feed failures. Both are retried; they differ in whether the retry counter
/// is reset.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum FeedError {
    /// No subscription was established
    #[error("connect failed: {0}")]
    Connect(String),

    /// An established subscription was lost
    #[error("disconnected: {0}")]
    Disconnected(String),
}

/// Callback invoked for every event. May be called from any task or thread.
pub type OnMessage = dyn Fn(SensorEvent) + Send + Sync;

/// A push-based telemetry feed.
#[async_trait]
pub trait SensorFeed: Send + 'static {
    /// Subscribe to `topics` and deliver events to `on_message` until the
    /// connection ends.
    ///
    /// Returns `Err` if the subscription could not be established or was lost.
    /// Dropping the returned future must tear the connection down.
    async fn subscribe(&mut self, topics: &[String], on_message: &OnMessage)
        -> Result<(), FeedError>;
}

/// Topic → reading lookup.
#[derive(Clone, Debug)]
pub struct TopicTable {
    entries: Vec<(String, SensorKind)>,
}

impl TopicTable {
    pub fn new(topics: &SensorTopics) -> Self {
        TopicTable {
            entries: vec![
                (topics.outside_temperature.clone(), SensorKind::OutsideTemperature),
                (topics.outside_humidity.clone(), SensorKind::OutsideHumidity),
                (topics.inside_temperature.clone(), SensorKind::InsideTemperature),
                (topics.inside_humidity.clone(), SensorKind::InsideHumidity),
            ],
        }
    }

    /// All subscribed topics.
    pub fn topics(&self) -> Vec<String> {
        self.entries.iter().map(|(topic, _)| topic.clone()).collect()
    }

    pub fn lookup(&self, topic: &str) -> Option<SensorKind> {
        self.entries
            .iter()
            .find(|(t, _)| t == topic)
            .map(|(_, kind)| *kind)
    }

    /// Turn an event into an update.
    ///
    /// Returns `None` for unknown topics and for payloads that are not UTF-8.
    /// Surrounding whitespace (a trailing newline from shell publishers) is
    /// trimmed.
    pub fn decode(&self, event: &SensorEvent) -> Option<Update> {
        let kind = self.lookup(&event.topic)?;
        match std::str::from_utf8(&event.payload) {
            Ok(text) => Some(kind.into_update(text.trim().to_string())),
            Err(e) => {
                log::debug!("Dropping non-UTF-8 payload on {}: {}", event.topic, e);
                None
            }
        }
    }
}

/// Background worker bridging a [`SensorFeed`] to the outbox.
pub struct SensorWorker<F> {
    feed: F,
    table: TopicTable,
    outbox: Outbox,
    retry: RetryPolicy,
}

impl<F: SensorFeed> SensorWorker<F> {
    pub fn new(feed: F, table: TopicTable, outbox: Outbox, retry: RetryPolicy) -> Self {
        SensorWorker {
            feed,
            table,
            outbox,
            retry,
        }
    }
}

/// How a subscription attempt ended.
enum Outcome {
    Died,
    Failed(FeedError),
    Closed,
}

#[async_trait]
impl<F: SensorFeed> Worker for SensorWorker<F> {
    fn name(&self) -> &'static str {
        "sensor"
    }

    async fn run(&mut self, inbox: &mut Inbox) {
        let topics = self.table.topics();
        let mut failures: u32 = 0;

        loop {
            log::info!("Connecting to sensor feed ({} topics)", topics.len());
            let table = self.table.clone();
            let outbox = self.outbox.clone();
            let on_message = move |event: SensorEvent| match table.decode(&event) {
                Some(update) => {
                    log::info!("New sensor update: {} {:?}", event.topic, update);
                    outbox.publish(update);
                }
                None => log::debug!("Ignoring message on {}", event.topic),
            };

            let outcome = {
                let subscription = self.feed.subscribe(&topics, &on_message);
                tokio::pin!(subscription);
                loop {
                    tokio::select! {
                        result = &mut subscription => {
                            break match result {
                                Ok(()) => Outcome::Closed,
                                Err(e) => Outcome::Failed(e),
                            };
                        }
                        control = inbox.recv() => {
                            if control == Control::Die {
                                break Outcome::Died;
                            }
                            log::debug!("Ignoring {:?} while subscribed", control);
                        }
                    }
                }
            };

            match outcome {
                Outcome::Died => return,
                Outcome::Closed => {
                    log::warn!("Sensor feed closed, reconnecting");
                    failures = 0;
                }
                Outcome::Failed(e) => {
                    log::warn!("Sensor feed: {}", e);
                    if matches!(e, FeedError::Disconnected(_)) {
                        failures = 0;
                    }
                    failures += 1;
                }
            }

            let Some(delay) = self.retry.next_delay(failures) else {
                log::error!("Sensor feed failed {} times, giving up", failures);
                return;
            };
            log::info!("Retrying sensor feed in {}s", delay.as_secs());
            if let Some(Control::Die) = inbox.receive(delay).await {
                return;
            }
        }
    }
}
