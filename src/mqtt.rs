//! MQTT implementation of [`SensorFeed`] on top of `rumqttc`.
//!
//! Every subscription attempt opens a fresh connection. The event loop is
//! driven inside the subscribe future, so dropping that future closes the
//! connection.

use crate::config::MqttConfig;
use crate::sensor::{FeedError, OnMessage, SensorEvent, SensorFeed};
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::time::Duration;

/// Requests buffered between the client handle and the event loop
const REQUEST_CAPACITY: usize = 16;

fn qos(level: u8) -> QoS {
    match level {
        0 => QoS::AtMostOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtLeastOnce,
    }
}

/// Sensor feed backed by an MQTT broker.
pub struct MqttFeed {
    config: MqttConfig,
}

impl MqttFeed {
    pub fn new(config: MqttConfig) -> Self {
        MqttFeed { config }
    }

    fn connect(&self) -> (AsyncClient, EventLoop) {
        let mut options =
            MqttOptions::new(&self.config.client_id, &self.config.host, self.config.port);
        options.set_keep_alive(Duration::from_secs(self.config.keep_alive_secs.max(5)));
        options.set_clean_session(true);
        AsyncClient::new(options, REQUEST_CAPACITY)
    }
}

#[async_trait]
impl SensorFeed for MqttFeed {
    async fn subscribe(
        &mut self,
        topics: &[String],
        on_message: &OnMessage,
    ) -> Result<(), FeedError> {
        log::info!(
            "Connecting to MQTT broker {}:{}",
            self.config.host,
            self.config.port
        );
        let (client, mut eventloop) = self.connect();
        for topic in topics {
            // Queued until the connection is up; sent right after CONNACK.
            client
                .subscribe(topic.as_str(), qos(self.config.qos))
                .await
                .map_err(|e| FeedError::Connect(e.to_string()))?;
        }

        let mut subscribed = false;
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    log::info!("MQTT connected, subscribing to {} topics", topics.len());
                }
                Ok(Event::Incoming(Packet::SubAck(_))) => {
                    if !subscribed {
                        log::info!("MQTT subscribed");
                    }
                    subscribed = true;
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    on_message(SensorEvent {
                        topic: publish.topic,
                        payload: publish.payload.to_vec(),
                    });
                }
                Ok(_) => {}
                Err(e) if subscribed => return Err(FeedError::Disconnected(e.to_string())),
                Err(e) => return Err(FeedError::Connect(e.to_string())),
            }
        }
    }
}
