//! # End-to-end Pipeline Tests
//!
//! These wire real workers to a real coordinator through the outbox, with the
//! external collaborators replaced by in-memory fakes. Time is paused so the
//! polling intervals run instantly.

use crate::config::{SensorTopics, TransitConfig, WeatherConfig};
use crate::coordinator::DisplayCoordinator;
use crate::display::{Display, DisplayError};
use crate::display_state::DisplayState;
use crate::http::FetchError;
use crate::outbox;
use crate::sensor::{FeedError, OnMessage, SensorEvent, SensorFeed, SensorWorker, TopicTable};
use crate::transit::{DepartureSource, RawDeparture, TransitWorker};
use crate::weather::{ForecastEntry, ForecastParameter, ForecastSource, WeatherWorker};
use crate::worker::{self, Control, RetryPolicy};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use chrono_tz::Europe::Stockholm;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Delivers a fixed batch of events once, then stays subscribed.
struct OneShotFeed {
    events: Vec<SensorEvent>,
}

#[async_trait]
impl SensorFeed for OneShotFeed {
    async fn subscribe(
        &mut self,
        _topics: &[String],
        on_message: &OnMessage,
    ) -> Result<(), FeedError> {
        for event in self.events.drain(..) {
            on_message(event);
        }
        std::future::pending::<()>().await;
        Ok(())
    }
}

/// Always returns the same departures.
struct FixedDepartures(Vec<RawDeparture>);

#[async_trait]
impl DepartureSource for FixedDepartures {
    async fn fetch_departures(
        &self,
        _site_id: u32,
        _window_minutes: u32,
    ) -> Result<Vec<RawDeparture>, FetchError> {
        Ok(self.0.clone())
    }
}

/// Always returns the same forecast.
struct FixedForecast(Vec<ForecastEntry>);

#[async_trait]
impl ForecastSource for FixedForecast {
    async fn fetch_forecast(
        &self,
        _latitude: f64,
        _longitude: f64,
    ) -> Result<Vec<ForecastEntry>, FetchError> {
        Ok(self.0.clone())
    }
}

/// Counts redraws and keeps the last state shown.
#[derive(Clone, Default)]
struct Panel {
    shown: Arc<Mutex<Vec<DisplayState>>>,
}

impl Display for Panel {
    type Image = DisplayState;

    fn render(&self, state: &DisplayState) -> DisplayState {
        state.clone()
    }

    fn show(&mut self, image: DisplayState) -> Result<(), DisplayError> {
        self.shown.lock().unwrap().push(image);
        Ok(())
    }
}

fn local_timestamp(offset_secs: i64) -> String {
    (Utc::now() + ChronoDuration::seconds(offset_secs))
        .with_timezone(&Stockholm)
        .format("%Y-%m-%dT%H:%M:%S")
        .to_string()
}

fn rainy_hour() -> ForecastEntry {
    ForecastEntry {
        valid_time: Utc::now() + ChronoDuration::hours(1),
        parameters: vec![
            ForecastParameter {
                name: "pmean".to_string(),
                values: vec![0.7],
            },
            ForecastParameter {
                name: "pcat".to_string(),
                values: vec![3.0],
            },
        ],
    }
}

#[tokio::test(start_paused = true)]
async fn all_workers_feed_one_board() {
    let topics = SensorTopics::default();
    let (outbox, inbound) = outbox::channel();
    let panel = Panel::default();
    let coordinator = tokio::spawn(
        DisplayCoordinator::new(inbound, panel.clone(), Stockholm).run(),
    );

    let sensor = worker::start(SensorWorker::new(
        OneShotFeed {
            events: vec![SensorEvent {
                topic: topics.outside_temperature.clone(),
                payload: b"21.5".to_vec(),
            }],
        },
        TopicTable::new(&topics),
        outbox.clone(),
        RetryPolicy::default(),
    ));

    let departure = RawDeparture {
        line: "555".to_string(),
        direction_code: 1,
        scheduled: local_timestamp(1200),
        expected: local_timestamp(1260),
        destination: TransitConfig::default().destination,
    };
    let transit = worker::start(TransitWorker::new(
        FixedDepartures(vec![departure]),
        outbox.clone(),
        TransitConfig::default(),
        Stockholm,
    ));

    let weather = worker::start(WeatherWorker::new(
        FixedForecast(vec![rainy_hour()]),
        outbox.clone(),
        WeatherConfig::default(),
        Stockholm,
    ));
    drop(outbox);

    // Let every worker complete a few cycles; identical results are not
    // republished, so the board settles.
    tokio::time::sleep(Duration::from_secs(120)).await;

    for handle in [sensor, transit, weather] {
        assert!(handle.send(Control::Die));
        tokio::time::timeout(Duration::from_secs(30), handle.join())
            .await
            .expect("worker should stop within one interval")
            .expect("worker should not panic");
    }

    let state = coordinator.await.unwrap();
    assert_eq!(state.outside_temperature.as_deref(), Some("21.5"));
    assert!(state.sensors_updated.is_some());
    assert_eq!(state.departures.len(), 1);
    assert_eq!(state.departures[0].line, "555");
    assert!(state.transit_updated.is_some());
    assert_eq!(state.precipitation.len(), 1);
    assert_eq!(state.precipitation[0].mean_mm, 0.7);

    // Three distinct updates at most; never more redraws than updates.
    let redraws = panel.shown.lock().unwrap().len();
    assert!((1..=3).contains(&redraws), "got {} redraws", redraws);
    assert_eq!(panel.shown.lock().unwrap().last(), Some(&state));
}

#[tokio::test(start_paused = true)]
async fn poll_after_unchanged_fetch_does_not_redraw() {
    let (outbox, inbound) = outbox::channel();
    let panel = Panel::default();
    let coordinator = tokio::spawn(
        DisplayCoordinator::new(inbound, panel.clone(), Stockholm).run(),
    );

    let weather = worker::start(WeatherWorker::new(
        FixedForecast(vec![rainy_hour()]),
        outbox,
        WeatherConfig::default(),
        Stockholm,
    ));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(panel.shown.lock().unwrap().len(), 1);

    // Same forecast again: nothing published, nothing redrawn.
    weather.send(Control::Poll);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(panel.shown.lock().unwrap().len(), 1);

    weather.send(Control::Die);
    weather.join().await.unwrap();
    let state = coordinator.await.unwrap();
    assert_eq!(state.precipitation.len(), 1);
}
