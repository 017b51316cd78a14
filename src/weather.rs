//! # Weather Forecast Worker
//!
//! Polls a point forecast on a fixed interval and publishes the next few
//! forecast periods that carry precipitation.
//!
//! The forecast is time-ordered, so the first qualifying entries are the
//! nearest ones. Entries with zero or missing mean precipitation are skipped.
//! Like the transit worker, a result is only published when it differs from
//! the last one published.

use crate::config::WeatherConfig;
use crate::http::FetchError;
use crate::outbox::{LastPublished, Outbox};
use crate::worker::{Control, Inbox, Worker};
use crate::{PrecipitationSample, Update};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Deserialize;

/// Mean precipitation intensity, mm/h
pub const PARAM_MEAN: &str = "pmean";

/// Precipitation category
pub const PARAM_CATEGORY: &str = "pcat";

/// One named forecast parameter.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ForecastParameter {
    pub name: String,
    #[serde(default)]
    pub values: Vec<f64>,
}

/// One forecast period.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastEntry {
    pub valid_time: DateTime<Utc>,
    #[serde(default)]
    pub parameters: Vec<ForecastParameter>,
}

impl ForecastEntry {
    /// First value of the parameter called `name`.
    pub fn parameter(&self, name: &str) -> Option<f64> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .and_then(|p| p.values.first().copied())
    }
}

/// A source of time-ordered forecast entries for a location.
#[async_trait]
pub trait ForecastSource: Send + Sync + 'static {
    async fn fetch_forecast(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Vec<ForecastEntry>, FetchError>;
}

/// Pick the first `limit` entries with precipitation, converted to `tz`.
pub fn precipitation_samples(
    entries: &[ForecastEntry],
    tz: Tz,
    limit: usize,
) -> Vec<PrecipitationSample> {
    entries
        .iter()
        .filter_map(|entry| {
            let mean_mm = entry.parameter(PARAM_MEAN).unwrap_or(0.0);
            if mean_mm == 0.0 {
                return None;
            }
            Some(PrecipitationSample {
                timestamp: entry.valid_time.with_timezone(&tz),
                mean_mm,
                category: entry.parameter(PARAM_CATEGORY).unwrap_or(0.0) as i32,
            })
        })
        .take(limit)
        .collect()
}

/// Background worker polling a [`ForecastSource`].
pub struct WeatherWorker<S> {
    source: S,
    outbox: Outbox,
    config: WeatherConfig,
    tz: Tz,
    last: LastPublished<Vec<PrecipitationSample>>,
}

impl<S: ForecastSource> WeatherWorker<S> {
    pub fn new(source: S, outbox: Outbox, config: WeatherConfig, tz: Tz) -> Self {
        WeatherWorker {
            source,
            outbox,
            config,
            tz,
            last: LastPublished::default(),
        }
    }

    /// Fetch the forecast and publish the precipitation list if it changed.
    ///
    /// Returns whether an update was published.
    pub async fn check(&mut self) -> Result<bool, FetchError> {
        let entries = self
            .source
            .fetch_forecast(self.config.latitude, self.config.longitude)
            .await?;
        log::debug!("Forecast has {} entries", entries.len());

        let samples = precipitation_samples(&entries, self.tz, self.config.max_samples);
        if !self.last.update(&samples) {
            return Ok(false);
        }
        log::info!("Precipitation changed: {} upcoming periods", samples.len());
        self.outbox.publish(Update::Precipitation(samples));
        Ok(true)
    }
}

#[async_trait]
impl<S: ForecastSource> Worker for WeatherWorker<S> {
    fn name(&self) -> &'static str {
        "weather"
    }

    async fn run(&mut self, inbox: &mut Inbox) {
        loop {
            if let Err(e) = self.check().await {
                log::warn!("Forecast fetch failed: {}", e);
            }
            // Poll just shortens the wait; the loop fetches on every wake.
            if let Some(Control::Die) = inbox.receive(self.config.poll_interval()).await {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbox;
    use chrono::TimeZone;
    use chrono_tz::Europe::Stockholm;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn entry(hour: u32, pmean: f64, pcat: f64) -> ForecastEntry {
        ForecastEntry {
            valid_time: Utc.with_ymd_and_hms(2024, 6, 1, hour, 0, 0).unwrap(),
            parameters: vec![
                ForecastParameter {
                    name: "t".to_string(),
                    values: vec![14.2],
                },
                ForecastParameter {
                    name: PARAM_MEAN.to_string(),
                    values: vec![pmean],
                },
                ForecastParameter {
                    name: PARAM_CATEGORY.to_string(),
                    values: vec![pcat],
                },
            ],
        }
    }

    /// Serves the same forecast every time, counting calls. The next
    /// `failures` calls answer with a server error instead.
    #[derive(Clone, Default)]
    struct Fixed {
        entries: Arc<Mutex<Vec<ForecastEntry>>>,
        calls: Arc<Mutex<usize>>,
        failures: Arc<Mutex<usize>>,
    }

    impl Fixed {
        fn set(&self, entries: Vec<ForecastEntry>) {
            *self.entries.lock().unwrap() = entries;
        }

        fn fail_next(&self, count: usize) {
            *self.failures.lock().unwrap() = count;
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl ForecastSource for Fixed {
        async fn fetch_forecast(
            &self,
            _latitude: f64,
            _longitude: f64,
        ) -> Result<Vec<ForecastEntry>, FetchError> {
            *self.calls.lock().unwrap() += 1;
            let mut failures = self.failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(FetchError::Status(503));
            }
            Ok(self.entries.lock().unwrap().clone())
        }
    }

    #[test]
    fn skips_dry_periods_and_caps_at_three() {
        let entries = vec![
            entry(10, 0.0, 0.0),
            entry(11, 0.4, 3.0),
            entry(12, 0.0, 0.0),
            entry(13, 1.2, 3.0),
            entry(14, 0.1, 1.0),
            entry(15, 2.5, 3.0),
        ];
        let samples = precipitation_samples(&entries, Stockholm, 3);
        assert_eq!(samples.len(), 3);
        let means: Vec<f64> = samples.iter().map(|s| s.mean_mm).collect();
        assert_eq!(means, vec![0.4, 1.2, 0.1]);
        assert_eq!(samples[2].category, 1);
    }

    #[test]
    fn converts_to_display_timezone() {
        let samples = precipitation_samples(&[entry(11, 0.4, 3.0)], Stockholm, 3);
        // CEST is UTC+2 in June
        assert_eq!(samples[0].timestamp.format("%H:%M").to_string(), "13:00");
    }

    #[test]
    fn missing_pmean_counts_as_dry() {
        let mut wet = entry(11, 0.4, 3.0);
        wet.parameters.retain(|p| p.name != PARAM_MEAN);
        assert!(precipitation_samples(&[wet], Stockholm, 3).is_empty());
    }

    #[test]
    fn decodes_forecast_json() {
        let body = r#"{
            "validTime": "2024-06-01T11:00:00Z",
            "parameters": [
                {"name": "pmean", "levelType": "hl", "level": 0, "unit": "kg/m2/h", "values": [0.4]},
                {"name": "pcat", "levelType": "hl", "level": 0, "unit": "category", "values": [3]}
            ]
        }"#;
        let parsed: ForecastEntry = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.parameter(PARAM_MEAN), Some(0.4));
        assert_eq!(parsed.parameter(PARAM_CATEGORY), Some(3.0));
        assert_eq!(parsed.parameter("ws"), None);
    }

    #[tokio::test]
    async fn publishes_only_on_change() {
        let source = Fixed::default();
        source.set(vec![entry(11, 0.4, 3.0)]);
        let (outbox, mut inbound) = outbox::channel();
        let mut worker =
            WeatherWorker::new(source.clone(), outbox, WeatherConfig::default(), Stockholm);

        assert!(worker.check().await.unwrap());
        assert!(!worker.check().await.unwrap());
        source.set(vec![entry(11, 0.6, 3.0)]);
        assert!(worker.check().await.unwrap());
        assert_eq!(source.calls(), 3);

        drop(worker);
        let mut kinds = Vec::new();
        while let Some(update) = inbound.recv().await {
            kinds.push(update.kind());
        }
        assert_eq!(kinds, vec!["precipitation", "precipitation"]);
    }

    #[tokio::test(start_paused = true)]
    async fn run_loop_polls_on_interval_and_stops_on_die() {
        let source = Fixed::default();
        let (outbox, _inbound) = outbox::channel();
        let config = WeatherConfig {
            poll_interval_secs: 600,
            ..WeatherConfig::default()
        };
        let handle = crate::worker::start(WeatherWorker::new(
            source.clone(),
            outbox,
            config,
            Stockholm,
        ));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(source.calls(), 1);
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(source.calls(), 2);

        handle.send(Control::Poll);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(source.calls(), 3);

        handle.send(Control::Die);
        tokio::time::timeout(Duration::from_secs(1), handle.join())
            .await
            .expect("worker should stop")
            .expect("worker should not panic");
    }

    #[tokio::test(start_paused = true)]
    async fn run_loop_survives_fetch_error() {
        let source = Fixed::default();
        source.set(vec![entry(11, 0.4, 3.0)]);
        source.fail_next(1);
        let (outbox, mut inbound) = outbox::channel();
        let handle = crate::worker::start(WeatherWorker::new(
            source.clone(),
            outbox,
            WeatherConfig::default(),
            Stockholm,
        ));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(source.calls(), 1);
        assert!(inbound.is_empty());

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(source.calls(), 2);
        match inbound.recv().await {
            Some(Update::Precipitation(samples)) => assert_eq!(samples.len(), 1),
            other => panic!("expected precipitation, got {:?}", other),
        }

        handle.send(Control::Die);
        handle.join().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn zero_poll_interval_still_waits_between_fetches() {
        let source = Fixed::default();
        let (outbox, _inbound) = outbox::channel();
        let config = WeatherConfig {
            poll_interval_secs: 0,
            ..WeatherConfig::default()
        };
        let handle = crate::worker::start(WeatherWorker::new(
            source.clone(),
            outbox,
            config,
            Stockholm,
        ));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(source.calls(), 1);
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!((3..=5).contains(&source.calls()), "got {} calls", source.calls());

        handle.send(Control::Die);
        tokio::time::timeout(Duration::from_secs(2), handle.join())
            .await
            .expect("worker should stop")
            .unwrap();
    }
}
