//! # Transit Departures Worker
//!
//! Polls a departures API and publishes the next few buses towards the
//! configured destination.
//!
//! ## Adaptive Polling
//!
//! Departure data only changes meaningfully as a bus gets close, so the worker
//! keeps an estimate of the next departure and schedules its next fetch from
//! it (see [`next_poll_delay`]):
//!
//! - **No departures**: check again in 10 minutes
//! - **Departure within 5 minutes**: check every minute for real-time updates
//! - **Otherwise**: sleep until 290 seconds before the departure
//!
//! The run loop itself wakes every `check_interval` (30 s by default) so that
//! control messages are never left waiting longer than that.
//!
//! ## Deduplication
//!
//! A fetch is published only when the resulting list differs from the last one
//! published. The comparison is order-sensitive deep equality.

use crate::config::TransitConfig;
use crate::http::FetchError;
use crate::outbox::{LastPublished, Outbox};
use crate::worker::{Control, Inbox, Worker};
use crate::{Departure, Update};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::time::Duration;
use tokio::time::Instant;

/// Wait this long when the API returned no matching departure
pub const IDLE_DELAY: Duration = Duration::from_secs(600);

/// Poll this often once a departure is closer than [`NEAR_THRESHOLD`]
pub const NEAR_DELAY: Duration = Duration::from_secs(60);

/// A departure closer than this switches to [`NEAR_DELAY`] polling
pub const NEAR_THRESHOLD: Duration = Duration::from_secs(300);

/// Distant departures are re-checked this long before they leave
pub const LEAD_TIME: Duration = Duration::from_secs(290);

/// Format of the timestamps in departure records (local time, no offset)
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// A departure as returned by the API, before filtering.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawDeparture {
    pub line: String,
    /// API direction code; `1` is the primary direction
    pub direction_code: u8,
    /// Timetabled time, `YYYY-MM-DDTHH:MM:SS` in local time
    pub scheduled: String,
    /// Real-time expected time, same format
    pub expected: String,
    pub destination: String,
}

/// A source of departure records for a stop.
#[async_trait]
pub trait DepartureSource: Send + Sync + 'static {
    /// Fetch departures from `site_id` within the next `window_minutes`,
    /// earliest first.
    async fn fetch_departures(
        &self,
        site_id: u32,
        window_minutes: u32,
    ) -> Result<Vec<RawDeparture>, FetchError>;
}

/// Delay until the next fetch, given the earliest known departure.
pub fn next_poll_delay(now: DateTime<Utc>, next_departure: Option<DateTime<Utc>>) -> Duration {
    let Some(departure) = next_departure else {
        return IDLE_DELAY;
    };
    // A departure already in the past counts as imminent.
    let until = (departure - now).to_std().unwrap_or(Duration::ZERO);
    if until < NEAR_THRESHOLD {
        NEAR_DELAY
    } else {
        until - LEAD_TIME
    }
}

/// Parse a local API timestamp in `tz`.
fn parse_local(raw: &str, tz: Tz) -> Result<DateTime<Tz>, FetchError> {
    let naive = NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .map_err(|e| FetchError::Malformed(format!("timestamp {:?}: {}", raw, e)))?;
    // Ambiguous times (DST fall-back) resolve to the earlier instant.
    tz.from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| FetchError::Malformed(format!("timestamp {:?} does not exist in {}", raw, tz)))
}

/// Result of normalizing one API response.
#[derive(Debug, PartialEq)]
pub struct Normalized {
    pub departures: Vec<Departure>,
    /// Earliest expected departure among the kept records
    pub next_departure: Option<DateTime<Utc>>,
}

/// Filter raw records to `destination`, keep at most `limit`, and convert
/// them to display departures.
///
/// Any unparsable timestamp rejects the whole response.
pub fn normalize(
    raw: &[RawDeparture],
    destination: &str,
    limit: usize,
    tz: Tz,
) -> Result<Normalized, FetchError> {
    let mut departures = Vec::with_capacity(limit);
    let mut next_departure: Option<DateTime<Utc>> = None;

    for record in raw
        .iter()
        .filter(|r| r.destination == destination)
        .take(limit)
    {
        let scheduled = parse_local(&record.scheduled, tz)?;
        let expected = parse_local(&record.expected, tz)?;

        let expected_utc = expected.with_timezone(&Utc);
        next_departure = Some(match next_departure {
            Some(current) => current.min(expected_utc),
            None => expected_utc,
        });

        departures.push(Departure {
            line: record.line.clone(),
            direction_flag: record.direction_code == 1,
            scheduled_time: scheduled.format("%H:%M:%S").to_string(),
            expected_time: expected.format("%H:%M:%S").to_string(),
        });
    }

    Ok(Normalized {
        departures,
        next_departure,
    })
}

/// Background worker polling a [`DepartureSource`].
pub struct TransitWorker<S> {
    source: S,
    outbox: Outbox,
    config: TransitConfig,
    tz: Tz,
    last: LastPublished<Vec<Departure>>,
    next_check: Instant,
    next_departure: Option<DateTime<Utc>>,
}

impl<S: DepartureSource> TransitWorker<S> {
    pub fn new(source: S, outbox: Outbox, config: TransitConfig, tz: Tz) -> Self {
        TransitWorker {
            source,
            outbox,
            config,
            tz,
            last: LastPublished::default(),
            next_check: Instant::now(),
            next_departure: None,
        }
    }

    /// Fetch, normalize and publish if changed.
    ///
    /// Returns the delay until the next fetch. On error nothing is published
    /// and the previous schedule is left untouched by the caller.
    pub async fn check(&mut self, now: DateTime<Utc>) -> Result<Duration, FetchError> {
        log::info!("Get new departures for site {}", self.config.site_id);
        let raw = self
            .source
            .fetch_departures(self.config.site_id, self.config.time_window_minutes)
            .await?;
        let normalized = normalize(
            &raw,
            &self.config.destination,
            self.config.max_departures,
            self.tz,
        )?;

        self.next_departure = normalized.next_departure;
        match self.next_departure {
            Some(departure) => log::info!(
                "Next departure in {}s",
                (departure - now).num_seconds()
            ),
            None => log::warn!(
                "No departures towards {} in {} raw records",
                self.config.destination,
                raw.len()
            ),
        }

        if self.last.update(&normalized.departures) {
            log::debug!("Publishing {} departures", normalized.departures.len());
            self.outbox.publish(Update::Departures(normalized.departures));
        } else {
            log::debug!("Departures unchanged");
        }

        Ok(next_poll_delay(now, self.next_departure))
    }

    async fn check_and_reschedule(&mut self) {
        match self.check(Utc::now()).await {
            Ok(delay) => {
                self.next_check = Instant::now() + delay;
                log::info!("Next check in {}s", delay.as_secs());
            }
            Err(e) => log::warn!("Departure fetch failed: {}", e),
        }
    }
}

#[async_trait]
impl<S: DepartureSource> Worker for TransitWorker<S> {
    fn name(&self) -> &'static str {
        "transit"
    }

    async fn run(&mut self, inbox: &mut Inbox) {
        let mut forced = false;
        loop {
            if forced || Instant::now() >= self.next_check {
                self.check_and_reschedule().await;
            }
            match inbox.receive(self.config.check_interval()).await {
                Some(Control::Die) => break,
                Some(Control::Poll) => forced = true,
                None => forced = false,
            }
        }
    }
}
