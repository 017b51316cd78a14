//! # Status Board Core Library
//!
//! This library contains everything the status board needs apart from process
//! bootstrapping: the background workers that gather data, the shared outbox
//! they publish to, and the coordinator that merges updates into a display
//! state and redraws the screen.
//!
//! ## Design Philosophy
//!
//! ### Fan-in pipeline
//! - **Independent workers**: sensor feed, transit departures and weather
//!   forecast each run in their own task at their own cadence
//! - **One outbox**: every worker gets a clone of the same [`outbox::Outbox`]
//!   at construction; nothing is shared through globals
//! - **One owner of state**: only the [`coordinator::DisplayCoordinator`]
//!   touches [`display_state::DisplayState`]
//!
//! ### Redraw batching
//! E-paper refreshes are slow and flicker, so the coordinator redraws only at
//! a quiescent point: after applying a message, if the outbox is empty.
//! A burst of updates therefore produces a single refresh.
//!
//! ### Best effort
//! Every external failure degrades to "try again next cycle". Nothing that
//! happens after the workers start is fatal to the process.
//!
//! ## Core Types
//!
//! - [`Update`]: a normalized message travelling from a worker to the coordinator
//! - [`Departure`]: one upcoming bus departure
//! - [`PrecipitationSample`]: one forecast entry with precipitation

use chrono::DateTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

pub mod config;
pub mod coordinator;
pub mod display;
pub mod display_state;
pub mod http;
pub mod logging;
pub mod mqtt;
pub mod outbox;
pub mod renderer;
pub mod sensor;
pub mod sl_api;
pub mod smhi_api;
pub mod transit;
pub mod weather;
pub mod worker;

#[cfg(test)]
mod tests;

/// One upcoming departure as shown on the board.
///
/// Times are kept as the `HH:MM:SS` part of the API timestamps, ready for
/// display.
///
/// # Example
/// ```
/// use status_board_lib::Departure;
///
/// let bus = Departure {
///     line: "555".to_string(),
///     direction_flag: true,
///     scheduled_time: "17:43:00".to_string(),
///     expected_time: "17:44:30".to_string(),
/// };
/// assert!(bus.is_delayed());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Departure {
    /// Line designation, e.g. "555"
    pub line: String,
    /// True when the journey runs in the primary direction
    pub direction_flag: bool,
    /// Timetabled departure time (`HH:MM:SS`)
    pub scheduled_time: String,
    /// Real-time expected departure time (`HH:MM:SS`)
    pub expected_time: String,
}

impl Departure {
    /// True when the expected time differs from the timetable.
    pub fn is_delayed(&self) -> bool {
        self.scheduled_time != self.expected_time
    }
}

/// A forecast entry with non-zero mean precipitation.
#[derive(Clone, Debug, PartialEq)]
pub struct PrecipitationSample {
    /// Start of the forecast validity period, in the display timezone
    pub timestamp: DateTime<Tz>,
    /// Mean precipitation intensity in mm/h
    pub mean_mm: f64,
    /// Precipitation category (0 none, 1 snow, 2 snow and rain, 3 rain, ...)
    pub category: i32,
}

/// The sensor readings the board knows how to show.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SensorKind {
    OutsideTemperature,
    OutsideHumidity,
    InsideTemperature,
    InsideHumidity,
}

impl SensorKind {
    /// Wrap a decoded reading into the matching outbox message.
    pub fn into_update(self, value: String) -> Update {
        match self {
            SensorKind::OutsideTemperature => Update::OutsideTemperature(value),
            SensorKind::OutsideHumidity => Update::OutsideHumidity(value),
            SensorKind::InsideTemperature => Update::InsideTemperature(value),
            SensorKind::InsideHumidity => Update::InsideHumidity(value),
        }
    }
}

/// A normalized update published by a worker.
///
/// The set of kinds is closed: producers drop anything they cannot classify
/// before it reaches the outbox.
#[derive(Clone, Debug, PartialEq)]
pub enum Update {
    OutsideTemperature(String),
    OutsideHumidity(String),
    InsideTemperature(String),
    InsideHumidity(String),
    Departures(Vec<Departure>),
    Precipitation(Vec<PrecipitationSample>),
}

impl Update {
    /// Short kind tag used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Update::OutsideTemperature(_) => "out-temp",
            Update::OutsideHumidity(_) => "out-hum",
            Update::InsideTemperature(_) => "in-temp",
            Update::InsideHumidity(_) => "in-hum",
            Update::Departures(_) => "buses",
            Update::Precipitation(_) => "precipitation",
        }
    }
}
