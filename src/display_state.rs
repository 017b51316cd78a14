//! The aggregate the board is drawn from.
//!
//! Owned by the display coordinator and changed only through
//! [`DisplayState::apply`]. Every field is last-write-wins.

use crate::{Departure, PrecipitationSample, Update};
use chrono::DateTime;
use chrono_tz::Tz;

/// Everything currently known about the world, plus when each source last
/// reported.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DisplayState {
    pub outside_temperature: Option<String>,
    pub outside_humidity: Option<String>,
    pub inside_temperature: Option<String>,
    pub inside_humidity: Option<String>,
    pub departures: Vec<Departure>,
    pub precipitation: Vec<PrecipitationSample>,
    /// Last sensor reading of any kind
    pub sensors_updated: Option<DateTime<Tz>>,
    pub transit_updated: Option<DateTime<Tz>>,
    pub weather_updated: Option<DateTime<Tz>>,
}

impl DisplayState {
    /// Fresh state with every value unknown.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one update received at `now`.
    pub fn apply(&mut self, update: Update, now: DateTime<Tz>) {
        match update {
            Update::OutsideTemperature(value) => {
                self.outside_temperature = Some(value);
                self.sensors_updated = Some(now);
            }
            Update::OutsideHumidity(value) => {
                self.outside_humidity = Some(value);
                self.sensors_updated = Some(now);
            }
            Update::InsideTemperature(value) => {
                self.inside_temperature = Some(value);
                self.sensors_updated = Some(now);
            }
            Update::InsideHumidity(value) => {
                self.inside_humidity = Some(value);
                self.sensors_updated = Some(now);
            }
            Update::Departures(departures) => {
                self.departures = departures;
                self.transit_updated = Some(now);
            }
            Update::Precipitation(samples) => {
                self.precipitation = samples;
                self.weather_updated = Some(now);
            }
        }
    }

    /// The next forecast period with precipitation, if any.
    pub fn next_precipitation(&self) -> Option<&PrecipitationSample> {
        self.precipitation.first()
    }
}
