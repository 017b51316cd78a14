//! # Status Board Rendering
//!
//! Draws a [`DisplayState`] either onto any `embedded-graphics` 1-bit draw
//! target (the e-paper layout) or into plain text for development on a
//! desktop terminal.
//!
//! ## Layout
//!
//! The screen is split in two columns:
//!
//! ```text
//! ┌──────────────────────┬──────────────────────┐
//! │ Outside              │ 555 | 17:43:00       │
//! │   21.5°C   63%       │  X  | (17:44:30)     │
//! │ Rain                 │ ──────────────────── │
//! │   0.4mm @ 13:00      │ 535 | 17:50:00       │
//! │ Inside               │ ...                  │
//! │   22.0°C   41%       │                      │
//! │ Updated 12:01:13     │ Updated 12:00:40     │
//! └──────────────────────┴──────────────────────┘
//! ```
//!
//! Unknown values are drawn as `--`.

use crate::display_state::DisplayState;
use crate::{Departure, PrecipitationSample};
use chrono::DateTime;
use chrono_tz::Tz;
use embedded_graphics::{
    mono_font::{iso_8859_1::FONT_10X20, iso_8859_1::FONT_6X13, MonoTextStyle},
    pixelcolor::BinaryColor,
    prelude::*,
    primitives::{Line, PrimitiveStyle},
    text::{Baseline, Text},
};

/// Placeholder for values not yet received
const UNKNOWN: &str = "--";

/// Outer margin in pixels
const MARGIN: i32 = 10;

/// Vertical space per departure entry
const DEPARTURE_PITCH: i32 = 80;

fn or_unknown(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or(UNKNOWN)
}

fn format_updated(updated: &Option<DateTime<Tz>>) -> String {
    match updated {
        Some(time) => time.format("%H:%M:%S").to_string(),
        None => "--:--:--".to_string(),
    }
}

/// Temperature and humidity on one line, e.g. `  21.5°C   63%`.
pub fn format_climate(temperature: &Option<String>, humidity: &Option<String>) -> String {
    format!(
        "{:>6}°C {:>5}%",
        or_unknown(temperature),
        or_unknown(humidity)
    )
}

/// Next precipitation, e.g. `0.4mm @ 13:00`, or `No rain`.
pub fn format_precipitation(sample: Option<&PrecipitationSample>) -> String {
    match sample {
        Some(sample) => format!(
            "{:.1}mm @ {}",
            sample.mean_mm,
            sample.timestamp.format("%H:%M")
        ),
        None => "No rain".to_string(),
    }
}

/// The three lines of one departure entry.
///
/// The expected time is shown only when it differs from the timetable.
pub fn format_departure(departure: &Departure) -> [String; 3] {
    let marker = if departure.direction_flag { "X" } else { " " };
    let expected = if departure.is_delayed() {
        format!("({})", departure.expected_time)
    } else {
        "(on time)".to_string()
    };
    [
        format!("{:>4} | {}", departure.line, departure.scheduled_time),
        format!("  {}  | {}", marker, expected),
        "-".repeat(17),
    ]
}

/// Draw the full board onto `target`.
///
/// The target is expected to be cleared to `BinaryColor::Off` beforehand.
pub fn draw_dashboard<D>(state: &DisplayState, target: &mut D) -> Result<(), D::Error>
where
    D: DrawTarget<Color = BinaryColor>,
{
    let size = target.bounding_box().size;
    let width = size.width as i32;
    let height = size.height as i32;
    let half = width / 2;

    let label = MonoTextStyle::new(&FONT_6X13, BinaryColor::On);
    let value = MonoTextStyle::new(&FONT_10X20, BinaryColor::On);

    // Left column: climate and rain
    let left = MARGIN;
    let rows: [(&str, String); 3] = [
        (
            "Outside",
            format_climate(&state.outside_temperature, &state.outside_humidity),
        ),
        ("Rain", format_precipitation(state.next_precipitation())),
        (
            "Inside",
            format_climate(&state.inside_temperature, &state.inside_humidity),
        ),
    ];
    let mut y = MARGIN;
    for (title, text) in rows.iter() {
        Text::with_baseline(title, Point::new(left, y), label, Baseline::Top).draw(target)?;
        y += 18;
        Text::with_baseline(text, Point::new(left + 20, y), value, Baseline::Top).draw(target)?;
        y += 40;
    }
    // Remaining rain periods in small print
    for sample in state.precipitation.iter().skip(1) {
        let line = format_precipitation(Some(sample));
        Text::with_baseline(&line, Point::new(left + 20, y), label, Baseline::Top)
            .draw(target)?;
        y += 16;
    }

    // Column divider
    Line::new(Point::new(half, MARGIN), Point::new(half, height - MARGIN))
        .into_styled(PrimitiveStyle::with_stroke(BinaryColor::On, 1))
        .draw(target)?;

    // Right column: departures
    let right = half + MARGIN;
    for (index, departure) in state.departures.iter().enumerate() {
        let top = MARGIN + index as i32 * DEPARTURE_PITCH;
        for (row, text) in format_departure(departure).iter().enumerate() {
            let position = Point::new(right, top + row as i32 * 24);
            Text::with_baseline(text, position, value, Baseline::Top).draw(target)?;
        }
    }
    if state.departures.is_empty() {
        Text::with_baseline(
            "No departures",
            Point::new(right, MARGIN),
            value,
            Baseline::Top,
        )
        .draw(target)?;
    }

    // Footer: last update per column, forecast above the sensor line
    let footer = height - MARGIN - 13;
    let forecast = format!("Forecast: {}", format_updated(&state.weather_updated));
    Text::with_baseline(&forecast, Point::new(left, footer - 16), label, Baseline::Top)
        .draw(target)?;
    let sensors = format!("Last update: {}", format_updated(&state.sensors_updated));
    let transit = format!("Last update: {}", format_updated(&state.transit_updated));
    Text::with_baseline(&sensors, Point::new(left, footer), label, Baseline::Top)
        .draw(target)?;
    Text::with_baseline(&transit, Point::new(right, footer), label, Baseline::Top)
        .draw(target)?;

    Ok(())
}

/// Render the board as plain text for terminals and logs.
pub fn render_text(state: &DisplayState) -> String {
    let mut left = vec![
        "Outside:".to_string(),
        format_climate(&state.outside_temperature, &state.outside_humidity),
        "Rain:".to_string(),
    ];
    if state.precipitation.is_empty() {
        left.push(format_precipitation(None));
    }
    for sample in &state.precipitation {
        left.push(format_precipitation(Some(sample)));
    }
    left.push(format!("Forecast {}", format_updated(&state.weather_updated)));
    left.push("Inside:".to_string());
    left.push(format_climate(
        &state.inside_temperature,
        &state.inside_humidity,
    ));

    let mut right: Vec<String> = state
        .departures
        .iter()
        .flat_map(|d| format_departure(d).into_iter())
        .collect();
    if right.is_empty() {
        right.push("No departures".to_string());
    }

    let rows = left.len().max(right.len());
    let mut out = String::new();
    for i in 0..rows {
        let l = left.get(i).map(String::as_str).unwrap_or("");
        let r = right.get(i).map(String::as_str).unwrap_or("");
        out.push_str(format!("{:<24}│ {}", l, r).trim_end());
        out.push('\n');
    }
    out.push_str(&format!(
        "{:<24}│ {}\n",
        format!("Updated {}", format_updated(&state.sensors_updated)),
        format!("Updated {}", format_updated(&state.transit_updated))
    ));
    out
}
