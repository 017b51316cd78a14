//! # Configuration Management
//!
//! This module handles loading and parsing configuration from the
//! `status-board.toml` file. It provides one place to configure the MQTT
//! broker and topics, the transit and weather APIs, and the display.
//!
//! Configuration is read once at startup and handed to each worker by value;
//! nothing reads it afterwards.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Default configuration file name, looked up in the working directory
pub const DEFAULT_PATH: &str = "status-board.toml";

/// Shortest loop interval a worker will wait between cycles
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Errors raised while validating or saving configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The display timezone is not a known IANA name
    #[error("unknown timezone {name:?}: {reason}")]
    Timezone { name: String, reason: String },

    /// Serializing the configuration failed
    #[error("config serialize: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Writing the configuration file failed
    #[error("config IO: {0}")]
    Io(#[from] std::io::Error),

    /// A worker interval is zero, which would make its loop spin
    #[error("{field} must be at least {} second(s)", MIN_INTERVAL.as_secs())]
    Interval { field: &'static str },
}

/// Application configuration loaded from status-board.toml
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// MQTT broker and sensor topics
    pub mqtt: MqttConfig,
    /// Transit departures API
    pub transit: TransitConfig,
    /// Weather forecast API
    pub weather: WeatherConfig,
    /// Display and rendering
    pub display: DisplayConfig,
    /// Shared HTTP client settings
    pub http: HttpConfig,
    /// Log file
    pub logging: LoggingConfig,
}

/// MQTT broker connection and subscription settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive_secs: u64,
    /// Fixed delay between subscription attempts
    pub retry_delay_secs: u64,
    /// Give up after this many consecutive failed attempts (unset = never)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    /// Subscription QoS level (0, 1 or 2)
    pub qos: u8,
    pub topics: SensorTopics,
}

/// Topic per sensor reading
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SensorTopics {
    pub outside_temperature: String,
    pub outside_humidity: String,
    pub inside_temperature: String,
    pub inside_humidity: String,
}

/// Transit departures settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransitConfig {
    pub base_url: String,
    pub api_key: String,
    pub site_id: u32,
    /// How far ahead the API should look, in minutes
    pub time_window_minutes: u32,
    /// Only departures towards this destination are shown
    pub destination: String,
    pub max_departures: usize,
    /// Loop interval between schedule checks
    pub check_interval_secs: u64,
}

/// Weather forecast settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub base_url: String,
    pub latitude: f64,
    pub longitude: f64,
    pub poll_interval_secs: u64,
    pub max_samples: usize,
}

/// Where the rendered board goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// Plain text on stdout
    Text,
    /// 1-bit bitmap written to `image_path`
    Bitmap,
}

/// Display and rendering configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// IANA timezone used for all displayed times
    pub timezone: String,
    pub width: u32,
    pub height: u32,
    pub output: OutputKind,
    /// Bitmap output file (PBM)
    pub image_path: String,
}

/// HTTP client configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
}

/// Log file settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log file, rotated at local midnight; empty disables file logging
    pub file: String,
    /// Rotated files to keep (`file.1` is yesterday's)
    pub keep_days: u32,
}

impl Default for MqttConfig {
    fn default() -> Self {
        MqttConfig {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "status-board".to_string(),
            keep_alive_secs: 30,
            retry_delay_secs: 10,
            max_retries: None,
            qos: 1,
            topics: SensorTopics::default(),
        }
    }
}

impl Default for SensorTopics {
    fn default() -> Self {
        SensorTopics {
            outside_temperature: "homie/homey/temp-sensor-garden/measure-temperature".to_string(),
            outside_humidity: "homie/homey/temp-sensor-garden/measure-humidity".to_string(),
            inside_temperature: "homie/homey/temp-sensor-living-room/measure-temperature"
                .to_string(),
            inside_humidity: "homie/homey/temp-sensor-living-room/measure-humidity".to_string(),
        }
    }
}

impl Default for TransitConfig {
    fn default() -> Self {
        TransitConfig {
            base_url: "https://api.sl.se/api2/realtimedeparturesV4.json".to_string(),
            api_key: String::new(),
            site_id: 5761,
            time_window_minutes: 60,
            destination: "Kallhälls station".to_string(),
            max_departures: 5,
            check_interval_secs: 30,
        }
    }
}

impl Default for WeatherConfig {
    fn default() -> Self {
        WeatherConfig {
            base_url: "https://opendata-download-metfcst.smhi.se/api/category/pmp3g/version/2"
                .to_string(),
            latitude: 59.322097,
            longitude: 17.886781,
            poll_interval_secs: 600,
            max_samples: 3,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        DisplayConfig {
            timezone: "Europe/Stockholm".to_string(),
            width: 800,  // Waveshare 7.5" V2
            height: 480, // Waveshare 7.5" V2
            output: OutputKind::Bitmap,
            image_path: "/tmp/status-board.pbm".to_string(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig { timeout_secs: 30 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            file: "status-board.log".to_string(),
            keep_days: 30,
        }
    }
}

fn interval(secs: u64) -> Duration {
    Duration::from_secs(secs).max(MIN_INTERVAL)
}

impl MqttConfig {
    /// Delay between subscription attempts, never below [`MIN_INTERVAL`].
    pub fn retry_delay(&self) -> Duration {
        interval(self.retry_delay_secs)
    }
}

impl TransitConfig {
    /// Run loop wake interval, never below [`MIN_INTERVAL`].
    pub fn check_interval(&self) -> Duration {
        interval(self.check_interval_secs)
    }
}

impl WeatherConfig {
    /// Forecast poll interval, never below [`MIN_INTERVAL`].
    pub fn poll_interval(&self) -> Duration {
        interval(self.poll_interval_secs)
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl DisplayConfig {
    /// Resolve the configured timezone name.
    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| ConfigError::Timezone {
                name: self.timezone.clone(),
                reason: e.to_string(),
            })
    }
}

impl Config {
    /// Reject worker intervals that would make a loop spin.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let intervals = [
            ("mqtt.retry_delay_secs", self.mqtt.retry_delay_secs),
            ("transit.check_interval_secs", self.transit.check_interval_secs),
            ("weather.poll_interval_secs", self.weather.poll_interval_secs),
        ];
        for (field, secs) in intervals {
            if Duration::from_secs(secs) < MIN_INTERVAL {
                return Err(ConfigError::Interval { field });
            }
        }
        Ok(())
    }

    /// Load configuration from specified path
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<Config>(&contents) {
                Ok(config) => match config.validate() {
                    Ok(()) => {
                        log::info!("Loaded configuration from {}", path.display());
                        config
                    }
                    Err(e) => {
                        log::warn!("Invalid configuration in {}: {}", path.display(), e);
                        log::warn!("Using default configuration");
                        Self::default()
                    }
                },
                Err(e) => {
                    log::warn!("Invalid config file format in {}: {}", path.display(), e);
                    log::warn!("Using default configuration");
                    Self::default()
                }
            },
            Err(_) => {
                log::info!(
                    "No config file found at {}, using default configuration",
                    path.display()
                );
                Self::default()
            }
        }
    }

    /// Save current configuration to the given path
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(&path, contents)?;
        log::info!("Configuration saved to {}", path.as_ref().display());
        Ok(())
    }
}
