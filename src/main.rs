//! # Status Board Application Entry Point
//!
//! Wires the configured collaborators into the workers and the display
//! coordinator, runs until Ctrl-C, then shuts everything down in order:
//! workers first, coordinator last once the outbox is closed.
//!
//! ```text
//! status-board [--stdout] [--config <path>] [--write-config]
//! ```
//!
//! - `--stdout`: print the board as text instead of the configured output
//! - `--config <path>`: configuration file (default `status-board.toml`)
//! - `--write-config`: write the effective configuration to that path and exit

use anyhow::Context;
use status_board_lib::config::{self, Config, OutputKind};
use status_board_lib::coordinator::DisplayCoordinator;
use status_board_lib::display::{BitmapDisplay, Display, TextDisplay};
use status_board_lib::mqtt::MqttFeed;
use status_board_lib::sensor::{SensorWorker, TopicTable};
use status_board_lib::sl_api::SlClient;
use status_board_lib::smhi_api::SmhiClient;
use status_board_lib::transit::TransitWorker;
use status_board_lib::weather::WeatherWorker;
use status_board_lib::worker::{self, Control, RetryPolicy, WorkerHandle};
use status_board_lib::{http, logging, outbox};
use std::env;

/// Command line options.
#[derive(Debug, Default)]
struct Args {
    stdout: bool,
    write_config: bool,
    config_path: Option<String>,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> anyhow::Result<Args> {
    let mut parsed = Args::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--stdout" => parsed.stdout = true,
            "--write-config" => parsed.write_config = true,
            "--config" => {
                let path = args.next().context("--config needs a path")?;
                parsed.config_path = Some(path);
            }
            other => anyhow::bail!("unknown argument: {}", other),
        }
    }
    Ok(parsed)
}

/// Start all workers and the coordinator, then wait for Ctrl-C.
async fn run<D: Display>(config: Config, display: D) -> anyhow::Result<()> {
    let tz = config.display.tz()?;
    let client = http::client(config.http.timeout()).context("building HTTP client")?;
    let (outbox, inbound) = outbox::channel();

    let coordinator = tokio::spawn(DisplayCoordinator::new(inbound, display, tz).run());

    let retry = RetryPolicy {
        delay: config.mqtt.retry_delay(),
        max_attempts: config.mqtt.max_retries,
    };
    let workers: Vec<WorkerHandle> = vec![
        worker::start(SensorWorker::new(
            MqttFeed::new(config.mqtt.clone()),
            TopicTable::new(&config.mqtt.topics),
            outbox.clone(),
            retry,
        )),
        worker::start(TransitWorker::new(
            SlClient::new(
                client.clone(),
                config.transit.base_url.clone(),
                config.transit.api_key.clone(),
            ),
            outbox.clone(),
            config.transit.clone(),
            tz,
        )),
        worker::start(WeatherWorker::new(
            SmhiClient::new(client, config.weather.base_url.clone()),
            outbox,
            config.weather.clone(),
            tz,
        )),
    ];
    log::info!("Startup done");

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    log::info!("Shutting down");

    for handle in &workers {
        handle.send(Control::Die);
    }
    for handle in workers {
        let name = handle.name();
        if let Err(e) = handle.join().await {
            log::error!("Worker {} ended abnormally: {}", name, e);
        }
    }

    // All outbox handles are gone now, so the coordinator drains and returns.
    coordinator.await.context("display coordinator panicked")?;
    Ok(())
}

/// Main application entry point.
fn main() -> anyhow::Result<()> {
    logging::init();
    let args = parse_args(env::args().skip(1))?;
    let config_path = args
        .config_path
        .clone()
        .unwrap_or_else(|| config::DEFAULT_PATH.to_string());
    let config = Config::load_from_path(&config_path);

    if args.write_config {
        config.save_to_path(&config_path)?;
        return Ok(());
    }

    if let Err(e) = logging::log_to_file(&config.logging) {
        log::warn!("Cannot open log file {}: {}", config.logging.file, e);
    }
    log::info!("----------- Application start -----------");
    let rt = tokio::runtime::Runtime::new()?;

    // Development mode: text output regardless of configuration
    let output = if args.stdout {
        OutputKind::Text
    } else {
        config.display.output
    };

    match output {
        OutputKind::Text => rt.block_on(run(config, TextDisplay)),
        OutputKind::Bitmap => {
            let display = BitmapDisplay::new(
                config.display.width,
                config.display.height,
                config.display.image_path.clone(),
            );
            rt.block_on(run(config, display))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> anyhow::Result<Args> {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn parses_flags() {
        let parsed = args(&["--stdout", "--config", "board.toml"]).unwrap();
        assert!(parsed.stdout);
        assert!(!parsed.write_config);
        assert_eq!(parsed.config_path.as_deref(), Some("board.toml"));
    }

    #[test]
    fn rejects_unknown_and_incomplete_arguments() {
        assert!(args(&["--verbose"]).is_err());
        assert!(args(&["--config"]).is_err());
    }
}
