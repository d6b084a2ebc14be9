mod config;
mod control;
mod models;
mod processor;
mod ramses;
mod transport;
mod utils;

use log::{error, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::task::JoinError;

use config::{Config, Mode};
use control::{AdaptiveCeiling, OutdoorContext, SetpointLimiter};
use processor::{run_bridge, FrameProcessor};
use transport::{mqtt, SerialInterface};
use utils::format_datetime;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("LOG_LEVEL", "info"))
        .format_timestamp_secs()
        .init();

    // Load configuration
    let config = match Config::new() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e);
        }
    };

    info!(
        "evohome-mitm started at {} (RF {} mode)",
        format_datetime(&OffsetDateTime::now_utc()),
        config.mode
    );
    if config.mode == Mode::Limit {
        info!(
            "CH ceiling {:.1} °C (idle {:.1} °C), ramp {:.1} °C per {}s, adaptive curve {}",
            config.limiter.base_max,
            config.ch_idle,
            config.limiter.ramp_step,
            config.limiter.ramp_interval.whole_seconds(),
            if config.adaptive.enabled { "on" } else { "off" }
        );
    }

    let context = Arc::new(OutdoorContext::new());
    let (publisher, mqtt_task) = mqtt::connect(&config.mqtt, Arc::clone(&context));

    let mut serial = SerialInterface::open(&config.serial.device, config.serial.baud)?;

    let limiter = match config.mode {
        Mode::Limit => Some(SetpointLimiter::new(
            config.limiter.clone(),
            AdaptiveCeiling::new(config.adaptive.clone()),
            Arc::clone(&context),
        )),
        Mode::Observe => None,
    };
    let mut processor = FrameProcessor::new(limiter, publisher);

    // The serial loop blocks on reads, keep it off the async workers
    let running = Arc::new(AtomicBool::new(true));
    let mut bridge = {
        let running = Arc::clone(&running);
        tokio::task::spawn_blocking(move || run_bridge(&mut serial, &mut processor, &running))
    };

    // Run the bridge or wait for shutdown signal
    tokio::select! {
        result = &mut bridge => {
            report_bridge_exit(result);
        }
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                error!("Failed to listen for Ctrl+C: {}", e);
            }
            info!("Program terminated by user. Exiting gracefully.");
            running.store(false, Ordering::Relaxed);
            report_bridge_exit(bridge.await);
        }
    }

    mqtt_task.abort();
    Ok(())
}

/// Log a bridge task that panicked or was cancelled; true on a clean stop
fn report_bridge_exit(result: Result<(), JoinError>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            error!("Bridge loop ended unexpectedly: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn panicked_bridge_is_reported() {
        let handle = tokio::task::spawn_blocking(|| -> () { panic!("serial port vanished") });
        assert!(!report_bridge_exit(handle.await));
    }

    #[tokio::test]
    async fn clean_bridge_stop_is_not_an_error() {
        let handle = tokio::task::spawn_blocking(|| ());
        assert!(report_bridge_exit(handle.await));
    }
}
