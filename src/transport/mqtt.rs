/// MQTT side channel: raw/decoded frame mirroring and outdoor temperature input
use log::{debug, info, warn};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::ops::RangeInclusive;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};

use crate::config::MqttConfig;
use crate::control::OutdoorContext;
use crate::utils::format_datetime;

pub const RAW_TOPIC: &str = "evohome/mitm/raw";
pub const DECODED_TOPIC_PREFIX: &str = "evohome/mitm/decoded";
pub const OUTDOOR_TOPIC: &str = "evohome/context/outdoor_temperature";

/// Accepted outdoor readings in °C
pub const OUTDOOR_RANGE: RangeInclusive<f64> = -30.0..=50.0;

const KEEP_ALIVE_SECS: u64 = 30;
const RECONNECT_DELAY_SECS: u64 = 5;
const REQUEST_CAPACITY: usize = 64;

/// Fire-and-forget publishing; callers only log failures
pub trait Publisher {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), String>;
}

pub struct MqttPublisher {
    client: AsyncClient,
}

impl Publisher for MqttPublisher {
    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), String> {
        // try_publish never waits on the event loop
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload)
            .map_err(|e| e.to_string())
    }
}

/// Create the client and spawn its event loop
///
/// The connection is established lazily by the event loop, so an
/// unreachable broker only costs log lines, never frame forwarding.
pub fn connect(config: &MqttConfig, context: Arc<OutdoorContext>) -> (MqttPublisher, JoinHandle<()>) {
    let mut options = MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port);
    options.set_keep_alive(std::time::Duration::from_secs(KEEP_ALIVE_SECS));

    let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
    let handle = tokio::spawn(run_event_loop(client.clone(), eventloop, context));

    (MqttPublisher { client }, handle)
}

async fn run_event_loop(client: AsyncClient, mut eventloop: EventLoop, context: Arc<OutdoorContext>) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("MQTT connected, subscribing to {}", OUTDOOR_TOPIC);
                // Subscriptions do not survive a reconnect with a clean session
                if let Err(e) = client.try_subscribe(OUTDOOR_TOPIC, QoS::AtMostOnce) {
                    warn!("MQTT subscribe failed: {}", e);
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                if publish.topic == OUTDOOR_TOPIC {
                    apply_outdoor_payload(&context, &publish.payload, OffsetDateTime::now_utc());
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!(
                    "MQTT connection error: {} (retrying in {}s)",
                    e, RECONNECT_DELAY_SECS
                );
                sleep(Duration::from_secs(RECONNECT_DELAY_SECS)).await;
            }
        }
    }
}

/// Store an outdoor temperature message in the context
///
/// Unparsable or out-of-range payloads are logged and leave the context
/// unchanged. Returns the accepted value.
pub fn apply_outdoor_payload(context: &OutdoorContext, payload: &[u8], now: OffsetDateTime) -> Option<f64> {
    let value = match std::str::from_utf8(payload)
        .ok()
        .and_then(|s| s.trim().parse::<f64>().ok())
    {
        Some(value) => value,
        None => {
            warn!(
                "Invalid outdoor temperature payload: {:?}",
                String::from_utf8_lossy(payload)
            );
            return None;
        }
    };

    if !OUTDOOR_RANGE.contains(&value) {
        warn!("Outdoor temperature out of range: {:.1} °C", value);
        return None;
    }

    context.set(value, now);
    info!("Outdoor temperature {:.1} °C", value);
    debug!("Outdoor temperature stored at {}", format_datetime(&now));
    Some(value)
}
