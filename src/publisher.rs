// NV7 Controller — Event Publishers
//
// Every state transition is handed to each registered sink in registration
// order. A sink that errors or panics is logged and skipped; the remaining
// sinks still see the event and the state machine never learns about it.

use std::panic::{self, AssertUnwindSafe};

use serde::Serialize;

use crate::events::Event;

pub const MQTT_TOPIC_PREFIX: &str = "NV7/CONTROLLER";

pub trait Publisher: Send {
    /// Short label used when logging sink failures.
    fn name(&self) -> &str;

    fn publish(&mut self, event: &Event) -> anyhow::Result<()>;
}

/// Append-only list of sinks, built once at startup.
#[derive(Default)]
pub struct PublisherSet {
    sinks: Vec<Box<dyn Publisher>>,
}

impl PublisherSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl Publisher + 'static) -> Self {
        self.register(Box::new(sink));
        self
    }

    pub fn register(&mut self, sink: Box<dyn Publisher>) {
        log::info!("Registered publisher '{}'", sink.name());
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Deliver `event` to every sink. Returns how many sinks accepted it.
    pub fn publish(&mut self, event: &Event) -> usize {
        let mut delivered = 0;
        for sink in self.sinks.iter_mut() {
            match panic::catch_unwind(AssertUnwindSafe(|| sink.publish(event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    log::warn!("Publisher '{}' failed on {}: {:#}", sink.name(), event.kind, e);
                }
                Err(_) => {
                    log::warn!("Publisher '{}' panicked on {}", sink.name(), event.kind);
                }
            }
        }
        delivered
    }
}

// ---------------------------------------------------------------------------
// Log sink
// ---------------------------------------------------------------------------
pub struct LogPublisher;

impl Publisher for LogPublisher {
    fn name(&self) -> &str {
        "log"
    }

    fn publish(&mut self, event: &Event) -> anyhow::Result<()> {
        log::info!(
            "Channel {}: {} {} (speed {}, {} / {})",
            event.channel,
            event.kind,
            event.button,
            event.state.speed,
            event.state.theme,
            event.state.colour
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MQTT sink
// ---------------------------------------------------------------------------

/// Whatever actually moves bytes to the broker.
pub trait MqttTransport: Send {
    fn enqueue(&mut self, topic: &str, retain: bool, payload: &[u8]) -> anyhow::Result<()>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct Payload<'a> {
    button: &'a str,
    channel: &'a str,
    theme: &'a str,
    colour: &'a str,
    speed: u8,
}

pub fn topic_for(event: &Event) -> String {
    format!("{}/{}", MQTT_TOPIC_PREFIX, event.kind)
}

pub fn encode_payload(event: &Event) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(&Payload {
        button: event.button.as_str(),
        channel: event.channel.as_str(),
        theme: &event.state.theme,
        colour: &event.state.colour,
        speed: event.state.speed,
    })
}

pub struct MqttPublisher<T: MqttTransport> {
    transport: T,
}

impl<T: MqttTransport> MqttPublisher<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }
}

impl<T: MqttTransport> Publisher for MqttPublisher<T> {
    fn name(&self) -> &str {
        "mqtt"
    }

    fn publish(&mut self, event: &Event) -> anyhow::Result<()> {
        let payload = encode_payload(event)?;
        // Retained so late subscribers pick up the current state.
        self.transport.enqueue(&topic_for(event), true, &payload)
    }
}
