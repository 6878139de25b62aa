//! NV7 controller: one analog button ladder in, lighting-controller events out.
//!
//! Pipeline, leaves first:
//!
//! ```text
//! sampler (2 ms tick) -> SampleBuffer -> controller poll (30 ms)
//!     -> Classifier -> GestureDebouncer -> StateMachine -> PublisherSet
//! ```
//!
//! Hardware-bound pieces (ADC, LED, Wi-Fi/MQTT) only build for
//! `target_os = "espidf"`; everything else runs on the host.

pub mod classifier;
pub mod config;
pub mod drivers;
pub mod events;
pub mod input;
pub mod publisher;
pub mod state;
pub mod tasks;

pub use classifier::{Classifier, TargetRange};
pub use config::{ConfigError, ControllerConfig, MqttConfig};
pub use events::{Button, Channel, Event, EventKind, Gesture, StateSnapshot};
pub use input::GestureDebouncer;
pub use publisher::{LogPublisher, MqttPublisher, MqttTransport, Publisher, PublisherSet};
pub use state::StateMachine;
pub use tasks::controller::{Controller, Pipeline};
pub use tasks::sampler::{Sampler, SamplerError};
