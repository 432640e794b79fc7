// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Tasmota MQTT entity bridge.
//!
//! This library translates Tasmota's MQTT topic and payload conventions
//! into an abstract, self-describing entity model for an automation host.
//! It owns no socket: the host injects an [`MqttTransport`] and feeds
//! inbound messages to [`TasmotaMqttClient::handle_message`] (or enables
//! the default `mqtt` feature and lets [`MqttBroker`] do both).
//!
//! # Overview
//!
//! - [`TasmotaDiscovery`] consumes the retained discovery payloads under
//!   a configurable prefix and reports devices and full replacement
//!   entity lists, each entry a `(config, hash)` pair.
//! - [`TasmotaMqttClient`] multiplexes per-entity topic subscriptions
//!   through owned [`Subscription`] handles and coalesces repeated
//!   identical publishes through a debounce window.
//! - Runtime entities ([`TasmotaLight`], [`TasmotaSensor`], …) subscribe
//!   their topics, track availability with deep-sleep inference, and
//!   expose typed state callbacks.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tasmota_bridge::{MqttBroker, TasmotaDiscovery};
//!
//! #[tokio::main]
//! async fn main() -> tasmota_bridge::Result<()> {
//!     let (_broker, client) = MqttBroker::builder()
//!         .host("192.168.1.50")
//!         .credentials("user", "password")
//!         .build()?;
//!
//!     let discovery = TasmotaDiscovery::new("tasmota/discovery", Arc::clone(&client));
//!     discovery
//!         .start_discovery(
//!             Arc::new(|device, mac| {
//!                 match device {
//!                     Some(device) => println!("discovered {mac}: {}", device.device_name),
//!                     None => println!("removed {mac}"),
//!                 }
//!             }),
//!             Arc::new(|sensors, mac| {
//!                 println!("{mac}: {} sensor entities", sensors.len());
//!             }),
//!         )
//!         .await?;
//!     Ok(())
//! }
//! ```

mod availability;
pub mod device;
pub mod discovery;
pub mod entity;
pub mod error;
pub mod fan;
pub mod light;
pub mod mqtt;
pub mod payload;
pub mod relay;
pub mod sensor;
pub mod shutter;
pub mod status_sensor;
pub mod switch;
pub mod topics;
pub mod trigger;
pub mod types;

pub use availability::{
    AvailabilityCallback, AvailabilityConfig, AvailabilityHandle, AvailabilityState,
    AvailabilityTracker, AvailabilityUpdate, is_deep_sleep_wake,
};
pub use device::{DeviceDescriptor, DeviceInfo, DeviceOptions, RelayRole};
pub use discovery::{
    DeviceDiscoveredCallback, EntityConfig, SensorsDiscoveredCallback, TasmotaDiscovery,
    TasmotaEntity, create_entity, get_entities_for_platform, has_entities_with_platform,
};
pub use entity::{DiscoveryHash, EntityIndex, Platform};
pub use error::{Error, ParseError, ProtocolError, Result, ValueError};
pub use light::{LightKind, LightRequest, LightUpdate, TasmotaLight, calculate_fade_speed};
#[cfg(feature = "mqtt")]
pub use mqtt::broker::{MqttBroker, MqttBrokerBuilder};
pub use mqtt::{
    MqttTransport, PublishMessage, ReceiveMessage, Subscription, TasmotaMqttClient, TopicMap,
    TopicSlot,
};
pub use sensor::{Quantity, SensorDiscovery, TasmotaSensor, get_sensor_entities};
pub use status_sensor::{StatusSensorKind, TasmotaStatusSensor, get_status_sensor_entities};
pub use trigger::{TasmotaTrigger, TasmotaTriggerConfig, get_triggers};
pub use types::{ColorTemp, Dimmer, FadeSpeed, HsbColor, MiredRange};
