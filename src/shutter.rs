// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shutter (cover) entities.
//!
//! A shutter occupies two consecutive relay slots and reports movement as
//! `{"Shutter<n>": {"Direction": ..., "Position": ..., "Tilt": ...}}`.
//! Inverted shutters flip direction and mirror position; tilt values map
//! between the device's configured tilt span and a 0-100 scale.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::availability::{AvailabilityConfig, AvailabilityHandle};
use crate::device::DeviceDescriptor;
use crate::entity::{EntityCommon, EntityIndex, Platform};
use crate::error::ProtocolError;
use crate::mqtt::{Subscription, TasmotaMqttClient, TopicMap, TopicSlot};
use crate::payload::{PathNode, get_value_by_path, parse_json};
use crate::topics;

/// Shutter option bit marking an inverted shutter.
const SHUTTER_OPTION_INVERT: u8 = 1;

/// Immutable configuration of one shutter entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TasmotaShutterConfig {
    /// Fields shared by all entities.
    pub common: EntityCommon,
    /// Availability wiring.
    pub availability: AvailabilityConfig,
    /// Shutter number (0-3), not the relay slot.
    pub idx: usize,
    /// Command topic root.
    pub command_topic: String,
    /// Direction and position are reported inverted.
    pub inverted: bool,
    /// Command result topic.
    pub result_topic: String,
    /// Periodic sensor telemetry topic.
    pub sensor_topic: String,
    /// Polled `STATUS10` response topic.
    pub status_topic: String,
    /// Tilt position at the closed end.
    pub tilt_min: i32,
    /// Tilt position at the open end.
    pub tilt_max: i32,
    /// Duration of a full tilt sweep in tenths of a second.
    pub tilt_duration: i32,
}

impl TasmotaShutterConfig {
    /// Derives the config for shutter `idx`.
    #[must_use]
    pub fn from_discovery(device: &DeviceDescriptor, idx: usize) -> Self {
        let options = device.shutter_options.get(idx).copied().unwrap_or(0);
        let tilt = device
            .shutter_tilt
            .get(idx)
            .cloned()
            .unwrap_or_else(|| vec![0, 0, 0]);
        Self {
            common: EntityCommon {
                endpoint: "shutter",
                index: EntityIndex::Index(idx),
                friendly_name: Some(format!("{} cover {}", device.device_name, idx + 1)),
                mac: device.mac.clone(),
                platform: Platform::Cover,
                poll_topic: topics::command_status_topic(device),
                poll_payload: "10".to_string(),
            },
            availability: AvailabilityConfig::from_device(device),
            idx,
            command_topic: topics::command_topic(device),
            inverted: options & SHUTTER_OPTION_INVERT != 0,
            result_topic: topics::stat_result_topic(device),
            sensor_topic: topics::tele_sensor_topic(device),
            status_topic: topics::stat_status_topic(device, Some(10)),
            tilt_min: tilt.first().copied().unwrap_or(0),
            tilt_max: tilt.get(1).copied().unwrap_or(0),
            tilt_duration: tilt.get(2).copied().unwrap_or(0),
        }
    }

    /// Returns whether the shutter supports tilt.
    #[must_use]
    pub fn supports_tilt(&self) -> bool {
        self.tilt_duration != 0 && self.tilt_min != self.tilt_max
    }
}

/// Movement state reported by a shutter.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ShutterUpdate {
    /// Movement direction: -1 closing, 0 stopped, 1 opening.
    pub direction: Option<i64>,
    /// Position: 0 closed, 100 fully open.
    pub position: Option<i64>,
    /// Tilt mapped to 0-100.
    pub tilt: Option<f64>,
}

/// Callback invoked with reported shutter movement.
pub type ShutterCallback = Box<dyn Fn(&ShutterUpdate) + Send + Sync>;

/// Runtime representation of one shutter entity.
pub struct TasmotaShutter {
    cfg: TasmotaShutterConfig,
    client: Arc<TasmotaMqttClient>,
    availability: AvailabilityHandle,
    on_state: Arc<RwLock<Option<ShutterCallback>>>,
    sub_state: tokio::sync::Mutex<Option<Subscription>>,
}

impl TasmotaShutter {
    /// Creates the runtime entity for a shutter config.
    #[must_use]
    pub fn new(cfg: TasmotaShutterConfig, client: Arc<TasmotaMqttClient>) -> Self {
        let availability = AvailabilityHandle::new(
            Arc::clone(&client),
            cfg.availability.clone(),
            cfg.common.poll_topic.clone(),
            cfg.common.poll_payload.clone(),
        );
        Self {
            cfg,
            client,
            availability,
            on_state: Arc::new(RwLock::new(None)),
            sub_state: tokio::sync::Mutex::new(None),
        }
    }

    /// Returns the entity's immutable config.
    #[must_use]
    pub fn config(&self) -> &TasmotaShutterConfig {
        &self.cfg
    }

    /// Returns the entity's unique id.
    #[must_use]
    pub fn unique_id(&self) -> String {
        self.cfg.common.unique_id()
    }

    /// Returns the availability sub-object.
    #[must_use]
    pub fn availability(&self) -> &AvailabilityHandle {
        &self.availability
    }

    /// Sets the callback fired on reported movement.
    pub fn set_on_state<F>(&self, callback: F)
    where
        F: Fn(&ShutterUpdate) + Send + Sync + 'static,
    {
        *self.on_state.write() = Some(Box::new(callback));
    }

    /// Requests a debounced status re-poll.
    pub fn poll_status(&self) {
        self.availability.poll_status();
    }

    /// Subscribes the result, telemetry, status and availability topics.
    ///
    /// # Errors
    ///
    /// Returns the transport's error unchanged.
    pub async fn subscribe_topics(&self) -> Result<(), ProtocolError> {
        let handler = shutter_state_handler(self.cfg.clone(), Arc::clone(&self.on_state));
        let mut map = TopicMap::new();
        map.insert(TopicSlot::Result, self.cfg.result_topic.clone(), Arc::clone(&handler));
        map.insert(TopicSlot::Sensor, self.cfg.sensor_topic.clone(), Arc::clone(&handler));
        map.insert(TopicSlot::Status(10), self.cfg.status_topic.clone(), handler);
        self.availability.fill_topic_map(&mut map);

        let mut sub = self.sub_state.lock().await;
        *sub = Some(self.client.subscribe(sub.take(), map).await?);
        Ok(())
    }

    /// Unsubscribes every topic of this entity.
    ///
    /// # Errors
    ///
    /// Returns the transport's error unchanged.
    pub async fn unsubscribe_topics(&self) -> Result<(), ProtocolError> {
        let mut sub = self.sub_state.lock().await;
        *sub = Some(self.client.unsubscribe(sub.take()).await?);
        Ok(())
    }

    /// Opens the shutter.
    ///
    /// # Errors
    ///
    /// Returns the transport's error unchanged.
    pub async fn open(&self) -> Result<(), ProtocolError> {
        self.command("ShutterOpen", "").await
    }

    /// Closes the shutter.
    ///
    /// # Errors
    ///
    /// Returns the transport's error unchanged.
    pub async fn close(&self) -> Result<(), ProtocolError> {
        self.command("ShutterClose", "").await
    }

    /// Stops shutter movement.
    ///
    /// # Errors
    ///
    /// Returns the transport's error unchanged.
    pub async fn stop(&self) -> Result<(), ProtocolError> {
        self.command("ShutterStop", "").await
    }

    /// Moves the shutter to a position, 0 closed to 100 fully open.
    ///
    /// # Errors
    ///
    /// Returns the transport's error unchanged.
    pub async fn set_position(&self, position: u8) -> Result<(), ProtocolError> {
        let position = if self.cfg.inverted {
            100 - i64::from(position.min(100))
        } else {
            i64::from(position.min(100))
        };
        self.command("ShutterPosition", &position.to_string()).await
    }

    /// Moves the tilt to a position, 0 closed to 100 fully open.
    ///
    /// # Errors
    ///
    /// Returns the transport's error unchanged.
    #[allow(clippy::cast_possible_truncation)]
    pub async fn set_tilt_position(&self, tilt: u8) -> Result<(), ProtocolError> {
        let span = f64::from(self.cfg.tilt_max - self.cfg.tilt_min);
        let device_tilt = f64::from(self.cfg.tilt_min) + f64::from(tilt.min(100)) * span / 100.0;
        self.command("ShutterTilt", &(device_tilt.round() as i64).to_string())
            .await
    }

    async fn command(&self, command: &str, payload: &str) -> Result<(), ProtocolError> {
        self.client
            .publish(
                &format!("{}{command}{}", self.cfg.command_topic, self.cfg.idx + 1),
                payload,
                0,
                false,
            )
            .await
    }
}

impl std::fmt::Debug for TasmotaShutter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TasmotaShutter")
            .field("unique_id", &self.unique_id())
            .field("inverted", &self.cfg.inverted)
            .finish()
    }
}

fn shutter_state_handler(
    cfg: TasmotaShutterConfig,
    on_state: Arc<RwLock<Option<ShutterCallback>>>,
) -> crate::mqtt::MessageHandler {
    Arc::new(move |msg| {
        let Some(json) = parse_json(&msg.payload) else {
            return;
        };

        let shutter_key = format!("Shutter{}", cfg.idx + 1);
        let mut path: Vec<PathNode> = Vec::new();
        if msg.topic == cfg.status_topic {
            path.push(PathNode::key("StatusSNS"));
        }
        path.push(PathNode::key(&shutter_key));

        let lookup = |leaf: &str| {
            let mut path = path.clone();
            path.push(PathNode::key(leaf));
            get_value_by_path(&json, &path).cloned()
        };

        let update = ShutterUpdate {
            direction: lookup("Direction")
                .and_then(|v| v.as_i64())
                .map(|direction| if cfg.inverted { -direction } else { direction }),
            position: lookup("Position")
                .and_then(|v| v.as_i64())
                .map(|position| if cfg.inverted { 100 - position } else { position }),
            tilt: lookup("Tilt").and_then(|v| v.as_i64()).and_then(|tilt| {
                let span = i64::from(cfg.tilt_max - cfg.tilt_min);
                if span == 0 {
                    return None;
                }
                #[allow(clippy::cast_precision_loss)]
                Some((tilt - i64::from(cfg.tilt_min)) as f64 * 100.0 / span as f64)
            }),
        };

        if (update.direction.is_some() || update.position.is_some() || update.tilt.is_some())
            && let Some(callback) = on_state.read().as_ref()
        {
            callback(&update);
        }
    })
}
