// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fan entity backed by an iFan controller.
//!
//! iFan devices expose exactly one fan with four speeds (0 = off). Speed
//! values outside that range in telemetry are dropped.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::availability::{AvailabilityConfig, AvailabilityHandle};
use crate::device::DeviceDescriptor;
use crate::entity::{EntityCommon, EntityIndex, Platform};
use crate::error::ProtocolError;
use crate::mqtt::{Subscription, TasmotaMqttClient, TopicMap, TopicSlot};
use crate::payload::{PathNode, get_value_by_path, parse_json};
use crate::topics;

/// Speeds an iFan accepts, 0 meaning off.
pub const SUPPORTED_FAN_SPEEDS: [u8; 4] = [0, 1, 2, 3];

/// Immutable configuration of the fan entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TasmotaFanConfig {
    /// Fields shared by all entities.
    pub common: EntityCommon,
    /// Availability wiring.
    pub availability: AvailabilityConfig,
    /// Command topic root.
    pub command_topic: String,
    /// Command result topic.
    pub result_topic: String,
    /// Periodic state telemetry topic.
    pub state_topic: String,
}

impl TasmotaFanConfig {
    /// Derives the fan config of an iFan device.
    #[must_use]
    pub fn from_discovery(device: &DeviceDescriptor) -> Self {
        Self {
            common: EntityCommon {
                endpoint: "fan",
                index: EntityIndex::Named("ifan".to_string()),
                friendly_name: None,
                mac: device.mac.clone(),
                platform: Platform::Fan,
                poll_topic: topics::command_state_topic(device),
                poll_payload: String::new(),
            },
            availability: AvailabilityConfig::from_device(device),
            command_topic: topics::command_topic(device),
            result_topic: topics::stat_result_topic(device),
            state_topic: topics::tele_state_topic(device),
        }
    }
}

/// Callback invoked with a reported fan speed.
pub type FanCallback = Box<dyn Fn(u8) + Send + Sync>;

/// Runtime representation of the fan entity.
pub struct TasmotaFan {
    cfg: TasmotaFanConfig,
    client: Arc<TasmotaMqttClient>,
    availability: AvailabilityHandle,
    on_state: Arc<RwLock<Option<FanCallback>>>,
    sub_state: tokio::sync::Mutex<Option<Subscription>>,
}

impl TasmotaFan {
    /// Creates the runtime entity for a fan config.
    #[must_use]
    pub fn new(cfg: TasmotaFanConfig, client: Arc<TasmotaMqttClient>) -> Self {
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
    pub fn config(&self) -> &TasmotaFanConfig {
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

    /// Sets the callback fired on reported speed changes.
    pub fn set_on_state<F>(&self, callback: F)
    where
        F: Fn(u8) + Send + Sync + 'static,
    {
        *self.on_state.write() = Some(Box::new(callback));
    }

    /// Requests a debounced state re-poll.
    pub fn poll_status(&self) {
        self.availability.poll_status();
    }

    /// Subscribes the result, state and availability topics.
    ///
    /// # Errors
    ///
    /// Returns the transport's error unchanged.
    pub async fn subscribe_topics(&self) -> Result<(), ProtocolError> {
        let on_state = Arc::clone(&self.on_state);
        let handler: crate::mqtt::MessageHandler = Arc::new(move |msg| {
            let Some(json) = parse_json(&msg.payload) else {
                return;
            };
            let Some(speed) = get_value_by_path(&json, &[PathNode::key(topics::COMMAND_FANSPEED)])
                .and_then(serde_json::Value::as_u64)
                .and_then(|speed| u8::try_from(speed).ok())
            else {
                return;
            };
            if SUPPORTED_FAN_SPEEDS.contains(&speed)
                && let Some(callback) = on_state.read().as_ref()
            {
                callback(speed);
            }
        });

        let mut map = TopicMap::new();
        map.insert(TopicSlot::Result, self.cfg.result_topic.clone(), Arc::clone(&handler));
        map.insert(TopicSlot::State, self.cfg.state_topic.clone(), handler);
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

    /// Sets the fan speed.
    ///
    /// # Errors
    ///
    /// Returns the transport's error unchanged; out-of-range speeds are
    /// rejected before touching the transport.
    pub async fn set_speed(&self, speed: u8) -> Result<(), ProtocolError> {
        if !SUPPORTED_FAN_SPEEDS.contains(&speed) {
            return Err(ProtocolError::Transport(format!(
                "unsupported fan speed {speed}"
            )));
        }
        self.client
            .publish(
                &format!("{}{}", self.cfg.command_topic, topics::COMMAND_FANSPEED),
                &speed.to_string(),
                0,
                false,
            )
            .await
    }
}

impl std::fmt::Debug for TasmotaFan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TasmotaFan")
            .field("unique_id", &self.unique_id())
            .finish()
    }
}
