// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Automation triggers backed by buttons and switches.
//!
//! With `SetOption73` (buttons) or detached switch modes, the device
//! publishes press events to `stat/RESULT` as
//! `{"Button1": {"Action": "SINGLE"}}`. Each possible event becomes one
//! trigger config; inactive events are still listed so the host can
//! retire triggers that a reconfiguration disabled.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::device::DeviceDescriptor;
use crate::error::ProtocolError;
use crate::mqtt::{Subscription, TasmotaMqttClient, TopicMap, TopicSlot};
use crate::payload::{PathNode, get_value_by_path_str};
use crate::topics;

/// Trigger type reported for an ignored event.
pub const TRIGGER_NONE: &str = "none";
/// Short press trigger type.
pub const TRIGGER_SHORT_PRESS: &str = "button_short_press";
/// Double press trigger type.
pub const TRIGGER_DOUBLE_PRESS: &str = "button_double_press";
/// Triple press trigger type.
pub const TRIGGER_TRIPLE_PRESS: &str = "button_triple_press";
/// Quadruple press trigger type.
pub const TRIGGER_QUADRUPLE_PRESS: &str = "button_quadruple_press";
/// Quintuple press trigger type.
pub const TRIGGER_QUINTUPLE_PRESS: &str = "button_quintuple_press";
/// Long press trigger type.
pub const TRIGGER_LONG_PRESS: &str = "button_long_press";

/// Where a trigger originates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerSource {
    /// Physical button.
    Button,
    /// Switch input.
    Switch,
}

impl std::fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Button => f.write_str("button"),
            Self::Switch => f.write_str("switch"),
        }
    }
}

/// Immutable configuration of one trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TasmotaTriggerConfig {
    /// Device MAC.
    pub mac: String,
    /// Event literal reported in the `Action` field.
    pub event: String,
    /// Slot index of the backing button or switch.
    pub idx: usize,
    /// Where the trigger originates.
    pub source: TriggerSource,
    /// Host-facing subtype, e.g. `button_1`.
    pub subtype: String,
    /// Topic the event arrives on.
    pub trigger_topic: String,
    /// Host-facing trigger type, [`TRIGGER_NONE`] when disabled.
    pub trigger_type: &'static str,
    /// JSON key the event is reported under.
    pub(crate) match_key: String,
}

impl TasmotaTriggerConfig {
    /// Returns whether this trigger is currently enabled.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.trigger_type != TRIGGER_NONE
    }

    /// Returns the trigger's stable id.
    #[must_use]
    pub fn trigger_id(&self) -> String {
        format!("{}_{}_{}_{}", self.mac, self.source, self.idx + 1, self.event)
    }
}

/// Button press events, in the order the firmware names them.
const BUTTON_EVENTS: [&str; 6] = ["SINGLE", "DOUBLE", "TRIPLE", "QUAD", "PENTA", "HOLD"];

fn button_trigger_types(device: &DeviceDescriptor, idx: usize) -> [&'static str; 6] {
    let enabled =
        device.options.mqtt_buttons != 0 && device.buttons.get(idx).copied().unwrap_or(0) != 0;
    if !enabled {
        return [TRIGGER_NONE; 6];
    }
    if device.options.button_single != 0 {
        // Immediate action: only single press fires.
        return [
            TRIGGER_SHORT_PRESS,
            TRIGGER_NONE,
            TRIGGER_NONE,
            TRIGGER_NONE,
            TRIGGER_NONE,
            TRIGGER_NONE,
        ];
    }
    if device.options.button_swap != 0 {
        return [
            TRIGGER_DOUBLE_PRESS,
            TRIGGER_SHORT_PRESS,
            TRIGGER_TRIPLE_PRESS,
            TRIGGER_QUADRUPLE_PRESS,
            TRIGGER_QUINTUPLE_PRESS,
            TRIGGER_LONG_PRESS,
        ];
    }
    [
        TRIGGER_SHORT_PRESS,
        TRIGGER_DOUBLE_PRESS,
        TRIGGER_TRIPLE_PRESS,
        TRIGGER_QUADRUPLE_PRESS,
        TRIGGER_QUINTUPLE_PRESS,
        TRIGGER_LONG_PRESS,
    ]
}

/// Generates the trigger configs for button slot `idx`.
#[must_use]
pub fn get_button_triggers(device: &DeviceDescriptor, idx: usize) -> Vec<TasmotaTriggerConfig> {
    let types = button_trigger_types(device, idx);
    BUTTON_EVENTS
        .iter()
        .zip(types)
        .map(|(event, trigger_type)| TasmotaTriggerConfig {
            mac: device.mac.clone(),
            event: (*event).to_string(),
            idx,
            source: TriggerSource::Button,
            subtype: format!("button_{}", idx + 1),
            trigger_topic: topics::stat_result_topic(device),
            trigger_type,
            match_key: format!("Button{}", idx + 1),
        })
        .collect()
}

/// Generates every trigger config a device announces.
#[must_use]
pub fn get_triggers(device: &DeviceDescriptor) -> Vec<TasmotaTriggerConfig> {
    let mut triggers = Vec::new();
    for idx in 0..device.buttons.len() {
        triggers.extend(get_button_triggers(device, idx));
    }
    for idx in 0..device.switch_modes.len() {
        triggers.extend(crate::switch::get_switch_triggers(device, idx));
    }
    triggers
}

/// Callback invoked when the configured event fires.
pub type TriggerCallback = Box<dyn Fn() + Send + Sync>;

/// Runtime representation of one trigger.
pub struct TasmotaTrigger {
    cfg: TasmotaTriggerConfig,
    client: Arc<TasmotaMqttClient>,
    on_trigger: Arc<RwLock<Option<TriggerCallback>>>,
    sub_state: tokio::sync::Mutex<Option<Subscription>>,
}

impl TasmotaTrigger {
    /// Creates the runtime entity for a trigger config.
    #[must_use]
    pub fn new(cfg: TasmotaTriggerConfig, client: Arc<TasmotaMqttClient>) -> Self {
        Self {
            cfg,
            client,
            on_trigger: Arc::new(RwLock::new(None)),
            sub_state: tokio::sync::Mutex::new(None),
        }
    }

    /// Returns the trigger's immutable config.
    #[must_use]
    pub fn config(&self) -> &TasmotaTriggerConfig {
        &self.cfg
    }

    /// Sets the callback fired when the event arrives.
    pub fn set_on_trigger<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.on_trigger.write() = Some(Box::new(callback));
    }

    /// Subscribes the trigger topic.
    ///
    /// # Errors
    ///
    /// Returns the transport's error unchanged.
    pub async fn subscribe_topics(&self) -> Result<(), ProtocolError> {
        let cfg = self.cfg.clone();
        let on_trigger = Arc::clone(&self.on_trigger);
        let mut map = TopicMap::new();
        map.insert(
            TopicSlot::Trigger,
            self.cfg.trigger_topic.clone(),
            Arc::new(move |msg| {
                let action = get_value_by_path_str(
                    &msg.payload,
                    &[PathNode::key(&cfg.match_key), PathNode::key("Action")],
                );
                if action.as_ref().and_then(serde_json::Value::as_str) == Some(cfg.event.as_str())
                    && let Some(callback) = on_trigger.read().as_ref()
                {
                    callback();
                }
            }),
        );

        let mut sub = self.sub_state.lock().await;
        *sub = Some(self.client.subscribe(sub.take(), map).await?);
        Ok(())
    }

    /// Unsubscribes the trigger topic.
    ///
    /// # Errors
    ///
    /// Returns the transport's error unchanged.
    pub async fn unsubscribe_topics(&self) -> Result<(), ProtocolError> {
        let mut sub = self.sub_state.lock().await;
        *sub = Some(self.client.unsubscribe(sub.take()).await?);
        Ok(())
    }
}

impl std::fmt::Debug for TasmotaTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TasmotaTrigger")
            .field("trigger_id", &self.cfg.trigger_id())
            .finish()
    }
}
