// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fixed per-device status sensors.
//!
//! Every device gets the same set of diagnostic sensors: network identity,
//! signal quality, connection counters, firmware version and restart
//! bookkeeping. Values come from two places, routed by topic: the periodic
//! `tele/STATE` message and the polled `stat/STATUS<n>` responses.
//!
//! Values that only change across reboots are single-shot: after the first
//! reading the entity drops its state topics and keeps only availability,
//! re-arming on the next online edge.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use crate::availability::{AvailabilityCallback, AvailabilityConfig, AvailabilityState, AvailabilityTracker, is_deep_sleep_wake};
use crate::device::DeviceDescriptor;
use crate::entity::{DiscoveryHash, EntityCommon, EntityIndex, Platform};
use crate::error::ProtocolError;
use crate::mqtt::{Subscription, TasmotaMqttClient, TopicMap, TopicSlot};
use crate::payload::{PathNode, get_value_by_path, parse_json};
use crate::topics;

/// One of the fixed diagnostic sensors every device exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusSensorKind {
    /// Device IP address, reported once from discovery data.
    Ip,
    /// Absolute time of the last restart, derived from the uptime counter.
    LastRestartTime,
    /// WiFi connect count.
    LinkCount,
    /// MQTT connect count.
    MqttCount,
    /// Reason of the last restart.
    RestartReason,
    /// WiFi signal quality in percent.
    Rssi,
    /// WiFi signal strength in dBm.
    Signal,
    /// SSID the device is connected to.
    Ssid,
    /// Firmware version.
    Version,
    /// Battery level in percent.
    BatteryPercentage,
}

impl StatusSensorKind {
    /// Returns the sensors a device exposes.
    #[must_use]
    pub fn for_device(device: &DeviceDescriptor) -> Vec<Self> {
        let mut kinds = vec![
            Self::Ip,
            Self::LastRestartTime,
            Self::LinkCount,
            Self::MqttCount,
            Self::RestartReason,
            Self::Rssi,
            Self::Signal,
            Self::Ssid,
            Self::Version,
        ];
        if device.battery != 0 {
            kinds.push(Self::BatteryPercentage);
        }
        kinds
    }

    /// Returns the stable key used in hashes and unique ids.
    #[must_use]
    pub const fn key(&self) -> &'static str {
        match self {
            Self::Ip => "status_ip",
            Self::LastRestartTime => "last_restart_time",
            Self::LinkCount => "status_link_count",
            Self::MqttCount => "status_mqtt_count",
            Self::RestartReason => "status_restart_reason",
            Self::Rssi => "status_rssi",
            Self::Signal => "status_signal",
            Self::Ssid => "status_ssid",
            Self::Version => "status_version",
            Self::BatteryPercentage => "status_battery_percentage",
        }
    }

    /// Returns the display name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Ip => "IP",
            Self::LastRestartTime => "Last Restart Time",
            Self::LinkCount => "WiFi Connect Count",
            Self::MqttCount => "MQTT Connect Count",
            Self::RestartReason => "Restart Reason",
            Self::Rssi => "RSSI",
            Self::Signal => "Signal",
            Self::Ssid => "SSID",
            Self::Version => "Firmware Version",
            Self::BatteryPercentage => "Battery Level",
        }
    }

    /// Returns the unit of the reported value.
    #[must_use]
    pub const fn unit(&self) -> Option<&'static str> {
        match self {
            Self::Rssi | Self::BatteryPercentage => Some("%"),
            Self::Signal => Some("dBm"),
            _ => None,
        }
    }

    /// Returns whether the value only changes across reboots.
    #[must_use]
    pub const fn single_shot(&self) -> bool {
        matches!(self, Self::LastRestartTime | Self::RestartReason | Self::Version)
    }

    /// Returns the value's path inside `tele/STATE` payloads.
    #[must_use]
    pub fn state_path(&self) -> Option<&'static [&'static str]> {
        match self {
            Self::LinkCount => Some(&["Wifi", "LinkCount"]),
            Self::MqttCount => Some(&["MqttCount"]),
            Self::BatteryPercentage => Some(&["BatteryPercentage"]),
            Self::Rssi => Some(&["Wifi", "RSSI"]),
            Self::Signal => Some(&["Wifi", "Signal"]),
            _ => None,
        }
    }

    /// Returns the value's path inside the polled status response.
    #[must_use]
    pub fn status_path(&self) -> Option<&'static [&'static str]> {
        match self {
            Self::Ip => None,
            Self::LastRestartTime => Some(&["StatusSTS", "UptimeSec"]),
            Self::LinkCount => Some(&["StatusSTS", "Wifi", "LinkCount"]),
            Self::MqttCount => Some(&["StatusSTS", "MqttCount"]),
            Self::RestartReason => Some(&["StatusPRM", "RestartReason"]),
            Self::Rssi => Some(&["StatusSTS", "Wifi", "RSSI"]),
            Self::Signal => Some(&["StatusSTS", "Wifi", "Signal"]),
            Self::Ssid => Some(&["StatusSTS", "Wifi", "SSId"]),
            Self::Version => Some(&["StatusFWR", "Version"]),
            Self::BatteryPercentage => Some(&["StatusSTS", "BatteryPercentage"]),
        }
    }

    /// Returns the `STATUS<n>` poll number carrying the value.
    #[must_use]
    pub const fn status_number(&self) -> Option<u8> {
        match self {
            Self::Ip => None,
            Self::RestartReason => Some(1),
            Self::Version => Some(2),
            _ => Some(11),
        }
    }
}

/// Immutable configuration of one status sensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TasmotaStatusSensorConfig {
    /// Fields shared by all entities.
    pub common: EntityCommon,
    /// Availability wiring.
    pub availability: AvailabilityConfig,
    /// Which diagnostic this sensor reports.
    pub kind: StatusSensorKind,
    /// A value known at discovery time, reported on subscribe.
    pub fixed_state: Option<String>,
    /// Periodic state telemetry topic.
    pub state_topic: String,
    /// Polled status response topic, when the kind has one.
    pub status_topic: Option<String>,
}

impl TasmotaStatusSensorConfig {
    /// Derives the config of one status sensor.
    #[must_use]
    pub fn from_discovery(device: &DeviceDescriptor, kind: StatusSensorKind) -> Self {
        Self {
            common: EntityCommon {
                endpoint: "status_sensor",
                index: EntityIndex::Named(kind.key().to_string()),
                friendly_name: Some(kind.name().to_string()),
                mac: device.mac.clone(),
                platform: Platform::StatusSensor,
                poll_topic: topics::command_status_topic(device),
                poll_payload: kind
                    .status_number()
                    .map_or(String::new(), |n| n.to_string()),
            },
            availability: AvailabilityConfig::from_device(device),
            kind,
            fixed_state: (kind == StatusSensorKind::Ip).then(|| device.ip.clone()),
            state_topic: topics::tele_state_topic(device),
            status_topic: kind
                .status_number()
                .map(|n| topics::stat_status_topic(device, Some(n))),
        }
    }
}

/// Generates the fixed status sensor list for a device.
#[must_use]
pub fn get_status_sensor_entities(
    device: &DeviceDescriptor,
) -> Vec<(TasmotaStatusSensorConfig, DiscoveryHash)> {
    StatusSensorKind::for_device(device)
        .into_iter()
        .map(|kind| {
            let hash = DiscoveryHash {
                mac: device.mac.clone(),
                platform: Platform::StatusSensor,
                kind: "status_sensor",
                id: EntityIndex::Named(kind.key().to_string()),
            };
            (TasmotaStatusSensorConfig::from_discovery(device, kind), hash)
        })
        .collect()
}

/// Callback invoked with a new diagnostic value.
pub type StatusSensorCallback = Box<dyn Fn(&Value) + Send + Sync>;

struct StatusCtx {
    cfg: TasmotaStatusSensorConfig,
    client: Arc<TasmotaMqttClient>,
    sub_state: tokio::sync::Mutex<Option<Subscription>>,
    tracker: Mutex<AvailabilityTracker>,
    on_state: RwLock<Option<StatusSensorCallback>>,
    on_availability: RwLock<Option<AvailabilityCallback>>,
}

/// Runtime representation of one status sensor.
pub struct TasmotaStatusSensor {
    ctx: Arc<StatusCtx>,
}

impl TasmotaStatusSensor {
    /// Creates the runtime entity for a status sensor config.
    #[must_use]
    pub fn new(cfg: TasmotaStatusSensorConfig, client: Arc<TasmotaMqttClient>) -> Self {
        let tracker = AvailabilityTracker::new(
            cfg.availability.payload_online.clone(),
            cfg.availability.payload_offline.clone(),
        );
        Self {
            ctx: Arc::new(StatusCtx {
                cfg,
                client,
                sub_state: tokio::sync::Mutex::new(None),
                tracker: Mutex::new(tracker),
                on_state: RwLock::new(None),
                on_availability: RwLock::new(None),
            }),
        }
    }

    /// Returns the entity's immutable config.
    #[must_use]
    pub fn config(&self) -> &TasmotaStatusSensorConfig {
        &self.ctx.cfg
    }

    /// Returns the entity's unique id.
    #[must_use]
    pub fn unique_id(&self) -> String {
        self.ctx.cfg.common.unique_id()
    }

    /// Returns the current availability.
    #[must_use]
    pub fn availability_state(&self) -> AvailabilityState {
        self.ctx.tracker.lock().state()
    }

    /// Returns whether the entity is flagged as deep-sleeping.
    #[must_use]
    pub fn deep_sleep(&self) -> bool {
        self.ctx.tracker.lock().deep_sleep()
    }

    /// Sets the callback fired on new diagnostic values.
    pub fn set_on_state<F>(&self, callback: F)
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        *self.ctx.on_state.write() = Some(Box::new(callback));
    }

    /// Sets the callback fired on availability edges.
    pub fn set_on_availability<F>(&self, callback: F)
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        *self.ctx.on_availability.write() = Some(Box::new(callback));
    }

    /// Requests a debounced status re-poll.
    pub fn poll_status(&self) {
        let cfg = &self.ctx.cfg;
        self.ctx
            .client
            .publish_debounced(&cfg.common.poll_topic, &cfg.common.poll_payload, 0, false);
    }

    /// Subscribes the state, status and availability topics.
    ///
    /// A discovery-time value (the IP sensor) is reported immediately.
    ///
    /// # Errors
    ///
    /// Returns the transport's error unchanged.
    pub async fn subscribe_topics(&self) -> Result<(), ProtocolError> {
        resubscribe_full(Arc::clone(&self.ctx)).await?;
        if let Some(fixed) = &self.ctx.cfg.fixed_state
            && let Some(callback) = self.ctx.on_state.read().as_ref()
        {
            callback(&Value::String(fixed.clone()));
        }
        Ok(())
    }

    /// Unsubscribes every topic of this entity.
    ///
    /// # Errors
    ///
    /// Returns the transport's error unchanged.
    pub async fn unsubscribe_topics(&self) -> Result<(), ProtocolError> {
        let mut sub = self.ctx.sub_state.lock().await;
        *sub = Some(self.ctx.client.unsubscribe(sub.take()).await?);
        Ok(())
    }
}

impl std::fmt::Debug for TasmotaStatusSensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TasmotaStatusSensor")
            .field("unique_id", &self.unique_id())
            .field("kind", &self.ctx.cfg.kind)
            .finish()
    }
}

async fn resubscribe_full(ctx: Arc<StatusCtx>) -> Result<(), ProtocolError> {
    let map = full_topic_map(&ctx);
    let mut sub = ctx.sub_state.lock().await;
    *sub = Some(ctx.client.subscribe(sub.take(), map).await?);
    Ok(())
}

/// Drops the state topics, keeping availability armed.
async fn drop_state_topics(ctx: Arc<StatusCtx>) -> Result<(), ProtocolError> {
    let mut map = TopicMap::new();
    availability_entries(&ctx, &mut map);
    let mut sub = ctx.sub_state.lock().await;
    *sub = Some(ctx.client.subscribe(sub.take(), map).await?);
    Ok(())
}

fn full_topic_map(ctx: &Arc<StatusCtx>) -> TopicMap {
    let mut map = TopicMap::new();
    let kind = ctx.cfg.kind;
    if kind.state_path().is_some() {
        map.insert(
            TopicSlot::State,
            ctx.cfg.state_topic.clone(),
            state_handler(Arc::clone(ctx)),
        );
    }
    if let (Some(topic), Some(number)) = (&ctx.cfg.status_topic, kind.status_number()) {
        map.insert(
            TopicSlot::Status(number),
            topic.clone(),
            state_handler(Arc::clone(ctx)),
        );
    }
    availability_entries(ctx, &mut map);
    map
}

fn availability_entries(ctx: &Arc<StatusCtx>, map: &mut TopicMap) {
    let handler_ctx = Arc::clone(ctx);
    map.insert(
        TopicSlot::Availability,
        ctx.cfg.availability.topic.clone(),
        Arc::new(move |msg| {
            let update = handler_ctx.tracker.lock().handle_payload(&msg.payload);
            if update.poll {
                let cfg = &handler_ctx.cfg.common;
                handler_ctx
                    .client
                    .publish_debounced(&cfg.poll_topic, &cfg.poll_payload, 0, false);
                // Re-arm single-shot topics dropped after the last value.
                tokio::spawn(log_subscribe_error(resubscribe_full(Arc::clone(&handler_ctx))));
            }
            if let Some(online) = update.changed
                && let Some(callback) = handler_ctx.on_availability.read().as_ref()
            {
                callback(online);
            }
        }),
    );

    let handler_ctx = Arc::clone(ctx);
    map.insert(
        TopicSlot::BootInfo,
        ctx.cfg.availability.boot_info_topic.clone(),
        Arc::new(move |msg| {
            let Some(json) = parse_json(&msg.payload) else {
                return;
            };
            let reason = get_value_by_path(&json, &[PathNode::key("Info3"), PathNode::key("RestartReason")])
                .or_else(|| get_value_by_path(&json, &[PathNode::key("RestartReason")]))
                .and_then(Value::as_str);
            if let Some(reason) = reason
                && handler_ctx.tracker.lock().note_restart_reason(reason)
            {
                tracing::info!(reason = %reason, "Entity flagged as deep-sleeping");
            }
        }),
    );
}

async fn log_subscribe_error(
    result: impl std::future::Future<Output = Result<(), ProtocolError>>,
) {
    if let Err(err) = result.await {
        tracing::warn!(error = %err, "Status sensor resubscribe failed");
    }
}

fn state_handler(ctx: Arc<StatusCtx>) -> crate::mqtt::MessageHandler {
    Arc::new(move |msg| {
        let Some(json) = parse_json(&msg.payload) else {
            return;
        };
        let kind = ctx.cfg.kind;

        let path = if msg.topic == ctx.cfg.state_topic {
            kind.state_path()
        } else {
            kind.status_path()
        };
        let Some(path) = path else {
            return;
        };
        let path: Vec<PathNode> = path.iter().map(|key| PathNode::key(*key)).collect();
        let Some(state) = get_value_by_path(&json, &path) else {
            return;
        };

        if kind == StatusSensorKind::RestartReason
            && let Some(reason) = state.as_str()
            && is_deep_sleep_wake(reason)
            && ctx.tracker.lock().note_restart_reason(reason)
        {
            tracing::info!(reason = %reason, "Entity flagged as deep-sleeping");
        }

        if kind.single_shot() {
            tokio::spawn(log_subscribe_error(drop_state_topics(Arc::clone(&ctx))));
        }

        let value = if kind == StatusSensorKind::LastRestartTime {
            let Some(uptime) = state.as_i64() else {
                return;
            };
            Value::String((Utc::now() - chrono::Duration::seconds(uptime)).to_rfc3339())
        } else {
            state.clone()
        };

        if let Some(callback) = ctx.on_state.read().as_ref() {
            callback(&value);
        }
    })
}
