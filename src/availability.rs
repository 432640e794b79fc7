// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-entity availability inference with deep-sleep suppression.
//!
//! Tasmota signals availability through a retained last-will topic carrying
//! configurable "online"/"offline" literals. Deep-sleeping devices publish
//! "offline" on every sleep cycle, which is expected behavior rather than a
//! fault, so the tracker suppresses offline transitions once a device has
//! been observed waking from deep sleep.
//!
//! Deep sleep is inferred, never configured: the boot info telemetry topic
//! carries the restart reason, and the first deep-sleep wake permanently
//! flips the entity's flag.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};

use crate::mqtt::{TasmotaMqttClient, TopicMap, TopicSlot};
use crate::payload::{PathNode, get_value_by_path, parse_json};

/// Availability of one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AvailabilityState {
    /// No availability message seen yet.
    #[default]
    Unknown,
    /// The device announced itself online.
    Online,
    /// The device announced itself offline.
    Offline,
}

/// Topics and literals an entity needs to track availability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityConfig {
    /// Last-will topic.
    pub topic: String,
    /// Literal announcing the device online.
    pub payload_online: String,
    /// Literal announcing the device offline.
    pub payload_offline: String,
    /// Boot info telemetry topic carrying the restart reason.
    pub boot_info_topic: String,
}

impl AvailabilityConfig {
    /// Derives the availability wiring from a device descriptor.
    #[must_use]
    pub fn from_device(device: &crate::device::DeviceDescriptor) -> Self {
        Self {
            topic: crate::topics::tele_will_topic(device),
            payload_online: device.online.clone(),
            payload_offline: device.offline.clone(),
            boot_info_topic: crate::topics::tele_info3_topic(device),
        }
    }
}

/// Result of feeding one availability payload to the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AvailabilityUpdate {
    /// The device reported online; trigger a status re-poll.
    pub poll: bool,
    /// The availability value changed; `Some(new value)` on an edge only.
    pub changed: Option<bool>,
}

/// Edge-triggered availability state machine for one entity.
#[derive(Debug)]
pub struct AvailabilityTracker {
    state: AvailabilityState,
    deep_sleep: bool,
    last_seen: Option<DateTime<Utc>>,
    payload_online: String,
    payload_offline: String,
}

impl AvailabilityTracker {
    /// Creates a tracker matching the given literals.
    #[must_use]
    pub fn new(payload_online: impl Into<String>, payload_offline: impl Into<String>) -> Self {
        Self {
            state: AvailabilityState::Unknown,
            deep_sleep: false,
            last_seen: None,
            payload_online: payload_online.into(),
            payload_offline: payload_offline.into(),
        }
    }

    /// Feeds one payload from the availability topic.
    ///
    /// An online literal always requests a re-poll, even without an edge;
    /// the device may have lost state across a reconnect. An offline
    /// literal is ignored entirely once the deep-sleep flag is set.
    /// Anything else is left alone.
    pub fn handle_payload(&mut self, payload: &str) -> AvailabilityUpdate {
        if payload == self.payload_online {
            self.last_seen = Some(Utc::now());
            let changed = (self.state != AvailabilityState::Online).then_some(true);
            self.state = AvailabilityState::Online;
            return AvailabilityUpdate { poll: true, changed };
        }
        if payload == self.payload_offline {
            if self.deep_sleep {
                tracing::debug!("Suppressing offline transition for deep-sleep entity");
                return AvailabilityUpdate::default();
            }
            let changed = (self.state != AvailabilityState::Offline).then_some(false);
            self.state = AvailabilityState::Offline;
            return AvailabilityUpdate { poll: false, changed };
        }
        AvailabilityUpdate::default()
    }

    /// Feeds a restart reason observed on the boot info topic.
    ///
    /// Returns `true` when the deep-sleep flag flips; the flag never
    /// clears for the lifetime of the entity.
    pub fn note_restart_reason(&mut self, reason: &str) -> bool {
        if !self.deep_sleep && is_deep_sleep_wake(reason) {
            self.deep_sleep = true;
            return true;
        }
        false
    }

    /// Returns the current availability.
    #[must_use]
    pub fn state(&self) -> AvailabilityState {
        self.state
    }

    /// Returns whether the entity is flagged as deep-sleeping.
    #[must_use]
    pub fn deep_sleep(&self) -> bool {
        self.deep_sleep
    }

    /// Returns when the device last reported online.
    #[must_use]
    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.last_seen
    }
}

/// Returns whether a restart reason string reports a deep-sleep wake.
///
/// ESP8266 reports "Deep-Sleep Wake", ESP32 builds "Deep Sleep Wake".
#[must_use]
pub fn is_deep_sleep_wake(reason: &str) -> bool {
    let reason = reason.to_ascii_lowercase();
    reason.contains("deep sleep wake") || reason.contains("deep-sleep wake")
}

/// Callback invoked on availability edges with the new value.
pub type AvailabilityCallback = Box<dyn Fn(bool) + Send + Sync>;

/// The availability sub-object entities embed.
///
/// Bundles the tracker with its topic wiring: the last-will topic feeds
/// [`AvailabilityTracker::handle_payload`], the boot info topic feeds
/// [`AvailabilityTracker::note_restart_reason`], and online literals
/// trigger a debounced re-poll of the entity's poll topic.
pub struct AvailabilityHandle {
    client: Arc<TasmotaMqttClient>,
    config: AvailabilityConfig,
    poll_topic: String,
    poll_payload: String,
    tracker: Arc<Mutex<AvailabilityTracker>>,
    on_change: Arc<RwLock<Option<AvailabilityCallback>>>,
}

impl AvailabilityHandle {
    /// Creates the handle for one entity.
    #[must_use]
    pub fn new(
        client: Arc<TasmotaMqttClient>,
        config: AvailabilityConfig,
        poll_topic: impl Into<String>,
        poll_payload: impl Into<String>,
    ) -> Self {
        let tracker = AvailabilityTracker::new(
            config.payload_online.clone(),
            config.payload_offline.clone(),
        );
        Self {
            client,
            config,
            poll_topic: poll_topic.into(),
            poll_payload: poll_payload.into(),
            tracker: Arc::new(Mutex::new(tracker)),
            on_change: Arc::new(RwLock::new(None)),
        }
    }

    /// Sets the callback fired on availability edges.
    pub fn set_on_change<F>(&self, callback: F)
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        *self.on_change.write() = Some(Box::new(callback));
    }

    /// Returns the current availability.
    #[must_use]
    pub fn state(&self) -> AvailabilityState {
        self.tracker.lock().state()
    }

    /// Returns whether the entity is flagged as deep-sleeping.
    #[must_use]
    pub fn deep_sleep(&self) -> bool {
        self.tracker.lock().deep_sleep()
    }

    /// Returns when the device last reported online.
    #[must_use]
    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.tracker.lock().last_seen()
    }

    /// Requests a debounced status re-poll.
    pub fn poll_status(&self) {
        self.client
            .publish_debounced(&self.poll_topic, &self.poll_payload, 0, false);
    }

    /// Adds the availability and boot info topics to an entity's map.
    pub(crate) fn fill_topic_map(&self, map: &mut TopicMap) {
        let tracker = Arc::clone(&self.tracker);
        let on_change = Arc::clone(&self.on_change);
        let client = Arc::clone(&self.client);
        let poll_topic = self.poll_topic.clone();
        let poll_payload = self.poll_payload.clone();
        map.insert(
            TopicSlot::Availability,
            self.config.topic.clone(),
            Arc::new(move |msg| {
                let update = tracker.lock().handle_payload(&msg.payload);
                if update.poll {
                    client.publish_debounced(&poll_topic, &poll_payload, 0, false);
                }
                if let Some(online) = update.changed
                    && let Some(callback) = on_change.read().as_ref()
                {
                    callback(online);
                }
            }),
        );

        let tracker = Arc::clone(&self.tracker);
        map.insert(
            TopicSlot::BootInfo,
            self.config.boot_info_topic.clone(),
            Arc::new(move |msg| {
                let Some(json) = parse_json(&msg.payload) else {
                    tracing::warn!(topic = %msg.topic, "Invalid boot info payload");
                    return;
                };
                let reason = get_value_by_path(&json, &[PathNode::key("Info3"), PathNode::key("RestartReason")])
                    .or_else(|| get_value_by_path(&json, &[PathNode::key("RestartReason")]))
                    .and_then(|value| value.as_str());
                if let Some(reason) = reason
                    && tracker.lock().note_restart_reason(reason)
                {
                    tracing::info!(reason = %reason, "Entity flagged as deep-sleeping");
                }
            }),
        );
    }
}

impl std::fmt::Debug for AvailabilityHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AvailabilityHandle")
            .field("topic", &self.config.topic)
            .field("state", &self.state())
            .field("deep_sleep", &self.deep_sleep())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> AvailabilityTracker {
        AvailabilityTracker::new("Online", "Offline")
    }

    #[test]
    fn online_offline_sequence_fires_both_edges() {
        let mut tracker = tracker();

        let update = tracker.handle_payload("Online");
        assert!(update.poll);
        assert_eq!(update.changed, Some(true));

        let update = tracker.handle_payload("Offline");
        assert!(!update.poll);
        assert_eq!(update.changed, Some(false));
        assert_eq!(tracker.state(), AvailabilityState::Offline);
    }

    #[test]
    fn deep_sleep_suppresses_offline() {
        let mut tracker = tracker();
        assert!(tracker.note_restart_reason("Deep-Sleep Wake"));

        let update = tracker.handle_payload("Online");
        assert_eq!(update.changed, Some(true));

        let update = tracker.handle_payload("Offline");
        assert_eq!(update.changed, None);
        assert_eq!(tracker.state(), AvailabilityState::Online);
    }

    #[test]
    fn offline_behaves_normally_before_flag() {
        let mut tracker = tracker();
        tracker.handle_payload("Online");
        let update = tracker.handle_payload("Offline");
        assert_eq!(update.changed, Some(false));
    }

    #[test]
    fn repeated_online_polls_without_edge() {
        let mut tracker = tracker();

        let update = tracker.handle_payload("Online");
        assert_eq!(update.changed, Some(true));

        let update = tracker.handle_payload("Online");
        assert!(update.poll);
        assert_eq!(update.changed, None);
    }

    #[test]
    fn unknown_payload_is_ignored() {
        let mut tracker = tracker();
        let update = tracker.handle_payload("Rebooting");
        assert_eq!(update, AvailabilityUpdate::default());
        assert_eq!(tracker.state(), AvailabilityState::Unknown);
    }

    #[test]
    fn deep_sleep_flag_is_permanent() {
        let mut tracker = tracker();
        assert!(tracker.note_restart_reason("Deep Sleep Wake"));
        assert!(!tracker.note_restart_reason("Software/System restart"));
        assert!(tracker.deep_sleep());
    }

    #[test]
    fn restart_reasons() {
        assert!(is_deep_sleep_wake("Deep-Sleep Wake"));
        assert!(is_deep_sleep_wake("Deep Sleep Wake Up"));
        assert!(!is_deep_sleep_wake("Software/System restart"));
        assert!(!is_deep_sleep_wake("Power On"));
    }

    #[test]
    fn last_seen_updates_on_online() {
        let mut tracker = tracker();
        assert!(tracker.last_seen().is_none());
        tracker.handle_payload("Online");
        assert!(tracker.last_seen().is_some());
    }
}
