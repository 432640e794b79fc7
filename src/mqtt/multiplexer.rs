// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-entity topic subscription management.
//!
//! Each entity subscribes a small map of logical slots to topics. The
//! multiplexer diffs a new map against the entity's current
//! [`Subscription`] handle, touches the transport only for actual changes,
//! and routes inbound messages to the handlers registered at delivery time.
//!
//! # Architecture
//!
//! ```text
//! subscribe(token, map)          handle_message(topic, payload)
//!         ↓                                 ↓
//!   diff vs token's topics          match topic filters
//!         ↓                                 ↓
//!  transport.subscribe(all)        invoke slot handlers
//!  transport.unsubscribe(dropped)
//!         ↓
//!   new owned token
//! ```
//!
//! Handles are consumed by value on every call: a superseded token cannot
//! be passed in again, which rules out stale aliasing at compile time.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use super::ReceiveMessage;

/// Callback invoked with every message delivered to a subscribed topic.
pub type MessageHandler = Arc<dyn Fn(&ReceiveMessage) + Send + Sync>;

/// Logical slot a topic is subscribed under.
///
/// Slots only matter for bookkeeping and logging; routing is by topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopicSlot {
    /// Last-will availability topic.
    Availability,
    /// Boot info telemetry (restart reason).
    BootInfo,
    /// Command result topic.
    Result,
    /// Periodic state telemetry.
    State,
    /// Periodic sensor telemetry.
    Sensor,
    /// Polled `STATUS<n>` response.
    Status(u8),
    /// Trigger event topic.
    Trigger,
    /// Discovery tree.
    Discovery,
}

impl fmt::Display for TopicSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Availability => write!(f, "availability"),
            Self::BootInfo => write!(f, "boot_info"),
            Self::Result => write!(f, "result"),
            Self::State => write!(f, "state"),
            Self::Sensor => write!(f, "sensor"),
            Self::Status(n) => write!(f, "status_{n}"),
            Self::Trigger => write!(f, "trigger"),
            Self::Discovery => write!(f, "discovery"),
        }
    }
}

/// A slot-keyed map of topics to subscribe with their handlers.
#[derive(Default)]
pub struct TopicMap {
    entries: Vec<(TopicSlot, String, MessageHandler)>,
}

impl TopicMap {
    /// Creates an empty topic map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a topic under the given slot.
    pub fn insert(&mut self, slot: TopicSlot, topic: impl Into<String>, handler: MessageHandler) {
        self.entries.push((slot, topic.into(), handler));
    }

    /// Returns `true` if the map holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn entries(&self) -> &[(TopicSlot, String, MessageHandler)] {
        &self.entries
    }
}

impl fmt::Debug for TopicMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots: Vec<String> = self
            .entries
            .iter()
            .map(|(slot, topic, _)| format!("{slot}:{topic}"))
            .collect();
        f.debug_struct("TopicMap").field("entries", &slots).finish()
    }
}

/// Owned handle over an entity's currently active topic set.
///
/// Returned by every subscribe/unsubscribe call and consumed by the next
/// one. The generation counter increases with each replacement, which makes
/// handle lineage visible in logs.
#[derive(Debug)]
pub struct Subscription {
    pub(crate) id: u64,
    pub(crate) generation: u64,
    pub(crate) topics: Vec<String>,
}

impl Subscription {
    /// Returns the topics this handle covers.
    #[must_use]
    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    /// Returns how many times this handle chain has been replaced.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns `true` if the handle covers no topics.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Subscription({}, gen {}, {} topics)",
            self.id,
            self.generation,
            self.topics.len()
        )
    }
}

struct RouteEntry {
    sub_id: u64,
    slot: TopicSlot,
    handler: MessageHandler,
}

/// Routes inbound messages to the handlers of active subscriptions.
#[derive(Default)]
pub(crate) struct TopicRouter {
    routes: RwLock<HashMap<String, Vec<RouteEntry>>>,
}

/// Outcome of a route-table replacement.
pub(crate) struct RouteDiff {
    /// Full topic set now active for the subscription.
    pub(crate) topics: Vec<String>,
    /// Topics newly added relative to the old handle.
    pub(crate) added: Vec<String>,
    /// Topics dropped relative to the old handle.
    pub(crate) dropped: Vec<String>,
}

impl TopicRouter {
    /// Replaces the routes of subscription `sub_id` with those in `map`.
    ///
    /// The swap happens under the route-table lock, so a message delivered
    /// concurrently either sees the old handlers or the new ones, never a
    /// mixture, and a dropped topic's handler can no longer fire once this
    /// returns.
    pub(crate) fn replace(&self, sub_id: u64, old_topics: &[String], map: &TopicMap) -> RouteDiff {
        let old: BTreeSet<&str> = old_topics.iter().map(String::as_str).collect();
        let new: BTreeSet<&str> = map.entries().iter().map(|(_, t, _)| t.as_str()).collect();

        let mut routes = self.routes.write();
        for topic in &old {
            if let Some(entries) = routes.get_mut(*topic) {
                entries.retain(|entry| entry.sub_id != sub_id);
                if entries.is_empty() {
                    routes.remove(*topic);
                }
            }
        }
        for (slot, topic, handler) in map.entries() {
            routes.entry(topic.clone()).or_default().push(RouteEntry {
                sub_id,
                slot: *slot,
                handler: Arc::clone(handler),
            });
        }
        drop(routes);

        RouteDiff {
            topics: new.iter().map(ToString::to_string).collect(),
            added: new.difference(&old).map(ToString::to_string).collect(),
            dropped: old.difference(&new).map(ToString::to_string).collect(),
        }
    }

    /// Delivers a message to every handler whose filter matches the topic.
    ///
    /// Handlers run while the route table is read-locked; a concurrent
    /// re-subscription waits for delivery to finish before swapping routes.
    /// Returns the number of handlers invoked.
    pub(crate) fn dispatch(&self, msg: &ReceiveMessage) -> usize {
        let routes = self.routes.read();
        let mut delivered = 0;
        for (filter, entries) in routes.iter() {
            if !topic_matches(filter, &msg.topic) {
                continue;
            }
            for entry in entries {
                tracing::trace!(
                    topic = %msg.topic,
                    slot = %entry.slot,
                    "Delivering message"
                );
                (entry.handler)(msg);
                delivered += 1;
            }
        }
        delivered
    }

    /// Returns the number of distinct topic filters currently routed.
    pub(crate) fn topic_count(&self) -> usize {
        self.routes.read().len()
    }
}

/// Returns whether an MQTT topic filter matches a concrete topic.
///
/// Supports the `+` single-level and `#` multi-level wildcards.
#[must_use]
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_parts = filter.split('/');
    let mut topic_parts = topic.split('/');

    loop {
        match (filter_parts.next(), topic_parts.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn counting_handler(counter: &Arc<AtomicU32>) -> MessageHandler {
        let counter = Arc::clone(counter);
        Arc::new(move |_msg| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn msg(topic: &str) -> ReceiveMessage {
        ReceiveMessage {
            topic: topic.to_string(),
            payload: String::new(),
            qos: 0,
            retain: false,
        }
    }

    #[test]
    fn topic_matches_exact() {
        assert!(topic_matches("tele/device/LWT", "tele/device/LWT"));
        assert!(!topic_matches("tele/device/LWT", "tele/device/STATE"));
    }

    #[test]
    fn topic_matches_single_level_wildcard() {
        assert!(topic_matches("tele/+/LWT", "tele/device/LWT"));
        assert!(!topic_matches("tele/+/LWT", "tele/device/extra/LWT"));
    }

    #[test]
    fn topic_matches_multi_level_wildcard() {
        assert!(topic_matches("tasmota/discovery/#", "tasmota/discovery/AABB/config"));
        assert!(topic_matches("#", "anything/at/all"));
        assert!(!topic_matches("tasmota/discovery/#", "tasmota/other/AABB"));
    }

    #[test]
    fn topic_matches_shorter_topic() {
        assert!(!topic_matches("tele/device/LWT", "tele/device"));
        assert!(!topic_matches("tele/device", "tele/device/LWT"));
    }

    #[test]
    fn replace_computes_symmetric_difference() {
        let router = TopicRouter::default();
        let counter = Arc::new(AtomicU32::new(0));

        let mut map = TopicMap::new();
        map.insert(TopicSlot::State, "tele/dev/STATE", counting_handler(&counter));
        map.insert(TopicSlot::Result, "stat/dev/RESULT", counting_handler(&counter));
        let diff = router.replace(1, &[], &map);
        assert_eq!(diff.added.len(), 2);
        assert!(diff.dropped.is_empty());

        let mut map = TopicMap::new();
        map.insert(TopicSlot::State, "tele/dev/STATE", counting_handler(&counter));
        map.insert(TopicSlot::Sensor, "tele/dev/SENSOR", counting_handler(&counter));
        let diff = router.replace(1, &diff.topics, &map);
        assert_eq!(diff.added, vec!["tele/dev/SENSOR".to_string()]);
        assert_eq!(diff.dropped, vec!["stat/dev/RESULT".to_string()]);
        assert_eq!(diff.topics.len(), 2);
    }

    #[test]
    fn replace_unchanged_map_has_no_diff() {
        let router = TopicRouter::default();
        let counter = Arc::new(AtomicU32::new(0));

        let mut map = TopicMap::new();
        map.insert(TopicSlot::State, "tele/dev/STATE", counting_handler(&counter));
        let diff = router.replace(1, &[], &map);

        let mut map = TopicMap::new();
        map.insert(TopicSlot::State, "tele/dev/STATE", counting_handler(&counter));
        let diff = router.replace(1, &diff.topics, &map);
        assert!(diff.added.is_empty());
        assert!(diff.dropped.is_empty());
    }

    #[test]
    fn dispatch_routes_to_matching_handlers() {
        let router = TopicRouter::default();
        let counter = Arc::new(AtomicU32::new(0));

        let mut map = TopicMap::new();
        map.insert(TopicSlot::State, "tele/dev/STATE", counting_handler(&counter));
        router.replace(1, &[], &map);

        assert_eq!(router.dispatch(&msg("tele/dev/STATE")), 1);
        assert_eq!(router.dispatch(&msg("tele/other/STATE")), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dispatch_after_drop_never_fires() {
        let router = TopicRouter::default();
        let counter = Arc::new(AtomicU32::new(0));

        let mut map = TopicMap::new();
        map.insert(TopicSlot::State, "tele/dev/STATE", counting_handler(&counter));
        let diff = router.replace(1, &[], &map);

        router.replace(1, &diff.topics, &TopicMap::new());
        assert_eq!(router.dispatch(&msg("tele/dev/STATE")), 0);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn dispatch_keeps_other_subscriptions_on_shared_topic() {
        let router = TopicRouter::default();
        let counter1 = Arc::new(AtomicU32::new(0));
        let counter2 = Arc::new(AtomicU32::new(0));

        let mut map = TopicMap::new();
        map.insert(TopicSlot::State, "tele/dev/STATE", counting_handler(&counter1));
        let diff1 = router.replace(1, &[], &map);

        let mut map = TopicMap::new();
        map.insert(TopicSlot::State, "tele/dev/STATE", counting_handler(&counter2));
        router.replace(2, &[], &map);

        // Dropping subscription 1 must not affect subscription 2.
        router.replace(1, &diff1.topics, &TopicMap::new());
        assert_eq!(router.dispatch(&msg("tele/dev/STATE")), 1);
        assert_eq!(counter1.load(Ordering::SeqCst), 0);
        assert_eq!(counter2.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn topic_count_tracks_active_filters() {
        let router = TopicRouter::default();
        let counter = Arc::new(AtomicU32::new(0));

        let mut map = TopicMap::new();
        map.insert(TopicSlot::State, "tele/dev/STATE", counting_handler(&counter));
        map.insert(TopicSlot::Result, "stat/dev/RESULT", counting_handler(&counter));
        let diff = router.replace(1, &[], &map);
        assert_eq!(router.topic_count(), 2);

        router.replace(1, &diff.topics, &TopicMap::new());
        assert_eq!(router.topic_count(), 0);
    }
}
