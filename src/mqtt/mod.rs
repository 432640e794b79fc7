// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! MQTT client facade over an injected transport.
//!
//! The library owns no socket. A host hands in an implementation of
//! [`MqttTransport`] and feeds inbound messages to
//! [`TasmotaMqttClient::handle_message`]; everything else — subscription
//! diffing, message routing, debounced publishing, `Backlog` assembly —
//! happens here. With the `mqtt` feature enabled, [`MqttBroker`](broker::MqttBroker)
//! provides a ready-made `rumqttc` transport.

#[cfg(feature = "mqtt")]
pub mod broker;
mod multiplexer;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::error::ProtocolError;
use crate::topics::COMMAND_BACKLOG;

pub use multiplexer::{MessageHandler, Subscription, TopicMap, TopicSlot, topic_matches};
use multiplexer::TopicRouter;

/// How long identical publishes are coalesced before hitting the wire.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_secs(1);

/// An outbound MQTT message.
///
/// The full 4-tuple is the debounce key: two publishes differing in any
/// component are debounced independently.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PublishMessage {
    /// Destination topic.
    pub topic: String,
    /// Message payload.
    pub payload: String,
    /// Quality of service (0, 1 or 2).
    pub qos: u8,
    /// Whether the broker should retain the message.
    pub retain: bool,
}

/// An inbound MQTT message.
#[derive(Debug, Clone)]
pub struct ReceiveMessage {
    /// Topic the message arrived on.
    pub topic: String,
    /// Message payload.
    pub payload: String,
    /// Quality of service the message was delivered with.
    pub qos: u8,
    /// Whether the message was a retained one.
    pub retain: bool,
}

/// The transport contract an automation host injects.
///
/// All calls are asynchronous and non-blocking; failures surface as
/// [`ProtocolError`] and are never retried by this library.
#[async_trait]
pub trait MqttTransport: Send + Sync {
    /// Publishes a single message.
    async fn publish(&self, message: PublishMessage) -> Result<(), ProtocolError>;

    /// Subscribes to the given topic filters.
    async fn subscribe(&self, topics: &[String]) -> Result<(), ProtocolError>;

    /// Unsubscribes from the given topic filters.
    async fn unsubscribe(&self, topics: &[String]) -> Result<(), ProtocolError>;
}

struct PendingTimer {
    seq: u64,
    handle: JoinHandle<()>,
}

/// Client facade used by every entity and the discovery reconciler.
///
/// Wraps the injected transport with subscription multiplexing and a
/// debounced publisher. Cheap to share via [`Arc`].
pub struct TasmotaMqttClient {
    transport: Arc<dyn MqttTransport>,
    router: TopicRouter,
    pending: Arc<Mutex<HashMap<PublishMessage, PendingTimer>>>,
    timer_seq: AtomicU64,
    sub_seq: AtomicU64,
    debounce_window: Duration,
}

impl TasmotaMqttClient {
    /// Creates a client over the given transport with the default
    /// debounce window.
    #[must_use]
    pub fn new(transport: Arc<dyn MqttTransport>) -> Self {
        Self::with_debounce_window(transport, DEBOUNCE_WINDOW)
    }

    /// Creates a client with an explicit debounce window.
    #[must_use]
    pub fn with_debounce_window(transport: Arc<dyn MqttTransport>, window: Duration) -> Self {
        Self {
            transport,
            router: TopicRouter::default(),
            pending: Arc::new(Mutex::new(HashMap::new())),
            timer_seq: AtomicU64::new(1),
            sub_seq: AtomicU64::new(1),
            debounce_window: window,
        }
    }

    /// Publishes a message immediately.
    ///
    /// # Errors
    ///
    /// Returns the transport's error unchanged.
    pub async fn publish(
        &self,
        topic: &str,
        payload: &str,
        qos: u8,
        retain: bool,
    ) -> Result<(), ProtocolError> {
        self.transport
            .publish(PublishMessage {
                topic: topic.to_string(),
                payload: payload.to_string(),
                qos,
                retain,
            })
            .await
    }

    /// Publishes a message after the debounce window, coalescing repeats.
    ///
    /// A pending publish with the same `(topic, payload, qos, retain)`
    /// tuple is cancelled and replaced; its timer never fires. On expiry
    /// the entry is removed and the message published once. Transport
    /// failures at expiry are logged; there is no retry.
    ///
    /// Must be called from within a tokio runtime.
    pub fn publish_debounced(&self, topic: &str, payload: &str, qos: u8, retain: bool) {
        let msg = PublishMessage {
            topic: topic.to_string(),
            payload: payload.to_string(),
            qos,
            retain,
        };
        let seq = self.timer_seq.fetch_add(1, Ordering::Relaxed);

        let mut pending = self.pending.lock();
        if let Some(old) = pending.remove(&msg) {
            old.handle.abort();
        }

        let handle = tokio::spawn({
            let pending = Arc::clone(&self.pending);
            let transport = Arc::clone(&self.transport);
            let msg = msg.clone();
            let window = self.debounce_window;
            async move {
                tokio::time::sleep(window).await;
                let due = {
                    let mut pending = pending.lock();
                    match pending.get(&msg) {
                        Some(timer) if timer.seq == seq => {
                            pending.remove(&msg);
                            true
                        }
                        // Superseded while the timer task was already racing
                        // its own abort.
                        _ => false,
                    }
                };
                if due {
                    tracing::debug!(topic = %msg.topic, payload = %msg.payload, "Publishing debounced message");
                    if let Err(err) = transport.publish(msg).await {
                        tracing::warn!(error = %err, "Debounced publish failed");
                    }
                }
            }
        });
        pending.insert(msg, PendingTimer { seq, handle });
    }

    /// Sends a command sequence as one atomic `Backlog` publish.
    ///
    /// The device executes the commands back to back without publishing
    /// intermediate state, which is how multi-parameter light updates
    /// avoid visible half-applied states.
    ///
    /// # Errors
    ///
    /// Returns the transport's error unchanged.
    pub async fn send_backlog(
        &self,
        command_topic: &str,
        commands: &[(String, String)],
    ) -> Result<(), ProtocolError> {
        let backlog = commands
            .iter()
            .map(|(command, argument)| format!("NoDelay;{command} {argument}"))
            .collect::<Vec<_>>()
            .join(";");
        self.publish(&format!("{command_topic}{COMMAND_BACKLOG}"), &backlog, 0, false)
            .await
    }

    /// Replaces the topic set of a subscription handle.
    ///
    /// Computes the symmetric difference between the handle's current
    /// topics and `topics`. When anything changed, issues one transport
    /// subscribe with the full new topic list and, if topics were dropped,
    /// one unsubscribe for exactly those. An unchanged topic set touches
    /// the transport not at all; handlers are still swapped.
    ///
    /// Pass `None` to start a new subscription chain.
    ///
    /// # Errors
    ///
    /// Returns the transport's error; the route table has already been
    /// updated at that point.
    pub async fn subscribe(
        &self,
        sub: Option<Subscription>,
        topics: TopicMap,
    ) -> Result<Subscription, ProtocolError> {
        let (sub_id, generation, old_topics) = match sub {
            Some(sub) => (sub.id, sub.generation + 1, sub.topics),
            None => (self.sub_seq.fetch_add(1, Ordering::Relaxed), 1, Vec::new()),
        };

        let diff = self.router.replace(sub_id, &old_topics, &topics);
        if diff.added.is_empty() && diff.dropped.is_empty() {
            tracing::trace!(id = sub_id, "Subscription topics unchanged");
        } else {
            tracing::debug!(
                id = sub_id,
                added = diff.added.len(),
                dropped = diff.dropped.len(),
                "Replacing subscription"
            );
            if !diff.topics.is_empty() {
                self.transport.subscribe(&diff.topics).await?;
            }
            if !diff.dropped.is_empty() {
                self.transport.unsubscribe(&diff.dropped).await?;
            }
        }

        Ok(Subscription {
            id: sub_id,
            generation,
            topics: diff.topics,
        })
    }

    /// Clears every topic a subscription handle represents.
    ///
    /// Idempotent: unsubscribing an already empty handle (or `None`) does
    /// not touch the transport.
    ///
    /// # Errors
    ///
    /// Returns the transport's error unchanged.
    pub async fn unsubscribe(
        &self,
        sub: Option<Subscription>,
    ) -> Result<Subscription, ProtocolError> {
        self.subscribe(sub, TopicMap::new()).await
    }

    /// Delivers an inbound message to every matching subscription handler.
    ///
    /// This is the host's entry point for messages received from its
    /// broker connection. Returns `true` if at least one handler fired.
    pub fn handle_message(&self, topic: &str, payload: &str, qos: u8, retain: bool) -> bool {
        let msg = ReceiveMessage {
            topic: topic.to_string(),
            payload: payload.to_string(),
            qos,
            retain,
        };
        self.router.dispatch(&msg) > 0
    }

    /// Returns the number of publishes currently waiting out the window.
    #[must_use]
    pub fn pending_publishes(&self) -> usize {
        self.pending.lock().len()
    }

    /// Returns the number of distinct topic filters currently subscribed.
    #[must_use]
    pub fn subscribed_topic_count(&self) -> usize {
        self.router.topic_count()
    }
}

impl fmt::Debug for TasmotaMqttClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TasmotaMqttClient")
            .field("pending_publishes", &self.pending_publishes())
            .field("subscribed_topics", &self.subscribed_topic_count())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod test_transport {
    use super::*;

    /// Transport that records every call for assertions.
    #[derive(Default)]
    pub(crate) struct RecordingTransport {
        pub(crate) published: Mutex<Vec<PublishMessage>>,
        pub(crate) subscribed: Mutex<Vec<Vec<String>>>,
        pub(crate) unsubscribed: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl MqttTransport for RecordingTransport {
        async fn publish(&self, message: PublishMessage) -> Result<(), ProtocolError> {
            self.published.lock().push(message);
            Ok(())
        }

        async fn subscribe(&self, topics: &[String]) -> Result<(), ProtocolError> {
            self.subscribed.lock().push(topics.to_vec());
            Ok(())
        }

        async fn unsubscribe(&self, topics: &[String]) -> Result<(), ProtocolError> {
            self.unsubscribed.lock().push(topics.to_vec());
            Ok(())
        }
    }
}
