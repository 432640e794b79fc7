// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Ready-made `rumqttc` transport for hosts without their own MQTT stack.
//!
//! [`MqttBroker`] owns the broker connection: it implements
//! [`MqttTransport`](super::MqttTransport) over a `rumqttc` client, pumps the
//! event loop in a background task and feeds every inbound publish into
//! [`TasmotaMqttClient::handle_message`]. Subscriptions are replayed after a
//! reconnect, matching the retained-message-driven discovery model.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::task::JoinHandle;

use super::{MqttTransport, PublishMessage, TasmotaMqttClient};
use crate::error::ProtocolError;

/// Global counter for generating unique client IDs.
static CLIENT_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn qos_from(qos: u8) -> QoS {
    match qos {
        1 => QoS::AtLeastOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtMostOnce,
    }
}

/// Builder for [`MqttBroker`].
#[derive(Debug, Clone)]
pub struct MqttBrokerBuilder {
    host: String,
    port: u16,
    credentials: Option<(String, String)>,
    keep_alive: Duration,
    debounce_window: Duration,
}

impl MqttBrokerBuilder {
    /// Sets the broker host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the broker port. Default is 1883.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the broker credentials.
    #[must_use]
    pub fn credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// Overrides the debounce window of the built client.
    #[must_use]
    pub fn debounce_window(mut self, window: Duration) -> Self {
        self.debounce_window = window;
        self
    }

    /// Connects to the broker and returns the broker handle plus the
    /// client every entity shares.
    ///
    /// # Errors
    ///
    /// Returns error if the host string is empty.
    pub fn build(self) -> Result<(MqttBroker, Arc<TasmotaMqttClient>), ProtocolError> {
        if self.host.is_empty() {
            return Err(ProtocolError::InvalidAddress("empty host".to_string()));
        }

        let counter = CLIENT_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        let client_id = format!("tasmota_bridge_{}_{}", std::process::id(), counter);

        let mut options = MqttOptions::new(client_id, self.host, self.port);
        options.set_keep_alive(self.keep_alive);
        if let Some((username, password)) = self.credentials {
            options.set_credentials(username, password);
        }

        let (mqtt_client, event_loop) = AsyncClient::new(options, 64);
        let transport = Arc::new(BrokerTransport {
            client: mqtt_client,
            subscriptions: Mutex::new(HashSet::new()),
        });
        let client = Arc::new(TasmotaMqttClient::with_debounce_window(
            Arc::clone(&transport) as Arc<dyn MqttTransport>,
            self.debounce_window,
        ));

        let pump = tokio::spawn(run_event_loop(
            event_loop,
            Arc::clone(&transport),
            Arc::clone(&client),
        ));

        Ok((MqttBroker { pump }, client))
    }
}

impl Default for MqttBrokerBuilder {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 1883,
            credentials: None,
            keep_alive: Duration::from_secs(30),
            debounce_window: super::DEBOUNCE_WINDOW,
        }
    }
}

/// Handle over a running broker connection.
///
/// Dropping the handle (or calling [`MqttBroker::disconnect`]) stops the
/// event loop task.
#[derive(Debug)]
pub struct MqttBroker {
    pump: JoinHandle<()>,
}

impl MqttBroker {
    /// Returns a builder for a broker connection.
    #[must_use]
    pub fn builder() -> MqttBrokerBuilder {
        MqttBrokerBuilder::default()
    }

    /// Stops the event loop task.
    pub fn disconnect(&self) {
        self.pump.abort();
    }
}

impl Drop for MqttBroker {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

struct BrokerTransport {
    client: AsyncClient,
    /// Filters to replay after a reconnect.
    subscriptions: Mutex<HashSet<String>>,
}

#[async_trait]
impl MqttTransport for BrokerTransport {
    async fn publish(&self, message: PublishMessage) -> Result<(), ProtocolError> {
        self.client
            .publish(
                &message.topic,
                qos_from(message.qos),
                message.retain,
                message.payload,
            )
            .await
            .map_err(ProtocolError::Mqtt)
    }

    async fn subscribe(&self, topics: &[String]) -> Result<(), ProtocolError> {
        for topic in topics {
            self.client
                .subscribe(topic, QoS::AtMostOnce)
                .await
                .map_err(ProtocolError::Mqtt)?;
        }
        let mut subscriptions = self.subscriptions.lock();
        subscriptions.extend(topics.iter().cloned());
        Ok(())
    }

    async fn unsubscribe(&self, topics: &[String]) -> Result<(), ProtocolError> {
        for topic in topics {
            self.client
                .unsubscribe(topic)
                .await
                .map_err(ProtocolError::Mqtt)?;
        }
        let mut subscriptions = self.subscriptions.lock();
        for topic in topics {
            subscriptions.remove(topic);
        }
        Ok(())
    }
}

async fn run_event_loop(
    mut event_loop: EventLoop,
    transport: Arc<BrokerTransport>,
    client: Arc<TasmotaMqttClient>,
) {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let payload = String::from_utf8_lossy(&publish.payload).to_string();
                client.handle_message(
                    &publish.topic,
                    &payload,
                    publish.qos as u8,
                    publish.retain,
                );
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                tracing::info!("Connected to MQTT broker");
                let filters: Vec<String> =
                    transport.subscriptions.lock().iter().cloned().collect();
                for filter in filters {
                    if let Err(err) = transport.client.subscribe(&filter, QoS::AtMostOnce).await {
                        tracing::warn!(filter = %filter, error = %err, "Resubscribe failed");
                    }
                }
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(error = %err, "MQTT connection error, retrying");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}
