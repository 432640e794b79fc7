// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Discovery-driven reconciliation of device and sensor payloads.
//!
//! Tasmota publishes two retained payloads per device under the discovery
//! prefix: `<prefix>/<MAC>/config` describing the device and
//! `<prefix>/<MAC>/sensors` describing its sensor tree. The reconciler
//! stores both wholesale, derives a full replacement entity list whenever
//! either side changes, and hands the host `(config, hash)` pairs — the
//! host diffs hashes against its previous set to decide update versus
//! replace.
//!
//! A sensor payload arriving before its device payload is buffered and
//! surfaced once the device is known. An empty retained payload removes
//! the device and tears down everything derived from it.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::device::{DeviceDescriptor, RelayRole};
use crate::entity::{DiscoveryHash, EntityIndex, Platform};
use crate::error::ProtocolError;
use crate::fan::{TasmotaFan, TasmotaFanConfig};
use crate::light::{TasmotaLight, TasmotaLightConfig};
use crate::mqtt::{Subscription, TasmotaMqttClient, TopicMap, TopicSlot};
use crate::relay::TasmotaRelayConfig;
use crate::sensor::{SensorDiscovery, TasmotaSensor, TasmotaSensorConfig, get_sensor_entities};
use crate::shutter::{TasmotaShutter, TasmotaShutterConfig};
use crate::status_sensor::{
    TasmotaStatusSensor, TasmotaStatusSensorConfig, get_status_sensor_entities,
};
use crate::switch::TasmotaSwitchConfig;

/// Immutable configuration of one entity, one variant per capability.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityConfig {
    /// Fan backed by an iFan controller.
    Fan(TasmotaFanConfig),
    /// Light channel.
    Light(TasmotaLightConfig),
    /// Plain relay.
    Relay(TasmotaRelayConfig),
    /// Sensor tree leaf.
    Sensor(TasmotaSensorConfig),
    /// Fixed per-device status sensor.
    StatusSensor(TasmotaStatusSensorConfig),
    /// Shutter pair.
    Shutter(TasmotaShutterConfig),
    /// Switch input surfacing as a binary sensor.
    Switch(TasmotaSwitchConfig),
}

impl EntityConfig {
    /// Returns the entity's unique id.
    #[must_use]
    pub fn unique_id(&self) -> String {
        match self {
            Self::Fan(cfg) => cfg.common.unique_id(),
            Self::Light(cfg) => cfg.common.unique_id(),
            Self::Relay(cfg) => cfg.common.unique_id(),
            Self::Sensor(cfg) => cfg.unique_id(),
            Self::StatusSensor(cfg) => cfg.common.unique_id(),
            Self::Shutter(cfg) => cfg.common.unique_id(),
            Self::Switch(cfg) => cfg.common.unique_id(),
        }
    }

    /// Returns the platform the entity belongs to.
    #[must_use]
    pub fn platform(&self) -> Platform {
        match self {
            Self::Fan(cfg) => cfg.common.platform,
            Self::Light(cfg) => cfg.common.platform,
            Self::Relay(cfg) => cfg.common.platform,
            Self::Sensor(cfg) => cfg.common.platform,
            Self::StatusSensor(cfg) => cfg.common.platform,
            Self::Shutter(cfg) => cfg.common.platform,
            Self::Switch(cfg) => cfg.common.platform,
        }
    }
}

/// Runtime entity, one variant per capability with library-side logic.
///
/// Plain relays and switches are the host's business; see
/// [`create_entity`].
#[derive(Debug)]
pub enum TasmotaEntity {
    /// Fan runtime.
    Fan(TasmotaFan),
    /// Light runtime.
    Light(TasmotaLight),
    /// Sensor runtime.
    Sensor(TasmotaSensor),
    /// Status sensor runtime.
    StatusSensor(TasmotaStatusSensor),
    /// Shutter runtime.
    Shutter(TasmotaShutter),
}

impl TasmotaEntity {
    /// Returns the entity's unique id.
    #[must_use]
    pub fn unique_id(&self) -> String {
        match self {
            Self::Fan(entity) => entity.unique_id(),
            Self::Light(entity) => entity.unique_id(),
            Self::Sensor(entity) => entity.unique_id(),
            Self::StatusSensor(entity) => entity.unique_id(),
            Self::Shutter(entity) => entity.unique_id(),
        }
    }

    /// Subscribes the entity's topics.
    ///
    /// # Errors
    ///
    /// Returns the transport's error unchanged.
    pub async fn subscribe_topics(&self) -> Result<(), ProtocolError> {
        match self {
            Self::Fan(entity) => entity.subscribe_topics().await,
            Self::Light(entity) => entity.subscribe_topics().await,
            Self::Sensor(entity) => entity.subscribe_topics().await,
            Self::StatusSensor(entity) => entity.subscribe_topics().await,
            Self::Shutter(entity) => entity.subscribe_topics().await,
        }
    }

    /// Unsubscribes the entity's topics.
    ///
    /// # Errors
    ///
    /// Returns the transport's error unchanged.
    pub async fn unsubscribe_topics(&self) -> Result<(), ProtocolError> {
        match self {
            Self::Fan(entity) => entity.unsubscribe_topics().await,
            Self::Light(entity) => entity.unsubscribe_topics().await,
            Self::Sensor(entity) => entity.unsubscribe_topics().await,
            Self::StatusSensor(entity) => entity.unsubscribe_topics().await,
            Self::Shutter(entity) => entity.unsubscribe_topics().await,
        }
    }

    /// Requests a debounced status re-poll.
    pub fn poll_status(&self) {
        match self {
            Self::Fan(entity) => entity.poll_status(),
            Self::Light(entity) => entity.poll_status(),
            Self::Sensor(entity) => entity.poll_status(),
            Self::StatusSensor(entity) => entity.poll_status(),
            Self::Shutter(entity) => entity.poll_status(),
        }
    }
}

/// Creates the runtime entity for a config.
///
/// Returns `None` for capabilities whose runtime lives in the host
/// (plain relays and binary-sensor switches have no logic beyond
/// formatting a topic and comparing a literal).
#[must_use]
pub fn create_entity(config: EntityConfig, client: Arc<TasmotaMqttClient>) -> Option<TasmotaEntity> {
    match config {
        EntityConfig::Fan(cfg) => Some(TasmotaEntity::Fan(TasmotaFan::new(cfg, client))),
        EntityConfig::Light(cfg) => Some(TasmotaEntity::Light(TasmotaLight::new(cfg, client))),
        EntityConfig::Sensor(cfg) => Some(TasmotaEntity::Sensor(TasmotaSensor::new(cfg, client))),
        EntityConfig::StatusSensor(cfg) => Some(TasmotaEntity::StatusSensor(
            TasmotaStatusSensor::new(cfg, client),
        )),
        EntityConfig::Shutter(cfg) => {
            Some(TasmotaEntity::Shutter(TasmotaShutter::new(cfg, client)))
        }
        EntityConfig::Relay(cfg) => {
            tracing::debug!(unique_id = %cfg.common.unique_id(), "Relay runtime is host-implemented");
            None
        }
        EntityConfig::Switch(cfg) => {
            tracing::debug!(unique_id = %cfg.common.unique_id(), "Switch runtime is host-implemented");
            None
        }
    }
}

/// An entity slot: the hash always exists, the config only when the slot
/// is populated in the current device configuration.
pub type EntitySlot = (Option<EntityConfig>, DiscoveryHash);

fn binary_sensor_entities(device: &DeviceDescriptor) -> Vec<EntitySlot> {
    (0..device.switch_modes.len())
        .map(|idx| {
            let hash = DiscoveryHash {
                mac: device.mac.clone(),
                platform: Platform::BinarySensor,
                kind: "switch",
                id: EntityIndex::Index(idx),
            };
            (
                TasmotaSwitchConfig::from_discovery(device, idx).map(EntityConfig::Switch),
                hash,
            )
        })
        .collect()
}

fn cover_entities(device: &DeviceDescriptor) -> Vec<EntitySlot> {
    let relays = device.relay_roles();
    let mut paired = Vec::new();
    let mut idx = 0;
    while idx < relays.len() {
        if relays[idx] == RelayRole::Shutter {
            if relays.get(idx + 1) == Some(&RelayRole::Shutter) {
                tracing::debug!(first = idx, second = idx + 1, "Found shutter pair");
                paired.push(idx);
                idx += 2;
                continue;
            }
            tracing::error!(
                relay = idx + 1,
                "Invalid shutter configuration, relay has no second half"
            );
            paired.clear();
            break;
        }
        idx += 1;
    }

    // Tasmota supports up to 4 shutters, each taking two consecutive relays.
    (0..4)
        .map(|shutter_idx| {
            let hash = DiscoveryHash {
                mac: device.mac.clone(),
                platform: Platform::Cover,
                kind: "shutter",
                id: EntityIndex::Index(shutter_idx),
            };
            (
                paired.get(shutter_idx).map(|_| {
                    EntityConfig::Shutter(TasmotaShutterConfig::from_discovery(device, shutter_idx))
                }),
                hash,
            )
        })
        .collect()
}

fn fan_entities(device: &DeviceDescriptor) -> Vec<EntitySlot> {
    let hash = DiscoveryHash {
        mac: device.mac.clone(),
        platform: Platform::Fan,
        kind: "fan",
        id: EntityIndex::Named("ifan".to_string()),
    };
    let entity =
        (device.ifan != 0).then(|| EntityConfig::Fan(TasmotaFanConfig::from_discovery(device)));
    vec![(entity, hash)]
}

fn light_entities(device: &DeviceDescriptor) -> Vec<EntitySlot> {
    let force_light = device.options.force_light != 0;
    let mut relays = device.relay_roles();
    if device.ifan != 0 && relays.first() == Some(&RelayRole::Light) {
        // iFan: the light slot is a single non-dimmable relay.
        relays[0] = RelayRole::Relay;
    }

    let mut entities = Vec::new();
    for (idx, role) in relays.iter().enumerate() {
        let hash = DiscoveryHash {
            mac: device.mac.clone(),
            platform: Platform::Light,
            kind: "light",
            id: EntityIndex::Index(idx),
        };
        let entity = (*role == RelayRole::Light)
            .then(|| EntityConfig::Light(TasmotaLightConfig::from_discovery(device, idx)));
        entities.push((entity, hash));
    }
    for (idx, role) in relays.iter().enumerate() {
        let hash = DiscoveryHash {
            mac: device.mac.clone(),
            platform: Platform::Light,
            kind: "relay",
            id: EntityIndex::Index(idx),
        };
        let as_light = *role == RelayRole::Relay && (force_light || (device.ifan != 0 && idx == 0));
        let entity = as_light.then(|| {
            EntityConfig::Relay(TasmotaRelayConfig::from_discovery(device, idx, Platform::Light))
        });
        entities.push((entity, hash));
    }
    entities
}

fn switch_entities(device: &DeviceDescriptor) -> Vec<EntitySlot> {
    let force_light = device.options.force_light != 0;
    device
        .relay_roles()
        .iter()
        .enumerate()
        .map(|(idx, role)| {
            let hash = DiscoveryHash {
                mac: device.mac.clone(),
                platform: Platform::Switch,
                kind: "relay",
                id: EntityIndex::Index(idx),
            };
            let entity = (*role == RelayRole::Relay && !force_light).then(|| {
                EntityConfig::Relay(TasmotaRelayConfig::from_discovery(
                    device,
                    idx,
                    Platform::Switch,
                ))
            });
            (entity, hash)
        })
        .collect()
}

/// Generates the entity slots of one platform.
#[must_use]
pub fn get_entities_for_platform(device: &DeviceDescriptor, platform: Platform) -> Vec<EntitySlot> {
    match platform {
        Platform::BinarySensor => binary_sensor_entities(device),
        Platform::Cover => cover_entities(device),
        Platform::Fan => fan_entities(device),
        Platform::Light => light_entities(device),
        Platform::Switch => switch_entities(device),
        Platform::StatusSensor => get_status_sensor_entities(device)
            .into_iter()
            .map(|(cfg, hash)| (Some(EntityConfig::StatusSensor(cfg)), hash))
            .collect(),
        Platform::Sensor => Vec::new(),
    }
}

/// Returns whether any entity of the platform is populated.
#[must_use]
pub fn has_entities_with_platform(device: &DeviceDescriptor, platform: Platform) -> bool {
    get_entities_for_platform(device, platform)
        .iter()
        .any(|(entity, _)| entity.is_some())
}

/// Callback invoked when a device payload changes.
///
/// `None` reports device removal.
pub type DeviceDiscoveredCallback = Arc<dyn Fn(Option<&DeviceDescriptor>, &str) + Send + Sync>;

/// Callback invoked with the full replacement sensor entity list.
pub type SensorsDiscoveredCallback = Arc<dyn Fn(&[(EntityConfig, DiscoveryHash)], &str) + Send + Sync>;

#[derive(Default)]
struct DiscoveryState {
    devices: HashMap<String, DeviceDescriptor>,
    sensors: HashMap<String, SensorDiscovery>,
}

enum DiscoveryKind {
    DeviceConfig,
    Sensors,
}

/// Reconciles retained discovery payloads into entity descriptor lists.
///
/// The store is explicitly owned by this value; there is no process-wide
/// discovery cache. Construct one per client.
pub struct TasmotaDiscovery {
    client: Arc<TasmotaMqttClient>,
    discovery_prefix: String,
    state: Arc<Mutex<DiscoveryState>>,
    sub_state: tokio::sync::Mutex<Option<Subscription>>,
}

impl TasmotaDiscovery {
    /// Creates a reconciler listening under `discovery_prefix`.
    #[must_use]
    pub fn new(discovery_prefix: impl Into<String>, client: Arc<TasmotaMqttClient>) -> Self {
        Self {
            client,
            discovery_prefix: discovery_prefix.into(),
            state: Arc::new(Mutex::new(DiscoveryState::default())),
            sub_state: tokio::sync::Mutex::new(None),
        }
    }

    /// Starts receiving discovery messages.
    ///
    /// # Errors
    ///
    /// Returns the transport's error unchanged.
    pub async fn start_discovery(
        &self,
        device_discovered: DeviceDiscoveredCallback,
        sensors_discovered: SensorsDiscoveredCallback,
    ) -> Result<(), ProtocolError> {
        let state = Arc::clone(&self.state);
        let prefix = self.discovery_prefix.clone();
        let mut map = TopicMap::new();
        map.insert(
            TopicSlot::Discovery,
            format!("{}/#", self.discovery_prefix),
            Arc::new(move |msg| {
                handle_discovery_message(
                    &state,
                    &prefix,
                    &msg.topic,
                    &msg.payload,
                    &device_discovered,
                    &sensors_discovered,
                );
            }),
        );

        let mut sub = self.sub_state.lock().await;
        *sub = Some(self.client.subscribe(sub.take(), map).await?);
        Ok(())
    }

    /// Stops receiving discovery messages.
    ///
    /// # Errors
    ///
    /// Returns the transport's error unchanged.
    pub async fn stop_discovery(&self) -> Result<(), ProtocolError> {
        let mut sub = self.sub_state.lock().await;
        *sub = Some(self.client.subscribe(sub.take(), TopicMap::new()).await?);
        Ok(())
    }

    /// Clears a device's retained discovery topics on the broker.
    ///
    /// Accepts the MAC with or without separators.
    ///
    /// # Errors
    ///
    /// Returns the transport's error unchanged.
    pub async fn clear_discovery_topic(&self, mac: &str) -> Result<(), ProtocolError> {
        let mac = mac.replace(':', "").to_uppercase();
        let (device_known, sensors_known) = {
            let mut state = self.state.lock();
            (
                state.devices.remove(&mac).is_some(),
                state.sensors.remove(&mac).is_some(),
            )
        };
        if device_known {
            let topic = format!("{}/{mac}/config", self.discovery_prefix);
            self.client.publish(&topic, "", 0, true).await?;
        }
        if sensors_known {
            let topic = format!("{}/{mac}/sensors", self.discovery_prefix);
            self.client.publish(&topic, "", 0, true).await?;
        }
        Ok(())
    }

    /// Returns the number of devices currently known.
    #[must_use]
    pub fn device_count(&self) -> usize {
        self.state.lock().devices.len()
    }
}

impl std::fmt::Debug for TasmotaDiscovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TasmotaDiscovery")
            .field("discovery_prefix", &self.discovery_prefix)
            .field("devices", &self.device_count())
            .finish()
    }
}

/// Extracts the MAC and payload kind from a discovery topic.
///
/// Expected shape: `<prefix>/<MAC>/config` or `<prefix>/<MAC>/sensors`.
fn parse_discovery_topic<'a>(topic: &'a str, prefix: &str) -> Option<(&'a str, DiscoveryKind)> {
    let rest = topic.strip_prefix(prefix)?.strip_prefix('/')?;
    let mut parts = rest.split('/');
    let mac = parts.next()?;
    let leaf = parts.next()?;
    if mac.is_empty() || parts.next().is_some() {
        return None;
    }
    match leaf {
        "config" => Some((mac, DiscoveryKind::DeviceConfig)),
        "sensors" => Some((mac, DiscoveryKind::Sensors)),
        _ => None,
    }
}

fn build_sensor_list(
    sensor_msg: &SensorDiscovery,
    device: &DeviceDescriptor,
) -> Vec<(EntityConfig, DiscoveryHash)> {
    let mut list: Vec<(EntityConfig, DiscoveryHash)> = get_sensor_entities(sensor_msg, device)
        .into_iter()
        .map(|(cfg, hash)| (EntityConfig::Sensor(cfg), hash))
        .collect();
    list.extend(
        get_status_sensor_entities(device)
            .into_iter()
            .map(|(cfg, hash)| (EntityConfig::StatusSensor(cfg), hash)),
    );
    list
}

fn handle_discovery_message(
    state: &Mutex<DiscoveryState>,
    prefix: &str,
    topic: &str,
    payload: &str,
    device_discovered: &DeviceDiscoveredCallback,
    sensors_discovered: &SensorsDiscoveredCallback,
) {
    let Some((mac, kind)) = parse_discovery_topic(topic, prefix) else {
        tracing::warn!(topic = %topic, "Invalid discovery topic");
        return;
    };

    match kind {
        DiscoveryKind::DeviceConfig => {
            if payload.is_empty() {
                if state.lock().devices.remove(mac).is_none() {
                    return;
                }
                tracing::info!(mac = %mac, "Device removed");
                device_discovered(None, mac);
                return;
            }

            let device: DeviceDescriptor = match serde_json::from_str(payload) {
                Ok(device) => device,
                Err(err) => {
                    tracing::warn!(mac = %mac, error = %err, "Invalid discovery message");
                    return;
                }
            };
            if device.mac != mac {
                tracing::warn!(
                    topic_mac = %mac,
                    payload_mac = %device.mac,
                    "MAC mismatch between topic and payload"
                );
                return;
            }

            let buffered_sensors = {
                let mut state = state.lock();
                state.devices.insert(mac.to_string(), device.clone());
                state.sensors.get(mac).cloned()
            };
            device_discovered(Some(&device), mac);
            if let Some(sensor_msg) = buffered_sensors {
                let list = build_sensor_list(&sensor_msg, &device);
                sensors_discovered(&list, mac);
            }
        }
        DiscoveryKind::Sensors => {
            if payload.is_empty() {
                let device_known = {
                    let mut state = state.lock();
                    state.sensors.remove(mac);
                    state.devices.contains_key(mac)
                };
                if device_known {
                    sensors_discovered(&[], mac);
                }
                return;
            }

            let sensor_msg: SensorDiscovery = match serde_json::from_str(payload) {
                Ok(sensors) => sensors,
                Err(err) => {
                    tracing::warn!(mac = %mac, error = %err, "Invalid discovery message");
                    return;
                }
            };
            let device = {
                let mut state = state.lock();
                state.sensors.insert(mac.to_string(), sensor_msg.clone());
                state.devices.get(mac).cloned()
            };
            // Buffered until the device payload arrives.
            let Some(device) = device else {
                tracing::debug!(mac = %mac, "Sensor payload buffered, device unknown");
                return;
            };
            let list = build_sensor_list(&sensor_msg, &device);
            sensors_discovered(&list, mac);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::test_fixtures::{BULB_DISCOVERY, PLUG_DISCOVERY};
    use crate::mqtt::MqttTransport;
    use crate::mqtt::test_transport::RecordingTransport;

    fn plug() -> DeviceDescriptor {
        serde_json::from_str(PLUG_DISCOVERY).unwrap()
    }

    fn bulb() -> DeviceDescriptor {
        serde_json::from_str(BULB_DISCOVERY).unwrap()
    }

    #[test]
    fn switch_platform_lists_relays() {
        let entities = get_entities_for_platform(&plug(), Platform::Switch);
        assert_eq!(entities.len(), 8);
        assert!(entities[0].0.is_some());
        assert!(entities[1..].iter().all(|(entity, _)| entity.is_none()));
        assert_eq!(entities[0].1.unique_id(), "00000049A3BC_switch_relay_0");
    }

    #[test]
    fn force_light_moves_relay_to_light_platform() {
        let mut device = plug();
        device.options.force_light = 1;

        assert!(!has_entities_with_platform(&device, Platform::Switch));
        let lights = get_entities_for_platform(&device, Platform::Light);
        let populated: Vec<&EntityConfig> =
            lights.iter().filter_map(|(entity, _)| entity.as_ref()).collect();
        assert_eq!(populated.len(), 1);
        assert!(matches!(populated[0], EntityConfig::Relay(_)));
    }

    #[test]
    fn bulb_yields_light_entity() {
        let lights = get_entities_for_platform(&bulb(), Platform::Light);
        let populated: Vec<&EntityConfig> =
            lights.iter().filter_map(|(entity, _)| entity.as_ref()).collect();
        assert_eq!(populated.len(), 1);
        assert!(matches!(populated[0], EntityConfig::Light(_)));
    }

    #[test]
    fn ifan_yields_fan_and_relay_light() {
        let mut device = plug();
        device.ifan = 1;
        device.relays = vec![2, 1, 1, 1];

        let fans = get_entities_for_platform(&device, Platform::Fan);
        assert!(fans[0].0.is_some());

        // The iFan light slot surfaces as a non-dimmable relay light.
        let lights = get_entities_for_platform(&device, Platform::Light);
        let populated: Vec<(&EntityConfig, &DiscoveryHash)> = lights
            .iter()
            .filter_map(|(entity, hash)| entity.as_ref().map(|entity| (entity, hash)))
            .collect();
        assert_eq!(populated.len(), 1);
        assert!(matches!(populated[0].0, EntityConfig::Relay(_)));
        assert_eq!(populated[0].1.kind, "relay");
    }

    #[test]
    fn shutter_pairing() {
        let mut device = plug();
        device.relays = vec![3, 3, 3, 3, 1, 0, 0, 0];
        let covers = get_entities_for_platform(&device, Platform::Cover);
        assert_eq!(covers.len(), 4);
        assert!(covers[0].0.is_some());
        assert!(covers[1].0.is_some());
        assert!(covers[2].0.is_none());
        assert!(covers[3].0.is_none());
    }

    #[test]
    fn unpaired_shutter_aborts() {
        let mut device = plug();
        device.relays = vec![3, 3, 3, 1];
        let covers = get_entities_for_platform(&device, Platform::Cover);
        assert!(covers.iter().all(|(entity, _)| entity.is_none()));
    }

    #[test]
    fn binary_sensor_platform_follows_switch_modes() {
        let mut device = plug();
        device.switch_modes[0] = 1;
        device.switch_modes[1] = 0;
        let entities = get_entities_for_platform(&device, Platform::BinarySensor);
        assert!(entities[0].0.is_some());
        assert!(entities[1].0.is_none());
    }

    #[test]
    fn factory_skips_host_implemented_platforms() {
        let transport = Arc::new(RecordingTransport::default());
        let client = Arc::new(TasmotaMqttClient::new(transport as Arc<dyn MqttTransport>));

        let relay = TasmotaRelayConfig::from_discovery(&plug(), 0, Platform::Switch);
        assert!(create_entity(EntityConfig::Relay(relay), Arc::clone(&client)).is_none());

        let light = TasmotaLightConfig::from_discovery(&bulb(), 0);
        let entity = create_entity(EntityConfig::Light(light), client).unwrap();
        assert!(matches!(entity, TasmotaEntity::Light(_)));
    }

    #[test]
    fn parse_discovery_topic_shapes() {
        let prefix = "tasmota/discovery";
        assert!(matches!(
            parse_discovery_topic("tasmota/discovery/AABBCC/config", prefix),
            Some(("AABBCC", DiscoveryKind::DeviceConfig))
        ));
        assert!(matches!(
            parse_discovery_topic("tasmota/discovery/AABBCC/sensors", prefix),
            Some(("AABBCC", DiscoveryKind::Sensors))
        ));
        assert!(parse_discovery_topic("tasmota/discovery/AABBCC/other", prefix).is_none());
        assert!(parse_discovery_topic("tasmota/discovery/AABBCC", prefix).is_none());
        assert!(parse_discovery_topic("tasmota/discovery/AABBCC/config/extra", prefix).is_none());
        assert!(parse_discovery_topic("other/AABBCC/config", prefix).is_none());
    }
}
