// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Sensor discovery tree flattening and runtime sensor entities.
//!
//! The sensor discovery payload nests readings up to three levels deep:
//!
//! ```text
//! {"INA219": {"Voltage": 4.494}}                        key -> scalar
//! {"ENERGY": {"TotalTariff": [0.000, 0.017]}}           key -> array
//! {"TX23":   {"Speed": {"Act": 14.8, "Avg": 8.5}}}      key -> map
//! ```
//!
//! The resolver emits one entity descriptor per leaf with a path-derived
//! name and a quantity classification keyed by the leaf name. A handful of
//! sensor families need overrides: `ANALOG` suffixes keys with the ADC pin
//! number, CT clamp meters nest differently-typed readings under one key,
//! and two families report an `Energy` field that is not in kWh.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::Value;

use crate::availability::{AvailabilityConfig, AvailabilityHandle};
use crate::device::DeviceDescriptor;
use crate::entity::{DiscoveryHash, EntityCommon, EntityIndex, Platform};
use crate::error::ProtocolError;
use crate::mqtt::{Subscription, TasmotaMqttClient, TopicMap, TopicSlot};
use crate::payload::{PathNode, SensorPath, get_value_by_path, parse_json};
use crate::topics;

/// Sensor families that never become entities.
pub const IGNORED_SENSORS: [&str; 3] = ["Time", "PN532", "RDM6300"];

/// Unit declaration keys a sensor payload may carry at top level.
const TEMPERATURE_UNIT_KEY: &str = "TempUnit";
const PRESSURE_UNIT_KEY: &str = "PressureUnit";
const SPEED_UNIT_KEY: &str = "SpeedUnit";

const SUPPORTED_TEMPERATURE_UNITS: [&str; 2] = ["C", "F"];
const SUPPORTED_PRESSURE_UNITS: [&str; 2] = ["hPa", "mmHg"];
const SUPPORTED_SPEED_UNITS: [&str; 6] = ["m/s", "km/h", "kn", "mph", "ft/s", "yd/s"];

/// What a sensor reading measures.
///
/// Classification drives the unit and, outside this library, the host's
/// device class and icon selection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Quantity {
    /// Active power in W.
    ActivePower,
    /// Ambient light level in lux.
    Ambient,
    /// Apparent power in VA.
    ApparentPower,
    /// Battery level in %.
    Battery,
    /// CO2 concentration in ppm.
    CarbonDioxide,
    /// Correlated color temperature in K.
    Cct,
    /// Particle concentration (CF=1 standard) in µg/m³.
    Cf1,
    /// Particle concentration (CF=1 standard) in µg/m³.
    Cf2_5,
    /// Particle concentration (CF=1 standard) in µg/m³.
    Cf10,
    /// Blue color channel.
    ColorBlue,
    /// Green color channel.
    ColorGreen,
    /// Red color channel.
    ColorRed,
    /// Current in A.
    Current,
    /// Neutral conductor current in A.
    CurrentNeutral,
    /// Dew point; unit declared by the payload.
    DewPoint,
    /// Distance in cm.
    Distance,
    /// Equivalent CO2 in ppm.
    Eco2,
    /// Energy in kWh.
    Energy,
    /// Exported active energy in kWh.
    EnergyExportActive,
    /// Exported reactive energy in kVArh.
    EnergyExportReactive,
    /// Exported energy per tariff in kWh.
    EnergyExportTariff,
    /// Imported active energy in kWh.
    EnergyImportActive,
    /// Imported reactive energy in kVArh.
    EnergyImportReactive,
    /// Unitless energy reading (lightning sensors, presence radar).
    EnergyOther,
    /// Energy consumed today in kWh.
    EnergyToday,
    /// Total energy consumed in kWh.
    EnergyTotal,
    /// Total energy per tariff in kWh.
    EnergyTotalTariff,
    /// Energy consumed yesterday in kWh.
    EnergyYesterday,
    /// Line frequency in Hz.
    Frequency,
    /// Relative humidity in %.
    Humidity,
    /// Illuminance in lux.
    Illuminance,
    /// Soil moisture in %.
    Moisture,
    /// Particle count >0.3µm in ppd.
    Pb0_3,
    /// Particle count >0.5µm in ppd.
    Pb0_5,
    /// Particle count >1µm in ppd.
    Pb1,
    /// Particle count >2.5µm in ppd.
    Pb2_5,
    /// Particle count >5µm in ppd.
    Pb5,
    /// Particle count >10µm in ppd.
    Pb10,
    /// Phase angle in degrees.
    PhaseAngle,
    /// PM1 concentration in µg/m³.
    Pm1,
    /// PM2.5 concentration in µg/m³.
    Pm2_5,
    /// PM10 concentration in µg/m³.
    Pm10,
    /// Power in W.
    Power,
    /// Power factor.
    PowerFactor,
    /// Pressure; unit declared by the payload.
    Pressure,
    /// Sea-level pressure; unit declared by the payload.
    PressureAtSeaLevel,
    /// Proximity reading.
    Proximity,
    /// Reactive power in VAr.
    ReactivePower,
    /// Speed; unit declared by the payload.
    Speed,
    /// Temperature; unit declared by the payload.
    Temperature,
    /// Timestamp the energy total started counting.
    TotalStartTime,
    /// Total volatile organic compounds in ppb.
    Tvoc,
    /// Voltage in V.
    Voltage,
    /// Weight in kg.
    Weight,
    /// Unrecognized reading, passed through by name.
    Other(String),
}

impl Quantity {
    /// Classifies a leaf reading by its JSON key.
    #[must_use]
    pub fn from_key(key: &str) -> Self {
        match key {
            "ActivePower" => Self::ActivePower,
            "Ambient" => Self::Ambient,
            "ApparentPower" => Self::ApparentPower,
            "Battery" => Self::Battery,
            "CarbonDioxide" => Self::CarbonDioxide,
            "CCT" => Self::Cct,
            "CF1" => Self::Cf1,
            "CF2.5" => Self::Cf2_5,
            "CF10" => Self::Cf10,
            "Blue" => Self::ColorBlue,
            "Green" => Self::ColorGreen,
            "Red" => Self::ColorRed,
            "Current" => Self::Current,
            "CurrentNeutral" => Self::CurrentNeutral,
            "DewPoint" => Self::DewPoint,
            "Distance" => Self::Distance,
            "eCO2" => Self::Eco2,
            "Energy" => Self::Energy,
            "ExportActive" => Self::EnergyExportActive,
            "ExportReactive" => Self::EnergyExportReactive,
            "ExportTariff" => Self::EnergyExportTariff,
            "ImportActive" => Self::EnergyImportActive,
            "ImportReactive" => Self::EnergyImportReactive,
            "Today" => Self::EnergyToday,
            "Total" => Self::EnergyTotal,
            "TotalTariff" => Self::EnergyTotalTariff,
            "Yesterday" => Self::EnergyYesterday,
            "Frequency" => Self::Frequency,
            "Humidity" => Self::Humidity,
            "Illuminance" => Self::Illuminance,
            "Moisture" => Self::Moisture,
            "PB0.3" => Self::Pb0_3,
            "PB0.5" => Self::Pb0_5,
            "PB1" => Self::Pb1,
            "PB2.5" => Self::Pb2_5,
            "PB5" => Self::Pb5,
            "PB10" => Self::Pb10,
            "PhaseAngle" => Self::PhaseAngle,
            "PM1" => Self::Pm1,
            "PM2.5" => Self::Pm2_5,
            "PM10" => Self::Pm10,
            "Power" => Self::Power,
            "Factor" => Self::PowerFactor,
            "Pressure" => Self::Pressure,
            "SeaPressure" => Self::PressureAtSeaLevel,
            "Proximity" => Self::Proximity,
            "ReactivePower" => Self::ReactivePower,
            "Speed" => Self::Speed,
            "Temperature" => Self::Temperature,
            "TotalStartTime" => Self::TotalStartTime,
            "TVOC" => Self::Tvoc,
            "Voltage" => Self::Voltage,
            "Weight" => Self::Weight,
            other => Self::Other(other.to_string()),
        }
    }

    /// Returns the fixed unit of this quantity, when it has one.
    #[must_use]
    pub fn unit(&self) -> Option<&'static str> {
        match self {
            Self::ActivePower | Self::Power => Some("W"),
            Self::Ambient | Self::Illuminance => Some("lux"),
            Self::ApparentPower => Some("VA"),
            Self::Battery | Self::Humidity | Self::Moisture => Some("%"),
            Self::CarbonDioxide | Self::Eco2 => Some("ppm"),
            Self::Cct => Some("K"),
            Self::Cf1 | Self::Cf2_5 | Self::Cf10 | Self::Pm1 | Self::Pm2_5 | Self::Pm10 => {
                Some("µg/m³")
            }
            Self::ColorBlue => Some("B"),
            Self::ColorGreen => Some("G"),
            Self::ColorRed => Some("R"),
            Self::Current | Self::CurrentNeutral => Some("A"),
            Self::Distance => Some("cm"),
            Self::Energy
            | Self::EnergyExportActive
            | Self::EnergyExportTariff
            | Self::EnergyImportActive
            | Self::EnergyToday
            | Self::EnergyTotal
            | Self::EnergyTotalTariff
            | Self::EnergyYesterday => Some("kWh"),
            Self::EnergyExportReactive | Self::EnergyImportReactive => Some("kVArh"),
            Self::Frequency => Some("Hz"),
            Self::Pb0_3 | Self::Pb0_5 | Self::Pb1 | Self::Pb2_5 | Self::Pb5 | Self::Pb10 => {
                Some("ppd")
            }
            Self::PhaseAngle => Some("°"),
            Self::Proximity => Some(" "),
            Self::ReactivePower => Some("VAr"),
            Self::Tvoc => Some("ppb"),
            Self::Voltage => Some("V"),
            Self::Weight => Some("kg"),
            Self::DewPoint
            | Self::EnergyOther
            | Self::PowerFactor
            | Self::Pressure
            | Self::PressureAtSeaLevel
            | Self::Speed
            | Self::Temperature
            | Self::TotalStartTime
            | Self::Other(_) => None,
        }
    }

    /// Returns the payload key declaring this quantity's unit, with the
    /// units that declaration may carry.
    #[must_use]
    pub fn dynamic_unit(&self) -> Option<(&'static str, &'static [&'static str])> {
        match self {
            Self::DewPoint | Self::Temperature => {
                Some((TEMPERATURE_UNIT_KEY, &SUPPORTED_TEMPERATURE_UNITS))
            }
            Self::Pressure | Self::PressureAtSeaLevel => {
                Some((PRESSURE_UNIT_KEY, &SUPPORTED_PRESSURE_UNITS))
            }
            Self::Speed => Some((SPEED_UNIT_KEY, &SUPPORTED_SPEED_UNITS)),
            _ => None,
        }
    }

    /// Returns the path key of the companion last-reset timestamp, if any.
    #[must_use]
    pub fn last_reset_key(&self) -> Option<&'static str> {
        match self {
            Self::EnergyTotal => Some("TotalStartTime"),
            _ => None,
        }
    }

    /// Returns whether the quantity has a fixed-unit table entry.
    ///
    /// Used when a nested sub-key collides with a different quantity's
    /// name: only statically mapped inner keys override the outer one.
    fn is_statically_mapped(&self) -> bool {
        !matches!(
            self,
            Self::DewPoint
                | Self::Pressure
                | Self::PressureAtSeaLevel
                | Self::Speed
                | Self::Temperature
                | Self::EnergyOther
                | Self::Other(_)
        )
    }
}

/// A device's retained sensor discovery payload, deserialized.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SensorDiscovery {
    /// The nested sensor tree.
    #[serde(rename = "sn")]
    pub sensors: serde_json::Map<String, Value>,
    /// Discovery payload format version.
    #[serde(rename = "ver", default)]
    pub version: u8,
}

/// Classifies one leaf given its position in the tree.
fn classify(sensor_key: &str, sub_key: &str, subsub_key: Option<&str>) -> Quantity {
    if (sensor_key == "AS3935" || sensor_key == "LD2410") && sub_key == "Energy" {
        // Lightning energy and radar "energy" have no defined unit.
        return Quantity::EnergyOther;
    }
    if let Some(subsub_key) = subsub_key {
        // Differently-typed readings nested under one key, e.g.
        // {"ANALOG": {"CTEnergy1": {"Power": 2300, "Voltage": 230}}}
        let inner = Quantity::from_key(subsub_key);
        if inner.is_statically_mapped() {
            return inner;
        }
    }
    if sensor_key == "ANALOG" {
        // ANALOG readings are suffixed with the ADC pin number.
        let stripped = sub_key.trim_end_matches(|c: char| c.is_ascii_digit());
        if stripped.len() < sub_key.len() {
            return Quantity::from_key(stripped);
        }
    }
    Quantity::from_key(sub_key)
}

/// Immutable configuration of one sensor entity.
#[derive(Debug, Clone, PartialEq)]
pub struct TasmotaSensorConfig {
    /// Fields shared by all entities.
    pub common: EntityCommon,
    /// Availability wiring.
    pub availability: AvailabilityConfig,
    /// The value seen at discovery time.
    pub discovered_value: Value,
    /// Path of the companion last-reset timestamp, if any.
    pub last_reset_path: Option<SensorPath>,
    /// What the sensor measures.
    pub quantity: Quantity,
    /// Unit of the reported value, fixed or payload-declared.
    pub unit: Option<String>,
    /// Periodic sensor telemetry topic.
    pub state_topic: String,
    /// Polled `STATUS10` response topic.
    pub status_topic: String,
    /// Path of the value inside telemetry payloads.
    pub value_path: SensorPath,
}

impl TasmotaSensorConfig {
    /// Returns the entity's unique id.
    #[must_use]
    pub fn unique_id(&self) -> String {
        let sensor_id = self
            .value_path
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("_");
        format!("{}_sensor_sensor_{sensor_id}", self.common.mac)
    }

    /// Returns whether the sensor was discovered with a numeric value.
    #[must_use]
    pub fn discovered_as_numeric(&self) -> bool {
        self.discovered_value.is_number()
    }
}

fn sensor_entity(
    sensor_msg: &SensorDiscovery,
    device: &DeviceDescriptor,
    value_path: SensorPath,
    parent_path: &[PathNode],
    quantity: Quantity,
    discovered_value: &Value,
) -> (TasmotaSensorConfig, DiscoveryHash) {
    let name = value_path
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    let hash = DiscoveryHash {
        mac: device.mac.clone(),
        platform: Platform::Sensor,
        kind: "sensor",
        id: EntityIndex::Named(name.clone()),
    };

    let unit = match quantity.dynamic_unit() {
        Some((declaration_key, supported)) => {
            let declared = sensor_msg
                .sensors
                .get(declaration_key)
                .and_then(Value::as_str);
            match declared {
                Some(unit) if supported.contains(&unit) => Some(unit.to_string()),
                Some(unit) => {
                    tracing::warn!(unit = %unit, quantity = ?quantity, "Unknown unit");
                    Some(unit.to_string())
                }
                None => {
                    tracing::warn!(quantity = ?quantity, "Missing unit declaration");
                    None
                }
            }
        }
        None => quantity.unit().map(ToString::to_string),
    };

    let last_reset_path = quantity.last_reset_key().map(|key| {
        let mut path: SensorPath = parent_path.to_vec();
        path.push(PathNode::key(key));
        path
    });

    let config = TasmotaSensorConfig {
        common: EntityCommon {
            endpoint: "sensor",
            index: EntityIndex::None,
            friendly_name: Some(name),
            mac: device.mac.clone(),
            platform: Platform::Sensor,
            poll_topic: topics::command_status_topic(device),
            poll_payload: "10".to_string(),
        },
        availability: AvailabilityConfig::from_device(device),
        discovered_value: discovered_value.clone(),
        last_reset_path,
        quantity,
        unit,
        state_topic: topics::tele_sensor_topic(device),
        status_topic: topics::stat_status_topic(device, Some(10)),
        value_path,
    };
    (config, hash)
}

/// Flattens a sensor discovery tree into one entity descriptor per leaf.
#[must_use]
pub fn get_sensor_entities(
    sensor_msg: &SensorDiscovery,
    device: &DeviceDescriptor,
) -> Vec<(TasmotaSensorConfig, DiscoveryHash)> {
    let mut entities = Vec::new();

    for (sensor_key, sensor) in &sensor_msg.sensors {
        if IGNORED_SENSORS.contains(&sensor_key.as_str()) {
            continue;
        }
        let Some(sensor) = sensor.as_object() else {
            continue;
        };
        let sensor_path = vec![PathNode::key(sensor_key)];

        for (sub_key, subsensor) in sensor {
            let mut sub_path = sensor_path.clone();
            sub_path.push(PathNode::key(sub_key));

            match subsensor {
                Value::Object(nested) => {
                    for (subsub_key, value) in nested {
                        let mut leaf_path = sub_path.clone();
                        leaf_path.push(PathNode::key(subsub_key));
                        let parent_path = sub_path.clone();
                        entities.push(sensor_entity(
                            sensor_msg,
                            device,
                            leaf_path,
                            &parent_path,
                            classify(sensor_key, sub_key, Some(subsub_key)),
                            value,
                        ));
                    }
                }
                Value::Array(values) => {
                    for (idx, value) in values.iter().enumerate() {
                        let mut leaf_path = sub_path.clone();
                        leaf_path.push(PathNode::Index(idx));
                        entities.push(sensor_entity(
                            sensor_msg,
                            device,
                            leaf_path,
                            &sensor_path,
                            classify(sensor_key, sub_key, None),
                            value,
                        ));
                    }
                }
                value => {
                    entities.push(sensor_entity(
                        sensor_msg,
                        device,
                        sub_path.clone(),
                        &sensor_path,
                        classify(sensor_key, sub_key, None),
                        value,
                    ));
                }
            }
        }
    }

    entities
}

/// Callback invoked with a new reading and the optional last-reset value.
pub type SensorCallback = Box<dyn Fn(&Value, Option<&Value>) + Send + Sync>;

/// Runtime representation of one sensor entity.
pub struct TasmotaSensor {
    cfg: TasmotaSensorConfig,
    client: Arc<TasmotaMqttClient>,
    availability: AvailabilityHandle,
    on_state: Arc<RwLock<Option<SensorCallback>>>,
    sub_state: tokio::sync::Mutex<Option<Subscription>>,
}

impl TasmotaSensor {
    /// Creates the runtime entity for a sensor config.
    #[must_use]
    pub fn new(cfg: TasmotaSensorConfig, client: Arc<TasmotaMqttClient>) -> Self {
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
    pub fn config(&self) -> &TasmotaSensorConfig {
        &self.cfg
    }

    /// Returns the entity's unique id.
    #[must_use]
    pub fn unique_id(&self) -> String {
        self.cfg.unique_id()
    }

    /// Returns the availability sub-object.
    #[must_use]
    pub fn availability(&self) -> &AvailabilityHandle {
        &self.availability
    }

    /// Sets the callback fired on new readings.
    pub fn set_on_state<F>(&self, callback: F)
    where
        F: Fn(&Value, Option<&Value>) + Send + Sync + 'static,
    {
        *self.on_state.write() = Some(Box::new(callback));
    }

    /// Requests a debounced status re-poll.
    pub fn poll_status(&self) {
        self.availability.poll_status();
    }

    /// Subscribes the telemetry, status and availability topics.
    ///
    /// # Errors
    ///
    /// Returns the transport's error unchanged.
    pub async fn subscribe_topics(&self) -> Result<(), ProtocolError> {
        let handler = sensor_state_handler(self.cfg.clone(), Arc::clone(&self.on_state));
        let mut map = TopicMap::new();
        map.insert(TopicSlot::Sensor, self.cfg.state_topic.clone(), Arc::clone(&handler));
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
}

impl std::fmt::Debug for TasmotaSensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TasmotaSensor")
            .field("unique_id", &self.unique_id())
            .field("quantity", &self.cfg.quantity)
            .finish()
    }
}

fn sensor_state_handler(
    cfg: TasmotaSensorConfig,
    on_state: Arc<RwLock<Option<SensorCallback>>>,
) -> crate::mqtt::MessageHandler {
    Arc::new(move |msg| {
        let Some(json) = parse_json(&msg.payload) else {
            return;
        };

        // Polled status responses wrap the sensor tree in StatusSNS.
        let (value_path, last_reset_path): (SensorPath, Option<SensorPath>) =
            if msg.topic == cfg.state_topic {
                (cfg.value_path.clone(), cfg.last_reset_path.clone())
            } else {
                let mut path: SensorPath = vec![PathNode::key("StatusSNS")];
                path.extend(cfg.value_path.iter().cloned());
                let last_reset = cfg.last_reset_path.as_ref().map(|reset| {
                    let mut path: SensorPath = vec![PathNode::key("StatusSNS")];
                    path.extend(reset.iter().cloned());
                    path
                });
                (path, last_reset)
            };

        let (parent_path, last_node) = match value_path.split_last() {
            Some((last, parent)) => (parent, last),
            None => return,
        };
        let Some(parent) = get_value_by_path(&json, parent_path) else {
            return;
        };

        // Indexed sensors may be announced with more entries than a given
        // telemetry payload carries; firmware builds disagree on channel
        // counts. Out-of-range lookups are silently dropped.
        let state = match (parent, last_node) {
            (Value::Object(map), PathNode::Key(key)) => map.get(key),
            (Value::Array(values), PathNode::Index(idx)) => values.get(*idx),
            (scalar, PathNode::Index(0)) if !scalar.is_object() && !scalar.is_array() => {
                Some(scalar)
            }
            _ => None,
        };
        let Some(state) = state else {
            return;
        };

        let last_reset = last_reset_path
            .as_deref()
            .and_then(|path| get_value_by_path(&json, path));
        if let Some(callback) = on_state.read().as_ref() {
            callback(state, last_reset);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::test_fixtures::PLUG_DISCOVERY;
    use crate::mqtt::MqttTransport;
    use crate::mqtt::test_transport::RecordingTransport;
    use parking_lot::Mutex;
    use serde_json::json;

    fn device() -> DeviceDescriptor {
        serde_json::from_str(PLUG_DISCOVERY).unwrap()
    }

    fn sensors(payload: &str) -> SensorDiscovery {
        serde_json::from_str(payload).unwrap()
    }

    #[test]
    fn energy_leaves_resolve_to_two_entities() {
        let msg = sensors(r#"{"sn": {"ENERGY": {"Total": 0.017, "Voltage": 234.3}}, "ver": 1}"#);
        let entities = get_sensor_entities(&msg, &device());
        assert_eq!(entities.len(), 2);

        let (total, total_hash) = entities
            .iter()
            .find(|(cfg, _)| cfg.common.friendly_name.as_deref() == Some("ENERGY Total"))
            .unwrap();
        assert_eq!(total.quantity, Quantity::EnergyTotal);
        assert_eq!(total.unit.as_deref(), Some("kWh"));
        assert_eq!(total_hash.id, EntityIndex::Named("ENERGY Total".to_string()));

        let (voltage, _) = entities
            .iter()
            .find(|(cfg, _)| cfg.common.friendly_name.as_deref() == Some("ENERGY Voltage"))
            .unwrap();
        assert_eq!(voltage.quantity, Quantity::Voltage);
        assert_eq!(voltage.unit.as_deref(), Some("V"));
    }

    #[test]
    fn resolver_is_deterministic() {
        let msg = sensors(r#"{"sn": {"ENERGY": {"Total": 0.017, "Voltage": 234.3}}, "ver": 1}"#);
        let first: Vec<DiscoveryHash> = get_sensor_entities(&msg, &device())
            .into_iter()
            .map(|(_, hash)| hash)
            .collect();
        let second: Vec<DiscoveryHash> = get_sensor_entities(&msg, &device())
            .into_iter()
            .map(|(_, hash)| hash)
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn array_leaves_get_indexed_paths() {
        let msg = sensors(r#"{"sn": {"ENERGY": {"TotalTariff": [0.000, 0.017]}}, "ver": 1}"#);
        let entities = get_sensor_entities(&msg, &device());
        assert_eq!(entities.len(), 2);
        assert_eq!(
            entities[0].0.common.friendly_name.as_deref(),
            Some("ENERGY TotalTariff 0")
        );
        assert_eq!(
            entities[1].0.value_path,
            vec![
                PathNode::key("ENERGY"),
                PathNode::key("TotalTariff"),
                PathNode::Index(1)
            ]
        );
        assert_eq!(entities[0].0.quantity, Quantity::EnergyTotalTariff);
    }

    #[test]
    fn nested_leaves_use_dynamic_speed_unit() {
        let msg = sensors(
            r#"{"sn": {"TX23": {"Speed": {"Act": 14.8, "Avg": 8.5}}, "SpeedUnit": "km/h"}, "ver": 1}"#,
        );
        let entities = get_sensor_entities(&msg, &device());
        assert_eq!(entities.len(), 2);
        let (act, _) = entities
            .iter()
            .find(|(cfg, _)| cfg.common.friendly_name.as_deref() == Some("TX23 Speed Act"))
            .unwrap();
        assert_eq!(act.quantity, Quantity::Speed);
        assert_eq!(act.unit.as_deref(), Some("km/h"));
    }

    #[test]
    fn temperature_unit_is_payload_declared() {
        let msg = sensors(
            r#"{"sn": {"DS18B20": {"Temperature": 21.5}, "TempUnit": "F"}, "ver": 1}"#,
        );
        let entities = get_sensor_entities(&msg, &device());
        assert_eq!(entities[0].0.unit.as_deref(), Some("F"));
    }

    #[test]
    fn analog_pin_suffix_is_stripped() {
        let msg = sensors(r#"{"sn": {"ANALOG": {"Temperature1": 21.5}, "TempUnit": "C"}, "ver": 1}"#);
        let entities = get_sensor_entities(&msg, &device());
        assert_eq!(entities[0].0.quantity, Quantity::Temperature);
        assert_eq!(entities[0].0.unit.as_deref(), Some("C"));
        // The path keeps the raw key.
        assert_eq!(
            entities[0].0.common.friendly_name.as_deref(),
            Some("ANALOG Temperature1")
        );
    }

    #[test]
    fn ct_clamp_inner_keys_override_quantity() {
        let msg = sensors(
            r#"{"sn": {"ANALOG": {"CTEnergy1": {"Power": 2300, "Voltage": 230, "Current": 10}}}, "ver": 1}"#,
        );
        let entities = get_sensor_entities(&msg, &device());
        let quantities: Vec<&Quantity> = entities.iter().map(|(cfg, _)| &cfg.quantity).collect();
        assert!(quantities.contains(&&Quantity::Power));
        assert!(quantities.contains(&&Quantity::Voltage));
        assert!(quantities.contains(&&Quantity::Current));
    }

    #[test]
    fn lightning_energy_has_no_unit() {
        let msg = sensors(r#"{"sn": {"AS3935": {"Energy": 13122}}, "ver": 1}"#);
        let entities = get_sensor_entities(&msg, &device());
        assert_eq!(entities[0].0.quantity, Quantity::EnergyOther);
        assert_eq!(entities[0].0.unit, None);
    }

    #[test]
    fn ignored_families_are_skipped() {
        let msg = sensors(
            r#"{"sn": {"Time": "2020-01-01T00:00:00", "PN532": {"UID": "AA"}, "INA219": {"Voltage": 4.5}}, "ver": 1}"#,
        );
        let entities = get_sensor_entities(&msg, &device());
        assert_eq!(entities.len(), 1);
        assert_eq!(
            entities[0].0.common.friendly_name.as_deref(),
            Some("INA219 Voltage")
        );
    }

    #[test]
    fn total_energy_gets_last_reset_path() {
        let msg = sensors(r#"{"sn": {"ENERGY": {"Total": 0.017}}, "ver": 1}"#);
        let entities = get_sensor_entities(&msg, &device());
        assert_eq!(
            entities[0].0.last_reset_path,
            Some(vec![PathNode::key("ENERGY"), PathNode::key("TotalStartTime")])
        );
    }

    #[test]
    fn unique_id_flattens_path() {
        let msg = sensors(r#"{"sn": {"ENERGY": {"TotalTariff": [0.0, 0.1]}}, "ver": 1}"#);
        let entities = get_sensor_entities(&msg, &device());
        assert_eq!(
            entities[1].0.unique_id(),
            "00000049A3BC_sensor_sensor_ENERGY_TotalTariff_1"
        );
    }

    fn runtime_sensor(
        sensor_payload: &str,
        pick: &str,
    ) -> (Arc<TasmotaMqttClient>, TasmotaSensor, Arc<Mutex<Vec<Value>>>) {
        let transport = Arc::new(RecordingTransport::default());
        let client = Arc::new(TasmotaMqttClient::new(transport as Arc<dyn MqttTransport>));
        let msg = sensors(sensor_payload);
        let (cfg, _) = get_sensor_entities(&msg, &device())
            .into_iter()
            .find(|(cfg, _)| cfg.common.friendly_name.as_deref() == Some(pick))
            .unwrap();
        let sensor = TasmotaSensor::new(cfg, Arc::clone(&client));
        let received = Arc::new(Mutex::new(Vec::new()));
        let received_clone = Arc::clone(&received);
        sensor.set_on_state(move |value, _| {
            received_clone.lock().push(value.clone());
        });
        (client, sensor, received)
    }

    #[tokio::test]
    async fn telemetry_updates_reach_callback() {
        let (client, sensor, received) = runtime_sensor(
            r#"{"sn": {"ENERGY": {"Voltage": 234.3}}, "ver": 1}"#,
            "ENERGY Voltage",
        );
        sensor.subscribe_topics().await.unwrap();

        client.handle_message(
            "tele/tasmota_49A3BC/SENSOR",
            r#"{"ENERGY": {"Voltage": 230.1}}"#,
            0,
            false,
        );
        assert_eq!(*received.lock(), vec![json!(230.1)]);
    }

    #[tokio::test]
    async fn status_updates_unwrap_status_sns() {
        let (client, sensor, received) = runtime_sensor(
            r#"{"sn": {"ENERGY": {"Voltage": 234.3}}, "ver": 1}"#,
            "ENERGY Voltage",
        );
        sensor.subscribe_topics().await.unwrap();

        client.handle_message(
            "stat/tasmota_49A3BC/STATUS10",
            r#"{"StatusSNS": {"ENERGY": {"Voltage": 229.0}}}"#,
            0,
            false,
        );
        assert_eq!(*received.lock(), vec![json!(229.0)]);
    }

    #[tokio::test]
    async fn missing_index_is_tolerated() {
        // Announced with two phases, reporting only one.
        let (client, sensor, received) = runtime_sensor(
            r#"{"sn": {"ENERGY": {"Voltage": [230.0, 231.0]}}, "ver": 1}"#,
            "ENERGY Voltage 1",
        );
        sensor.subscribe_topics().await.unwrap();

        client.handle_message(
            "tele/tasmota_49A3BC/SENSOR",
            r#"{"ENERGY": {"Voltage": [229.5]}}"#,
            0,
            false,
        );
        assert!(received.lock().is_empty());
    }

    #[tokio::test]
    async fn missing_field_is_tolerated() {
        let (client, sensor, received) = runtime_sensor(
            r#"{"sn": {"ENERGY": {"Voltage": 234.3}}, "ver": 1}"#,
            "ENERGY Voltage",
        );
        sensor.subscribe_topics().await.unwrap();

        client.handle_message(
            "tele/tasmota_49A3BC/SENSOR",
            r#"{"ENERGY": {"Total": 0.2}}"#,
            0,
            false,
        );
        client.handle_message("tele/tasmota_49A3BC/SENSOR", "not json", 0, false);
        assert!(received.lock().is_empty());
    }

    #[tokio::test]
    async fn scalar_update_for_single_element_array() {
        // Announced as a one-element array, reported as a bare scalar.
        let (client, sensor, received) = runtime_sensor(
            r#"{"sn": {"ENERGY": {"Voltage": [230.0]}}, "ver": 1}"#,
            "ENERGY Voltage 0",
        );
        sensor.subscribe_topics().await.unwrap();

        client.handle_message(
            "tele/tasmota_49A3BC/SENSOR",
            r#"{"ENERGY": {"Voltage": 231.5}}"#,
            0,
            false,
        );
        assert_eq!(*received.lock(), vec![json!(231.5)]);
    }

    #[tokio::test]
    async fn last_reset_accompanies_total() {
        let (client, sensor, received) = runtime_sensor(
            r#"{"sn": {"ENERGY": {"Total": 0.017}}, "ver": 1}"#,
            "ENERGY Total",
        );
        let resets = Arc::new(Mutex::new(Vec::new()));
        let resets_clone = Arc::clone(&resets);
        sensor.set_on_state(move |_, last_reset| {
            resets_clone.lock().push(last_reset.cloned());
        });
        sensor.subscribe_topics().await.unwrap();

        client.handle_message(
            "tele/tasmota_49A3BC/SENSOR",
            r#"{"ENERGY": {"Total": 0.020, "TotalStartTime": "2018-11-23T15:33:47"}}"#,
            0,
            false,
        );
        assert_eq!(
            *resets.lock(),
            vec![Some(json!("2018-11-23T15:33:47"))]
        );
        // The first callback was replaced before subscribing.
        assert!(received.lock().is_empty());
    }
}
