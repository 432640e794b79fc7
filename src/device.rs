// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Typed representation of the retained device discovery payload.
//!
//! Tasmota publishes a JSON document with heavily abbreviated keys to
//! `<discovery_prefix>/<MAC>/config`. [`DeviceDescriptor`] deserializes it
//! wholesale; fields introduced by later firmware default to their
//! pre-introduction values so older devices keep parsing.

use serde::Deserialize;

/// Role assigned to a relay slot in the `rl` capability list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayRole {
    /// Slot unused.
    None,
    /// Plain on/off relay.
    Relay,
    /// Relay driving a light channel.
    Light,
    /// Relay paired into a shutter.
    Shutter,
}

impl From<u8> for RelayRole {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Relay,
            2 => Self::Light,
            3 => Self::Shutter,
            _ => Self::None,
        }
    }
}

/// The `so` option bitfield of a discovery payload.
///
/// Keys are `SetOption` numbers serialized as strings; every field defaults
/// to 0 because devices only report the options their firmware knows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct DeviceOptions {
    /// `SetOption4`: return MQTT response as `RESULT` or `%COMMAND%`.
    #[serde(rename = "4", default)]
    pub mqtt_response: u8,
    /// `SetOption11`: swap button single and double press functionality.
    #[serde(rename = "11", default)]
    pub button_swap: u8,
    /// `SetOption13`: allow immediate action on single button press.
    #[serde(rename = "13", default)]
    pub button_single: u8,
    /// `SetOption17`: show color string as comma-separated decimals.
    #[serde(rename = "17", default)]
    pub decimal_text: u8,
    /// `SetOption20`: update dimmer/color/CT without turning power on.
    #[serde(rename = "20", default)]
    pub not_power_linked: u8,
    /// `SetOption30`: enforce discovery of relays as lights.
    #[serde(rename = "30", default)]
    pub force_light: u8,
    /// `SetOption68`: multi-channel PWM instead of a single light.
    #[serde(rename = "68", default)]
    pub pwm_multi_channels: u8,
    /// `SetOption73`: decouple buttons and send multi-press MQTT messages.
    #[serde(rename = "73", default)]
    pub mqtt_buttons: u8,
    /// `SetOption80`: blinds and shutters support.
    #[serde(rename = "80", default)]
    pub shutter_mode: u8,
    /// `SetOption82`: reduce the CT range from 153..500 to 200..380.
    #[serde(rename = "82", default)]
    pub reduced_ct_range: u8,
    /// `SetOption114`: detach switches and send MQTT messages.
    #[serde(rename = "114", default)]
    pub mqtt_switches: u8,
    /// `SetOption117`: run fading at fixed duration instead of fixed slew rate.
    #[serde(rename = "117", default)]
    pub fade_fixed_duration: u8,
}

/// A device's retained discovery payload, deserialized.
///
/// Replaced wholesale whenever a new payload arrives for the same MAC;
/// never mutated in place.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeviceDescriptor {
    /// Device IP address.
    pub ip: String,
    /// Device name.
    #[serde(rename = "dn")]
    pub device_name: String,
    /// Per-relay friendly names; `null` entries mean "unset".
    #[serde(rename = "fn")]
    pub friendly_names: Vec<Option<String>>,
    /// Topic template with `%prefix%`/`%topic%`/`%hostname%`/`%id%` macros.
    #[serde(rename = "ft")]
    pub full_topic: String,
    /// Device hostname.
    #[serde(rename = "hn")]
    pub hostname: String,
    /// Set when the device is an iFan controller.
    #[serde(rename = "if", default)]
    pub ifan: u8,
    /// Light subtype (0=none, 1=single, 2=coldwarm, 3=rgb, 4=rgbw, 5=rgbcw).
    #[serde(rename = "lt_st", default)]
    pub light_subtype: u8,
    /// Whether RGB and white channels are linked into a single light.
    #[serde(rename = "lk", default)]
    pub link_rgb_ct: u8,
    /// Device MAC, 12 uppercase hex digits without separators.
    pub mac: String,
    /// Device model.
    #[serde(rename = "md")]
    pub model: String,
    /// Availability "offline" literal.
    #[serde(rename = "ofln")]
    pub offline: String,
    /// Availability "online" literal.
    #[serde(rename = "onln")]
    pub online: String,
    /// `SetOption` bitfield.
    #[serde(rename = "so", default)]
    pub options: DeviceOptions,
    /// Topic prefixes, in `[cmnd, stat, tele]` order.
    #[serde(rename = "tp")]
    pub prefixes: Vec<String>,
    /// Power state literals, in `[off, on, toggle, hold]` order.
    #[serde(rename = "state")]
    pub state_names: Vec<String>,
    /// Firmware version.
    #[serde(rename = "sw")]
    pub sw_version: String,
    /// Device topic.
    #[serde(rename = "t")]
    pub topic: String,
    /// Set when the device is Tuya-based.
    #[serde(rename = "ty", default)]
    pub tuya: u8,
    /// Relay roles, one entry per relay slot.
    #[serde(rename = "rl", default)]
    pub relays: Vec<u8>,
    /// Switch modes, `-1` for unused slots.
    #[serde(rename = "swc", default)]
    pub switch_modes: Vec<i8>,
    /// Switch names; `null` entries mean "unset".
    #[serde(rename = "swn", default)]
    pub switch_names: Vec<Option<String>>,
    /// Button configuration flags.
    #[serde(rename = "btn", default)]
    pub buttons: Vec<u8>,
    /// Set when the device reports a battery level.
    #[serde(rename = "bat", default)]
    pub battery: u8,
    /// Per-shutter option bits.
    #[serde(rename = "sho", default)]
    pub shutter_options: Vec<u8>,
    /// Per-shutter `[tilt_min, tilt_max, tilt_duration]` triples.
    #[serde(rename = "sht", default)]
    pub shutter_tilt: Vec<Vec<i32>>,
    /// Discovery payload format version.
    #[serde(rename = "ver", default)]
    pub version: u8,
}

impl DeviceDescriptor {
    /// Returns the role of relay slot `idx`.
    #[must_use]
    pub fn relay_role(&self, idx: usize) -> RelayRole {
        self.relays.get(idx).copied().map_or(RelayRole::None, RelayRole::from)
    }

    /// Returns the roles of all relay slots.
    #[must_use]
    pub fn relay_roles(&self) -> Vec<RelayRole> {
        self.relays.iter().copied().map(RelayRole::from).collect()
    }

    /// Returns the slot index of the first relay driving a light.
    #[must_use]
    pub fn first_light_relay(&self) -> Option<usize> {
        self.relays.iter().position(|&r| RelayRole::from(r) == RelayRole::Light)
    }

    /// Returns the host-facing identity summary of this device.
    #[must_use]
    pub fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            ip: self.ip.clone(),
            mac: self.mac.clone(),
            manufacturer: "Tasmota",
            model: self.model.clone(),
            name: self.device_name.clone(),
            sw_version: self.sw_version.clone(),
        }
    }
}

/// Identity summary handed to the automation host on device discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Device IP address.
    pub ip: String,
    /// Device MAC.
    pub mac: String,
    /// Always "Tasmota".
    pub manufacturer: &'static str,
    /// Device model.
    pub model: String,
    /// Device name.
    pub name: String,
    /// Firmware version.
    pub sw_version: String,
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_parses_plug_payload() {
        let device: DeviceDescriptor =
            serde_json::from_str(test_fixtures::PLUG_DISCOVERY).unwrap();
        assert_eq!(device.mac, "00000049A3BC");
        assert_eq!(device.topic, "tasmota_49A3BC");
        assert_eq!(device.relay_role(0), RelayRole::Relay);
        assert_eq!(device.relay_role(1), RelayRole::None);
        assert_eq!(device.state_names[1], "ON");
    }

    #[test]
    fn descriptor_parses_bulb_payload() {
        let device: DeviceDescriptor =
            serde_json::from_str(test_fixtures::BULB_DISCOVERY).unwrap();
        assert_eq!(device.relay_role(0), RelayRole::Light);
        assert_eq!(device.light_subtype, 5);
        assert_eq!(device.first_light_relay(), Some(0));
    }

    #[test]
    fn descriptor_tolerates_missing_optional_fields() {
        // A minimal payload in the shape of early discovery firmware.
        let payload = r#"{
            "ip": "192.168.0.1",
            "dn": "Old",
            "fn": ["Old"],
            "ft": "%prefix%/%topic%/",
            "hn": "old",
            "mac": "AABBCCDDEEFF",
            "md": "Generic",
            "ofln": "Offline",
            "onln": "Online",
            "state": ["OFF", "ON", "TOGGLE", "HOLD"],
            "sw": "9.0.0",
            "t": "old",
            "tp": ["cmnd", "stat", "tele"],
            "rl": [1]
        }"#;
        let device: DeviceDescriptor = serde_json::from_str(payload).unwrap();
        assert_eq!(device.ifan, 0);
        assert_eq!(device.battery, 0);
        assert_eq!(device.options, DeviceOptions::default());
        assert!(device.shutter_options.is_empty());
    }

    #[test]
    fn descriptor_rejects_malformed_payload() {
        assert!(serde_json::from_str::<DeviceDescriptor>("{}").is_err());
        assert!(serde_json::from_str::<DeviceDescriptor>("not json").is_err());
    }

    #[test]
    fn device_info_summary() {
        let device: DeviceDescriptor =
            serde_json::from_str(test_fixtures::PLUG_DISCOVERY).unwrap();
        let info = device.device_info();
        assert_eq!(info.manufacturer, "Tasmota");
        assert_eq!(info.name, "Plug");
        assert_eq!(info.mac, device.mac);
    }

    #[test]
    fn options_parse_from_numeric_keys() {
        let options: DeviceOptions =
            serde_json::from_str(r#"{"30": 1, "117": 1, "999": 1}"#).unwrap();
        assert_eq!(options.force_light, 1);
        assert_eq!(options.fade_fixed_duration, 1);
        assert_eq!(options.button_swap, 0);
    }
}
